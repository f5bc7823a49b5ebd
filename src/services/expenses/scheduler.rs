//! 每日汇总任务

use chrono::{Days, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::service::ExpenseManager;
use crate::error::ServiceResult;

/// 一次调度的执行结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyReportOutcome {
    pub users: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_amount: f64,
}

/// 距离下一个 `hour:00` 的时长，恰好在整点时顺延到次日
pub fn next_run_delay(now: NaiveDateTime, hour: u32) -> Duration {
    let run_time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let mut next = now.date().and_time(run_time);
    if next <= now {
        next = next
            .checked_add_days(Days::new(1))
            .unwrap_or(next + chrono::Duration::days(1));
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// 为所有有支出的用户并发计算前一天的汇总
pub async fn run_daily_reports(
    manager: &ExpenseManager,
    today: NaiveDate,
) -> ServiceResult<DailyReportOutcome> {
    let day = today.pred_opt().unwrap_or(today);
    let user_ids = manager.active_user_ids().await?;
    tracing::info!(date = %day, users = user_ids.len(), "Running daily expense reports");

    let tasks = user_ids.iter().map(|&user_id| async move {
        (user_id, manager.summarize(user_id, day, day).await)
    });
    let results = futures::future::join_all(tasks).await;

    let mut outcome = DailyReportOutcome {
        users: user_ids.len(),
        ..Default::default()
    };
    for (user_id, result) in results {
        match result {
            Ok(summary) => {
                outcome.succeeded += 1;
                outcome.total_amount += summary.total_amount;
                tracing::debug!(
                    user_id,
                    total = summary.total_amount,
                    count = summary.total_transactions,
                    "Daily summary generated"
                );
            }
            Err(e) => {
                outcome.failed += 1;
                tracing::error!(user_id, error = %e, "Daily summary failed");
            }
        }
    }

    tracing::info!(
        date = %day,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        total = outcome.total_amount,
        "Daily expense reports completed"
    );
    Ok(outcome)
}

pub fn spawn_report_scheduler(
    manager: ExpenseManager,
    hour: u32,
    tracker: &TaskTracker,
    cancel: CancellationToken,
) {
    tracker.spawn(async move {
        loop {
            let delay = next_run_delay(Local::now().naive_local(), hour);
            tracing::debug!(seconds = delay.as_secs(), "Next daily report scheduled");
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Report scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    let today = Local::now().date_naive();
                    if let Err(e) = run_daily_reports(&manager, today).await {
                        tracing::error!(error = %e, "Daily expense reports failed");
                    }
                }
            }
        }
    });
}
