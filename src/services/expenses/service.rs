use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

use super::directory::UserDirectory;
use super::model::{Expense, ExpenseReport, ExpenseRequest, ExpenseSummary, NewExpense, parse_date};
use super::report;
use super::repository::ExpenseRepository;
use crate::error::{ServiceError, ServiceResult};

/// 按月筛选：只给月份时匹配任意年份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthFilter {
    Month(u32),
    YearMonth(i32, u32),
}

impl MonthFilter {
    /// 接受 "3"、"03" 或 "2024-03"
    pub fn parse(value: &str) -> ServiceResult<Self> {
        let invalid = || ServiceError::BusinessRule("Month is invalid".into());
        // 只允许纯数字，拒绝 "+3" 这类带符号的写法
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        let value = value.trim();

        let filter = match value.split_once('-') {
            Some((year, month))
                if year.len() == 4 && month.len() == 2 && digits(year) && digits(month) =>
            {
                let year: i32 = year.parse().map_err(|_| invalid())?;
                let month: u32 = month.parse().map_err(|_| invalid())?;
                MonthFilter::YearMonth(year, month)
            }
            Some(_) => return Err(invalid()),
            None if (1..=2).contains(&value.len()) && digits(value) => {
                MonthFilter::Month(value.parse().map_err(|_| invalid())?)
            }
            None => return Err(invalid()),
        };

        let month = match filter {
            MonthFilter::Month(m) | MonthFilter::YearMonth(_, m) => m,
        };
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(filter)
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        match *self {
            MonthFilter::Month(m) => date.month() == m,
            MonthFilter::YearMonth(y, m) => date.year() == y && date.month() == m,
        }
    }
}

/// 支出业务逻辑
#[derive(Clone)]
pub struct ExpenseManager {
    repository: Arc<dyn ExpenseRepository>,
    directory: Arc<dyn UserDirectory>,
    heavy_tasks: Arc<Semaphore>,
}

impl ExpenseManager {
    pub fn new(
        repository: Arc<dyn ExpenseRepository>,
        directory: Arc<dyn UserDirectory>,
        heavy_task_limit: usize,
    ) -> Self {
        Self {
            repository,
            directory,
            heavy_tasks: Arc::new(Semaphore::new(heavy_task_limit.max(1))),
        }
    }

    /// 用户名 -> 用户ID
    pub async fn resolve_user_id(&self, username: &str) -> ServiceResult<i64> {
        if username.trim().is_empty() {
            return Err(ServiceError::BusinessRule(
                "Username cannot be null or empty".into(),
            ));
        }
        match self.directory.find_by_username(username).await? {
            Some(user) => Ok(user.id),
            None => {
                tracing::warn!(username = %username, "User not found");
                Err(ServiceError::not_found("User", "username", username))
            }
        }
    }

    pub async fn expenses_for_user(&self, user_id: i64) -> ServiceResult<Vec<Expense>> {
        let expenses = self.repository.find_by_user(user_id).await?;
        tracing::info!(user_id, count = expenses.len(), "Fetched expenses");
        Ok(expenses)
    }

    pub async fn expense_by_id(&self, id: i64, user_id: i64) -> ServiceResult<Expense> {
        if id <= 0 {
            return Err(ServiceError::BusinessRule(
                "Expense Id must be positive number".into(),
            ));
        }
        self.repository
            .find_by_id_and_user(id, user_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id, expense_id = id, "Expense not found");
                ServiceError::not_found("Expense", "id", id)
            })
    }

    /// 按日期倒序首次出现的顺序去重
    pub async fn categories_for_user(&self, user_id: i64) -> ServiceResult<Vec<String>> {
        let mut categories: Vec<String> = Vec::new();
        for expense in self.repository.find_by_user(user_id).await? {
            if !categories.contains(&expense.category) {
                categories.push(expense.category);
            }
        }
        tracing::info!(user_id, count = categories.len(), "Fetched categories");
        Ok(categories)
    }

    pub async fn expenses_on_day(&self, date: &str, user_id: i64) -> ServiceResult<Vec<Expense>> {
        if date.trim().is_empty() {
            return Err(ServiceError::BusinessRule(
                "Date cannot be null or empty".into(),
            ));
        }
        let day = parse_day(date)?;
        let expenses = self.repository.find_by_user_between(user_id, day, day).await?;
        tracing::info!(user_id, date = %day, count = expenses.len(), "Fetched expenses by day");
        Ok(expenses)
    }

    pub async fn expenses_in_category_month(
        &self,
        category: &str,
        month: &str,
        user_id: i64,
    ) -> ServiceResult<Vec<Expense>> {
        if month.trim().is_empty() {
            return Err(ServiceError::BusinessRule("Month is invalid".into()));
        }
        if category.trim().is_empty() {
            return Err(ServiceError::BusinessRule(
                "Category cannot be null or empty".into(),
            ));
        }
        let filter = MonthFilter::parse(month)?;
        let category = category.trim();

        let expenses: Vec<Expense> = self
            .repository
            .find_by_user(user_id)
            .await?
            .into_iter()
            .filter(|e| e.category.eq_ignore_ascii_case(category) && filter.matches(e.date))
            .collect();
        tracing::info!(
            user_id,
            category = %category,
            month = %month,
            count = expenses.len(),
            "Fetched expenses by category and month"
        );
        Ok(expenses)
    }

    pub async fn expenses_between(
        &self,
        user_id: i64,
        start: &str,
        end: &str,
    ) -> ServiceResult<Vec<Expense>> {
        let (start, end) = parse_range(start, end)?;
        let expenses = self.repository.find_by_user_between(user_id, start, end).await?;
        tracing::info!(user_id, count = expenses.len(), "Fetched expenses in date range");
        Ok(expenses)
    }

    pub async fn summarize(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<ExpenseSummary> {
        if start > end {
            return Err(range_error());
        }
        let expenses = self.repository.find_by_user_between(user_id, start, end).await?;
        let summary = report::create_summary(&expenses, user_id, start, end);
        tracing::info!(
            user_id,
            total = summary.total_amount,
            count = summary.total_transactions,
            "Generated expense summary"
        );
        Ok(summary)
    }

    pub async fn summarize_range(
        &self,
        user_id: i64,
        start: &str,
        end: &str,
    ) -> ServiceResult<ExpenseSummary> {
        let (start, end) = parse_range(start, end)?;
        self.summarize(user_id, start, end).await
    }

    pub async fn generate_monthly_report(
        &self,
        user_id: i64,
        month: u32,
        year: i32,
    ) -> ServiceResult<ExpenseReport> {
        let (start, end) = report::month_bounds(year, month).ok_or_else(|| {
            ServiceError::BusinessRule(format!("Invalid month {month} for year {year}"))
        })?;

        let _permit = self.heavy_permit().await?;
        let expenses = self.repository.find_by_user_between(user_id, start, end).await?;
        tracing::info!(user_id, month, year, count = expenses.len(), "Generated monthly report");
        Ok(report::create_report(expenses, start, end, report::MONTHLY_REPORT))
    }

    pub async fn generate_category_report(
        &self,
        user_id: i64,
        start: &str,
        end: &str,
    ) -> ServiceResult<ExpenseReport> {
        let (start, end) = parse_range(start, end)?;

        let _permit = self.heavy_permit().await?;
        let expenses = self.repository.find_by_user_between(user_id, start, end).await?;
        tracing::info!(user_id, count = expenses.len(), "Generated category report");
        Ok(report::create_report(expenses, start, end, report::CATEGORY_REPORT))
    }

    pub async fn add_expense(&self, user_id: i64, request: ExpenseRequest) -> ServiceResult<Expense> {
        let new = validated(request, user_id)
            .map_err(|errors| ServiceError::BusinessRule(errors.join("; ")))?;
        let saved = self.repository.save(new).await?;
        tracing::info!(user_id, expense_id = saved.id, "Created expense");
        Ok(saved)
    }

    /// 批量创建，任一条校验失败则全部不写入
    pub async fn add_expenses(
        &self,
        user_id: i64,
        requests: Vec<ExpenseRequest>,
    ) -> ServiceResult<Vec<Expense>> {
        if requests.is_empty() {
            return Err(ServiceError::BusinessRule(
                "At least one expense is required".into(),
            ));
        }

        let mut messages = Vec::new();
        let mut expenses = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            match validated(request, user_id) {
                Ok(new) => expenses.push(new),
                Err(errors) => messages.push(format!("{} - {}", index + 1, errors.join("; "))),
            }
        }
        if !messages.is_empty() {
            return Err(ServiceError::BusinessRule(messages.join("\n")));
        }

        let saved = self.repository.save_all(expenses).await?;
        tracing::info!(user_id, count = saved.len(), "Created expenses");
        Ok(saved)
    }

    pub async fn modify_expense(
        &self,
        user_id: i64,
        id: i64,
        request: ExpenseRequest,
    ) -> ServiceResult<Expense> {
        let mut errors = Vec::new();
        if id <= 0 {
            errors.push("Expense Id must be provided".to_string());
        }
        errors.extend(request.validation_errors());
        if !errors.is_empty() {
            return Err(ServiceError::BusinessRule(errors.join("; ")));
        }

        let new = request
            .into_new_expense(user_id)
            .ok_or_else(|| ServiceError::BusinessRule("Expense date is required".into()))?;
        match self.repository.update(id, new).await? {
            Some(updated) => {
                tracing::info!(user_id, expense_id = id, "Updated expense");
                Ok(updated)
            }
            None => {
                tracing::warn!(user_id, expense_id = id, "Expense to update not found");
                Err(ServiceError::not_found("Expense", "id", id))
            }
        }
    }

    pub async fn remove_expense(&self, user_id: i64, id: i64) -> ServiceResult<()> {
        if id <= 0 {
            return Err(ServiceError::BusinessRule(
                "Expense Id must be positive".into(),
            ));
        }
        if self.repository.delete(id, user_id).await? {
            tracing::info!(user_id, expense_id = id, "Deleted expense");
            Ok(())
        } else {
            tracing::warn!(user_id, expense_id = id, "Expense to delete not found");
            Err(ServiceError::not_found("Expense", "id", id))
        }
    }

    pub async fn active_user_ids(&self) -> ServiceResult<Vec<i64>> {
        self.repository.distinct_user_ids().await
    }

    async fn heavy_permit(&self) -> ServiceResult<SemaphorePermit<'_>> {
        self.heavy_tasks
            .acquire()
            .await
            .map_err(|e| ServiceError::Internal(format!("Report executor closed: {e}")))
    }
}

fn validated(request: ExpenseRequest, user_id: i64) -> Result<NewExpense, Vec<String>> {
    let errors = request.validation_errors();
    if !errors.is_empty() {
        return Err(errors);
    }
    request
        .into_new_expense(user_id)
        .ok_or_else(|| vec!["Expense date is required".to_string()])
}

fn parse_day(value: &str) -> ServiceResult<NaiveDate> {
    parse_date(value).ok_or_else(|| {
        ServiceError::Validation(format!(
            "Invalid date '{}', expected YYYY-MM-DD",
            value.trim()
        ))
    })
}

fn range_error() -> ServiceError {
    ServiceError::BusinessRule("Start date must not be after end date".into())
}

fn parse_range(start: &str, end: &str) -> ServiceResult<(NaiveDate, NaiveDate)> {
    let start = parse_day(start)?;
    let end = parse_day(end)?;
    if start > end {
        return Err(range_error());
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_filter_formats() {
        assert_eq!(MonthFilter::parse("3").unwrap(), MonthFilter::Month(3));
        assert_eq!(MonthFilter::parse("03").unwrap(), MonthFilter::Month(3));
        assert_eq!(
            MonthFilter::parse("2024-03").unwrap(),
            MonthFilter::YearMonth(2024, 3)
        );
        for bad in [
            "", "13", "0", "2024-3", "24-03", "march", "2024-13", "+3", "2024-+3", "+024-03",
        ] {
            assert!(MonthFilter::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn month_filter_matching() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert!(MonthFilter::Month(3).matches(date));
        assert!(MonthFilter::YearMonth(2024, 3).matches(date));
        assert!(!MonthFilter::YearMonth(2023, 3).matches(date));
        assert!(!MonthFilter::Month(4).matches(date));
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(matches!(
            parse_range("2024-02-01", "2024-01-01"),
            Err(ServiceError::BusinessRule(_))
        ));
        assert!(matches!(
            parse_range("yesterday", "2024-01-01"),
            Err(ServiceError::Validation(_))
        ));
    }
}
