//! 汇总与报表计算

use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;

use super::model::{Expense, ExpenseReport, ExpenseSummary};

pub const MONTHLY_REPORT: &str = "Monthly Report";
pub const CATEGORY_REPORT: &str = "Category Report";

pub fn total_amount(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|e| e.amount).sum()
}

/// total / count，按十进制保留两位小数（四舍五入）
pub fn average_amount(total: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    decimal_div_half_up(total, count).unwrap_or_else(|| {
        let avg = total / count as f64;
        (avg * 100.0).round() / 100.0
    })
}

// 以 f64 的最短十进制表示做整数运算，3.015 这类值不会因二进制误差被舍掉
fn decimal_div_half_up(total: f64, count: usize) -> Option<f64> {
    if !total.is_finite() {
        return None;
    }
    let repr = format!("{}", total.abs());
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((&repr, ""));
    let mantissa: i128 = format!("{int_part}{frac_part}").parse().ok()?;
    let scale = u32::try_from(frac_part.len()).ok()?;

    let denominator = 10i128.checked_pow(scale)?.checked_mul(count as i128)?;
    let numerator = mantissa.checked_mul(100)?;
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let rounded = if remainder * 2 >= denominator {
        quotient + 1
    } else {
        quotient
    };

    let value = rounded as f64 / 100.0;
    Some(if total < 0.0 { -value } else { value })
}

pub fn category_totals(expenses: &[Expense]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for expense in expenses {
        *totals.entry(expense.category.clone()).or_insert(0.0) += expense.amount;
    }
    totals
}

pub fn create_summary(
    expenses: &[Expense],
    user_id: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> ExpenseSummary {
    let total = total_amount(expenses);
    ExpenseSummary {
        user_id,
        start_date,
        end_date,
        total_amount: total,
        total_transactions: expenses.len(),
        average_amount: average_amount(total, expenses.len()),
        generated_at: Local::now().naive_local(),
    }
}

pub fn create_report(
    expenses: Vec<Expense>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    report_type: &str,
) -> ExpenseReport {
    ExpenseReport {
        report_type: report_type.to_string(),
        start_date,
        end_date,
        total_amount: total_amount(&expenses),
        total_transactions: expenses.len(),
        category_totals: category_totals(&expenses),
        expenses,
        generated_at: Local::now().naive_local(),
    }
}

/// 某月的第一天与最后一天
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next_month.pred_opt()?))
}
