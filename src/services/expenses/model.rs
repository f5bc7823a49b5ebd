use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

use crate::expense;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 未指定类型时的默认值
pub const DEFAULT_EXPENSE_TYPE: i32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    pub id: i64,
    pub user_id: i64,
    pub expense_type: i32,
    pub date: NaiveDate,
    pub amount: f64,
    pub category: String,
    pub account: String,
    pub note: Option<String>,
}

impl Expense {
    pub fn to_proto(&self) -> expense::Expense {
        expense::Expense {
            id: self.id,
            user_id: self.user_id,
            expense_type: self.expense_type,
            date: self.date.format(DATE_FORMAT).to_string(),
            amount: self.amount,
            category: self.category.clone(),
            account: self.account.clone(),
            note: self.note.clone(),
        }
    }
}

/// 已校验、待写入的支出
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub user_id: i64,
    pub expense_type: i32,
    pub date: NaiveDate,
    pub amount: f64,
    pub category: String,
    pub account: String,
    pub note: Option<String>,
}

impl NewExpense {
    pub fn with_id(self, id: i64) -> Expense {
        Expense {
            id,
            user_id: self.user_id,
            expense_type: self.expense_type,
            date: self.date,
            amount: self.amount,
            category: self.category,
            account: self.account,
            note: self.note,
        }
    }
}

/// 客户端提交的支出，日期保留原始字符串以便校验时给出提示
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseRequest {
    pub expense_type: i32,
    pub date: String,
    pub amount: f64,
    pub category: String,
    pub account: String,
    pub note: Option<String>,
}

impl From<expense::ExpenseInput> for ExpenseRequest {
    fn from(input: expense::ExpenseInput) -> Self {
        Self {
            expense_type: input.expense_type,
            date: input.date,
            amount: input.amount,
            category: input.category,
            account: input.account,
            note: input.note,
        }
    }
}

impl ExpenseRequest {
    /// 返回所有校验错误，为空表示通过
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.amount.is_nan() || self.amount <= 0.0 {
            errors.push("Expense amount must be positive".to_string());
        }
        if self.category.trim().is_empty() {
            errors.push("Expense category is required".to_string());
        }
        if self.date.trim().is_empty() {
            errors.push("Expense date is required".to_string());
        } else if parse_date(&self.date).is_none() {
            errors.push(format!(
                "Expense date must be in YYYY-MM-DD format: {}",
                self.date.trim()
            ));
        }
        if self.account.trim().is_empty() {
            errors.push("Expense account is required".to_string());
        }
        errors
    }

    /// 调用前需要先通过校验
    pub fn into_new_expense(self, user_id: i64) -> Option<NewExpense> {
        let date = parse_date(&self.date)?;
        let expense_type = if self.expense_type == 0 {
            DEFAULT_EXPENSE_TYPE
        } else {
            self.expense_type
        };
        Some(NewExpense {
            user_id,
            expense_type,
            date,
            amount: self.amount,
            category: self.category.trim().to_string(),
            account: self.account.trim().to_string(),
            note: self.note.filter(|n| !n.trim().is_empty()),
        })
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseSummary {
    pub user_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_amount: f64,
    pub total_transactions: usize,
    pub average_amount: f64,
    pub generated_at: NaiveDateTime,
}

impl ExpenseSummary {
    pub fn to_proto(&self) -> expense::ExpenseSummary {
        expense::ExpenseSummary {
            user_id: self.user_id,
            start_date: self.start_date.format(DATE_FORMAT).to_string(),
            end_date: self.end_date.format(DATE_FORMAT).to_string(),
            total_amount: self.total_amount,
            total_transactions: i32::try_from(self.total_transactions).unwrap_or(i32::MAX),
            average_amount: self.average_amount,
            generated_at: self.generated_at.format(DATE_TIME_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseReport {
    pub report_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_amount: f64,
    pub total_transactions: usize,
    pub expenses: Vec<Expense>,
    pub category_totals: BTreeMap<String, f64>,
    pub generated_at: NaiveDateTime,
}

impl ExpenseReport {
    pub fn to_proto(&self) -> expense::ExpenseReport {
        expense::ExpenseReport {
            report_type: self.report_type.clone(),
            start_date: self.start_date.format(DATE_FORMAT).to_string(),
            end_date: self.end_date.format(DATE_FORMAT).to_string(),
            total_amount: self.total_amount,
            total_transactions: i32::try_from(self.total_transactions).unwrap_or(i32::MAX),
            expenses: self.expenses.iter().map(Expense::to_proto).collect(),
            category_totals: self
                .category_totals
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            generated_at: self.generated_at.format(DATE_TIME_FORMAT).to_string(),
        }
    }
}
