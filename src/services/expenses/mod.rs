//! 支出服务：记账、查询、汇总与报表

pub mod directory;
pub mod grpc_impl;
pub mod model;
pub mod report;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use directory::{DirectoryUser, LocalUserDirectory, RemoteUserDirectory, UserDirectory};
pub use model::{Expense, ExpenseReport, ExpenseRequest, ExpenseSummary, NewExpense};
pub use repository::{ExpenseRepository, InMemoryExpenseRepository, PgExpenseRepository};
pub use scheduler::{DailyReportOutcome, next_run_delay, run_daily_reports, spawn_report_scheduler};
pub use service::{ExpenseManager, MonthFilter};

/// 注册到注册中心的 gRPC 服务全名
pub const EXPENSE_SERVICE_NAME: &str = "expense.ExpenseService";
