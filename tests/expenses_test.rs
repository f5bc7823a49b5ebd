use chrono::NaiveDate;
use std::sync::Arc;
use tonic::{Code, Request};

use expense_mesh::auth::{AuthenticatedUser, PasswordHasher};
use expense_mesh::error::{ServiceError, ServiceResult};
use expense_mesh::expense::{
    DateRangeRequest, ExpenseIdRequest, ExpenseInput, ListExpensesRequest,
    expense_service_server::ExpenseService,
};
use expense_mesh::services::expenses::{
    DirectoryUser, ExpenseManager, ExpenseRequest, InMemoryExpenseRepository, LocalUserDirectory,
    UserDirectory, run_daily_reports,
};
use expense_mesh::services::users::{InMemoryUserRepository, Role, UserManager};

async fn manager() -> ExpenseManager {
    let users = UserManager::new(Arc::new(InMemoryUserRepository::new()));
    users
        .seed_default_users(&PasswordHasher::new(4))
        .await
        .expect("Failed to seed users");

    ExpenseManager::new(
        Arc::new(InMemoryExpenseRepository::new()),
        Arc::new(LocalUserDirectory::new(users)),
        2,
    )
}

fn request(date: &str, amount: f64, category: &str) -> ExpenseRequest {
    ExpenseRequest {
        expense_type: 0,
        date: date.into(),
        amount,
        category: category.into(),
        account: "Cash".into(),
        note: None,
    }
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn seeded(manager: &ExpenseManager) -> i64 {
    let user_id = manager.resolve_user_id("phuong").await.unwrap();
    manager
        .add_expenses(
            user_id,
            vec![
                request("2024-03-01", 10.0, "Food"),
                request("2024-03-15", 25.5, "Transport"),
                request("2024-03-20", 4.5, "food"),
                request("2024-04-02", 100.0, "Rent"),
                request("2023-03-10", 7.0, "Food"),
            ],
        )
        .await
        .unwrap();
    user_id
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let manager = manager().await;
    let err = manager.resolve_user_id("ghost").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(err.to_string(), "User not found with username : ghost");
}

#[tokio::test]
async fn test_create_and_query_expenses() {
    let manager = manager().await;
    let user_id = seeded(&manager).await;

    let all = manager.expenses_for_user(user_id).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].date, day("2024-04-02"), "newest first");
    assert!(all.iter().all(|e| e.expense_type == 1));

    let categories = manager.categories_for_user(user_id).await.unwrap();
    assert_eq!(categories, vec!["Rent", "food", "Transport", "Food"]);

    let on_day = manager.expenses_on_day("2024-03-15", user_id).await.unwrap();
    assert_eq!(on_day.len(), 1);
    assert_eq!(on_day[0].category, "Transport");

    let march_food = manager
        .expenses_in_category_month("FOOD", "03", user_id)
        .await
        .unwrap();
    assert_eq!(march_food.len(), 3, "any year, case-insensitive");

    let march_2024_food = manager
        .expenses_in_category_month("food", "2024-03", user_id)
        .await
        .unwrap();
    assert_eq!(march_2024_food.len(), 2);

    let range = manager
        .expenses_between(user_id, "2024-03-01", "2024-03-20")
        .await
        .unwrap();
    assert_eq!(range.len(), 3, "both ends inclusive");
}

#[tokio::test]
async fn test_query_argument_errors() {
    let manager = manager().await;
    let user_id = seeded(&manager).await;

    assert!(matches!(
        manager.expenses_on_day("", user_id).await,
        Err(ServiceError::BusinessRule(_))
    ));
    assert!(matches!(
        manager.expenses_on_day("15/03/2024", user_id).await,
        Err(ServiceError::Validation(_))
    ));
    assert!(manager
        .expenses_in_category_month("Food", "13", user_id)
        .await
        .is_err());
    assert!(manager
        .expenses_between(user_id, "2024-04-01", "2024-03-01")
        .await
        .is_err());
    assert!(matches!(
        manager.expense_by_id(0, user_id).await,
        Err(ServiceError::BusinessRule(_))
    ));
    assert!(matches!(
        manager.expense_by_id(999, user_id).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_expenses_are_isolated_per_user() {
    let manager = manager().await;
    let owner = seeded(&manager).await;
    let other = manager.resolve_user_id("admin").await.unwrap();

    let expense = manager.expenses_for_user(owner).await.unwrap().remove(0);
    assert!(matches!(
        manager.expense_by_id(expense.id, other).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(manager.remove_expense(other, expense.id).await.is_err());
    assert!(manager.expenses_for_user(other).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bulk_create_is_all_or_nothing() {
    let manager = manager().await;
    let user_id = manager.resolve_user_id("phuong").await.unwrap();

    let err = manager
        .add_expenses(
            user_id,
            vec![
                request("2024-03-01", 10.0, "Food"),
                request("2024-03-02", -1.0, "Food"),
                request("", 5.0, " "),
            ],
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "2 - Expense amount must be positive\n\
         3 - Expense category is required; Expense date is required"
    );
    assert!(manager.expenses_for_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_and_delete() {
    let manager = manager().await;
    let user_id = manager.resolve_user_id("phuong").await.unwrap();
    let created = manager
        .add_expense(user_id, request("2024-05-01", 12.0, "Food"))
        .await
        .unwrap();

    let updated = manager
        .modify_expense(
            user_id,
            created.id,
            ExpenseRequest {
                expense_type: 2,
                note: Some("lunch".into()),
                ..request("2024-05-02", 15.0, "Dining")
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.expense_type, 2);
    assert_eq!(updated.category, "Dining");
    assert_eq!(updated.note.as_deref(), Some("lunch"));

    let err = manager
        .modify_expense(user_id, 0, request("2024-05-02", 15.0, "Dining"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Expense Id must be provided");

    let err = manager
        .modify_expense(user_id, 404, request("2024-05-02", 15.0, "Dining"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    manager.remove_expense(user_id, created.id).await.unwrap();
    let err = manager.remove_expense(user_id, created.id).await.unwrap_err();
    assert_eq!(err.to_string(), "Expense not found with id : 1");
}

#[tokio::test]
async fn test_summary_and_reports() {
    let manager = manager().await;
    let user_id = seeded(&manager).await;

    let summary = manager
        .summarize(user_id, day("2024-03-01"), day("2024-03-31"))
        .await
        .unwrap();
    assert_eq!(summary.total_transactions, 3);
    assert_eq!(summary.total_amount, 40.0);
    assert_eq!(summary.average_amount, 13.33);

    let empty = manager
        .summarize(user_id, day("2020-01-01"), day("2020-01-31"))
        .await
        .unwrap();
    assert_eq!(empty.total_transactions, 0);
    assert_eq!(empty.average_amount, 0.0);

    let monthly = manager.generate_monthly_report(user_id, 3, 2024).await.unwrap();
    assert_eq!(monthly.report_type, "Monthly Report");
    assert_eq!(monthly.start_date, day("2024-03-01"));
    assert_eq!(monthly.end_date, day("2024-03-31"));
    assert_eq!(monthly.total_transactions, 3);

    assert!(manager.generate_monthly_report(user_id, 13, 2024).await.is_err());

    let by_category = manager
        .generate_category_report(user_id, "2023-01-01", "2024-12-31")
        .await
        .unwrap();
    assert_eq!(by_category.report_type, "Category Report");
    assert_eq!(by_category.category_totals.get("Food"), Some(&17.0));
    assert_eq!(by_category.category_totals.get("food"), Some(&4.5));
    assert_eq!(by_category.category_totals.get("Rent"), Some(&100.0));
}

#[tokio::test]
async fn test_daily_reports_cover_every_user() {
    let manager = manager().await;
    let phuong = seeded(&manager).await;
    let admin = manager.resolve_user_id("admin").await.unwrap();
    manager
        .add_expense(admin, request("2024-03-15", 1.5, "Coffee"))
        .await
        .unwrap();
    assert_ne!(phuong, admin);

    let outcome = run_daily_reports(&manager, day("2024-03-16")).await.unwrap();
    assert_eq!(outcome.users, 2);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.total_amount, 27.0);
}

struct UnreachableDirectory;

#[tonic::async_trait]
impl UserDirectory for UnreachableDirectory {
    async fn find_by_username(&self, _username: &str) -> ServiceResult<Option<DirectoryUser>> {
        Err(ServiceError::external("user-service", "connection refused"))
    }
}

fn authenticated<T>(message: T, username: &str) -> Request<T> {
    let mut request = Request::new(message);
    request.extensions_mut().insert(AuthenticatedUser {
        username: username.into(),
        role: Role::User,
    });
    request
}

#[tokio::test]
async fn test_grpc_surface() {
    let manager = manager().await;

    let created = manager
        .create_expense(authenticated(
            ExpenseInput {
                expense_type: 0,
                date: "2024-06-01".into(),
                amount: 9.99,
                category: "Books".into(),
                account: "Card".into(),
                note: Some("novel".into()),
            },
            "phuong",
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(created.date, "2024-06-01");
    assert_eq!(created.expense_type, 1);

    let list = manager
        .list_expenses(authenticated(ListExpensesRequest {}, "phuong"))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(list.expenses.len(), 1);

    let summary = manager
        .summary(authenticated(
            DateRangeRequest {
                start_date: "2024-06-01".into(),
                end_date: "2024-06-30".into(),
            },
            "phuong",
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(summary.total_transactions, 1);
    assert_eq!(summary.start_date, "2024-06-01");

    let err = manager
        .get_expense(authenticated(ExpenseIdRequest { id: created.id }, "admin"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    let err = manager
        .create_expense(authenticated(ExpenseInput::default(), "phuong"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);

    let err = manager
        .list_expenses(Request::new(ListExpensesRequest {}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    let deleted = manager
        .delete_expense(authenticated(ExpenseIdRequest { id: created.id }, "phuong"))
        .await
        .unwrap()
        .into_inner();
    assert!(deleted.deleted);
}

#[tokio::test]
async fn test_user_service_outage_maps_to_unavailable() {
    let manager = ExpenseManager::new(
        Arc::new(InMemoryExpenseRepository::new()),
        Arc::new(UnreachableDirectory),
        1,
    );

    let err = manager
        .list_expenses(authenticated(ListExpensesRequest {}, "phuong"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(
        err.message(),
        "Service temporarily unavailable. Please try again later."
    );
}
