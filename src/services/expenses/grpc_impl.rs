use tonic::{Request, Response, Status};

use super::model::{Expense, ExpenseRequest};
use super::service::ExpenseManager;
use crate::auth::AuthenticatedUser;
use crate::expense::{
    self, CategoryList, CreateExpensesRequest, DateRangeRequest, DeleteExpenseResponse,
    ExpenseIdRequest, ExpenseInput, ExpenseList, ExpensesByCategoryAndMonthRequest,
    ExpensesByDayRequest, ListCategoriesRequest, ListExpensesRequest, MonthlyReportRequest,
    UpdateExpenseRequest, expense_service_server::ExpenseService,
};

impl ExpenseManager {
    // 拦截器写入的用户名 -> 用户ID
    async fn caller_id<T>(&self, request: &Request<T>) -> Result<i64, Status> {
        let caller = AuthenticatedUser::from_request(request)?;
        Ok(self.resolve_user_id(&caller.username).await?)
    }
}

fn expense_list(expenses: Vec<Expense>) -> Response<ExpenseList> {
    Response::new(ExpenseList {
        expenses: expenses.iter().map(Expense::to_proto).collect(),
    })
}

#[tonic::async_trait]
impl ExpenseService for ExpenseManager {
    async fn list_expenses(
        &self,
        request: Request<ListExpensesRequest>,
    ) -> Result<Response<ExpenseList>, Status> {
        let user_id = self.caller_id(&request).await?;
        Ok(expense_list(self.expenses_for_user(user_id).await?))
    }

    async fn get_expense(
        &self,
        request: Request<ExpenseIdRequest>,
    ) -> Result<Response<expense::Expense>, Status> {
        let user_id = self.caller_id(&request).await?;
        let id = request.into_inner().id;
        let expense = self.expense_by_id(id, user_id).await?;
        Ok(Response::new(expense.to_proto()))
    }

    async fn list_categories(
        &self,
        request: Request<ListCategoriesRequest>,
    ) -> Result<Response<CategoryList>, Status> {
        let user_id = self.caller_id(&request).await?;
        let categories = self.categories_for_user(user_id).await?;
        Ok(Response::new(CategoryList { categories }))
    }

    async fn expenses_by_day(
        &self,
        request: Request<ExpensesByDayRequest>,
    ) -> Result<Response<ExpenseList>, Status> {
        let user_id = self.caller_id(&request).await?;
        let date = request.into_inner().date;
        Ok(expense_list(self.expenses_on_day(&date, user_id).await?))
    }

    async fn expenses_by_category_and_month(
        &self,
        request: Request<ExpensesByCategoryAndMonthRequest>,
    ) -> Result<Response<ExpenseList>, Status> {
        let user_id = self.caller_id(&request).await?;
        let req = request.into_inner();
        let expenses = self
            .expenses_in_category_month(&req.category, &req.month, user_id)
            .await?;
        Ok(expense_list(expenses))
    }

    async fn expenses_by_date_range(
        &self,
        request: Request<DateRangeRequest>,
    ) -> Result<Response<ExpenseList>, Status> {
        let user_id = self.caller_id(&request).await?;
        let req = request.into_inner();
        let expenses = self
            .expenses_between(user_id, &req.start_date, &req.end_date)
            .await?;
        Ok(expense_list(expenses))
    }

    async fn summary(
        &self,
        request: Request<DateRangeRequest>,
    ) -> Result<Response<expense::ExpenseSummary>, Status> {
        let user_id = self.caller_id(&request).await?;
        let req = request.into_inner();
        let summary = self
            .summarize_range(user_id, &req.start_date, &req.end_date)
            .await?;
        Ok(Response::new(summary.to_proto()))
    }

    async fn monthly_report(
        &self,
        request: Request<MonthlyReportRequest>,
    ) -> Result<Response<expense::ExpenseReport>, Status> {
        let user_id = self.caller_id(&request).await?;
        let req = request.into_inner();
        let report = self
            .generate_monthly_report(user_id, req.month, req.year)
            .await?;
        Ok(Response::new(report.to_proto()))
    }

    async fn category_report(
        &self,
        request: Request<DateRangeRequest>,
    ) -> Result<Response<expense::ExpenseReport>, Status> {
        let user_id = self.caller_id(&request).await?;
        let req = request.into_inner();
        let report = self
            .generate_category_report(user_id, &req.start_date, &req.end_date)
            .await?;
        Ok(Response::new(report.to_proto()))
    }

    async fn create_expense(
        &self,
        request: Request<ExpenseInput>,
    ) -> Result<Response<expense::Expense>, Status> {
        let user_id = self.caller_id(&request).await?;
        let input = ExpenseRequest::from(request.into_inner());
        let expense = self.add_expense(user_id, input).await?;
        Ok(Response::new(expense.to_proto()))
    }

    async fn create_expenses(
        &self,
        request: Request<CreateExpensesRequest>,
    ) -> Result<Response<ExpenseList>, Status> {
        let user_id = self.caller_id(&request).await?;
        let inputs = request
            .into_inner()
            .expenses
            .into_iter()
            .map(ExpenseRequest::from)
            .collect();
        Ok(expense_list(self.add_expenses(user_id, inputs).await?))
    }

    async fn update_expense(
        &self,
        request: Request<UpdateExpenseRequest>,
    ) -> Result<Response<expense::Expense>, Status> {
        let user_id = self.caller_id(&request).await?;
        let req = request.into_inner();
        let input = req
            .expense
            .map(ExpenseRequest::from)
            .ok_or_else(|| Status::invalid_argument("Expense is required"))?;
        let expense = self.modify_expense(user_id, req.id, input).await?;
        Ok(Response::new(expense.to_proto()))
    }

    async fn delete_expense(
        &self,
        request: Request<ExpenseIdRequest>,
    ) -> Result<Response<DeleteExpenseResponse>, Status> {
        let user_id = self.caller_id(&request).await?;
        let id = request.into_inner().id;
        self.remove_expense(user_id, id).await?;
        Ok(Response::new(DeleteExpenseResponse { deleted: true }))
    }
}
