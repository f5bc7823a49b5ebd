use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::model::{Expense, NewExpense};
use crate::error::ServiceResult;

/// 支出存储，所有列表按日期倒序返回
#[tonic::async_trait]
pub trait ExpenseRepository: Send + Sync + 'static {
    async fn find_by_user(&self, user_id: i64) -> ServiceResult<Vec<Expense>>;
    async fn find_by_id_and_user(&self, id: i64, user_id: i64) -> ServiceResult<Option<Expense>>;
    /// 起止日期均包含
    async fn find_by_user_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<Vec<Expense>>;
    async fn save(&self, expense: NewExpense) -> ServiceResult<Expense>;
    /// 全部写入或全部失败
    async fn save_all(&self, expenses: Vec<NewExpense>) -> ServiceResult<Vec<Expense>>;
    /// 记录不存在或不属于该用户时返回 None
    async fn update(&self, id: i64, expense: NewExpense) -> ServiceResult<Option<Expense>>;
    async fn delete(&self, id: i64, user_id: i64) -> ServiceResult<bool>;
    async fn distinct_user_ids(&self) -> ServiceResult<Vec<i64>>;
}

#[derive(Debug, FromRow)]
struct ExpenseRow {
    id: i64,
    user_id: i64,
    expense_type: i32,
    date: NaiveDate,
    amount: f64,
    category: String,
    account: String,
    note: Option<String>,
}

impl From<ExpenseRow> for Expense {
    fn from(row: ExpenseRow) -> Self {
        Expense {
            id: row.id,
            user_id: row.user_id,
            expense_type: row.expense_type,
            date: row.date,
            amount: row.amount,
            category: row.category,
            account: row.account,
            note: row.note,
        }
    }
}

const EXPENSE_COLUMNS: &str = "id, user_id, expense_type, date, amount, category, account, note";

/// PostgreSQL 实现
#[derive(Debug, Clone)]
pub struct PgExpenseRepository {
    pool: PgPool,
}

impl PgExpenseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[tonic::async_trait]
impl ExpenseRepository for PgExpenseRepository {
    async fn find_by_user(&self, user_id: i64) -> ServiceResult<Vec<Expense>> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = $1 ORDER BY date DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Expense::from).collect())
    }

    async fn find_by_id_and_user(&self, id: i64, user_id: i64) -> ServiceResult<Option<Expense>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Expense::from))
    }

    async fn find_by_user_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<Vec<Expense>> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses \
             WHERE user_id = $1 AND date BETWEEN $2 AND $3 \
             ORDER BY date DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(user_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Expense::from).collect())
    }

    async fn save(&self, expense: NewExpense) -> ServiceResult<Expense> {
        let mut saved = self.save_all(vec![expense]).await?;
        saved
            .pop()
            .ok_or_else(|| crate::error::ServiceError::Internal("Insert returned no row".into()))
    }

    async fn save_all(&self, expenses: Vec<NewExpense>) -> ServiceResult<Vec<Expense>> {
        let sql = format!(
            "INSERT INTO expenses (user_id, expense_type, date, amount, category, account, note) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {EXPENSE_COLUMNS}"
        );

        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(expenses.len());
        for expense in expenses {
            let row = sqlx::query_as::<_, ExpenseRow>(&sql)
                .bind(expense.user_id)
                .bind(expense.expense_type)
                .bind(expense.date)
                .bind(expense.amount)
                .bind(&expense.category)
                .bind(&expense.account)
                .bind(&expense.note)
                .fetch_one(&mut *tx)
                .await?;
            saved.push(Expense::from(row));
        }
        tx.commit().await?;
        Ok(saved)
    }

    async fn update(&self, id: i64, expense: NewExpense) -> ServiceResult<Option<Expense>> {
        let sql = format!(
            "UPDATE expenses SET expense_type = $3, date = $4, amount = $5, category = $6, \
             account = $7, note = $8 WHERE id = $1 AND user_id = $2 RETURNING {EXPENSE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(id)
            .bind(expense.user_id)
            .bind(expense.expense_type)
            .bind(expense.date)
            .bind(expense.amount)
            .bind(&expense.category)
            .bind(&expense.account)
            .bind(&expense.note)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Expense::from))
    }

    async fn delete(&self, id: i64, user_id: i64) -> ServiceResult<bool> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn distinct_user_ids(&self) -> ServiceResult<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT DISTINCT user_id FROM expenses ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[derive(Debug, Default)]
struct MemoryExpenses {
    next_id: i64,
    expenses: BTreeMap<i64, Expense>,
}

impl MemoryExpenses {
    fn insert(&mut self, expense: NewExpense) -> Expense {
        self.next_id += 1;
        let saved = expense.with_id(self.next_id);
        self.expenses.insert(saved.id, saved.clone());
        saved
    }

    fn query(&self, filter: impl Fn(&Expense) -> bool) -> Vec<Expense> {
        let mut found: Vec<Expense> = self.expenses.values().filter(|&e| filter(e)).cloned().collect();
        found.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        found
    }
}

/// 内存实现，未配置数据库时与测试中使用
#[derive(Debug, Default)]
pub struct InMemoryExpenseRepository {
    inner: RwLock<MemoryExpenses>,
}

impl InMemoryExpenseRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[tonic::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn find_by_user(&self, user_id: i64) -> ServiceResult<Vec<Expense>> {
        Ok(self.inner.read().await.query(|e| e.user_id == user_id))
    }

    async fn find_by_id_and_user(&self, id: i64, user_id: i64) -> ServiceResult<Option<Expense>> {
        Ok(self
            .inner
            .read()
            .await
            .expenses
            .get(&id)
            .filter(|e| e.user_id == user_id)
            .cloned())
    }

    async fn find_by_user_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<Vec<Expense>> {
        Ok(self
            .inner
            .read()
            .await
            .query(|e| e.user_id == user_id && e.date >= start && e.date <= end))
    }

    async fn save(&self, expense: NewExpense) -> ServiceResult<Expense> {
        Ok(self.inner.write().await.insert(expense))
    }

    async fn save_all(&self, expenses: Vec<NewExpense>) -> ServiceResult<Vec<Expense>> {
        let mut inner = self.inner.write().await;
        Ok(expenses.into_iter().map(|e| inner.insert(e)).collect())
    }

    async fn update(&self, id: i64, expense: NewExpense) -> ServiceResult<Option<Expense>> {
        let mut inner = self.inner.write().await;
        match inner.expenses.get_mut(&id) {
            Some(existing) if existing.user_id == expense.user_id => {
                *existing = expense.with_id(id);
                Ok(Some(existing.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: i64, user_id: i64) -> ServiceResult<bool> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .expenses
            .get(&id)
            .is_some_and(|e| e.user_id == user_id);
        if owned {
            inner.expenses.remove(&id);
        }
        Ok(owned)
    }

    async fn distinct_user_ids(&self) -> ServiceResult<Vec<i64>> {
        let inner = self.inner.read().await;
        let mut ids: Vec<i64> = inner.expenses.values().map(|e| e.user_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}
