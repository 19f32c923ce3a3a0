//! # Customer Repository
//!
//! Customers who may buy on kasbon. Balance changes go through
//! [`KasbonRepository`](crate::repository::kasbon::KasbonRepository) only.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::scope::{LockTarget, ScopeMode, TxScope};
use warung_core::input::NewCustomer;
use warung_core::{CoreError, Customer};

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn create(&self, input: &NewCustomer) -> DbResult<Customer> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        let customer = self.create_in(&mut scope, input).await?;
        scope.commit().await?;

        info!(id = %customer.id, credit_limit = customer.credit_limit, "Customer created");
        Ok(customer)
    }

    pub async fn create_in(&self, scope: &mut TxScope, input: &NewCustomer) -> DbResult<Customer> {
        input.validate()?;

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            phone: input.phone.clone(),
            credit_limit: input.credit_limit,
            current_debt: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        debug!(id = %customer.id, name = %customer.name, "Inserting customer");

        scope
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO customers (id, name, phone, credit_limit, current_debt, is_active, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, 0, 1, ?5, ?5)
                    "#,
                )
                .bind(&customer.id)
                .bind(&customer.name)
                .bind(&customer.phone)
                .bind(customer.credit_limit)
                .bind(now),
            )
            .await?;
        Ok(customer)
    }

    pub async fn get(&self, id: &str) -> DbResult<Customer> {
        let customer: Option<Customer> = sqlx::query_as("SELECT * FROM customers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        customer.ok_or_else(|| CoreError::CustomerNotFound(id.to_string()).into())
    }

    /// Locks a customer row inside a write scope.
    pub async fn lock(&self, scope: &mut TxScope, id: &str) -> DbResult<Customer> {
        let customer: Option<Customer> = scope.select_for_update(LockTarget::Customer, id).await?;
        customer.ok_or_else(|| CoreError::CustomerNotFound(id.to_string()).into())
    }

    /// Soft-deletes a customer. Outstanding debt stays on the ledger.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let mut scope = TxScope::begin(&self.pool, ScopeMode::Write).await?;
        self.deactivate_in(&mut scope, id).await?;
        scope.commit().await?;
        Ok(())
    }

    pub async fn deactivate_in(&self, scope: &mut TxScope, id: &str) -> DbResult<()> {
        let affected = scope
            .execute(
                sqlx::query("UPDATE customers SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                    .bind(id)
                    .bind(Utc::now()),
            )
            .await?;
        if affected == 0 {
            return Err(CoreError::CustomerNotFound(id.to_string()).into());
        }
        Ok(())
    }

    /// Active customers that owe something, largest debt first.
    pub async fn with_debt(&self) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as(
            "SELECT * FROM customers WHERE is_active = 1 AND current_debt > 0 ORDER BY current_debt DESC, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(customers)
    }
}
