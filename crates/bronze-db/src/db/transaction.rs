//! Short metadata transactions.
//!
//! The provenance insert and its log entry each run in their own transaction.
//! `TransactionGuard` names the operation it belongs to so that a guard dropped
//! on an error path shows up in the logs.

use bronze_core::AppError;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

pub struct TransactionGuard<'a> {
    transaction: Option<Transaction<'a, Postgres>>,
    operation: &'static str,
}

impl<'a> TransactionGuard<'a> {
    pub async fn begin(pool: &'a PgPool, operation: &'static str) -> Result<Self, AppError> {
        let transaction = pool.begin().await?;
        tracing::trace!(operation = operation, "Transaction started");

        Ok(Self {
            transaction: Some(transaction),
            operation,
        })
    }

    /// Connection to run statements on. Fails once the guard is finished.
    pub fn conn(&mut self) -> Result<&mut PgConnection, AppError> {
        match self.transaction.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(AppError::Internal(format!(
                "Transaction for {} already finished",
                self.operation
            ))),
        }
    }

    pub async fn commit(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.transaction.take() {
            tx.commit().await?;
            tracing::trace!(operation = self.operation, "Transaction committed");
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.transaction.take() {
            tx.rollback().await?;
            tracing::debug!(operation = self.operation, "Transaction rolled back");
        }
        Ok(())
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            // sqlx rolls the inner transaction back when it is dropped.
            tracing::warn!(
                operation = self.operation,
                "Transaction dropped without commit or rollback"
            );
        }
    }
}
