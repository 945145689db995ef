use async_trait::async_trait;
use common::{Currency, Money, OrderId, PaymentId};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Payment, PaymentError, PaymentLog, PaymentStatus, Result, repository::PaymentRepository,
};

/// PostgreSQL payment repository.
#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let amount: Decimal = row.try_get("amount")?;
        let currency: String = row.try_get("currency")?;
        let status: String = row.try_get("status")?;

        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get("id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            amount: Money::new(amount),
            currency: Currency::new(currency),
            method: row.try_get("method")?,
            status: status
                .parse::<PaymentStatus>()
                .map_err(|e| PaymentError::Database(sqlx::Error::Decode(e.into())))?,
            gateway_order_id: row.try_get("gateway_order_id")?,
            gateway_id: row.try_get("gateway_id")?,
            gateway_response: row.try_get("gateway_response")?,
            failure_reason: row.try_get("failure_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn append_log(conn: &mut sqlx::PgConnection, log: &PaymentLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO payment_logs (payment_id, action, data, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(log.payment_id.as_uuid())
        .bind(&log.action)
        .bind(&log.data)
        .bind(log.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert(&self, payment: &Payment, log: &PaymentLog) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount, currency, method, status,
                                  gateway_order_id, gateway_id, gateway_response,
                                  failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.amount.amount())
        .bind(payment.currency.as_str())
        .bind(&payment.method)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_order_id)
        .bind(&payment.gateway_id)
        .bind(&payment.gateway_response)
        .bind(&payment.failure_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("payments_order_id_key")
            {
                return PaymentError::Conflict(payment.order_id.to_string());
            }
            PaymentError::Database(e)
        })?;

        Self::append_log(&mut *tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, payment: &Payment, log: &PaymentLog) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $1, gateway_order_id = $2, gateway_id = $3, gateway_response = $4,
                failure_reason = $5, updated_at = now()
            WHERE id = $6
            "#,
        )
        .bind(payment.status.as_str())
        .bind(&payment.gateway_order_id)
        .bind(&payment.gateway_id)
        .bind(&payment.gateway_response)
        .bind(&payment.failure_reason)
        .bind(payment.id.as_uuid())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PaymentError::NotFound(payment.order_id.to_string()));
        }

        Self::append_log(&mut *tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount, currency, method, status, gateway_order_id,
                   gateway_id, gateway_response, failure_reason, created_at, updated_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn logs(&self, payment_id: PaymentId) -> Result<Vec<PaymentLog>> {
        let rows = sqlx::query(
            r#"
            SELECT payment_id, action, data, created_at
            FROM payment_logs
            WHERE payment_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(payment_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PaymentLog {
                    payment_id: PaymentId::from_uuid(row.try_get("payment_id")?),
                    action: row.try_get("action")?,
                    data: row.try_get("data")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
