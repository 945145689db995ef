use async_trait::async_trait;
use common::{Currency, Money, OrderId, ProductId, SellerId, UserId};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Order, OrderError, OrderItem, OrderStatus, OrderStatusLog, Result,
    repository::OrderRepository,
};

/// PostgreSQL order repository.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_status(raw: &str) -> Result<OrderStatus> {
        raw.parse()
            .map_err(|e: String| OrderError::Database(sqlx::Error::Decode(e.into())))
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let seller_id: Option<Uuid> = row.try_get("seller_id")?;
        let status: String = row.try_get("status")?;
        let total_amount: Decimal = row.try_get("total_amount")?;
        let commission: Decimal = row.try_get("commission")?;
        let currency: String = row.try_get("currency")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            order_number: row.try_get("order_number")?,
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            seller_id: seller_id.map(SellerId::from_uuid),
            status: Self::parse_status(&status)?,
            total_amount: Money::new(total_amount),
            commission: Money::new(commission),
            currency: Currency::new(currency),
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let product_id: String = row.try_get("product_id")?;
        let quantity: i32 = row.try_get("quantity")?;
        let unit_price: Decimal = row.try_get("unit_price")?;
        let total_price: Decimal = row.try_get("total_price")?;
        let commission: Decimal = row.try_get("commission")?;

        Ok(OrderItem {
            product_id: ProductId::new(product_id),
            quantity: quantity as u32,
            unit_price: Money::new(unit_price),
            total_price: Money::new(total_price),
            commission: Money::new(commission),
        })
    }

    async fn load_items(&self, id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity, unit_price, total_price, commission
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn order_exists(&self, id: OrderId) -> Result<bool> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, seller_id, status, total_amount, \
                             commission, currency, created_at, updated_at";

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, order: &Order, log: &OrderStatusLog) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, seller_id, status, total_amount,
                                commission, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.user_id.as_uuid())
        .bind(order.seller_id.map(|s| s.as_uuid()))
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .bind(order.commission.amount())
        .bind(order.currency.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price,
                                         total_price, commission)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_str())
            .bind(item.quantity as i32)
            .bind(item.unit_price.amount())
            .bind(item.total_price.amount())
            .bind(item.commission.amount())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO order_status_logs (order_id, status, notes, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(log.order_id.as_uuid())
        .bind(log.status.as_str())
        .bind(&log.notes)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let items = self.load_items(id).await?;
                Ok(Some(Self::row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let id = OrderId::from_uuid(row.try_get("id")?);
            let items = self.load_items(id).await?;
            orders.push(Self::row_to_order(&row, items)?);
        }
        Ok(orders)
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        log: &OrderStatusLog,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET status = $1, updated_at = now()
            WHERE id = $2 AND status = $3
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(log.status.as_str())
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            drop(tx);
            return if self.order_exists(id).await? {
                Err(OrderError::Conflict {
                    order_id: id,
                    expected,
                })
            } else {
                Err(OrderError::NotFound(id))
            };
        };

        sqlx::query(
            "INSERT INTO order_status_logs (order_id, status, notes, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(id.as_uuid())
        .bind(log.status.as_str())
        .bind(&log.notes)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let items = self.load_items(id).await?;
        Self::row_to_order(&row, items)
    }

    async fn status_history(&self, id: OrderId) -> Result<Vec<OrderStatusLog>> {
        if !self.order_exists(id).await? {
            return Err(OrderError::NotFound(id));
        }

        let rows = sqlx::query(
            r#"
            SELECT order_id, status, notes, created_at
            FROM order_status_logs
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                Ok(OrderStatusLog {
                    order_id: OrderId::from_uuid(row.try_get("order_id")?),
                    status: Self::parse_status(&status)?,
                    notes: row.try_get("notes")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
