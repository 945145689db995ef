use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    BusError, Delivery, Message, MessageProperties, QueueOptions, Result, broker::Broker,
    routing::topic_matches,
};

/// PostgreSQL-backed broker.
///
/// Queues are rows in `bus_messages`; consumers dequeue with
/// `FOR UPDATE SKIP LOCKED` so a message is handed to at most one consumer
/// at a time. Every published message is persistent.
#[derive(Clone)]
pub struct PostgresBroker {
    pool: PgPool,
}

impl PostgresBroker {
    /// Creates a new PostgreSQL broker.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn route(
        tx: &mut Transaction<'_, Postgres>,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<usize> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bus_exchanges WHERE name = $1)")
                .bind(exchange)
                .fetch_one(&mut **tx)
                .await?;
        if !exists {
            return Err(BusError::ExchangeNotFound(exchange.to_string()));
        }

        let bindings = sqlx::query("SELECT queue, binding_key FROM bus_bindings WHERE exchange = $1")
            .bind(exchange)
            .fetch_all(&mut **tx)
            .await?;

        let mut targets: Vec<String> = Vec::new();
        for row in bindings {
            let queue: String = row.try_get("queue")?;
            let binding_key: String = row.try_get("binding_key")?;
            if topic_matches(&binding_key, routing_key) && !targets.contains(&queue) {
                targets.push(queue);
            }
        }

        let properties = serde_json::to_value(&message.properties)?;
        for queue in &targets {
            sqlx::query(
                r#"
                INSERT INTO bus_messages (queue, exchange, routing_key, body, properties)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(queue)
            .bind(exchange)
            .bind(routing_key)
            .bind(&message.body)
            .bind(&properties)
            .execute(&mut **tx)
            .await?;
        }

        Ok(targets.len())
    }

    fn row_to_delivery(row: PgRow) -> Result<Delivery> {
        let properties: serde_json::Value = row.try_get("properties")?;
        let properties: MessageProperties = serde_json::from_value(properties)?;
        let id: i64 = row.try_get("id")?;

        Ok(Delivery {
            delivery_tag: id as u64,
            queue: row.try_get("queue")?,
            exchange: row.try_get("exchange")?,
            routing_key: row.try_get("routing_key")?,
            redelivered: row.try_get("redelivered")?,
            message: Message::new(row.try_get("body")?, properties),
        })
    }

    async fn ensure_queue(&self, queue: &str) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bus_queues WHERE name = $1)")
                .bind(queue)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(())
        } else {
            Err(BusError::QueueNotFound(queue.to_string()))
        }
    }
}

#[async_trait]
impl Broker for PostgresBroker {
    async fn declare_exchange(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT INTO bus_exchanges (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bus_queues (name, durable, dead_letter_exchange, dead_letter_routing_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(options.durable)
        .bind(&options.dead_letter_exchange)
        .bind(&options.dead_letter_routing_key)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT durable, dead_letter_exchange, dead_letter_routing_key FROM bus_queues WHERE name = $1",
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;
        let existing = QueueOptions {
            durable: row.try_get("durable")?,
            dead_letter_exchange: row.try_get("dead_letter_exchange")?,
            dead_letter_routing_key: row.try_get("dead_letter_routing_key")?,
        };
        if existing != options {
            return Err(BusError::PreconditionFailed {
                queue: name.to_string(),
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, binding_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bus_bindings (queue, exchange, binding_key)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(queue)
        .bind(exchange)
        .bind(binding_key)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return match db_err.constraint() {
                    Some("bus_bindings_exchange_fkey") => {
                        BusError::ExchangeNotFound(exchange.to_string())
                    }
                    _ => BusError::QueueNotFound(queue.to_string()),
                };
            }
            BusError::Database(e)
        })?;
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, message: Message) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let routed = Self::route(&mut tx, exchange, routing_key, &message).await?;
        tx.commit().await?;
        Ok(routed)
    }

    async fn enqueue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        message: Message,
    ) -> Result<()> {
        self.ensure_queue(queue).await?;
        let properties = serde_json::to_value(&message.properties)?;
        sqlx::query(
            r#"
            INSERT INTO bus_messages (queue, exchange, routing_key, body, properties)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(queue)
        .bind(exchange)
        .bind(routing_key)
        .bind(&message.body)
        .bind(&properties)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>> {
        let row = sqlx::query(
            r#"
            UPDATE bus_messages
            SET state = 'unacked', delivered_at = now()
            WHERE id = (
                SELECT id FROM bus_messages
                WHERE queue = $1 AND state = 'ready'
                ORDER BY redelivered DESC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, queue, exchange, routing_key, body, properties, redelivered
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_delivery(row)?)),
            None => {
                self.ensure_queue(queue).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query("DELETE FROM bus_messages WHERE id = $1 AND state = 'unacked'")
            .bind(delivery.delivery_tag as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BusError::UnknownDelivery {
                queue: delivery.queue.clone(),
                delivery_tag: delivery.delivery_tag,
            });
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if requeue {
            let result = sqlx::query(
                "UPDATE bus_messages SET state = 'ready', redelivered = TRUE WHERE id = $1 AND state = 'unacked'",
            )
            .bind(delivery.delivery_tag as i64)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(BusError::UnknownDelivery {
                    queue: delivery.queue.clone(),
                    delivery_tag: delivery.delivery_tag,
                });
            }
            tx.commit().await?;
            return Ok(());
        }

        let row = sqlx::query(
            r#"
            DELETE FROM bus_messages
            WHERE id = $1 AND state = 'unacked'
            RETURNING id, queue, exchange, routing_key, body, properties, redelivered
            "#,
        )
        .bind(delivery.delivery_tag as i64)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| BusError::UnknownDelivery {
            queue: delivery.queue.clone(),
            delivery_tag: delivery.delivery_tag,
        })?;
        let rejected = Self::row_to_delivery(row)?;

        let dead_letter = sqlx::query(
            "SELECT dead_letter_exchange, dead_letter_routing_key FROM bus_queues WHERE name = $1",
        )
        .bind(&rejected.queue)
        .fetch_one(&mut *tx)
        .await?;
        let dlx: Option<String> = dead_letter.try_get("dead_letter_exchange")?;
        let dl_routing_key: Option<String> = dead_letter.try_get("dead_letter_routing_key")?;

        match dlx {
            Some(dlx) => {
                let mut message = rejected.message;
                message.record_death(
                    &rejected.queue,
                    &rejected.exchange,
                    &rejected.routing_key,
                    "rejected",
                );
                let key = dl_routing_key.unwrap_or(rejected.routing_key);
                Self::route(&mut tx, &dlx, &key, &message).await?;
            }
            None => {
                tracing::warn!(
                    queue = %rejected.queue,
                    routing_key = %rejected.routing_key,
                    "rejected message dropped, queue has no dead-letter exchange"
                );
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<u64> {
        self.ensure_queue(queue).await?;
        let result = sqlx::query(
            "UPDATE bus_messages SET state = 'ready', redelivered = TRUE WHERE queue = $1 AND state = 'unacked'",
        )
        .bind(queue)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn queue_depth(&self, queue: &str) -> Result<u64> {
        self.ensure_queue(queue).await?;
        let depth: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bus_messages WHERE queue = $1 AND state = 'ready'",
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await?;
        Ok(depth as u64)
    }
}
