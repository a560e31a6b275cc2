//! Sqlite implementation of the order repository.
//!
//! Orders are owned by the CRUD layer; the orchestrator only reads them by
//! id and mutates the carrier linkage block.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::order::Order;
use crate::domain::repositories::OrderRepository;

#[derive(Clone)]
pub struct SqliteOrderRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO orders
            (id, merchant_order_id, sender_name, sender_phone, pickup_instructions,
             consignee_name, consignee_phone, destination_district, destination_city,
             destination_province, destination_postalcode, destination_address,
             dropoff_lat, dropoff_long, dropoff_instructions,
             weight, width, height, length, payment_type, cod_amount, item_value,
             product_details, carrier_order_id, awb_number, carrier_status,
             batch_id, assignment_status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.merchant_order_id)
        .bind(&order.sender_name)
        .bind(&order.sender_phone)
        .bind(&order.pickup_instructions)
        .bind(&order.consignee_name)
        .bind(&order.consignee_phone)
        .bind(&order.destination_district)
        .bind(&order.destination_city)
        .bind(&order.destination_province)
        .bind(&order.destination_postalcode)
        .bind(&order.destination_address)
        .bind(order.dropoff_lat)
        .bind(order.dropoff_long)
        .bind(&order.dropoff_instructions)
        .bind(order.weight)
        .bind(order.width)
        .bind(order.height)
        .bind(order.length)
        .bind(&order.payment_type)
        .bind(order.cod_amount)
        .bind(order.item_value)
        .bind(&order.product_details)
        .bind(&order.carrier_order_id)
        .bind(&order.awb_number)
        .bind(&order.carrier_status)
        .bind(order.batch_id)
        .bind(&order.assignment_status)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
}

/// Builds a "?, ?, ..." placeholder list for an IN clause.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Order>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM orders WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, Order>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&*self.pool).await?)
    }

    async fn link_batch(
        &self,
        ids: &[String],
        batch_id: i64,
        assignment_status: &str,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE orders SET batch_id = ?, assignment_status = ? WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(batch_id).bind(assignment_status);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(&*self.pool).await?;
        tracing::debug!(batch_id, linked = result.rows_affected(), "orders linked to batch");
        Ok(result.rows_affected())
    }

    async fn clear_batch(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE orders SET batch_id = NULL, assignment_status = 'assigned' WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(&*self.pool).await?;
        tracing::info!(cleared = result.rows_affected(), "batch linkage reset");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn repo() -> SqliteOrderRepository {
        let db = DatabaseConnection::new_in_memory().await.expect("connect");
        db.migrate().await.expect("migrate");
        SqliteOrderRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn find_by_ids_returns_only_requested_rows() {
        let repo = repo().await;
        for n in 1..=3 {
            repo.insert(&Order::new(n.to_string(), format!("INV-{n}")))
                .await
                .expect("insert");
        }

        let found = repo
            .find_by_ids(&["1".into(), "3".into(), "nope".into()])
            .await
            .expect("find");
        let mut ids: Vec<&str> = found.iter().map(|o| o.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["1", "3"]);

        assert!(repo.find_by_ids(&[]).await.expect("empty").is_empty());
    }

    #[tokio::test]
    async fn link_and_clear_batch_roundtrip() {
        let repo = repo().await;
        repo.insert(&Order::new("1", "INV-1")).await.expect("insert");
        repo.insert(&Order::new("2", "INV-2")).await.expect("insert");

        let linked = repo
            .link_batch(&["1".into(), "2".into()], 42, "in_progress")
            .await
            .expect("link");
        assert_eq!(linked, 2);

        let found = repo.find_by_ids(&["1".into()]).await.expect("find");
        assert_eq!(found[0].batch_id, Some(42));
        assert_eq!(found[0].assignment_status, "in_progress");

        let cleared = repo
            .clear_batch(&["1".into(), "2".into()])
            .await
            .expect("clear");
        assert_eq!(cleared, 2);

        let found = repo.find_by_ids(&["2".into()]).await.expect("find");
        assert_eq!(found[0].batch_id, None);
        assert_eq!(found[0].assignment_status, "assigned");
    }
}
