//! Sqlite implementation of the partner mirror.
//!
//! The mirror's only write pattern is replace-all-then-upsert: a sync run
//! deletes every row first, then upserts batches keyed by partner id. Each
//! batch runs in one transaction.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::partner::PartnerRecord;
use crate::domain::repositories::PartnerMirrorRepository;

#[derive(Clone)]
pub struct SqlitePartnerMirrorRepository {
    pool: Arc<SqlitePool>,
}

impl SqlitePartnerMirrorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn find_by_partner_id(&self, partner_id: &str) -> Result<Option<PartnerRecord>> {
        let record = sqlx::query_as::<_, PartnerRecord>(
            "SELECT * FROM partner_mirror WHERE partner_id = ?",
        )
        .bind(partner_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(record)
    }
}

#[async_trait]
impl PartnerMirrorRepository for SqlitePartnerMirrorRepository {
    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM partner_mirror")
            .execute(&*self.pool)
            .await?;
        tracing::info!(deleted = result.rows_affected(), "partner mirror cleared");
        Ok(result.rows_affected())
    }

    async fn upsert_batch(&self, records: &[PartnerRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT OR REPLACE INTO partner_mirror
                (partner_id, name, phone_number, city, status, attendance,
                 bank_info_provided, app_version, last_active, registered_at,
                 hubs, businesses, reason, current_lat, current_lon,
                 national_id, license_number, license_expiry,
                 bank_name, bank_account_holder, bank_account_number,
                 registry_status, registry_plate_number, registry_unit_brand,
                 registry_address, registry_unit_out_date, registry_unit_return_date,
                 registry_usage_duration, registry_matched_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.partner_id)
            .bind(&record.name)
            .bind(&record.phone_number)
            .bind(&record.city)
            .bind(&record.status)
            .bind(&record.attendance)
            .bind(record.bank_info_provided)
            .bind(&record.app_version)
            .bind(&record.last_active)
            .bind(&record.registered_at)
            .bind(&record.hubs)
            .bind(&record.businesses)
            .bind(&record.reason)
            .bind(record.current_lat)
            .bind(record.current_lon)
            .bind(&record.national_id)
            .bind(&record.license_number)
            .bind(&record.license_expiry)
            .bind(&record.bank_name)
            .bind(&record.bank_account_holder)
            .bind(&record.bank_account_number)
            .bind(&record.registry_status)
            .bind(&record.registry_plate_number)
            .bind(&record.registry_unit_brand)
            .bind(&record.registry_address)
            .bind(&record.registry_unit_out_date)
            .bind(&record.registry_unit_return_date)
            .bind(&record.registry_usage_duration)
            .bind(record.registry_matched_at)
            .bind(record.updated_at)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn count(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM partner_mirror")
            .fetch_one(&*self.pool)
            .await?;
        Ok(count.0 as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use chrono::Utc;

    async fn repo() -> SqlitePartnerMirrorRepository {
        let db = DatabaseConnection::new_in_memory().await.expect("connect");
        db.migrate().await.expect("migrate");
        SqlitePartnerMirrorRepository::new(db.pool().clone())
    }

    fn record(partner_id: &str, name: &str) -> PartnerRecord {
        PartnerRecord {
            partner_id: partner_id.to_string(),
            name: name.to_string(),
            last_active: "-".into(),
            registered_at: "-".into(),
            updated_at: Utc::now(),
            ..PartnerRecord::default()
        }
    }

    #[tokio::test]
    async fn upsert_batch_writes_and_replaces() {
        let repo = repo().await;

        let written = repo
            .upsert_batch(&[record("1", "Asep"), record("2", "Budi")])
            .await
            .expect("upsert");
        assert_eq!(written, 2);
        assert_eq!(repo.count().await.expect("count"), 2);

        // Same key again replaces instead of duplicating.
        repo.upsert_batch(&[record("1", "Asep Renamed")])
            .await
            .expect("upsert again");
        assert_eq!(repo.count().await.expect("count"), 2);
        let row = repo
            .find_by_partner_id("1")
            .await
            .expect("query")
            .expect("row");
        assert_eq!(row.name, "Asep Renamed");
    }

    #[tokio::test]
    async fn delete_all_empties_the_mirror() {
        let repo = repo().await;
        repo.upsert_batch(&[record("1", "Asep")]).await.expect("upsert");

        let deleted = repo.delete_all().await.expect("delete");
        assert_eq!(deleted, 1);
        assert_eq!(repo.count().await.expect("count"), 0);
    }
}
