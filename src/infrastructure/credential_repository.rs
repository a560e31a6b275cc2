//! Sqlite-backed operational lookup stores: the active service-account
//! credential and per-sender upload routing metadata.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::repositories::{CredentialRepository, RoutingRepository};
use crate::domain::services::{Credential, RoutingInfo};

#[derive(Clone)]
pub struct SqliteCredentialRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCredentialRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn active_credential(&self) -> Result<Option<Credential>> {
        let row = sqlx::query(
            "SELECT username, password FROM carrier_credentials WHERE status = 'active' LIMIT 1",
        )
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| Credential {
            username: row.get("username"),
            password: row.get("password"),
        }))
    }
}

#[derive(Clone)]
pub struct SqliteRoutingRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteRoutingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl RoutingRepository for SqliteRoutingRepository {
    async fn routing_for_senders(
        &self,
        senders: &[String],
    ) -> Result<HashMap<String, RoutingInfo>> {
        if senders.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT sender_name, business, city, service_type, hub FROM sender_routing WHERE sender_name IN ({})",
            vec!["?"; senders.len()].join(", ")
        );
        let mut query = sqlx::query(&sql);
        for sender in senders {
            query = query.bind(sender);
        }

        let rows = query.fetch_all(&*self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<String, _>("sender_name"),
                    RoutingInfo {
                        business: row.get("business"),
                        city: row.get("city"),
                        service_type: row.get("service_type"),
                        hub: row.get("hub"),
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn pool() -> SqlitePool {
        let db = DatabaseConnection::new_in_memory().await.expect("connect");
        db.migrate().await.expect("migrate");
        db.pool().clone()
    }

    #[tokio::test]
    async fn only_active_credentials_are_returned() {
        let pool = pool().await;
        sqlx::query(
            "INSERT INTO carrier_credentials (username, password, status) VALUES \
             ('retired', 'x', 'inactive'), ('svc-account', 'secret', 'active')",
        )
        .execute(&pool)
        .await
        .expect("seed");

        let repo = SqliteCredentialRepository::new(pool);
        let credential = repo
            .active_credential()
            .await
            .expect("query")
            .expect("active row");
        assert_eq!(credential.username, "svc-account");
        assert_eq!(credential.password, "secret");
    }

    #[tokio::test]
    async fn missing_active_credential_is_none() {
        let repo = SqliteCredentialRepository::new(pool().await);
        assert!(repo.active_credential().await.expect("query").is_none());
    }

    #[tokio::test]
    async fn routing_is_keyed_by_sender() {
        let pool = pool().await;
        sqlx::query(
            "INSERT INTO sender_routing (sender_name, business, city, service_type, hub) VALUES \
             ('Acme Store', 12, 9, 2, 59)",
        )
        .execute(&pool)
        .await
        .expect("seed");

        let repo = SqliteRoutingRepository::new(pool);
        let map = repo
            .routing_for_senders(&["Acme Store".into(), "Unknown".into()])
            .await
            .expect("query");

        assert_eq!(map.len(), 1);
        assert_eq!(map["Acme Store"].hub, 59);
        assert!(!map.contains_key("Unknown"));
    }
}
