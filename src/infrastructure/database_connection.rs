//! Database connection and pool management.
//!
//! Sqlite via sqlx. The schema is created idempotently at startup; the
//! partner mirror carries no migrations because it is replaced wholesale on
//! every sync run.

use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        if let Some(parent) = Path::new(db_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests. Pinned to a single connection: each
    /// sqlite memory connection is its own database.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_partner_mirror_sql = r#"
            CREATE TABLE IF NOT EXISTS partner_mirror (
                partner_id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                phone_number TEXT NOT NULL DEFAULT '',
                city TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                attendance TEXT NOT NULL DEFAULT '',
                bank_info_provided BOOLEAN NOT NULL DEFAULT 0,
                app_version TEXT NOT NULL DEFAULT '',
                last_active TEXT NOT NULL DEFAULT '-',
                registered_at TEXT NOT NULL DEFAULT '-',
                hubs TEXT NOT NULL DEFAULT '',
                businesses TEXT NOT NULL DEFAULT '',
                reason TEXT NOT NULL DEFAULT '',
                current_lat REAL,
                current_lon REAL,
                national_id TEXT NOT NULL DEFAULT '',
                license_number TEXT NOT NULL DEFAULT '',
                license_expiry TEXT NOT NULL DEFAULT '',
                bank_name TEXT NOT NULL DEFAULT '',
                bank_account_holder TEXT NOT NULL DEFAULT '',
                bank_account_number TEXT NOT NULL DEFAULT '',
                registry_status TEXT NOT NULL DEFAULT '',
                registry_plate_number TEXT NOT NULL DEFAULT '',
                registry_unit_brand TEXT NOT NULL DEFAULT '',
                registry_address TEXT NOT NULL DEFAULT '',
                registry_unit_out_date TEXT NOT NULL DEFAULT '',
                registry_unit_return_date TEXT NOT NULL DEFAULT '',
                registry_usage_duration TEXT NOT NULL DEFAULT '',
                registry_matched_at DATETIME,
                updated_at DATETIME NOT NULL
            )
        "#;

        let create_orders_sql = r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                merchant_order_id TEXT NOT NULL,
                sender_name TEXT NOT NULL DEFAULT '',
                sender_phone TEXT NOT NULL DEFAULT '',
                pickup_instructions TEXT NOT NULL DEFAULT '',
                consignee_name TEXT NOT NULL DEFAULT '',
                consignee_phone TEXT NOT NULL DEFAULT '',
                destination_district TEXT NOT NULL DEFAULT '',
                destination_city TEXT NOT NULL DEFAULT '',
                destination_province TEXT NOT NULL DEFAULT '',
                destination_postalcode TEXT NOT NULL DEFAULT '',
                destination_address TEXT NOT NULL DEFAULT '',
                dropoff_lat REAL,
                dropoff_long REAL,
                dropoff_instructions TEXT NOT NULL DEFAULT '',
                weight REAL NOT NULL DEFAULT 0,
                width REAL NOT NULL DEFAULT 0,
                height REAL NOT NULL DEFAULT 0,
                length REAL NOT NULL DEFAULT 0,
                payment_type TEXT NOT NULL DEFAULT 'non_cod',
                cod_amount REAL NOT NULL DEFAULT 0,
                item_value REAL NOT NULL DEFAULT 0,
                product_details TEXT NOT NULL DEFAULT '',
                carrier_order_id TEXT,
                awb_number TEXT,
                carrier_status TEXT,
                batch_id INTEGER,
                assignment_status TEXT NOT NULL DEFAULT 'assigned'
            )
        "#;

        let create_credentials_sql = r#"
            CREATE TABLE IF NOT EXISTS carrier_credentials (
                username TEXT PRIMARY KEY,
                password TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'inactive'
            )
        "#;

        let create_routing_sql = r#"
            CREATE TABLE IF NOT EXISTS sender_routing (
                sender_name TEXT PRIMARY KEY,
                business INTEGER NOT NULL,
                city INTEGER NOT NULL,
                service_type INTEGER NOT NULL,
                hub INTEGER NOT NULL
            )
        "#;

        sqlx::query(create_partner_mirror_sql).execute(&self.pool).await?;
        sqlx::query(create_orders_sql).execute(&self.pool).await?;
        sqlx::query(create_credentials_sql).execute(&self.pool).await?;
        sqlx::query(create_routing_sql).execute(&self.pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_merchant ON orders (merchant_order_id)")
            .execute(&self.pool)
            .await?;

        tracing::info!("database schema ready");
        Ok(())
    }
}
