// src/classes/postgres.rs

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio_postgres::{Client, Config, NoTls};

use super::EquivalenceClassStore;
use crate::error::Result;

const TABLE_DDL: &str = "
    CREATE TABLE IF NOT EXISTS dedupe_classes (
        id VARCHAR(100) NOT NULL,
        clid INT NOT NULL,
        PRIMARY KEY (id, clid)
    )";

const INDEX_DDL: &str =
    "CREATE INDEX IF NOT EXISTS dedupe_classes_clid ON dedupe_classes (clid)";

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("POSTGRES_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "dedupe".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "class store DB config: host={}, port={}, db={}, user={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("dedupe_engine");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Durable equivalence-class store over a single logical table
/// `dedupe_classes (id, clid)` with a composite primary key and a
/// non-unique index on `clid`.
///
/// One connection carries every statement, which also serializes all writes.
/// A class merge is a bulk rewrite of the losing class id; the next free
/// class id is recovered from `max(clid) + 1` at open, so the store picks up
/// where a previous run left off.
pub struct PostgresClassStore {
    client: Client,
    next_class_id: i32,
}

impl PostgresClassStore {
    /// Connects using the `POSTGRES_*` environment variables.
    pub async fn connect() -> Result<Self> {
        let config = build_pg_config();
        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("equivalence-class database connection ended: {}", e);
            }
        });
        Self::with_client(client).await
    }

    /// Wraps an existing connection, creating the backing table if needed.
    pub async fn with_client(client: Client) -> Result<Self> {
        client.execute(TABLE_DDL, &[]).await?;
        client.execute(INDEX_DDL, &[]).await?;
        let row = client
            .query_one("SELECT COALESCE(MAX(clid), -1) + 1 FROM dedupe_classes", &[])
            .await?;
        let next_class_id: i32 = row.get(0);
        debug!("equivalence-class store ready, next class id {}", next_class_id);
        Ok(PostgresClassStore {
            client,
            next_class_id,
        })
    }

    async fn class_id_of(&self, id: &str) -> Result<Option<i32>> {
        let row = self
            .client
            .query_opt("SELECT clid FROM dedupe_classes WHERE id = $1", &[&id])
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn add_to_class(&self, id: &str, clid: i32) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO dedupe_classes (id, clid) VALUES ($1, $2)",
                &[&id, &clid],
            )
            .await?;
        Ok(())
    }

    async fn merge(&self, winner: i32, loser: i32) -> Result<()> {
        let rewritten = self
            .client
            .execute(
                "UPDATE dedupe_classes SET clid = $1 WHERE clid = $2",
                &[&winner, &loser],
            )
            .await?;
        debug!(
            "merged class {} into {}, {} memberships rewritten",
            loser, winner, rewritten
        );
        Ok(())
    }
}

#[async_trait]
impl EquivalenceClassStore for PostgresClassStore {
    async fn add_link(&mut self, id1: &str, id2: &str) -> Result<()> {
        let clid1 = self.class_id_of(id1).await?;
        let clid2 = self.class_id_of(id2).await?;

        match (clid1, clid2) {
            (Some(c1), Some(c2)) if c1 == c2 => Ok(()), // we already knew
            (Some(c1), Some(c2)) => self.merge(c1, c2).await,
            (Some(c1), None) => self.add_to_class(id2, c1).await,
            (None, Some(c2)) => self.add_to_class(id1, c2).await,
            (None, None) => {
                let clid = self.next_class_id;
                self.next_class_id += 1;
                self.add_to_class(id1, clid).await?;
                if id1 != id2 {
                    self.add_to_class(id2, clid).await?;
                }
                Ok(())
            }
        }
    }

    async fn class_id(&self, id: &str) -> Result<Option<u32>> {
        Ok(self.class_id_of(id).await?.map(|clid| clid as u32))
    }

    async fn class_of(&self, id: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT c.id FROM dedupe_classes c
                 JOIN dedupe_classes probe ON probe.clid = c.clid
                 WHERE probe.id = $1",
                &[&id],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn class_count(&self) -> Result<usize> {
        let row = self
            .client
            .query_one("SELECT COUNT(DISTINCT clid) FROM dedupe_classes", &[])
            .await?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }

    async fn commit(&mut self) -> Result<()> {
        // every statement autocommits on its own connection
        Ok(())
    }
}
