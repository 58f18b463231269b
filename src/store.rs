use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use tokio::task;
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{Client, ClientRow, NewClientRow};
use crate::schema::clients;

/// Repository for client aggregates. Handlers go through this seam only;
/// implementations own the persistence lifecycle.
#[async_trait]
pub trait ClientStore: Send + Sync + 'static {
    async fn insert(&self, client: &Client) -> Result<()>;

    /// Looks a client up by id or by Aktenzeichen; both are valid keys.
    async fn find(&self, key: &str) -> Result<Option<Client>>;

    /// Persists the full aggregate in one write.
    async fn save(&self, client: &Client) -> Result<()>;

    async fn list(&self) -> Result<Vec<Client>>;
}

pub struct PgClientStore {
    pool: PgPool,
}

impl PgClientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_row(row: ClientRow) -> Result<Client> {
    serde_json::from_value(row.data)
        .with_context(|| format!("malformed client document {}", row.id))
}

#[async_trait]
impl ClientStore for PgClientStore {
    async fn insert(&self, client: &Client) -> Result<()> {
        let pool = self.pool.clone();
        let row = NewClientRow {
            id: client.id,
            aktenzeichen: client.aktenzeichen.clone(),
            data: serde_json::to_value(client)?,
        };
        task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            diesel::insert_into(clients::table)
                .values(&row)
                .execute(&mut conn)
                .context("failed to insert client")?;
            Ok(())
        })
        .await
        .context("insert task panicked")?
    }

    async fn find(&self, key: &str) -> Result<Option<Client>> {
        let pool = self.pool.clone();
        let id = Uuid::parse_str(key).ok();
        let aktenzeichen = key.to_string();
        let row = task::spawn_blocking(move || -> Result<Option<ClientRow>> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            let row = match id {
                Some(id) => clients::table
                    .find(id)
                    .first::<ClientRow>(&mut conn)
                    .optional()?,
                None => clients::table
                    .filter(clients::aktenzeichen.eq(&aktenzeichen))
                    .first::<ClientRow>(&mut conn)
                    .optional()?,
            };
            Ok(row)
        })
        .await
        .context("lookup task panicked")??;

        row.map(decode_row).transpose()
    }

    async fn save(&self, client: &Client) -> Result<()> {
        let pool = self.pool.clone();
        let id = client.id;
        let data = serde_json::to_value(client)?;
        let updated = task::spawn_blocking(move || -> Result<usize> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            let count = diesel::update(clients::table.find(id))
                .set((
                    clients::data.eq(&data),
                    clients::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(&mut conn)
                .context("failed to save client")?;
            Ok(count)
        })
        .await
        .context("save task panicked")??;

        if updated == 0 {
            return Err(anyhow!("client {id} vanished during save"));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Client>> {
        let pool = self.pool.clone();
        let rows = task::spawn_blocking(move || -> Result<Vec<ClientRow>> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            let rows = clients::table
                .order(clients::created_at.asc())
                .load::<ClientRow>(&mut conn)?;
            Ok(rows)
        })
        .await
        .context("list task panicked")??;

        rows.into_iter().map(decode_row).collect()
    }
}
