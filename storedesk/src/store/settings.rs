use crate::clients::TableStore;
use crate::errors::Result;
use crate::models::settings::{Settings, SettingsUpdate};
use crate::models::{decode_row, decode_rows, encode_row};
use crate::types::TableId;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

/// Single writer for the settings singleton.
///
/// A save updates the known row in place and only creates a row when none exists, so repeated
/// saves never leave duplicate settings rows behind.
#[derive(Clone)]
pub struct SettingsStore {
    table_store: Arc<dyn TableStore>,
    table: TableId,
    current: Arc<RwLock<Option<Settings>>>,
    // Serialises saves so two concurrent first saves cannot both create a row
    write_lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub fn new(table_store: Arc<dyn TableStore>, table: TableId) -> Self {
        Self {
            table_store,
            table,
            current: Arc::new(RwLock::new(None)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Read the settings table and cache the singleton.
    ///
    /// Tables written by older front ends can hold several rows. The most recently updated one
    /// wins (highest row id on ties or missing timestamps); the others are left untouched.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<Settings>> {
        let _guard = self.write_lock.lock().await;
        self.load_locked().await
    }

    async fn load_locked(&self) -> Result<Option<Settings>> {
        let rows = self.table_store.list_rows(self.table).await?;
        let mut candidates: Vec<Settings> = decode_rows(rows)?;
        if candidates.len() > 1 {
            warn!(
                rows = candidates.len(),
                table = self.table,
                "Settings table holds more than one row; using the most recently updated"
            );
        }

        candidates.sort_by(|a, b| {
            a.updated_at
                .or(a.created_at)
                .cmp(&b.updated_at.or(b.created_at))
                .then_with(|| numeric_id(&a.id).cmp(&numeric_id(&b.id)))
        });
        let chosen = candidates.pop();

        *self.current.write().await = chosen.clone();
        Ok(chosen)
    }

    pub async fn get(&self) -> Option<Settings> {
        self.current.read().await.clone()
    }

    /// Apply an update: PATCH the existing row, or create the row if there is none yet.
    #[instrument(skip_all)]
    pub async fn save(&self, update: SettingsUpdate) -> Result<Settings> {
        let _guard = self.write_lock.lock().await;
        let cached = self.current.read().await.clone();
        let existing = match cached {
            Some(settings) => Some(settings),
            // Only create after checking the table, in case the row was never loaded
            None => self.load_locked().await?,
        };

        let now = Utc::now();
        let mut row = encode_row(&update)?;
        row.insert("updated_at".into(), serde_json::to_value(now).map_err(anyhow::Error::from)?);

        let saved_row = match &existing {
            Some(settings) => self.table_store.update_row(self.table, &settings.id, &row).await?,
            None => {
                row.insert("created_at".into(), serde_json::to_value(now).map_err(anyhow::Error::from)?);
                self.table_store.create_row(self.table, &row).await?
            }
        };

        let saved: Settings = decode_row(saved_row)?;
        info!(settings_id = %saved.id, created = existing.is_none(), "Saved settings");
        *self.current.write().await = Some(saved.clone());
        Ok(saved)
    }
}

fn numeric_id(id: &str) -> (u64, &str) {
    (id.parse().unwrap_or(0), id)
}
