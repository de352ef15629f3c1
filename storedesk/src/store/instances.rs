use crate::clients::TableStore;
use crate::clients::gateway::GatewayInstance;
use crate::errors::Result;
use crate::models::decode_rows;
use crate::models::instances::Instance;
use crate::types::{InstanceStatus, TableId};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// The locally rendered list of messaging instances.
///
/// Cloned handles share the same list. Every mutation goes through the methods here; readers only
/// ever get snapshots.
#[derive(Clone, Default)]
pub struct InstanceStore {
    instances: Arc<RwLock<Vec<Instance>>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with the rows of the instances table.
    #[instrument(skip(self, table_store))]
    pub async fn load(&self, table_store: &dyn TableStore, table: TableId) -> Result<usize> {
        let rows = table_store.list_rows(table).await?;
        let loaded: Vec<Instance> = decode_rows(rows)?;
        let count = loaded.len();
        *self.instances.write().await = loaded;
        info!(count, "Loaded instances from table store");
        Ok(count)
    }

    pub async fn list(&self) -> Vec<Instance> {
        self.instances.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Instance> {
        self.instances.read().await.iter().find(|i| i.id == id).cloned()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Instance> {
        self.instances.read().await.iter().find(|i| i.name == name).cloned()
    }

    /// Insert a record, replacing any record with the same id.
    pub async fn insert(&self, instance: Instance) {
        let mut instances = self.instances.write().await;
        match instances.iter_mut().find(|i| i.id == instance.id) {
            Some(existing) => *existing = instance,
            None => instances.push(instance),
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Instance> {
        let mut instances = self.instances.write().await;
        let position = instances.iter().position(|i| i.id == id)?;
        Some(instances.remove(position))
    }

    /// Overwrite one instance's status. Returns true if the stored value changed.
    pub async fn set_status(&self, id: &str, status: InstanceStatus) -> bool {
        let mut instances = self.instances.write().await;
        match instances.iter_mut().find(|i| i.id == id) {
            Some(instance) if instance.status != status => {
                debug!(instance = %instance.name, from = %instance.status, to = %status, "Instance status changed");
                instance.status = status;
                true
            }
            _ => false,
        }
    }

    /// Apply the gateway's authoritative instance list.
    ///
    /// Entries are matched by name. Local instances without a same-named gateway entry keep their
    /// current status. Returns how many records changed.
    pub async fn apply_gateway_report(&self, reported: &[GatewayInstance]) -> usize {
        let mut instances = self.instances.write().await;
        let mut changed = 0;

        for instance in instances.iter_mut() {
            let Some(entry) = reported.iter().find(|r| r.name == instance.name) else {
                continue;
            };
            let status = entry.status();
            if instance.status != status {
                debug!(instance = %instance.name, from = %instance.status, to = %status, "Instance status changed");
                instance.status = status;
                changed += 1;
            }
        }

        changed
    }
}
