//! Periodic refresh of instance statuses from the gateway.
//!
//! The gateway's instance list is authoritative for connection state. Each tick fetches it in full
//! and overwrites the matching local records; nothing is written back to the table store.

use crate::clients::GatewayProvider;
use crate::errors::{Error, Result};
use crate::store::InstanceStore;
use crate::sync::poll::{PollHandle, spawn_poll};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Clone)]
pub struct StatusReconciler {
    instances: InstanceStore,
    gateways: Arc<dyn GatewayProvider>,
}

impl StatusReconciler {
    pub fn new(instances: InstanceStore, gateways: Arc<dyn GatewayProvider>) -> Self {
        Self { instances, gateways }
    }

    /// Fetch the gateway's instance list once and apply it. Returns how many records changed.
    #[instrument(skip(self))]
    pub async fn reconcile_once(&self) -> Result<usize> {
        let gateway = self.gateways.gateway().await?;
        let reported = gateway.fetch_instances().await?;
        let changed = self.instances.apply_gateway_report(&reported).await;
        if changed > 0 {
            info!(changed, reported = reported.len(), "Reconciled instance statuses");
        } else {
            debug!(reported = reported.len(), "Instance statuses already up to date");
        }
        Ok(changed)
    }

    /// Run [`reconcile_once`](Self::reconcile_once) every `interval` until `token` is cancelled.
    ///
    /// Failures are logged and the previous statuses kept; the loop never backs off.
    pub fn spawn(&self, interval: Duration, token: CancellationToken) -> PollHandle {
        info!(interval = ?interval, "Starting status reconciler");
        let reconciler = self.clone();
        spawn_poll("status_reconciler", interval, token, move || {
            let reconciler = reconciler.clone();
            async move {
                match reconciler.reconcile_once().await {
                    Ok(_) => {}
                    // Expected until someone saves gateway settings
                    Err(e @ Error::NotConfigured { .. }) => debug!("Skipping reconciliation: {}", e),
                    Err(e) => warn!("Status reconciliation failed: {:#}", e),
                }
                ControlFlow::Continue(())
            }
        })
    }
}
