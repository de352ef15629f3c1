//! Pairing flow for messaging instances.
//!
//! Connecting an instance asks the gateway for pairing material. While an image is waiting to be
//! scanned a poll watches the gateway's instance list; once the instance reports `open` the local
//! status becomes connected, the session (and its image) is dropped and the poll stops. There is
//! no maximum wait.
//!
//! Each instance has at most one session. Every connect draws a generation number, and an instance
//! only accepts results newer than the last one it published or the last cancel, so a slow
//! response from an older connect can never overwrite a newer session. A connect that fails leaves
//! the running session alone.

use crate::clients::GatewayProvider;
use crate::clients::gateway::{ConnectResponse, Gateway, PairingCode};
use crate::errors::{Error, Result};
use crate::models::instances::Instance;
use crate::store::InstanceStore;
use crate::sync::poll::{PollHandle, spawn_poll};
use crate::types::{InstanceStatus, RowId};
use dashmap::DashMap;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What an operator should currently see for an instance's pairing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PairingState {
    Idle,
    AwaitingScan {
        /// Scannable image, usually a data URI
        image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pairing_code: Option<String>,
    },
    Connected,
}

impl PairingState {
    fn from_pairing(pairing: &PairingCode) -> Option<Self> {
        pairing.image().map(|image| PairingState::AwaitingScan {
            image: image.to_string(),
            pairing_code: pairing.pairing_code.clone(),
        })
    }

    /// `None` when the response carries neither pairing material nor a connection state.
    fn from_connect(response: &ConnectResponse) -> Option<Self> {
        if let Some(awaiting) = Self::from_pairing(&response.pairing) {
            return Some(awaiting);
        }
        response.instance.as_ref().map(|i| Self::from_status(i.status()))
    }

    fn from_status(status: InstanceStatus) -> Self {
        match status {
            InstanceStatus::Connected => PairingState::Connected,
            _ => PairingState::Idle,
        }
    }
}

/// A pairing image waiting to be scanned, and the poll watching for it.
struct PairingSession {
    generation: u64,
    state: PairingState,
    // Dropping the handle stops the poll
    poll: PollHandle,
}

#[derive(Default)]
struct PairingSlot {
    /// Results with a generation at or below this are stale
    claimed: u64,
    session: Option<PairingSession>,
}

#[derive(Clone)]
pub struct PairingManager {
    slots: Arc<DashMap<RowId, PairingSlot>>,
    generations: Arc<AtomicU64>,
    instances: InstanceStore,
    gateways: Arc<dyn GatewayProvider>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl PairingManager {
    /// Every poll runs on a child of `shutdown`, so cancelling it stops all pairing polls.
    pub fn new(instances: InstanceStore, gateways: Arc<dyn GatewayProvider>, poll_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            generations: Arc::new(AtomicU64::new(0)),
            instances,
            gateways,
            poll_interval,
            shutdown,
        }
    }

    /// Ask the gateway to pair the instance and publish the resulting state.
    ///
    /// When the gateway answers with neither an image nor a state, the connection state endpoint
    /// decides between connected and idle.
    #[instrument(skip(self))]
    pub async fn connect(&self, instance_id: &str) -> Result<PairingState> {
        let instance = self
            .instances
            .get(instance_id)
            .await
            .ok_or_else(|| Error::not_found("Instance", instance_id))?;

        let generation = self.next_generation();
        let gateway = self.gateways.gateway().await?;
        let response = gateway.connect(&instance.name).await?;
        let state = match PairingState::from_connect(&response) {
            Some(state) => state,
            None => PairingState::from_status(gateway.connection_state(&instance.name).await?),
        };

        Ok(self.publish(&instance, generation, gateway, state).await)
    }

    /// Start a session from pairing material the gateway already handed out (instance creation).
    pub async fn start(&self, instance: &Instance, gateway: Arc<dyn Gateway>, pairing: &PairingCode) -> PairingState {
        let Some(state) = PairingState::from_pairing(pairing) else {
            return PairingState::Idle;
        };
        let generation = self.next_generation();
        self.publish(instance, generation, gateway, state).await
    }

    /// The running session's state, or idle when no image is waiting to be scanned.
    pub fn state(&self, instance_id: &str) -> PairingState {
        self.slots
            .get(instance_id)
            .and_then(|slot| slot.session.as_ref().map(|s| s.state.clone()))
            .unwrap_or(PairingState::Idle)
    }

    /// Tear down the instance's session and discard connects still in flight. Returns whether
    /// there was a session.
    pub fn cancel(&self, instance_id: &str) -> bool {
        let mut slot = self.slots.entry(instance_id.to_string()).or_default();
        slot.claimed = slot.claimed.max(self.generations.load(Ordering::SeqCst));
        let removed = slot.session.take().is_some();
        if removed {
            debug!(instance_id, "Cancelled pairing session");
        }
        removed
    }

    /// Number of sessions whose poll is still running.
    pub fn active_polls(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.session.as_ref().is_some_and(|s| !s.poll.is_finished()))
            .count()
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn publish(&self, instance: &Instance, generation: u64, gateway: Arc<dyn Gateway>, state: PairingState) -> PairingState {
        let installed = {
            let mut slot = self.slots.entry(instance.id.clone()).or_default();
            if slot.claimed >= generation {
                false
            } else {
                slot.claimed = generation;
                // Replacing the session stops the previous poll
                slot.session = match state {
                    PairingState::AwaitingScan { .. } => Some(PairingSession {
                        generation,
                        state: state.clone(),
                        poll: self.watch(instance.clone(), generation, gateway),
                    }),
                    PairingState::Idle | PairingState::Connected => None,
                };
                true
            }
        };

        if !installed {
            debug!(instance = %instance.name, generation, "Discarding superseded pairing result");
            return self.state(&instance.id);
        }

        match state {
            PairingState::AwaitingScan { .. } => {
                self.instances.set_status(&instance.id, InstanceStatus::Connecting).await;
                info!(instance = %instance.name, "Waiting for pairing image to be scanned");
            }
            PairingState::Connected => {
                self.instances.set_status(&instance.id, InstanceStatus::Connected).await;
                info!(instance = %instance.name, "Instance is already connected");
            }
            PairingState::Idle => {}
        }
        state
    }

    fn watch(&self, instance: Instance, generation: u64, gateway: Arc<dyn Gateway>) -> PollHandle {
        let slots = self.slots.clone();
        let instances = self.instances.clone();

        spawn_poll("pairing", self.poll_interval, self.shutdown.child_token(), move || {
            let (slots, instances, gateway, instance) = (slots.clone(), instances.clone(), gateway.clone(), instance.clone());
            async move {
                let reported = match gateway.fetch_instances().await {
                    Ok(reported) => reported,
                    Err(e) => {
                        warn!(instance = %instance.name, "Pairing poll failed: {}", e);
                        return ControlFlow::Continue(());
                    }
                };

                let connected = reported
                    .iter()
                    .find(|r| (r.id.is_some() && r.id == instance.gateway_id) || r.name == instance.name)
                    .is_some_and(|r| r.status() == InstanceStatus::Connected);
                if !connected {
                    return ControlFlow::Continue(());
                }

                let is_current = |slot: &PairingSlot| slot.session.as_ref().is_some_and(|s| s.generation == generation);
                if !slots.get(&instance.id).is_some_and(|slot| is_current(&*slot)) {
                    return ControlFlow::Break(());
                }

                instances.set_status(&instance.id, InstanceStatus::Connected).await;
                info!(instance = %instance.name, "Instance paired and connected");

                // Dropping the session cancels this poll, so nothing may be awaited after it
                if let Some(mut slot) = slots.get_mut(&instance.id)
                    && is_current(&*slot)
                {
                    slot.session = None;
                }
                ControlFlow::Break(())
            }
        })
    }
}
