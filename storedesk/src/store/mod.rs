//! In-memory state with a single writer per concern.
//!
//! - [`InstanceStore`]: the instance list mirrored from the table store, with statuses kept fresh
//!   from the gateway
//! - [`SettingsStore`]: the settings singleton, saved in place rather than appended

pub mod instances;
pub mod settings;

pub use instances::InstanceStore;
pub use settings::SettingsStore;
