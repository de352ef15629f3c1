//! Background polls that keep local state in line with the gateway.
//!
//! - [`poll`]: the cancellable fixed-interval loop both polls run on
//! - [`reconciler`]: periodic status refresh for every instance
//! - [`pairing`]: per-instance watch while a pairing image waits to be scanned

pub mod pairing;
pub mod poll;
pub mod reconciler;
