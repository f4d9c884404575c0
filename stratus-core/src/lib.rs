//! Stratus Core
//!
//! Resource model, provider trait and the operation poller shared by Stratus
//! cloud providers.

pub mod differ;
pub mod jsonpath;
pub mod provider;
pub mod refresh;
pub mod resource;
pub mod tags;
pub mod transport;
pub mod waiter;
