//! Slot cache for emoterelay.
//!
//! - **Catalog** — name → source URL directory, refreshed wholesale
//! - **Store** — the capacity-bounded index of resident slots
//! - **Eviction** — pure choice of which slot to sacrifice
//! - **Cache** — lookups, on-demand provisioning and eviction

pub mod cache;
pub mod catalog;
pub mod eviction;
pub mod store;

pub use cache::{ClearReport, PinGuard, PopulateReport, SlotCache};
pub use catalog::Catalog;
pub use store::SlotStore;
