//! Alert persistence and retention.
//!
//! [`AlertStore`] writes batches of machine-reported alerts together with
//! their events, metas and decisions, answers filtered queries over them,
//! deletes them with their children, and evicts old alerts by age and count.
//! The schema is managed by the `migration` crate and applied on connect.

pub mod config;
pub mod entities;
pub mod error;
pub mod filter;
pub mod store;


pub use config::{RetentionConfig, StoreConfig};
pub use error::StoreError;
pub use filter::{AlertFilter, FilterMap};
pub use store::{
    AlertRow, AlertStore, DecisionRow, EventRow, MachineLookup, MachineLookupError, MachineRow,
    MetaRow,
};
