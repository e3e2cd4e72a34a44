//! The REST backend as seen by the dashboard core.

pub mod client;
pub mod types;

pub use client::{Backend, HttpBackend};
pub use types::{EntityId, ListParams, Page, Record};
