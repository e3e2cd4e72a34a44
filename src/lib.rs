//! Data layer of the livelihoods training dashboard: a persistent
//! read-through cache, foreign-key label hydration, geographic scope and
//! role resolution, and the role-driven navigation projection.

pub mod api;
pub mod cache;
pub mod collections;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod geoscope;
pub mod hydrate;
pub mod logging;
pub mod navigation;
pub mod query;
pub mod role;
pub mod store;

#[cfg(test)]
mod testing;
