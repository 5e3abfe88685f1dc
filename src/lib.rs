//! Order service: the order aggregate and its domain service, a unit of work
//! over PostgreSQL, and a durable, resumable order creation saga across the
//! pricing, payment and notification services.

pub mod application;
pub mod clients;
pub mod config;
pub mod domain;
pub mod messaging;
pub mod metrics;
pub mod persistence;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
