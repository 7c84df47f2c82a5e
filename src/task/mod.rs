//! Durable task queue.
//!
//! Tasks move `open` to `processing` when claimed and end in exactly one of
//! `completed`, `failed` or `cancelled`. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
