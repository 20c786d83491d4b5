//! Service layer module.
//!
//! Wires repositories, resolvers and the gateway into the trigger and reconciler.

pub mod container;

pub use container::ServiceContainer;
