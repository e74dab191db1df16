//! Seedgraph - nested relational seed documents resolved into create/connect
//! operations and applied once per content version.

pub mod analyzer;
pub mod applier;
pub mod checksum;
pub mod config;
pub mod document;
pub mod entity;
pub mod ledger;
pub mod mapper;
pub mod resolver;
pub mod runner;
pub mod schema;
pub mod settings;
pub mod store;

#[cfg(test)]
mod testing;
