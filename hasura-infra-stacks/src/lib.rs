//! Hasura Infra Stacks
//!
//! Declarations for a GraphQL engine deployment backed by PostgreSQL, split
//! into a network & data unit and a service & ingress unit.

pub mod bastion;
pub mod config;
pub mod credentials;
pub mod database;
pub mod error;
pub mod ingress;
pub mod network;
pub mod service;
pub mod stack;
pub mod topology;

pub use config::{ConfigBuilder, Environment, TopologyConfig};
pub use error::BuildError;
pub use stack::{Handle, Unit};
pub use topology::{NetworkOutputs, NetworkStack, ServiceStack, Topology};
