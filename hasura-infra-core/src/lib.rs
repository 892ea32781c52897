//! Hasura Infra Core
//!
//! Core library for provisioning the Hasura deployment topology: resource
//! declarations as values, dependency resolution, planning, and a provider
//! abstraction that turns planned effects into side effects.

pub mod differ;
pub mod effect;
pub mod graph;
pub mod interpreter;
pub mod naming;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
