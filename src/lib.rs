//! Declarative provisioning of k3d clusters, nodes and registries.
//!
//! Flat attribute files are expanded into typed desired state
//! ([`expand`]), node filters are resolved against the cluster topology
//! ([`filter`]), and the [`pipeline`] drives a [`runtime::RuntimeClient`],
//! rolling back a cluster whose creation failed. Credentials of new clusters
//! are merged into the user's kubeconfig ([`kubeconfig`]).

pub mod attributes;
pub mod cli;
pub mod expand;
pub mod filter;
pub mod identity;
pub mod kubeconfig;
pub mod pipeline;
pub mod runtime;
pub mod settings;
pub mod spec;
