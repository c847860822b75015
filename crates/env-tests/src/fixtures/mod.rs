//! Test fixtures for acquiring live environments.

pub mod environment;

pub use environment::{
    cleanup_manager, config, provision_dedicated, selector, shared_descriptor,
    shared_environment,
};
