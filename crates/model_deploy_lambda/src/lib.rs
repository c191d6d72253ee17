//! AWS-oriented adapters and handlers for model deployment.
//!
//! This crate owns runtime integration details (Lambda handlers, SageMaker,
//! S3 and SNS adapter traits, environment configuration) and re-exports the
//! domain primitives of `model_deploy_core` through the `runtime` module.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod logging;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub mod runtime {
    pub use model_deploy_core::{contract, naming, plan, wait};
}
