//! Shared model deployment domain primitives.
//!
//! This crate owns the deployment descriptor contract, resource naming, stage
//! planning and the endpoint wait policy. It intentionally excludes AWS SDK
//! and Lambda runtime concerns.

pub mod contract;
pub mod naming;
pub mod plan;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod wait;
