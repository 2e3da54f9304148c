//! aws-operator: Kubernetes operator for AWS tenant clusters
//!
//! Reconciles `AWSConfig` custom resources against the AWS infrastructure of
//! a tenant cluster: CloudFormation stacks, KMS keys, S3 buckets and the
//! host-cluster objects fronting the tenant API.

pub mod aws;
pub mod cache;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod key;
pub mod resources;
pub mod stack;
pub mod telemetry;
pub mod template;

#[cfg(feature = "metrics")]
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::error::{Error, Result};
