//! Custom Resource Definitions for the AWS operator
//!
//! This module defines the AWSConfig CRD describing a tenant cluster.

mod aws_config;
pub mod types;


pub use aws_config::{
    AWSConfig, AWSConfigSpec, AWSConfigStatus, AutoscalingGroupStatus, AwsSpec, AwsStatus,
    ClusterSpec, ClusterStatus, NetworkStatus, ScalingSpec, SpecValidationError,
};
pub use types::*;
