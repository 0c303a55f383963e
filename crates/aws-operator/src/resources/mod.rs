//! The resources converging an `AwsCluster`.
//!
//! They run in the order `encryption_key`, `s3_bucket`, `ebs_volume`, `stack`, `drainer`, see
//! [`crate::operator`].

pub mod drainer;
pub mod ebs_volume;
pub mod encryption_key;
pub mod s3_bucket;
pub mod stack;
