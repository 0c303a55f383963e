//! Decorators over [`Resource`](super::Resource) and [`CrudResource`](super::CrudResource).
//!
//! Each middleware implements both traits for any inner value implementing them, preserving
//! the call contract, so they compose in any order.

mod metrics;
mod retry;

pub use metrics::Measured;
pub use retry::Retrying;
