use async_trait::async_trait;

use crate::{context::PassContext, error::Result, framework::ReconcileObject};

/// One reconciliation step.
///
/// Both operations must be idempotent: a pass that fails halfway is repeated from the first
/// resource on the next resync.
#[async_trait]
pub trait Resource<K: ReconcileObject>: Send + Sync {
    fn name(&self) -> &str;

    async fn ensure_created(&self, ctx: &PassContext, obj: &K) -> Result<()>;

    async fn ensure_deleted(&self, ctx: &PassContext, obj: &K) -> Result<()>;
}
