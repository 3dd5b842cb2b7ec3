//! Replication hook
//!
//! The transport to other nodes lives outside this crate; the serializer only
//! decides *when* the hook runs relative to the acknowledgment.

use super::Mutation;
use crate::error::Result;

/// Receives every mutation written with the REPLICATION option
pub trait Replicator: Send + Sync {
    fn replicate(&self, mutation: &Mutation) -> Result<()>;
}

/// Records replicated mutations in the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReplicator;

impl Replicator for LogReplicator {
    fn replicate(&self, mutation: &Mutation) -> Result<()> {
        tracing::debug!(
            db = mutation.db.as_deref().unwrap_or(""),
            key_len = mutation.key.len(),
            value_len = mutation.value.len(),
            "mutation marked for replication"
        );
        Ok(())
    }
}
