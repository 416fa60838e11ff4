//! Session checkpoints: opaque, digest-verified snapshots.
//!
//! A checkpoint is captured by value right before a repair attempt and
//! restored right after it. The core never looks inside `payload`; it only
//! guarantees the payload handed back on restore is the one that was captured.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::collaborators::AgentSession;
use crate::domain::error::{Result, TestLoopError};

/// Snapshot of a session's broader conversational/file context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// SHA-256 hex of the serialized payload.
    pub digest: String,
}

impl Checkpoint {
    /// Capture a payload and compute its digest.
    pub fn capture(payload: serde_json::Value) -> Result<Self> {
        let digest = compute_payload_digest(&payload)?;
        Ok(Self {
            checkpoint_id: Uuid::new_v4(),
            created_at: Utc::now(),
            payload,
            digest,
        })
    }

    /// Check that the payload still matches the digest taken at capture time.
    pub fn verify(&self) -> Result<()> {
        let actual = compute_payload_digest(&self.payload)?;
        if actual != self.digest {
            return Err(TestLoopError::DigestMismatch {
                expected: self.digest.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Short form of the digest (first 12 hex chars).
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

fn compute_payload_digest(payload: &serde_json::Value) -> Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// RAII guard that restores a checkpoint on every exit path.
///
/// Call [`CheckpointGuard::restore`] on the normal path to observe the
/// restore result. If the guard is dropped without it (early return, panic
/// unwinding), `Drop` restores and logs any failure.
pub struct CheckpointGuard<'a> {
    session: &'a dyn AgentSession,
    checkpoint: Option<Checkpoint>,
}

impl<'a> CheckpointGuard<'a> {
    /// Capture a checkpoint from the session and arm the guard.
    pub fn acquire(session: &'a dyn AgentSession) -> Result<Self> {
        let checkpoint = session.generate_checkpoint()?;
        Ok(Self {
            session,
            checkpoint: Some(checkpoint),
        })
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    /// Restore now and disarm the guard.
    pub fn restore(mut self) -> Result<Checkpoint> {
        match self.checkpoint.take() {
            Some(checkpoint) => {
                restore_verified(self.session, &checkpoint)?;
                Ok(checkpoint)
            }
            None => Err(TestLoopError::Checkpoint(
                "checkpoint already restored".to_string(),
            )),
        }
    }
}

impl Drop for CheckpointGuard<'_> {
    fn drop(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            if let Err(e) = restore_verified(self.session, &checkpoint) {
                warn!(
                    checkpoint_id = %checkpoint.checkpoint_id,
                    error = %e,
                    "checkpoint restore on drop failed"
                );
            }
        }
    }
}

fn restore_verified(session: &dyn AgentSession, checkpoint: &Checkpoint) -> Result<()> {
    checkpoint.verify()?;
    session.restore_checkpoint(checkpoint)
}
