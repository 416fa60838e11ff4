//! Command-backed agent session.
//!
//! The checkpoint payload is the conversation transcript. A repair dispatch
//! pipes the rendered repair prompt into the configured repair command.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use testloop_core::{
    AgentSession, Checkpoint, ConversationScope, RepairRequest, Result as LoopResult,
};

/// Conversation held by the CLI session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub messages: Vec<String>,
    pub current: Option<String>,
}

#[derive(Debug)]
pub struct CommandSession {
    repair_command: Option<String>,
    workspace_root: PathBuf,
    transcript: Mutex<Transcript>,
}

impl CommandSession {
    pub fn new(repair_command: Option<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            repair_command,
            workspace_root: workspace_root.into(),
            transcript: Mutex::new(Transcript::default()),
        }
    }

    #[cfg(test)]
    pub fn transcript(&self) -> Transcript {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AgentSession for CommandSession {
    fn generate_checkpoint(&self) -> LoopResult<Checkpoint> {
        let payload = serde_json::to_value(&*self.lock())?;
        Checkpoint::capture(payload)
    }

    fn restore_checkpoint(&self, checkpoint: &Checkpoint) -> LoopResult<()> {
        let transcript: Transcript = serde_json::from_value(checkpoint.payload.clone())?;
        *self.lock() = transcript;
        Ok(())
    }

    fn reset_conversation(&self, scope: ConversationScope) {
        let mut transcript = self.lock();
        transcript.current = None;
        if scope == ConversationScope::History {
            transcript.messages.clear();
        }
    }

    async fn dispatch_repair(&self, request: &RepairRequest) -> anyhow::Result<()> {
        let command = self
            .repair_command
            .as_deref()
            .context("no repair command configured; set `command` under [repair]")?;
        let prompt = request.render();
        self.lock().current = Some(prompt.clone());

        info!(command = %command, modify = %request.modify, "dispatching repair");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start repair command `{command}`"))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("failed to send repair prompt")?;
        }

        let status = child.wait().await.context("repair command did not finish")?;
        self.lock().messages.push(prompt);
        if !status.success() {
            anyhow::bail!("repair command exited with {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testloop_core::ModifyScope;

    #[test]
    fn test_checkpoint_roundtrip() {
        let session = CommandSession::new(None, ".");
        session.lock().messages.push("hello".into());
        let checkpoint = session.generate_checkpoint().unwrap();

        session.reset_conversation(ConversationScope::History);
        assert!(session.transcript().messages.is_empty());

        session.restore_checkpoint(&checkpoint).unwrap();
        assert_eq!(session.transcript().messages, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_dispatch_without_command_fails() {
        let session = CommandSession::new(None, ".");
        let err = session
            .dispatch_repair(&RepairRequest::new("[unit]\nboom\n\n", ModifyScope::Code))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no repair command configured"));
    }

    #[tokio::test]
    async fn test_dispatch_pipes_prompt_to_command() {
        let dir = tempfile::tempdir().unwrap();
        let session = CommandSession::new(Some("cat > prompt.txt".into()), dir.path());
        let request = RepairRequest::new("[unit]\nboom\n\n", ModifyScope::Test);

        session.dispatch_repair(&request).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("prompt.txt")).unwrap();
        assert_eq!(written, request.render());
        assert_eq!(session.transcript().messages, vec![request.render()]);
    }

    #[tokio::test]
    async fn test_dispatch_reports_nonzero_exit() {
        let session = CommandSession::new(Some("cat >/dev/null; exit 2".into()), ".");
        let err = session
            .dispatch_repair(&RepairRequest::new("r", ModifyScope::Either))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("repair command exited"));
    }
}
