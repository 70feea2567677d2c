//! Command-completion invalidation listener.
//!
//! The `clear` configuration maps command names to flag patterns. When a
//! mapped command finishes successfully, matching cache entries are purged.
//! Failed commands never trigger invalidation and unmapped commands are
//! no-ops.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::CacheEngine;

/// Completion notification for a named external operation.
#[derive(Debug, Clone)]
pub struct CommandFinished {
    pub command: String,
    pub exit_code: i32,
}

impl CommandFinished {
    pub fn new(command: impl Into<String>, exit_code: i32) -> Self {
        Self {
            command: command.into(),
            exit_code,
        }
    }
}

/// Maps finished commands to invalidation patterns.
pub struct ClearListener {
    clear: HashMap<String, String>,
    engine: Arc<CacheEngine>,
}

impl ClearListener {
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        Self {
            clear: engine.settings().clear.clone(),
            engine,
        }
    }

    /// Whether any command is mapped to a pattern at all.
    pub fn is_active(&self) -> bool {
        !self.clear.is_empty()
    }

    /// React to a finished command.
    ///
    /// Returns `true` when an invalidation queue was executed successfully.
    pub async fn on_command_finished(&self, event: &CommandFinished) -> bool {
        if event.exit_code != 0 {
            debug!(
                command = %event.command,
                exit_code = event.exit_code,
                "command failed; skipping invalidation"
            );
            return false;
        }

        let Some(pattern) = self.clear.get(&event.command) else {
            debug!(command = %event.command, "command not mapped; skipping");
            return false;
        };

        info!(command = %event.command, pattern = %pattern, "command finished; clearing cache");
        self.engine.clear(pattern).execute_queue().await
    }

    /// Consume completion events from a channel until it closes.
    pub async fn listen(&self, mut events: mpsc::Receiver<CommandFinished>) {
        while let Some(event) = events.recv().await {
            self.on_command_finished(&event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::storage::MemoryStorage;

    fn listener(mappings: &[(&str, &str)]) -> ClearListener {
        let mut settings = Settings::default();
        for (command, pattern) in mappings {
            settings
                .clear
                .insert(command.to_string(), pattern.to_string());
        }
        let engine = Arc::new(CacheEngine::new(settings, Arc::new(MemoryStorage::new())));
        ClearListener::new(engine)
    }

    #[test]
    fn listener_without_mappings_is_inactive() {
        assert!(!listener(&[]).is_active());
        assert!(listener(&[("optimize:clear", "route*")]).is_active());
    }

    #[tokio::test]
    async fn failed_commands_never_invalidate() {
        let listener = listener(&[("optimize:clear", "route*")]);
        let event = CommandFinished::new("optimize:clear", 1);
        assert!(!listener.on_command_finished(&event).await);
    }

    #[tokio::test]
    async fn unmapped_commands_are_no_ops() {
        let listener = listener(&[("optimize:clear", "route*")]);
        let event = CommandFinished::new("cache:warm", 0);
        assert!(!listener.on_command_finished(&event).await);
    }

    #[tokio::test]
    async fn mapped_command_with_success_exit_executes_the_queue() {
        let listener = listener(&[("optimize:clear", "route*")]);
        let event = CommandFinished::new("optimize:clear", 0);
        assert!(listener.on_command_finished(&event).await);
    }

    #[tokio::test]
    async fn listen_drains_the_channel() {
        let listener = listener(&[("optimize:clear", "route*")]);
        let (tx, rx) = mpsc::channel(4);

        tx.send(CommandFinished::new("optimize:clear", 0))
            .await
            .unwrap();
        tx.send(CommandFinished::new("other", 0)).await.unwrap();
        drop(tx);

        listener.listen(rx).await;
    }
}
