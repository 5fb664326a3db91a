//! Inbound command hook.
//!
//! A remote collaborator sends either the bare word `LOCK` or a JSON object
//! `{"command": "LOCK"}`. The hook parses it and runs the configured
//! [`LockAction`]; the platform lock itself is supplied by the caller.

use crate::transparency::SharedActivityLog;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// Command error types.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("lock action failed: {0}")]
    Action(String),
}

/// Commands accepted from a remote collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteCommand {
    Lock,
}

#[derive(Deserialize)]
struct CommandEnvelope {
    command: String,
}

impl RemoteCommand {
    /// Parse a raw inbound message.
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CommandError::Empty);
        }

        let word = if trimmed.starts_with('{') {
            serde_json::from_str::<CommandEnvelope>(trimmed)
                .map_err(|_| CommandError::Unknown(trimmed.to_string()))?
                .command
        } else {
            trimmed.to_string()
        };

        match word.trim().to_ascii_uppercase().as_str() {
            "LOCK" => Ok(Self::Lock),
            _ => Err(CommandError::Unknown(word)),
        }
    }
}

impl FromStr for RemoteCommand {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Performs the workstation lock.
pub trait LockAction: Send + Sync {
    fn lock(&self) -> Result<(), CommandError>;
}

/// Lock action that only records the request.
#[derive(Debug, Default)]
pub struct LoggingLockAction;

impl LockAction for LoggingLockAction {
    fn lock(&self) -> Result<(), CommandError> {
        info!("Lock requested; no platform lock action is configured");
        Ok(())
    }
}

/// Acknowledgement returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    pub command: RemoteCommand,
    pub handled_at: DateTime<Local>,
}

/// Entry point for inbound commands.
pub struct CommandHook {
    lock: Box<dyn LockAction>,
    log: Option<SharedActivityLog>,
}

impl CommandHook {
    pub fn new(lock: Box<dyn LockAction>) -> Self {
        Self { lock, log: None }
    }

    pub fn with_log(mut self, log: SharedActivityLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Parse and run one raw command.
    pub fn handle(&self, input: &str) -> Result<CommandAck, CommandError> {
        let command = match RemoteCommand::parse(input) {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejected command: {e}");
                return Err(e);
            }
        };
        self.execute(command)
    }

    pub fn execute(&self, command: RemoteCommand) -> Result<CommandAck, CommandError> {
        if let Some(log) = &self.log {
            log.record_command();
        }
        match command {
            RemoteCommand::Lock => self.lock.lock()?,
        }
        Ok(CommandAck {
            command,
            handled_at: Local::now(),
        })
    }
}

impl Default for CommandHook {
    fn default() -> Self {
        Self::new(Box::new(LoggingLockAction))
    }
}
