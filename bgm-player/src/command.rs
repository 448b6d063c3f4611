//! Playback commands
//!
//! A command is an immutable value handed to the playback worker. It is moved
//! into the worker queue on enqueue and owned by the queue until the worker
//! thread pops it.

use std::fmt;

/// Action requested from the playback worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Bind and play the file named by the payload
    Start,
    Pause,
    Resume,
    Stop,
    /// Drop the decoder and return to Idle
    Release,
    /// Stop the worker thread (terminal)
    Shutdown,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Pause => "pause",
            CommandKind::Resume => "resume",
            CommandKind::Stop => "stop",
            CommandKind::Release => "release",
            CommandKind::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command handled by the playback worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    payload: Option<String>,
}

impl Command {
    /// Command without payload
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    /// Command carrying a file identifier
    pub fn with_payload(kind: CommandKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: Some(payload.into()),
        }
    }

    pub fn start(file_name: impl Into<String>) -> Self {
        Self::with_payload(CommandKind::Start, file_name)
    }

    pub fn pause() -> Self {
        Self::new(CommandKind::Pause)
    }

    pub fn resume() -> Self {
        Self::new(CommandKind::Resume)
    }

    pub fn stop() -> Self {
        Self::new(CommandKind::Stop)
    }

    pub fn release() -> Self {
        Self::new(CommandKind::Release)
    }

    pub fn shutdown() -> Self {
        Self::new(CommandKind::Shutdown)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "{}({})", self.kind, payload),
            None => write!(f, "{}", self.kind),
        }
    }
}
