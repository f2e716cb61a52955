//! Error taxonomy shared by every collector.
//!
//! Runner failures ([`CommandFailure`]) are mapped into [`AuditError`] by the
//! collector that issued the command, because only the caller knows which
//! tool and arguments were involved.

use crate::runner::CommandFailure;

/// Longest raw output fragment carried inside an error.
pub const MAX_FRAGMENT_CHARS: usize = 200;

/// Errors that can occur while collecting or writing audit data.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The binary is not installed (or not on `PATH`).
    #[error("{tool}: executable not found")]
    ExternalToolMissing { tool: String },

    /// The tool did not finish within its timeout and was killed.
    #[error("{tool}: timed out after {secs}s")]
    ExternalToolTimeout { tool: String, secs: u64 },

    /// The tool ran but exited non-zero.
    #[error("{tool}: exited with code {code}: {stderr}")]
    ExternalToolNonZeroExit {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// The tool's output did not have the expected structure.
    #[error("{tool}: malformed output ({reason}): {fragment:?}")]
    MalformedOutput {
        tool: String,
        reason: String,
        fragment: String,
    },

    /// vnstat JSON whose generation could not be determined.
    #[error("vnstat: unknown JSON schema generation: {fragment:?}")]
    SchemaVersionMismatch { fragment: String },

    /// The process lacks the privileges needed to run the collectors.
    #[error("server-report must be run as root (effective uid {euid})")]
    InsufficientPrivilege { euid: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuditError {
    /// Map a runner failure for `tool` into the audit taxonomy.
    pub fn from_failure(tool: &str, failure: CommandFailure) -> Self {
        match failure {
            CommandFailure::NotFound => Self::ExternalToolMissing {
                tool: tool.to_string(),
            },
            CommandFailure::Timeout(limit) => Self::ExternalToolTimeout {
                tool: tool.to_string(),
                secs: limit.as_secs(),
            },
            CommandFailure::NonZeroExit { code, result } => Self::ExternalToolNonZeroExit {
                tool: tool.to_string(),
                code,
                stderr: truncate_fragment(result.stderr.trim()),
            },
            CommandFailure::Spawn(e) => Self::Io(e),
        }
    }

    /// Build a [`AuditError::MalformedOutput`] with the raw text truncated.
    pub fn malformed(tool: &str, reason: impl Into<String>, raw: &str) -> Self {
        Self::MalformedOutput {
            tool: tool.to_string(),
            reason: reason.into(),
            fragment: truncate_fragment(raw),
        }
    }
}

/// Convenience alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Cut `raw` to at most [`MAX_FRAGMENT_CHARS`] characters, marking the cut.
pub fn truncate_fragment(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(MAX_FRAGMENT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
