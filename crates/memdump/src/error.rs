use thiserror::Error;

use crate::space::SPACE_NAMES;

/// Errors produced while decoding a trace or rendering a report.
///
/// Every variant is fatal for the run that produced it: a trace is either
/// decoded completely or not at all.
#[derive(Debug, Error)]
pub enum MemdumpError {
    /// Structural violation in the binary trace (unknown tag, truncated field,
    /// oversized string, dangling stacktrace index, invalid UTF-8).
    #[error("malformed trace at byte {offset}: {reason}")]
    MalformedTrace { offset: u64, reason: String },

    /// A space code in the trace outside the registered set.
    #[error("unknown space code {0} in trace")]
    UnknownSpaceCode(u32),

    /// A user supplied space name outside the canonical set.
    #[error("invalid space '{0}', possible values: all, {names}", names = SPACE_NAMES.join(", "))]
    UnknownSpaceName(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode report as json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemdumpError>;

impl MemdumpError {
    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedTrace {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether the error stems from caller input rather than from the trace.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::UnknownSpaceName(_))
    }

    /// Process exit status a command line wrapper should use for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_usage() {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_exit_with_two() {
        let err = MemdumpError::UnknownSpaceName("heap".to_string());
        assert!(err.is_usage());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.to_string(),
            "invalid space 'heap', possible values: all, object, humongous, nonmovable, internal, code, compiler"
        );
    }

    #[test]
    fn test_trace_errors_exit_with_one() {
        let err = MemdumpError::malformed(12, "invalid event tag 7");
        assert!(!err.is_usage());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "malformed trace at byte 12: invalid event tag 7");

        assert_eq!(MemdumpError::UnknownSpaceCode(9).exit_code(), 1);
    }
}
