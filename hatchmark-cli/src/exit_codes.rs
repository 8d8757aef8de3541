//! Exit codes following sysexits.h conventions.
//!
//! Verdicts map to distinct codes so scripts and CI systems can branch on
//! the outcome without parsing output.

#![allow(dead_code)] // Constants may be used in future or for documentation

/// Successful execution; for `verify`, the content is a registered original.
pub const SUCCESS: i32 = 0;

/// General error; for `verify`, the content is not on record.
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format outcome: the content matches a registration only
/// approximately (potentially altered copy).
/// Maps to EX_DATAERR from sysexits.h.
pub const POTENTIALLY_ALTERED: i32 = 65;

/// Cannot open or decode an input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Ledger unavailable or corrupt.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const LEDGER_ERROR: i32 = 69;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Classify by inspecting the error chain
        let code = if message.contains("Failed to read file") {
            INPUT_ERROR
        } else if message.contains("unsupported content") {
            INPUT_ERROR
        } else if message.contains("ledger unavailable") || message.contains("journal line") {
            LEDGER_ERROR
        } else if message.contains("Failed to write") {
            IO_ERROR
        } else if message.contains("invalid record id") {
            USAGE_ERROR
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_input_errors() {
        let err = anyhow::anyhow!("Failed to read file: missing.png");
        assert_eq!(ExitCode::from_anyhow(&err).code, INPUT_ERROR);

        let err = anyhow::anyhow!("unsupported content: failed to decode image");
        assert_eq!(ExitCode::from_anyhow(&err).code, INPUT_ERROR);
    }

    #[test]
    fn test_classifies_ledger_errors() {
        let err = anyhow::anyhow!("ledger unavailable: permission denied");
        assert_eq!(ExitCode::from_anyhow(&err).code, LEDGER_ERROR);
    }

    #[test]
    fn test_unknown_errors_are_general() {
        let err = anyhow::anyhow!("something else entirely");
        assert_eq!(ExitCode::from_anyhow(&err).code, GENERAL_ERROR);
    }
}
