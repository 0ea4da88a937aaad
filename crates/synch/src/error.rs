//! # Synch Error Types
//!
//! Construction and attachment failures. Contention outcomes are not errors:
//! `acquire`/`release` report them as plain `bool` values.

use thiserror::Error;

/// Errors that can occur while building or attaching synchronization handles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A numeric argument was outside its accepted range.
    #[error("invalid argument: {name} = {value}")]
    InvalidArgument {
        /// The argument that was rejected.
        name: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// The segment handed to `attach` does not have the component's layout.
    #[error("invalid {component} segment: expected {expected} bytes, got {actual}")]
    InvalidHandle {
        /// The component that refused the segment.
        component: &'static str,
        /// Required segment size in bytes.
        expected: usize,
        /// Size of the segment that was supplied.
        actual: usize,
    },

    /// A wait policy failed to parse or validate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A wait policy file could not be read.
    #[error("cannot read configuration: {0}")]
    ConfigIo(String),
}

/// Result type for synch operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Largest value accepted for identities and initial permit counts.
pub(crate) const MAX_WORD_VALUE: i64 = 0x7FFF_FFFF;

/// Checks that `value` fits in `[0, 2^31)` and narrows it to a segment word.
pub(crate) fn check_word_value(name: &'static str, value: i64) -> SyncResult<i32> {
    if !(0..=MAX_WORD_VALUE).contains(&value) {
        return Err(SyncError::InvalidArgument { name, value });
    }
    i32::try_from(value).map_err(|_| SyncError::InvalidArgument { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_value_bounds() {
        assert_eq!(check_word_value("tid", 0), Ok(0));
        assert_eq!(check_word_value("tid", MAX_WORD_VALUE), Ok(i32::MAX));
        assert!(check_word_value("tid", -1).is_err());
        assert!(check_word_value("tid", 1 << 31).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = SyncError::InvalidArgument { name: "identity", value: -1 };
        assert_eq!(err.to_string(), "invalid argument: identity = -1");

        let err = SyncError::InvalidHandle { component: "Lock", expected: 12, actual: 4 };
        assert_eq!(err.to_string(), "invalid Lock segment: expected 12 bytes, got 4");
    }
}
