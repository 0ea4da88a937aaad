//! # Wait Policy
//!
//! How a waiter behaves before it parks on a segment word. The policy is
//! stored in the segment when it is created, so every handle attached to the
//! segment waits the same way.
//!
//! ## File Format
//!
//! ```toml
//! # Optimistic re-checks of the word before registering as a waiter.
//! spin_limit = 128
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Upper bound for [`WaitConfig::spin_limit`].
pub const MAX_SPIN_LIMIT: u32 = 1_000_000;

/// Wait policy shared by all handles of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    /// Spin iterations spent re-checking the word before parking.
    pub spin_limit: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self { spin_limit: 64 }
    }
}

impl WaitConfig {
    /// Pure futex behaviour: park as soon as the word matches.
    #[must_use]
    pub const fn no_spin() -> Self {
        Self { spin_limit: 0 }
    }

    /// Parses a policy from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the text is not valid TOML for
    /// this struct or the values are out of range.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a policy from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConfigIo`] if the file cannot be read, and
    /// [`SyncError::InvalidConfig`] if its contents are rejected.
    pub fn load<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigIo(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `spin_limit` exceeds
    /// [`MAX_SPIN_LIMIT`].
    pub fn validate(&self) -> SyncResult<()> {
        if self.spin_limit > MAX_SPIN_LIMIT {
            return Err(SyncError::InvalidConfig(format!(
                "spin_limit {} exceeds {MAX_SPIN_LIMIT}",
                self.spin_limit
            )));
        }
        Ok(())
    }
}
