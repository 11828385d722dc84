//! Low-level command vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A directly executable database operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Insert new rows.
    Create,
    /// Read rows matching a filter.
    Read,
    /// Patch or substitute existing rows.
    Update,
    /// Remove rows matching a filter.
    Delete,
}

impl CommandType {
    /// Returns the lowercase name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Returns `true` for commands that modify stored data.
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_type_names() {
        assert_eq!(CommandType::Read.as_str(), "read");
        assert_eq!(CommandType::Update.to_string(), "update");
    }

    #[test]
    fn test_write_commands() {
        assert!(!CommandType::Read.is_write());
        assert!(CommandType::Create.is_write());
        assert!(CommandType::Delete.is_write());
    }
}
