use std::fmt;

use serde::{Deserialize, Serialize};

/// A reference to a remote profile, either by its handle or its numeric ID.
///
/// Both forms may name the same profile; the store keys profiles by numeric
/// ID and resolves handles through a unique, case-insensitive index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    ByHandle(String),
    ByNumericId(i64),
}

impl Identity {
    pub fn handle(handle: impl Into<String>) -> Self {
        Identity::ByHandle(normalize_handle(&handle.into()))
    }

    pub fn id(id: i64) -> Self {
        Identity::ByNumericId(id)
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Identity::ByNumericId(id)
    }
}

impl From<&str> for Identity {
    fn from(handle: &str) -> Self {
        Identity::handle(handle)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::ByHandle(handle) => write!(f, "@{handle}"),
            Identity::ByNumericId(id) => write!(f, "#{id}"),
        }
    }
}

/// Strip surrounding whitespace and a leading `@`.
pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_normalized() {
        assert_eq!(Identity::handle("  @someone "), Identity::ByHandle("someone".into()));
    }

    #[test]
    fn display_distinguishes_forms() {
        assert_eq!(Identity::handle("someone").to_string(), "@someone");
        assert_eq!(Identity::id(42).to_string(), "#42");
    }
}
