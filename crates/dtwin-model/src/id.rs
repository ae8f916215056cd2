//! Model identifiers
//!
//! Provides [`ModelId`], the opaque versioned identifier of a model definition.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

static DTMI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^dtmi:[A-Za-z](?:[A-Za-z0-9_]*[A-Za-z0-9])?(?::[A-Za-z](?:[A-Za-z0-9_]*[A-Za-z0-9])?)*(?:;[1-9][0-9]{0,8}(?:\.[1-9][0-9]{0,5})?)?$",
    )
    .expect("DTMI pattern is a valid regex")
});

/// Globally unique, versioned identifier of a model definition
///
/// Equality is exact string equality. `dtmi:com:example:Room;1` and
/// `dtmi:com:example:Room;2` are unrelated keys.
///
/// # Examples
/// - `dtmi:com:example:Thermostat;1`
/// - `dtmi:com:example:Building;2`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(String);

impl ModelId {
    /// Identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path part (everything before `;`)
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        self.0.split_once(';').map_or(self.0.as_str(), |(path, _)| path)
    }

    /// Version part (everything after `;`), if present
    #[inline]
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.0.split_once(';').map(|(_, version)| version)
    }

    /// Check the identifier against the DTMI grammar
    #[must_use]
    pub fn is_dtmi(&self) -> bool {
        DTMI_PATTERN.is_match(&self.0)
    }

    /// Derive the identifier of a nested element
    ///
    /// `dtmi:a:B;1` with suffix `_contents:__temp` becomes
    /// `dtmi:a:B:_contents:__temp;1`.
    #[must_use]
    pub fn nested(&self, suffix: &str) -> Self {
        match self.version() {
            Some(version) => Self(format!("{}:{suffix};{version}", self.path())),
            None => Self(format!("{}:{suffix}", self.path())),
        }
    }
}

impl Display for ModelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModelId {
    type Err = ModelIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl TryFrom<String> for ModelId {
    type Error = ModelIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(ModelIdError::Empty);
        }
        if value.chars().any(char::is_whitespace) {
            return Err(ModelIdError::Whitespace(value));
        }
        Ok(Self(value))
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.0
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors related to model identifiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelIdError {
    /// Empty identifier
    #[error("model identifier is empty")]
    Empty,

    /// Identifier contains whitespace
    #[error("model identifier contains whitespace: '{0}'")]
    Whitespace(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_path_and_version() {
        let id: ModelId = "dtmi:com:example:Room;3".parse().unwrap();
        assert_eq!(id.path(), "dtmi:com:example:Room");
        assert_eq!(id.version(), Some("3"));
    }

    #[test]
    fn id_without_version() {
        let id: ModelId = "dtmi:com:example:Room".parse().unwrap();
        assert_eq!(id.path(), "dtmi:com:example:Room");
        assert!(id.version().is_none());
    }

    #[test]
    fn id_rejects_empty_and_whitespace() {
        assert_eq!("".parse::<ModelId>(), Err(ModelIdError::Empty));
        assert!(matches!(
            "dtmi:a b;1".parse::<ModelId>(),
            Err(ModelIdError::Whitespace(_))
        ));
    }

    #[test]
    fn id_dtmi_grammar() {
        let valid: ModelId = "dtmi:com:example:Thermostat;1".parse().unwrap();
        let no_scheme: ModelId = "com:example:Thermostat;1".parse().unwrap();
        let bad_version: ModelId = "dtmi:com:example:Thermostat;0".parse().unwrap();
        let trailing_underscore: ModelId = "dtmi:com:example_;1".parse().unwrap();

        assert!(valid.is_dtmi());
        assert!(!no_scheme.is_dtmi());
        assert!(!bad_version.is_dtmi());
        assert!(!trailing_underscore.is_dtmi());
    }

    #[test]
    fn id_nested_keeps_version() {
        let id: ModelId = "dtmi:com:example:Room;2".parse().unwrap();
        assert_eq!(
            id.nested("_contents:__temp").as_str(),
            "dtmi:com:example:Room:_contents:__temp;2"
        );
    }

    #[test]
    fn id_serde_is_transparent() {
        let id: ModelId = "dtmi:com:example:Room;1".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dtmi:com:example:Room;1\"");
        let back: ModelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ModelId>("\"\"").is_err());
    }
}
