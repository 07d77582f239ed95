//! Validated value types shared by every DriveFS crate.
//!
//! Types here guarantee their invariants once constructed, so downstream code (path
//! resolution, permission checks, storage) never re-validates them.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors raised when a single path component fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name cannot be empty")]
    Empty,
    #[error("name cannot be '.' or '..'")]
    DotSegment,
    #[error("name exceeds {0} bytes")]
    TooLong(usize),
    #[error("name contains a control character")]
    ControlCharacter,
    #[error("name contains reserved character '{0}'")]
    ReservedCharacter(char),
}

/// Characters that may never appear inside a single path component.
pub const RESERVED_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Maximum byte length of a single component (matches common filesystem limits).
pub const MAX_NAME_BYTES: usize = 255;

/// One validated path component: a file, folder or drive name.
///
/// Null bytes and other control characters, the reserved characters in
/// [`RESERVED_NAME_CHARS`], and the dot segments `.` / `..` are rejected. Unlike
/// [`NonEmptyText`] the input is not trimmed; a name with surrounding spaces is kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathComponent(String);

impl PathComponent {
    pub fn new(input: impl AsRef<str>) -> Result<Self, NameError> {
        let name = input.as_ref();
        if name.trim().is_empty() {
            return Err(NameError::Empty);
        }
        if name == "." || name == ".." {
            return Err(NameError::DotSegment);
        }
        if name.len() > MAX_NAME_BYTES {
            return Err(NameError::TooLong(MAX_NAME_BYTES));
        }
        if name.chars().any(char::is_control) {
            return Err(NameError::ControlCharacter);
        }
        if let Some(c) = name.chars().find(|c| RESERVED_NAME_CHARS.contains(c)) {
            return Err(NameError::ReservedCharacter(c));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathComponent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Access level granted by a drive membership or an item share.
///
/// The ordering is meaningful: `ReadWrite > Read`, and a check always compares
/// `granted >= required`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionLevel {
    Read,
    #[serde(alias = "write")]
    ReadWrite,
}

impl PermissionLevel {
    /// Stable string form used in storage rows and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::ReadWrite => "read-write",
        }
    }

    /// Returns true when a grant at `self` is sufficient for `required`.
    pub fn satisfies(self, required: PermissionLevel) -> bool {
        self >= required
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown permission level string.
#[derive(Debug, thiserror::Error)]
#[error("unknown permission level: {0}")]
pub struct ParsePermissionError(String);

impl FromStr for PermissionLevel {
    type Err = ParsePermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "r" => Ok(PermissionLevel::Read),
            "read-write" | "readwrite" | "write" | "rw" => Ok(PermissionLevel::ReadWrite),
            other => Err(ParsePermissionError(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_and_rejects_blank() {
        assert_eq!(NonEmptyText::new("  design ").unwrap().as_str(), "design");
        assert!(matches!(NonEmptyText::new("   "), Err(TextError::Empty)));
    }

    #[test]
    fn path_component_rejects_reserved_characters() {
        for c in RESERVED_NAME_CHARS {
            let name = format!("bad{}name", c);
            assert_eq!(
                PathComponent::new(&name),
                Err(NameError::ReservedCharacter(*c)),
                "accepted {name}"
            );
        }
    }

    #[test]
    fn path_component_rejects_control_and_dot_segments() {
        assert_eq!(PathComponent::new("a\0b"), Err(NameError::ControlCharacter));
        assert_eq!(PathComponent::new("tab\there"), Err(NameError::ControlCharacter));
        assert_eq!(PathComponent::new(".."), Err(NameError::DotSegment));
        assert_eq!(PathComponent::new("."), Err(NameError::DotSegment));
        assert_eq!(PathComponent::new(""), Err(NameError::Empty));
        assert_eq!(
            PathComponent::new("x".repeat(MAX_NAME_BYTES + 1)),
            Err(NameError::TooLong(MAX_NAME_BYTES))
        );
    }

    #[test]
    fn path_component_accepts_ordinary_names() {
        assert_eq!(PathComponent::new("Q1 report.xlsx").unwrap().as_str(), "Q1 report.xlsx");
        assert!(PathComponent::new(".hidden").is_ok());
        assert!(PathComponent::new("naïve-ünïcode").is_ok());
    }

    #[test]
    fn permission_level_ordering_and_parsing() {
        assert!(PermissionLevel::ReadWrite.satisfies(PermissionLevel::Read));
        assert!(PermissionLevel::Read.satisfies(PermissionLevel::Read));
        assert!(!PermissionLevel::Read.satisfies(PermissionLevel::ReadWrite));

        assert_eq!("write".parse::<PermissionLevel>().unwrap(), PermissionLevel::ReadWrite);
        assert_eq!("READ".parse::<PermissionLevel>().unwrap(), PermissionLevel::Read);
        assert!("admin".parse::<PermissionLevel>().is_err());
    }

    #[test]
    fn permission_level_serde_uses_kebab_case() {
        let json = serde_json::to_string(&PermissionLevel::ReadWrite).unwrap();
        assert_eq!(json, "\"read-write\"");
        let parsed: PermissionLevel = serde_json::from_str("\"write\"").unwrap();
        assert_eq!(parsed, PermissionLevel::ReadWrite);
    }
}
