//! Virtual path handling.
//!
//! `sanitise` holds the pure string checks, `resolver` maps a cleaned virtual path onto the
//! storage tree for a given identity.

mod resolver;
mod sanitise;

pub use resolver::{NamespaceKind, PathResolver, ResolvedPath};
pub use sanitise::{clean, is_same_or_under, is_within_root, join_virtual, split_parent};

use crate::DriveResult;
use drivefs_types::PathComponent;

/// Validates a single entry name before it is created on disk.
pub fn validate_component(name: &str) -> DriveResult<PathComponent> {
    Ok(PathComponent::new(name)?)
}
