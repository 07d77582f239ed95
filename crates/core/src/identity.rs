//! Authenticated actors.

use uuid::Uuid;

/// An authenticated actor.
///
/// Built by a surface once authentication succeeds and never mutated for the rest of the
/// request. The login name doubles as the actor's home directory name, so it is validated as
/// a single path component when the user is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub login: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn new(
        id: Uuid,
        login: impl Into<String>,
        display_name: impl Into<String>,
        is_admin: bool,
    ) -> Self {
        Self {
            id,
            login: login.into(),
            display_name: display_name.into(),
            is_admin,
        }
    }

    /// Name of the directory under the users root that holds this actor's home tree.
    pub fn home_dir_name(&self) -> &str {
        &self.login
    }

    /// Compact id form used in cache keys and storage rows.
    pub fn key(&self) -> String {
        self.id.simple().to_string()
    }
}
