//! Permission vocabulary
//!
//! Permission names double as policy names and as JWT claim values, so they
//! are defined once here and referenced everywhere else.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

/// Permission identifiers known to the application.
pub mod names {
    pub const POLLS_READ: &str = "polls:read";
    pub const POLLS_CREATE: &str = "polls:create";
    pub const POLLS_UPDATE: &str = "polls:update";
    pub const POLLS_DELETE: &str = "polls:delete";

    pub const QUESTIONS_READ: &str = "questions:read";
    pub const QUESTIONS_CREATE: &str = "questions:create";
    pub const QUESTIONS_UPDATE: &str = "questions:update";

    pub const USERS_READ: &str = "users:read";
    pub const USERS_CREATE: &str = "users:create";
    pub const USERS_UPDATE: &str = "users:update";

    pub const ROLES_READ: &str = "roles:read";
    pub const ROLES_CREATE: &str = "roles:create";
    pub const ROLES_UPDATE: &str = "roles:update";

    pub const RESULTS_READ: &str = "results:read";

    pub const ALL: &[&str] = &[
        POLLS_READ,
        POLLS_CREATE,
        POLLS_UPDATE,
        POLLS_DELETE,
        QUESTIONS_READ,
        QUESTIONS_CREATE,
        QUESTIONS_UPDATE,
        USERS_READ,
        USERS_CREATE,
        USERS_UPDATE,
        ROLES_READ,
        ROLES_CREATE,
        ROLES_UPDATE,
        RESULTS_READ,
    ];
}

/// A single authorizable action.
///
/// Permissions are flat strings compared by exact equality. There is no
/// wildcard or hierarchy: `"polls"` does not imply `"polls:read"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// The set of permission names that policy lookups treat as permission-shaped.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    known: HashSet<Permission>,
}

impl PermissionCatalog {
    pub fn new<I, P>(permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        Self {
            known: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// Catalog of every permission in [`names::ALL`]
    pub fn standard() -> Self {
        Self::new(names::ALL.iter().copied())
    }

    /// Look up a permission by exact name
    pub fn get(&self, name: &str) -> Option<&Permission> {
        self.known.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Permissions in name order
    pub fn sorted(&self) -> Vec<&Permission> {
        let mut all: Vec<_> = self.known.iter().collect();
        all.sort();
        all
    }
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}
