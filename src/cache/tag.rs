//! Resource tags.
//!
//! A tag names a server resource kind, optionally narrowed to one instance.
//! The instance id `LIST` stands for the collection of that kind.

use std::fmt;

pub const ACCOUNTS: &str = "Accounts";
pub const TRANSACTIONS: &str = "Transactions";
pub const NOTIFICATIONS: &str = "Notifications";
pub const CARDS: &str = "Cards";
pub const PROFILE: &str = "Profile";

/// Instance id of a collection tag.
pub const LIST_ID: &str = "LIST";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub kind: String,
    pub id: Option<String>,
}

impl Tag {
    /// Every resource of `kind`.
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
        }
    }

    /// One instance of `kind`.
    pub fn item(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: Some(id.into()),
        }
    }

    /// The collection of `kind`.
    pub fn list(kind: impl Into<String>) -> Self {
        Self::item(kind, LIST_ID)
    }

    /// Tags touched when a member is created, updated or deleted: the
    /// member itself and its collection.
    pub fn member_change(kind: &str, id: impl Into<String>) -> Vec<Tag> {
        vec![Self::item(kind, id), Self::list(kind)]
    }

    pub fn is_list(&self) -> bool {
        self.id.as_deref() == Some(LIST_ID)
    }

    /// Whether invalidating `self` affects an entry providing `provided`.
    ///
    /// A tag without an id matches every tag of its kind.
    pub fn matches(&self, provided: &Tag) -> bool {
        if self.kind != provided.kind {
            return false;
        }
        match &self.id {
            None => true,
            Some(id) => provided.id.as_ref() == Some(id),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{}", self.kind, id),
            None => f.write_str(&self.kind),
        }
    }
}

/// Whether any tag in `invalidated` matches any tag in `provided`.
pub fn intersects(invalidated: &[Tag], provided: &[Tag]) -> bool {
    invalidated
        .iter()
        .any(|t| provided.iter().any(|p| t.matches(p)))
}
