use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::user::Identity;

/// A stored document.
///
/// `file_path` is meaningful when `is_file` is set, `json_data` otherwise.
/// `grant` holds the logins given read access beyond owner and public.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub mime: String,
    pub is_file: bool,
    pub is_public: bool,
    pub file_path: Option<String>,
    pub json_data: Option<serde_json::Value>,
    #[serde(default)]
    pub grant: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Builds a new document owned by `owner` from creation input.
    ///
    /// Timestamps are truncated to microseconds, the precision the stores keep.
    pub fn new(owner: &Identity, input: NewDocument) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            owner_id: owner.id,
            mime: input.mime,
            is_file: input.is_file,
            is_public: input.is_public,
            file_path: input.file_path,
            json_data: input.json_data,
            grant: normalize_grant(input.grant),
            created_at: now,
            updated_at: now,
        }
    }

    /// True when `login` appears in the grant set.
    pub fn grants(&self, login: &str) -> bool {
        self.grant.iter().any(|g| g == login)
    }

    /// Ordering used for every list result: name ascending, newest first
    /// within a name, id as a final tie-break.
    pub fn listing_order(a: &Document, b: &Document) -> Ordering {
        a.name
            .cmp(&b.name)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Input for creating a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub name: String,
    pub mime: String,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub json_data: Option<serde_json::Value>,
    #[serde(default)]
    pub grant: Vec<String>,
}

impl NewDocument {
    pub fn new(name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            ..Self::default()
        }
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.is_file = true;
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_json(mut self, json_data: serde_json::Value) -> Self {
        self.json_data = Some(json_data);
        self
    }

    pub fn with_grant<I, S>(mut self, logins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant = logins.into_iter().map(Into::into).collect();
        self
    }
}

/// Trims, drops blanks, sorts and de-duplicates a grant list.
fn normalize_grant(grant: Vec<String>) -> Vec<String> {
    let mut grant: Vec<String> = grant
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();
    grant.sort();
    grant.dedup();
    grant
}

/// A single key/value predicate applied by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    pub key: String,
    pub value: String,
}

/// Parameters of a list query. Constructed per request, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DocumentFilter {
    /// Restrict results to documents owned by this user.
    pub owner_id: Option<Uuid>,
    /// The identity the results are filtered for. Mandatory for listing.
    pub requester: Option<Identity>,
    pub predicate: Option<Predicate>,
    pub limit: Option<u32>,
}

impl DocumentFilter {
    pub fn for_requester(requester: Identity) -> Self {
        Self {
            requester: Some(requester),
            ..Self::default()
        }
    }

    pub fn owned_by(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn matching(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicate = Some(Predicate {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
