//! Document access policy.

use crate::models::{Document, Identity};

/// Read access decision for `identity` on `doc`.
///
/// Granted when the document is public, when `identity` owns it (by id), or
/// when the grant set lists `identity` (by login).
pub fn check_access(doc: &Document, identity: &Identity) -> bool {
    doc.is_public || doc.owner_id == identity.id || doc.grants(&identity.login)
}

/// Deletion is reserved to the owner; grants and public visibility do not count.
pub fn can_delete(doc: &Document, identity: &Identity) -> bool {
    doc.owner_id == identity.id
}
