mod document;
mod session;
mod user;

pub use document::{Document, DocumentFilter, NewDocument, Predicate};
pub use session::Session;
pub use user::{Identity, User};
