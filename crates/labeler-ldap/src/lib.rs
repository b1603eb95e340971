//! LDAP membership provider for the directory labeler
//!
//! [`LdapDirectory`] binds once per configured domain and answers
//! [`labeler_core::MembershipProvider::resolve`] with a paged search that
//! streams computer objects as pages arrive.
//!
//! - Subtree scopes search for `(objectClass=computer)` below the OU
//! - Group scopes locate the group, then search for computers whose
//!   `memberOf` names it
//! - A missing OU or group surfaces as `ScopeNotFound`, anything else as
//!   `Unavailable`

pub mod directory;
pub mod error;
pub mod filter;

pub use directory::LdapDirectory;
pub use error::{Error, Result};
