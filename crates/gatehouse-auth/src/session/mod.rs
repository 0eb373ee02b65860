//! Browser session state and cookies.

pub mod cookie;
pub mod store;
pub mod types;

pub use cookie::{CookieSigner, SignedToken};
pub use store::{InMemorySessionStore, PendingLookup, SessionStore};
pub use types::{AuthenticatedSession, PendingAuthorization, SessionRecord};
