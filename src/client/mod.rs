//! Consumer side of the session API.
//!
//! [`ApiClient`] talks to the `/auth` endpoints over HTTP and sends every
//! authenticated call through a [`RefreshCoordinator`], so an expired access
//! token is renewed once no matter how many calls notice it at the same time.

mod claims;
mod coordinator;
mod credentials;
mod http;

pub use claims::peek_claims;
pub use coordinator::{ClientError, RefreshCoordinator, RefreshExchange, SessionStatus};
pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use http::{ApiClient, DEFAULT_TIMEOUT, HttpRefreshExchange};
