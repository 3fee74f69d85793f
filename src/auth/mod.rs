//! Bearer-token authentication and refresh cookie transport.
//!
//! Dual-token system: short-lived access tokens (stateless, sent as
//! `Authorization: Bearer`) and long-lived refresh tokens (one per user,
//! stored server-side, sent only as an HttpOnly cookie).

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    CookieAttributes, CookieTransport, DEFAULT_COOKIE_MAX_AGE_SECS, REFRESH_COOKIE_NAME, SameSite,
    get_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{BearerAuth, bearer_token};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
