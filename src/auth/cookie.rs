//! Refresh token cookie transport.
//!
//! The refresh token travels only as an HttpOnly cookie. Its attributes are a
//! function of the deployment environment, and the clearing cookie must repeat
//! them exactly: browsers ignore a clear whose scope does not match the
//! original cookie.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::cli::Environment;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Default cookie lifetime: 10 days, matching the default refresh token duration.
pub const DEFAULT_COOKIE_MAX_AGE_SECS: u64 = 10 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Scope attributes shared by the set and clear cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieAttributes {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: &'static str,
}

impl CookieAttributes {
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Development => Self {
                http_only: true,
                secure: false,
                same_site: SameSite::Lax,
                path: "/",
            },
            // Cross-site frontends need SameSite=None, which browsers only accept with Secure.
            Environment::Production => Self {
                http_only: true,
                secure: true,
                same_site: SameSite::None,
                path: "/",
            },
        }
    }

    fn render(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!("{}={}", REFRESH_COOKIE_NAME, value);
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str("; SameSite=");
        cookie.push_str(self.same_site.as_str());
        cookie.push_str("; Path=");
        cookie.push_str(self.path);
        cookie.push_str(&format!("; Max-Age={}", max_age));
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Builds `Set-Cookie` values for the refresh token. The value is opaque here.
#[derive(Debug, Clone, Copy)]
pub struct CookieTransport {
    attributes: CookieAttributes,
    max_age: u64,
}

impl CookieTransport {
    pub fn new(env: Environment, max_age: u64) -> Self {
        Self {
            attributes: CookieAttributes::for_environment(env),
            max_age,
        }
    }

    pub fn attributes(&self) -> CookieAttributes {
        self.attributes
    }

    /// `Set-Cookie` value carrying the refresh token.
    pub fn refresh_cookie(&self, token: &str) -> String {
        self.attributes.render(token, self.max_age)
    }

    /// `Set-Cookie` value that removes the refresh token cookie.
    pub fn clear_cookie(&self) -> String {
        self.attributes.render("", 0)
    }

    pub fn set_refresh_cookie(&self, headers: &mut HeaderMap, token: &str) {
        append_set_cookie(headers, self.refresh_cookie(token));
    }

    pub fn clear_refresh_cookie(&self, headers: &mut HeaderMap) {
        append_set_cookie(headers, self.clear_cookie());
    }
}

fn append_set_cookie(headers: &mut HeaderMap, cookie: String) {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!(error = %e, "Refusing to send malformed cookie"),
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_attributes() {
        let attrs = CookieAttributes::for_environment(Environment::Development);
        assert!(attrs.http_only);
        assert!(!attrs.secure);
        assert_eq!(attrs.same_site, SameSite::Lax);
    }

    #[test]
    fn test_production_attributes() {
        let attrs = CookieAttributes::for_environment(Environment::Production);
        assert!(attrs.http_only);
        assert!(attrs.secure);
        assert_eq!(attrs.same_site, SameSite::None);
    }

    #[test]
    fn test_refresh_cookie_development() {
        let transport = CookieTransport::new(Environment::Development, 3600);
        assert_eq!(
            transport.refresh_cookie("abc"),
            "refreshToken=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=3600"
        );
    }

    #[test]
    fn test_refresh_cookie_production() {
        let transport = CookieTransport::new(Environment::Production, 3600);
        assert_eq!(
            transport.refresh_cookie("abc"),
            "refreshToken=abc; HttpOnly; SameSite=None; Path=/; Max-Age=3600; Secure"
        );
    }

    #[test]
    fn test_clear_matches_set_scope() {
        for env in [Environment::Development, Environment::Production] {
            let transport = CookieTransport::new(env, 3600);
            let set = transport.refresh_cookie("abc");
            let clear = transport.clear_cookie();

            let scope = |cookie: &str| -> Vec<String> {
                cookie
                    .split(';')
                    .skip(1)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.starts_with("Max-Age"))
                    .collect()
            };

            assert_eq!(scope(&set), scope(&clear));
            assert!(clear.starts_with("refreshToken=;"));
            assert!(clear.contains("Max-Age=0"));
        }
    }

    #[test]
    fn test_set_refresh_cookie_appends_header() {
        let transport = CookieTransport::new(Environment::Development, 60);
        let mut headers = HeaderMap::new();
        transport.set_refresh_cookie(&mut headers, "abc");
        transport.clear_refresh_cookie(&mut headers);

        let values: Vec<_> = headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; refreshToken=xyz789"),
        );

        assert_eq!(get_cookie(&headers, REFRESH_COOKIE_NAME), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, REFRESH_COOKIE_NAME), None);
    }

    #[test]
    fn test_get_cookie_no_header() {
        let headers = HeaderMap::new();
        assert_eq!(get_cookie(&headers, REFRESH_COOKIE_NAME), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  refreshToken = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, REFRESH_COOKIE_NAME), Some("abc123"));
    }
}
