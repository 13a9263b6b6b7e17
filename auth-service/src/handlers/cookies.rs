//! Session cookies.
//!
//! Tokens travel in HttpOnly cookies; each has a readable companion holding
//! its expiry so browser code can tell when to refresh.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use time::Duration;

use crate::config::SecurityConfig;
use crate::models::TokenPair;

pub const ACCESS_COOKIE: &str = "access_token_cookie";
pub const REFRESH_COOKIE: &str = "refresh_token_cookie";
pub const ACCESS_EXPIRE_COOKIE: &str = "access_expire";
pub const REFRESH_EXPIRE_COOKIE: &str = "refresh_expire";

#[derive(Debug, Clone, Default)]
pub struct CookieSettings {
    pub secure: bool,
    pub domain: Option<String>,
}

impl From<&SecurityConfig> for CookieSettings {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            secure: config.cookie_secure,
            domain: config.cookie_domain.clone(),
        }
    }
}

impl CookieSettings {
    fn build(&self, name: &str, value: String, http_only: bool, max_age: Duration) -> Cookie<'static> {
        let mut cookie = Cookie::build((name.to_string(), value))
            .http_only(http_only)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/".to_string())
            .max_age(max_age)
            .build();
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        cookie
    }

    fn token_cookies(
        &self,
        token_name: &str,
        expire_name: &str,
        token: &str,
        expires_at: i64,
    ) -> [Cookie<'static>; 2] {
        let max_age = Duration::seconds((expires_at - Utc::now().timestamp()).max(0));
        [
            self.build(token_name, token.to_string(), true, max_age),
            self.build(expire_name, expires_at.to_string(), false, max_age),
        ]
    }

    /// Add the access cookies to `jar`.
    pub fn set_access(&self, jar: CookieJar, token: &str, expires_at: i64) -> CookieJar {
        self.token_cookies(ACCESS_COOKIE, ACCESS_EXPIRE_COOKIE, token, expires_at)
            .into_iter()
            .fold(jar, |jar, cookie| jar.add(cookie))
    }

    /// Add the refresh cookies to `jar`.
    pub fn set_refresh(&self, jar: CookieJar, token: &str, expires_at: i64) -> CookieJar {
        self.token_cookies(REFRESH_COOKIE, REFRESH_EXPIRE_COOKIE, token, expires_at)
            .into_iter()
            .fold(jar, |jar, cookie| jar.add(cookie))
    }

    pub fn set_pair(&self, jar: CookieJar, pair: &TokenPair) -> CookieJar {
        let jar = self.set_access(jar, &pair.access_token, pair.access_expires_at);
        self.set_refresh(jar, &pair.refresh_token, pair.refresh_expires_at)
    }

    /// Expired versions of every session cookie.
    pub fn cleared(&self) -> Vec<Cookie<'static>> {
        [
            (ACCESS_COOKIE, true),
            (ACCESS_EXPIRE_COOKIE, false),
            (REFRESH_COOKIE, true),
            (REFRESH_EXPIRE_COOKIE, false),
        ]
        .into_iter()
        .map(|(name, http_only)| self.build(name, String::new(), http_only, Duration::ZERO))
        .collect()
    }

    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        self.cleared()
            .into_iter()
            .fold(jar, |jar, cookie| jar.add(cookie))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cookie_is_http_only_and_expiry_is_readable() {
        let settings = CookieSettings::default();
        let expires_at = Utc::now().timestamp() + 900;
        let jar = settings.set_access(CookieJar::new(), "token", expires_at);

        let token = jar.get(ACCESS_COOKIE).expect("access cookie");
        assert_eq!(token.value(), "token");
        assert_eq!(token.http_only(), Some(true));

        let expire = jar.get(ACCESS_EXPIRE_COOKIE).expect("expire cookie");
        assert_eq!(expire.value(), expires_at.to_string());
        assert_eq!(expire.http_only(), Some(false));
    }

    #[test]
    fn test_domain_applied() {
        let settings = CookieSettings {
            secure: true,
            domain: Some("example.com".to_string()),
        };
        for cookie in settings.cleared() {
            assert_eq!(cookie.domain(), Some("example.com"));
            assert_eq!(cookie.max_age(), Some(Duration::ZERO));
            assert_eq!(cookie.secure(), Some(true));
        }
    }
}
