//! Auth cookie transport contract.
//!
//! The access token rides a root-path cookie with a short max-age; the
//! refresh token is scoped to the refresh endpoint only, so it is never
//! sent with ordinary API calls. Both are cleared together on logout and
//! on password reset.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::AuthConfig;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Path the refresh cookie is scoped to.
pub fn refresh_path(config: &AuthConfig) -> String {
    format!("{}/auth/refresh", config.base_path)
}

fn base_cookie(config: &AuthConfig, name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(config.is_prod())
        .same_site(if config.is_prod() {
            SameSite::Strict
        } else {
            SameSite::Lax
        })
        .build()
}

/// Set the access-token cookie (root path, access TTL).
pub fn set_access_cookie(jar: CookieJar, config: &AuthConfig, access_token: String) -> CookieJar {
    let mut cookie = base_cookie(config, ACCESS_COOKIE, access_token);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::seconds(config.jwt.access_ttl_secs));
    jar.add(cookie)
}

/// Set the refresh-token cookie (refresh path, refresh TTL).
pub fn set_refresh_cookie(jar: CookieJar, config: &AuthConfig, refresh_token: String) -> CookieJar {
    let mut cookie = base_cookie(config, REFRESH_COOKIE, refresh_token);
    cookie.set_path(refresh_path(config));
    cookie.set_max_age(time::Duration::seconds(config.jwt.refresh_ttl_secs));
    jar.add(cookie)
}

/// Set both auth cookies after a completed login.
pub fn set_auth_cookies(
    jar: CookieJar,
    config: &AuthConfig,
    access_token: String,
    refresh_token: String,
) -> CookieJar {
    let jar = set_access_cookie(jar, config, access_token);
    set_refresh_cookie(jar, config, refresh_token)
}

/// Clear both auth cookies. The refresh cookie must be removed with its
/// original path or browsers keep the stale copy.
pub fn clear_auth_cookies(jar: CookieJar, config: &AuthConfig) -> CookieJar {
    let access = Cookie::build((ACCESS_COOKIE, "")).path("/").build();
    let refresh = Cookie::build((REFRESH_COOKIE, ""))
        .path(refresh_path(config))
        .build();
    jar.remove(access).remove(refresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    #[test]
    fn refresh_cookie_is_scoped_to_refresh_endpoint() {
        let config = AuthConfig::for_tests();
        let jar = set_auth_cookies(
            CookieJar::new(),
            &config,
            "access".to_string(),
            "refresh".to_string(),
        );

        let refresh = jar.get(REFRESH_COOKIE).unwrap();
        assert_eq!(refresh.path(), Some("/api/v1/auth/refresh"));

        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.path(), Some("/"));
    }

    #[test]
    fn max_age_tracks_configured_ttls() {
        let config = AuthConfig::for_tests();
        let jar = set_auth_cookies(
            CookieJar::new(),
            &config,
            "access".to_string(),
            "refresh".to_string(),
        );

        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(
            access.max_age(),
            Some(time::Duration::seconds(config.jwt.access_ttl_secs))
        );
        let refresh = jar.get(REFRESH_COOKIE).unwrap();
        assert_eq!(
            refresh.max_age(),
            Some(time::Duration::seconds(config.jwt.refresh_ttl_secs))
        );
    }
}
