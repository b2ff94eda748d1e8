//! Session cookies: access token on `/`, refresh token only on the token
//! endpoint.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use warden_auth::{IssuedToken, TokenPair};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const REFRESH_PATH: &str = "/auth/token";

/// Store both tokens of a freshly issued pair.
pub fn with_session(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, &pair.access, "/"))
        .add(session_cookie(REFRESH_COOKIE, &pair.refresh, REFRESH_PATH))
}

/// Tell the client to drop both tokens.
pub fn without_session(jar: CookieJar) -> CookieJar {
    jar.add(removal_cookie(ACCESS_COOKIE, "/"))
        .add(removal_cookie(REFRESH_COOKIE, REFRESH_PATH))
}

pub fn refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn session_cookie(name: &'static str, token: &IssuedToken, path: &'static str) -> Cookie<'static> {
    // Lifetime of the token itself (1h access / 7d refresh by default).
    let max_age = match (token.claims.issued_at, token.claims.expires_at) {
        (Some(iat), Some(exp)) => exp - iat,
        _ => 0,
    };
    let mut cookie = base_cookie(name, token.token.clone(), path);
    cookie.set_max_age(time::Duration::seconds(max_age));
    cookie
}

fn removal_cookie(name: &'static str, path: &'static str) -> Cookie<'static> {
    let mut cookie = base_cookie(name, String::new(), path);
    cookie.make_removal();
    cookie
}

fn base_cookie(name: &'static str, value: String, path: &'static str) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(path)
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}
