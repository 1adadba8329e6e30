//! The `sid` cookie: building, clearing and reading it.

use crate::db::sessions::SESSION_TTL_SECS;
use crate::error::{AppError, AppResult};
use axum::http::{header::COOKIE, HeaderMap, HeaderValue};

pub const SESSION_COOKIE_NAME: &str = "sid";

/// `Set-Cookie` value carrying a session token for the full session TTL.
pub fn session_cookie(token: &str, secure: bool) -> AppResult<HeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_TTL_SECS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(format!("Unencodable session cookie: {e}")))
}

pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static("sid=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure")
    } else {
        HeaderValue::from_static("sid=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

/// The `sid` value from any `Cookie` header, if present and non-empty.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie("abc.def", false).unwrap();
        assert_eq!(
            cookie,
            "sid=abc.def; Path=/; HttpOnly; SameSite=Lax; Max-Age=900"
        );
        let secure = session_cookie("abc.def", true).unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cleared = clear_session_cookie(false);
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));
        assert!(clear_session_cookie(true).to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn reads_sid_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; sid=id.tag; lang=en"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("id.tag"));
    }

    #[test]
    fn missing_or_empty_sid_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);
        headers.insert(COOKIE, HeaderValue::from_static("sidecar=1; sid="));
        assert_eq!(extract_session_token(&headers), None);
    }
}
