//! Request decorators
//!
//! Credentials and locale are owned by collaborators outside this crate.
//! They reach the wire as opaque headers injected right before dispatch.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_LANGUAGE, AUTHORIZATION, COOKIE};

/// Something that adds headers to every outgoing request
pub trait RequestDecorator: Send + Sync {
    fn decorate(&self, headers: &mut HeaderMap);
}

/// `Authorization: Bearer <token>`
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Security: never print the token
        f.write_str("BearerToken(***)")
    }
}

impl RequestDecorator for BearerToken {
    fn decorate(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(&format!("Bearer {}", self.0)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("Bearer token contains invalid header characters, skipping"),
        }
    }
}

/// Session cookie auth (`Cookie: <name>=<value>`)
#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    value: String,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl RequestDecorator for SessionCookie {
    fn decorate(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(&format!("{}={}", self.name, self.value)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.append(COOKIE, value);
            }
            Err(_) => tracing::warn!("Session cookie contains invalid header characters, skipping"),
        }
    }
}

/// `Accept-Language: <locale>`
#[derive(Debug, Clone)]
pub struct AcceptLanguage(String);

impl AcceptLanguage {
    pub fn new(locale: impl Into<String>) -> Self {
        Self(locale.into())
    }

    pub fn locale(&self) -> &str {
        &self.0
    }
}

impl RequestDecorator for AcceptLanguage {
    fn decorate(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }
    }
}

/// Arbitrary static header, for collaborators that use custom names
#[derive(Debug, Clone)]
pub struct StaticHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl StaticHeader {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

impl RequestDecorator for StaticHeader {
    fn decorate(&self, headers: &mut HeaderMap) {
        headers.insert(self.name.clone(), self.value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_sets_sensitive_authorization() {
        let mut headers = HeaderMap::new();
        BearerToken::new("abc123").decorate(&mut headers);

        let value = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer abc123");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_bearer_token_debug_is_masked() {
        let token = BearerToken::new("secret");
        assert!(!format!("{:?}", token).contains("secret"));
    }

    #[test]
    fn test_accept_language() {
        let mut headers = HeaderMap::new();
        AcceptLanguage::new("ko-KR").decorate(&mut headers);
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "ko-KR");
    }

    #[test]
    fn test_invalid_token_is_skipped() {
        let mut headers = HeaderMap::new();
        BearerToken::new("bad\ntoken").decorate(&mut headers);
        assert!(headers.get(AUTHORIZATION).is_none());
    }
}
