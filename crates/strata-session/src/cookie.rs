//! Session cookie parsing and emission.

use chrono::{DateTime, Utc};
use cookie::Cookie;
use http::HeaderMap;
use http::header::COOKIE;
use time::OffsetDateTime;

use crate::config::SessionConfig;
use crate::id::SessionId;

/// Reads the session identifier from `Cookie` headers and renders the
/// `Set-Cookie` value announcing a new one.
#[derive(Debug, Clone)]
pub struct CookieCodec {
    name: String,
    path: String,
}

impl CookieCodec {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.cookie_name.clone(), config.cookie_path.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract the session identifier from one raw `Cookie` header.
    ///
    /// Missing cookie, unparsable pairs and malformed identifiers all yield
    /// `None`.
    pub fn parse(&self, header: &str) -> Option<SessionId> {
        Cookie::split_parse(header)
            .filter_map(|c| c.ok())
            .find(|c| c.name() == self.name)
            .and_then(|c| SessionId::parse(c.value()))
    }

    /// Extract the session identifier from every `Cookie` header in `headers`.
    pub fn parse_headers(&self, headers: &HeaderMap) -> Option<SessionId> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|h| self.parse(h))
    }

    /// Render the `Set-Cookie` value for `id` expiring at `expires`.
    pub fn serialize(&self, id: &SessionId, expires: DateTime<Utc>) -> String {
        let mut builder = Cookie::build((self.name.clone(), id.to_string())).path(self.path.clone());
        if let Ok(at) = OffsetDateTime::from_unix_timestamp(expires.timestamp()) {
            builder = builder.expires(at);
        }
        builder.build().to_string()
    }
}

impl Default for CookieCodec {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    const ID: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_parse_finds_named_cookie() {
        let codec = CookieCodec::default();
        let header = format!("theme=dark; sid={}; lang=en", ID);

        assert_eq!(codec.parse(&header), SessionId::parse(ID));
    }

    #[test]
    fn test_parse_missing_or_malformed() {
        let codec = CookieCodec::default();

        assert_eq!(codec.parse(""), None);
        assert_eq!(codec.parse("theme=dark"), None);
        assert_eq!(codec.parse("sid=not-a-session-id"), None);
        assert_eq!(codec.parse(";;;="), None);
    }

    #[test]
    fn test_parse_headers_scans_all_cookie_headers() {
        let codec = CookieCodec::new("app_sid", "/");
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_str(&format!("app_sid={}", ID)).unwrap());

        assert_eq!(codec.parse_headers(&headers), SessionId::parse(ID));
    }

    #[test]
    fn test_serialize_format() {
        let codec = CookieCodec::default();
        let id = SessionId::parse(ID).unwrap();
        let expires = DateTime::parse_from_rfc3339("2026-10-25T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(
            codec.serialize(&id, expires),
            format!("sid={}; Path=/; Expires=Sun, 25 Oct 2026 08:30:00 GMT", ID)
        );
    }
}
