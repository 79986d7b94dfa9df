use std::collections::HashSet;

use axum::http::HeaderValue;
use url::Url;

use crate::error::GuardError;

/// Placeholder origin used to check that a relative reference cannot
/// resolve anywhere else.
const SELF_ORIGIN: &str = "http://self.invalid/";

/// A navigation target that may go into a `Location` header as-is.
#[derive(Debug, Clone)]
pub struct SafeRedirect {
    location: HeaderValue,
}

impl SafeRedirect {
    pub fn location(&self) -> &HeaderValue {
        &self.location
    }
}

/// Allow-list of redirect destination hosts. Schemes are fixed to http(s).
#[derive(Debug, Clone, Default)]
pub struct RedirectPolicy {
    allowed_hosts: HashSet<String>,
}

impl RedirectPolicy {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { allowed_hosts }
    }

    pub fn allowed_hosts(&self) -> impl Iterator<Item = &str> {
        self.allowed_hosts.iter().map(String::as_str)
    }

    pub fn validate_redirect(&self, raw_url: &str) -> Result<SafeRedirect, GuardError> {
        let location = if is_local_path(raw_url) {
            Some(raw_url.to_string())
        } else {
            self.allowed_absolute(raw_url)
        };

        match location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            Some(location) => Ok(SafeRedirect { location }),
            None => {
                tracing::warn!(url = ?raw_url, "rejected redirect target");
                Err(GuardError::UntrustedRedirectTarget)
            }
        }
    }

    /// Returns the serialized URL when it is http(s), carries no
    /// credentials, and names an allow-listed host.
    fn allowed_absolute(&self, raw_url: &str) -> Option<String> {
        let url = Url::parse(raw_url).ok()?;

        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if !url.username().is_empty() || url.password().is_some() {
            return None;
        }

        let host = url.host_str()?;
        self.allowed_hosts
            .contains(host)
            .then(|| url.as_str().to_string())
    }
}

/// Same-origin path reference: one leading slash, nothing that a browser
/// could reinterpret as a new authority.
fn is_local_path(raw: &str) -> bool {
    if !raw.starts_with('/') || raw.starts_with("//") {
        return false;
    }
    if raw
        .chars()
        .any(|c| c == '\\' || c.is_whitespace() || c.is_control())
    {
        return false;
    }

    let Ok(base) = Url::parse(SELF_ORIGIN) else {
        return false;
    };
    match base.join(raw) {
        Ok(joined) => joined.origin() == base.origin(),
        Err(_) => false,
    }
}
