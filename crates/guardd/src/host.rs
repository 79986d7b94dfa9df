use std::fmt;
use std::net::IpAddr;

use crate::error::GuardError;

/// Longest hostname accepted, per RFC 1035 presentation form without a trailing dot.
pub const MAX_HOST_LEN: usize = 253;

const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Ip,
    Name,
}

/// A host that passed validation and is safe to hand to the diagnostic
/// command as one argv element. The caller's text is kept byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeHost {
    value: String,
    kind: HostKind,
}

impl SafeHost {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> HostKind {
        self.kind
    }
}

impl fmt::Display for SafeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Validate a caller-supplied host or IP literal.
///
/// Strict grammar only; the input is never trimmed or repaired.
pub fn validate_host(raw: &str) -> Result<SafeHost, GuardError> {
    let kind = if raw.parse::<IpAddr>().is_ok() {
        Some(HostKind::Ip)
    } else if is_valid_hostname(raw) {
        Some(HostKind::Name)
    } else {
        None
    };

    if let Some(kind) = kind {
        return Ok(SafeHost {
            value: raw.to_string(),
            kind,
        });
    }

    tracing::warn!(host = ?raw, "rejected diagnostic host");
    Err(GuardError::InvalidHost)
}

fn is_valid_hostname(raw: &str) -> bool {
    if raw.is_empty() || raw.len() > MAX_HOST_LEN {
        return false;
    }

    if !raw
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return false;
    }

    // A leading '-' on any label would let the value parse as an option.
    raw.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}
