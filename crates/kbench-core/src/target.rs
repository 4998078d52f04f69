//! Benchmark targets and their endpoints.

use crate::{DomainError, DomainResult, KernelId, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Substitution slot used by channel URL templates.
pub const TEMPLATE_SLOT: &str = "%s";

/// Backend under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Jupyter,
    Zasper,
}

impl Target {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jupyter => "jupyter",
            Self::Zasper => "zasper",
        }
    }

    /// Where the backend listens when started with its stock settings.
    #[must_use]
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Jupyter => "http://localhost:8888",
            Self::Zasper => "http://localhost:8048",
        }
    }

    /// Endpoints at the target's default address.
    pub fn default_endpoints(&self) -> DomainResult<Endpoints> {
        Endpoints::from_base_url(self.default_base_url())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jupyter" => Ok(Self::Jupyter),
            "zasper" => Ok(Self::Zasper),
            other => Err(DomainError::UnknownTarget {
                name: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// URL Template
// ============================================================================

/// Channel URL with exactly two `%s` slots: kernel id, then session id.
///
/// ```
/// use kbench_core::{KernelId, SessionId, UrlTemplate};
///
/// let template = UrlTemplate::parse("ws://h/api/kernels/%s/channels?session_id=%s").unwrap();
/// let url = template.fill(&KernelId::new("k1"), &SessionId::new("s1"));
/// assert_eq!(url, "ws://h/api/kernels/k1/channels?session_id=s1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn parse(template: impl Into<String>) -> DomainResult<Self> {
        let template = template.into();
        let slots = template.matches(TEMPLATE_SLOT).count();
        if slots != 2 {
            return Err(DomainError::InvalidUrlTemplate { template, slots });
        }
        Ok(Self(template))
    }

    /// Substitutes the kernel id into the first slot and the session id
    /// into the second.
    #[must_use]
    pub fn fill(&self, kernel_id: &KernelId, session_id: &SessionId) -> String {
        let mut out = String::with_capacity(
            self.0.len() + kernel_id.as_str().len() + session_id.as_str().len(),
        );
        let mut ids = [kernel_id.as_str(), session_id.as_str()].into_iter();
        let mut pieces = self.0.split(TEMPLATE_SLOT).peekable();
        while let Some(piece) = pieces.next() {
            out.push_str(piece);
            if pieces.peek().is_some() {
                out.push_str(ids.next().unwrap_or_default());
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UrlTemplate {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UrlTemplate> for String {
    fn from(value: UrlTemplate) -> Self {
        value.0
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Session-creation endpoint plus the channel URL template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub sessions_url: String,
    pub channels_template: UrlTemplate,
}

impl Endpoints {
    pub fn new(sessions_url: impl Into<String>, channels_template: UrlTemplate) -> Self {
        Self {
            sessions_url: sessions_url.into(),
            channels_template,
        }
    }

    /// Derives both endpoints from an `http://host:port` base.
    ///
    /// The channel template uses the `ws` scheme. TLS backends are not
    /// supported, so `https` is rejected here rather than on the first call.
    pub fn from_base_url(base_url: &str) -> DomainResult<Self> {
        let base = base_url.trim().trim_end_matches('/');
        let Some(rest) = base.strip_prefix("http://") else {
            return Err(DomainError::InvalidFieldValue {
                field: "base_url".to_string(),
                value: base_url.to_string(),
                expected: "plain http:// URL".to_string(),
            });
        };

        if rest.is_empty() {
            return Err(DomainError::InvalidFieldValue {
                field: "base_url".to_string(),
                value: base_url.to_string(),
                expected: "a host".to_string(),
            });
        }

        let channels_template = UrlTemplate::parse(format!(
            "ws://{rest}/api/kernels/{TEMPLATE_SLOT}/channels?session_id={TEMPLATE_SLOT}"
        ))?;

        Ok(Self {
            sessions_url: format!("{base}/api/sessions"),
            channels_template,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse() {
        assert_eq!("jupyter".parse::<Target>().unwrap(), Target::Jupyter);
        assert_eq!(" Zasper ".parse::<Target>().unwrap(), Target::Zasper);

        let err = "voila".parse::<Target>().unwrap_err();
        assert!(err.to_string().contains("voila"));
    }

    #[test]
    fn test_target_default_endpoints() {
        let jupyter = Target::Jupyter.default_endpoints().unwrap();
        assert_eq!(jupyter.sessions_url, "http://localhost:8888/api/sessions");
        assert_eq!(
            jupyter.channels_template.as_str(),
            "ws://localhost:8888/api/kernels/%s/channels?session_id=%s"
        );

        let zasper = Target::Zasper.default_endpoints().unwrap();
        assert_eq!(zasper.sessions_url, "http://localhost:8048/api/sessions");
    }

    #[test]
    fn test_endpoints_reject_https_base() {
        let err = Endpoints::from_base_url("https://lab.example.com/").unwrap_err();
        assert!(err.to_string().contains("https://lab.example.com/"));
        assert!(err.to_string().contains("plain http://"));
    }

    #[test]
    fn test_endpoints_reject_bad_scheme() {
        assert!(Endpoints::from_base_url("ftp://host").is_err());
        assert!(Endpoints::from_base_url("http://").is_err());
    }

    #[test]
    fn test_template_requires_two_slots() {
        assert!(UrlTemplate::parse("ws://h/%s").is_err());
        assert!(UrlTemplate::parse("ws://h/%s/%s/%s").is_err());

        match UrlTemplate::parse("ws://h/none") {
            Err(DomainError::InvalidUrlTemplate { slots, .. }) => assert_eq!(slots, 0),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_template_fill_order() {
        let template = UrlTemplate::parse("%s|%s").unwrap();
        let filled = template.fill(&KernelId::new("kernel"), &SessionId::new("session"));
        assert_eq!(filled, "kernel|session");
    }

    #[test]
    fn test_template_deserialize_validates() {
        let ok: Result<UrlTemplate, _> = serde_json::from_str("\"a/%s/b/%s\"");
        assert!(ok.is_ok());

        let bad: Result<UrlTemplate, _> = serde_json::from_str("\"a/%s\"");
        assert!(bad.is_err());
    }
}
