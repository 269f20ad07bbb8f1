use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use drm_core::{ParseError, ProtectionScheme};

use crate::selector::SchemeSelector;

fn default_scheme_priority() -> Vec<String> {
    vec!["widevine".into(), "playready".into()]
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    64
}

/**
    Session manager configuration, fixed before content open.

    ```json
    {
        "license_server_url": "https://license.example/widevine",
        "request_headers": { "X-Client": "player" },
        "scheme_priority": ["playready", "widevine"],
        "request_timeout_ms": 10000
    }
    ```
*/
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DrmConfig {
    /// License server; when unset the provider-suggested URL is used.
    pub license_server_url: Option<String>,
    /// Extra headers attached to every license request.
    pub request_headers: BTreeMap<String, String>,
    /// Scheme names or system IDs, most preferred first.
    #[serde(default = "default_scheme_priority")]
    pub scheme_priority: Vec<String>,
    /// License request timeout; zero is treated as one millisecond.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for DrmConfig {
    fn default() -> Self {
        Self {
            license_server_url: None,
            request_headers: BTreeMap::new(),
            scheme_priority: default_scheme_priority(),
            request_timeout_ms: default_request_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl DrmConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_license_server_url(mut self, url: impl Into<String>) -> Self {
        self.license_server_url = Some(url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_scheme_priority<I, S>(mut self, priority: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scheme_priority = priority.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.request_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /**
        Build the scheme selector from `scheme_priority`.
    */
    pub fn selector(&self) -> Result<SchemeSelector, ParseError> {
        let schemes = self
            .scheme_priority
            .iter()
            .map(|s| s.parse::<ProtectionScheme>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SchemeSelector::new(schemes))
    }
}
