use serde::{Deserialize, Serialize};

/// What changed for an endpoint in a membership update. Transient
/// per-update metadata, never stored in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointChange {
    UrlChanged,
    WeightChanged,
    #[default]
    FullyChanged,
}

/// One backend log-ingestion server as announced by discovery.
///
/// `weight` is carried as an extension point for weighted selection but
/// is not consulted by the uniform round-robin balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub weight: i32,
    #[serde(skip)]
    pub change: EndpointChange,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Endpoint {
            name: name.into(),
            url: url.into(),
            weight: 0,
            change: EndpointChange::FullyChanged,
        }
    }
}
