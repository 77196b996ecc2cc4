/// Process-level shipper configuration, immutable after startup.
///
/// `backends` is the static fallback used when discovery is not
/// available; `discovery` lists the coordination-store endpoints that
/// serve live backend membership.
#[derive(Debug, Clone, Default)]
pub struct ShipperConfig {
    pub backends: Vec<String>,
    pub discovery: Vec<String>,
}
