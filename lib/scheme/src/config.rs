use serde::{Deserialize, Serialize};

/// Scheme that `http`/`https` loads of the application's own host are
/// served under.
pub const DEFAULT_SCHEME: &str = "socket";
const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Tunables of the resource bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// The application's custom scheme.
    pub scheme: String,
    /// Loads over `http` or `https` whose host equals this identifier are
    /// treated as loads of [`scheme`](Self::scheme).
    pub bundle_identifier: Option<String>,
    /// Depth of the response body pipe, in chunks.
    pub pipe_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            bundle_identifier: None,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

impl BridgeConfig {
    pub fn with_bundle_identifier(mut self, bundle_identifier: impl Into<String>) -> Self {
        self.bundle_identifier = Some(bundle_identifier.into());
        self
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partial_toml() {
        let config = BridgeConfig::from_toml(r#"bundle_identifier = "co.example.app""#).unwrap();
        assert_eq!(config.scheme, "socket");
        assert_eq!(config.bundle_identifier.as_deref(), Some("co.example.app"));
        assert_eq!(config.pipe_capacity, 16);
    }
}
