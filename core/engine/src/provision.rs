//! Provisioning artifacts.
//!
//! When the engine reports `Unkeyed` it generates a key pair and a
//! certificate signing request that must be delivered out-of-band for
//! provisioning. The process is restarted once provisioning completes.

use serde::{Deserialize, Serialize};

use sable_common::{Error, Result};

/// Certificate signing request plus capability list, serialized as JSON
/// for out-of-band provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    /// Base64-encoded certificate signing request.
    pub csr: String,
    /// Capabilities this end point requests. Applications append their own
    /// before writing the artifact.
    pub capabilities: Vec<String>,
}

impl ProvisioningRequest {
    /// Create a request from an encoded CSR and base capabilities.
    pub fn new(csr: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            csr: csr.into(),
            capabilities,
        }
    }

    /// Append an application capability.
    pub fn push_capability(&mut self, capability: impl Into<String>) {
        self.capabilities.push(capability.into());
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let mut req = ProvisioningRequest::new("Q1NSLWJ5dGVz", vec![]);
        req.push_capability("app.echo");
        req.push_capability("app.share");

        let json = req.to_json().unwrap();
        let restored = ProvisioningRequest::from_json(&json).unwrap();

        assert_eq!(restored.csr, req.csr);
        assert_eq!(restored.capabilities, vec!["app.echo", "app.share"]);
    }

    #[test]
    fn test_capabilities_survive_quoting() {
        // Capability strings with quotes must come back intact, which the
        // hand-concatenated format this replaces could not guarantee.
        let req = ProvisioningRequest::new("csr", vec!["weird \"cap\"".to_string()]);
        let json = req.to_json().unwrap();
        let restored = ProvisioningRequest::from_json(&json).unwrap();
        assert_eq!(restored.capabilities[0], "weird \"cap\"");
    }
}
