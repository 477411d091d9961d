//! A single discovered service instance.

use std::collections::HashMap;

/// One live endpoint of a logical service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub host: String,
    pub port: u16,
    /// Relative weight; 0 keeps the instance listed but never selected.
    pub weight: u32,
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(host: impl Into<String>, port: u16, weight: u32) -> Self {
        Self {
            host: host.into(),
            port,
            weight,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_selectable(&self) -> bool {
        self.weight > 0
    }
}
