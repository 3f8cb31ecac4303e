//! Destination key
//!
//! Each (proxy, scheme, address) triple gets its own pool. Keys compare by
//! value, so two keys built from the same strings share one pool entry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a distinct remote endpoint class
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DestinationKey {
    proxy: String,
    scheme: String,
    address: String,
}

impl DestinationKey {
    pub fn new(
        proxy: impl Into<String>,
        scheme: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            proxy: proxy.into(),
            scheme: scheme.into(),
            address: address.into(),
        }
    }

    /// Key for a destination reached without a proxy
    pub fn direct(scheme: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(String::new(), scheme, address)
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether connections for this key go through a proxy
    pub fn is_proxied(&self) -> bool {
        !self.proxy.is_empty()
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.address)?;
        if self.is_proxied() {
            write!(f, " via {}", self.proxy)?;
        }
        Ok(())
    }
}
