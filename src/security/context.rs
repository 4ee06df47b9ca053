use sha2::{Digest, Sha256};

use crate::database::models::UserProfile;

/// Identity supplied by the transport layer for one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// Authenticated uid, None for anonymous calls
    pub uid: Option<String>,
    /// Remote address as seen by the transport, if known
    pub client_addr: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            client_addr: None,
        }
    }

    pub fn with_client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = Some(addr.into());
        self
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Rate-limit scope for this caller on one endpoint. Anonymous callers
    /// are bucketed by a digest of their address so raw IPs never reach
    /// the store.
    pub fn scope_key(&self, endpoint: &str) -> String {
        match &self.uid {
            Some(uid) => format!("{}:{}", endpoint, uid),
            None => {
                let addr = self.client_addr.as_deref().unwrap_or("unknown");
                let digest = Sha256::digest(addr.as_bytes());
                let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
                format!("{}:anon:{}", endpoint, hex)
            }
        }
    }
}

/// What a secured handler receives alongside its sanitized payload
#[derive(Debug, Clone)]
pub struct CallContext {
    pub endpoint: String,
    pub caller: Caller,
    /// Loaded by the authorization step; None for anonymous endpoints
    pub profile: Option<UserProfile>,
}
