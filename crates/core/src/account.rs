//! Caller credentials and the grid accounts they resolve to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::AccountId;

/// Connection identity presented by a caller when enqueueing work.
///
/// Secrets are not carried here; authenticating against the grid is the
/// execution backend's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub host: String,
    pub port: u16,
    pub zone: String,
    pub user_name: String,
}

impl Credential {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        zone: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            zone: zone.into(),
            user_name: user_name.into(),
        }
    }

    /// Fail fast on credentials that cannot possibly resolve.
    pub fn validate(&self) -> DomainResult<()> {
        if self.host.trim().is_empty() {
            return Err(DomainError::validation("credential host is empty"));
        }
        if self.zone.trim().is_empty() {
            return Err(DomainError::validation("credential zone is empty"));
        }
        if self.user_name.trim().is_empty() {
            return Err(DomainError::validation("credential user name is empty"));
        }
        if self.port == 0 {
            return Err(DomainError::validation("credential port must be non-zero"));
        }
        Ok(())
    }
}

impl core::fmt::Display for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}@{}:{}", self.user_name, self.zone, self.host, self.port)
    }
}

/// Internal account record that owns jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub host: String,
    pub port: u16,
    pub zone: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn from_credential(credential: &Credential) -> Self {
        Self {
            id: AccountId::new(),
            host: credential.host.clone(),
            port: credential.port,
            zone: credential.zone.clone(),
            user_name: credential.user_name.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn matches(&self, credential: &Credential) -> bool {
        self.host == credential.host
            && self.port == credential.port
            && self.zone == credential.zone
            && self.user_name == credential.user_name
    }
}
