//! Resolution of caller credentials to owning accounts.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use conveyor_core::{Account, Credential};

use crate::store::StoreError;

/// Maps a caller credential to the internal account that owns its jobs.
pub trait AccountResolver: Send + Sync {
    /// `Ok(None)` when the credential is unknown.
    fn resolve(&self, credential: &Credential) -> Result<Option<Account>, StoreError>;
}

/// In-memory account registry for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAccountResolver {
    accounts: RwLock<HashMap<Credential, Account>>,
}

impl InMemoryAccountResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register `credential`, returning the existing account if already known.
    pub fn register(&self, credential: Credential) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().map_err(|_| StoreError::Poisoned)?;
        let account = accounts
            .entry(credential)
            .or_insert_with_key(Account::from_credential);
        Ok(account.clone())
    }
}

impl AccountResolver for InMemoryAccountResolver {
    fn resolve(&self, credential: &Credential) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().map_err(|_| StoreError::Poisoned)?;
        Ok(accounts.get(credential).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rods() -> Credential {
        Credential::new("grid.example.org", 1247, "tempZone", "rods")
    }

    #[test]
    fn registered_credential_resolves() {
        let resolver = InMemoryAccountResolver::new();
        let account = resolver.register(rods()).unwrap();

        let resolved = resolver.resolve(&rods()).unwrap().unwrap();
        assert_eq!(resolved.id, account.id);
        assert!(resolved.matches(&rods()));
    }

    #[test]
    fn register_is_idempotent() {
        let resolver = InMemoryAccountResolver::new();
        let first = resolver.register(rods()).unwrap();
        let second = resolver.register(rods()).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn unknown_credential_resolves_to_none() {
        let resolver = InMemoryAccountResolver::new();
        resolver.register(rods()).unwrap();

        let other = Credential::new("grid.example.org", 1247, "otherZone", "rods");
        assert!(resolver.resolve(&other).unwrap().is_none());
    }
}
