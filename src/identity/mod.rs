use anyhow::Context;
use ssi::jwk::JWK;
use tracing::{debug, info};

use crate::{
    core::jose,
    error::Result,
    store::{KeyValueStore, StoreKey, StoreName},
};

pub mod proof;

pub use proof::{IdentityProofGenerator, KeyProof};

/// Key of the wallet identity record.
pub const CURRENT_IDENTITY: &str = "current";

/// Owns the wallet's signing key, a single P-256 JWK persisted in the identity store.
#[derive(Debug)]
pub struct IdentityManager<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> IdentityManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    fn key() -> StoreKey {
        StoreKey::from(CURRENT_IDENTITY)
    }

    /// The persisted identity, if one was initialized.
    pub async fn identity(&self) -> Result<Option<JWK>> {
        let Some(record) = self.store.find_one(StoreName::Identity, &Self::key()).await? else {
            return Ok(None);
        };
        let jwk = serde_json::from_value(record).context("stored wallet identity is malformed")?;
        Ok(Some(jwk))
    }

    /// Return the wallet identity, generating and persisting it on first use.
    pub async fn initialize(&self) -> Result<JWK> {
        if let Some(jwk) = self.identity().await? {
            debug!(kid = ?jwk.key_id, "reusing wallet identity");
            return Ok(jwk);
        }

        let jwk = jose::generate_p256()?;
        self.store
            .insert(
                StoreName::Identity,
                Some(Self::key()),
                serde_json::to_value(&jwk).context("unable to serialize wallet identity")?,
            )
            .await?;
        info!(kid = ?jwk.key_id, "generated wallet identity");
        Ok(jwk)
    }

    /// Remove the identity. The next [initialize](Self::initialize) generates a new key.
    pub async fn clear(&self) -> Result<()> {
        Ok(self.store.clear(StoreName::Identity).await?)
    }
}
