use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use ssi::jwk::JWK;
use tracing::{debug, info};
use url::Url;

use crate::{
    core::{
        jose::{certificate_jwk, dns_subject_alt_names, x5c_leaf},
        metadata::CredentialConfiguration,
    },
    error::{IssuanceError, Result},
    sd_jwt::{RevealedClaims, SdJwt, SdJwtError},
    store::{KeyValueStore, StoreKey, StoreName},
    utils::unix_timestamp,
};

/// What a wallet shows of a stored credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayCredential {
    /// The key of the credential in the credential store, once persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// Unix time in milliseconds.
    pub issued_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Json>>,
}

/// An issued credential with its display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedCredential {
    pub encoded: String,
    pub display: DisplayCredential,
}

impl ProcessedCredential {
    /// Read a record of the credential store, stamping its key as the display id.
    pub fn from_record(key: &StoreKey, value: Json) -> Result<Self> {
        let mut credential: Self =
            serde_json::from_value(value).context(format!("stored credential '{key}' is malformed"))?;
        if let StoreKey::Number(id) = key {
            credential.display.id = Some(*id);
        }
        Ok(credential)
    }
}

/// Verifies, decodes and persists issued SD-JWT credentials.
#[derive(Debug)]
pub struct SdJwtCredentialProcessor<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> SdJwtCredentialProcessor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Verify `credential` against `verifying_keys`, decode the claims declared by
    /// `configuration` and persist the result.
    ///
    /// When the credential header names a `kid`, only the key with that `kid` is tried.
    /// Without verifying keys, the leaf of the header's `x5c` chain is used, provided one of its
    /// DNS SubjectAltNames is the host of `credential_issuer`.
    pub async fn process_credential(
        &self,
        credential: &str,
        verifying_keys: &[JWK],
        credential_issuer: &str,
        configuration: &CredentialConfiguration,
        display_starter: Option<DisplayCredential>,
    ) -> Result<ProcessedCredential> {
        let sd_jwt = SdJwt::parse(credential).map_err(verification)?;

        let RevealedClaims { claims, disclosed } =
            verify(&sd_jwt, verifying_keys, credential_issuer)?;
        let issued_at = claims
            .get("iat")
            .and_then(Json::as_i64)
            .unwrap_or_else(unix_timestamp)
            .checked_mul(1000)
            .ok_or_else(|| verification("'iat' is out of range"))?;

        let expected = configuration.expected_claims();
        let disclosed: Map<String, Json> = disclosed
            .into_iter()
            .filter(|(name, _)| {
                let declared = expected.contains(name);
                if !declared {
                    debug!("dropping undeclared claim '{name}'");
                }
                declared
            })
            .collect();

        let mut processed = ProcessedCredential {
            encoded: credential.to_owned(),
            display: DisplayCredential {
                issued_at,
                claims: Some(disclosed),
                ..display_starter.unwrap_or_default()
            },
        };

        let key = self
            .store
            .insert(
                StoreName::Credentials,
                None,
                serde_json::to_value(&processed).context("unable to serialize credential")?,
            )
            .await?;
        if let StoreKey::Number(id) = key {
            processed.display.id = Some(id);
        }
        info!(id = %key, "stored credential");

        Ok(processed)
    }
}

fn verification(e: impl std::fmt::Display) -> IssuanceError {
    IssuanceError::CredentialVerification(e.to_string())
}

fn verify(
    sd_jwt: &SdJwt,
    verifying_keys: &[JWK],
    credential_issuer: &str,
) -> Result<RevealedClaims, IssuanceError> {
    let header = sd_jwt.header().map_err(verification)?;

    let candidates: Vec<JWK> = if !verifying_keys.is_empty() {
        match &header.kid {
            Some(kid) => {
                let matching: Vec<JWK> = verifying_keys
                    .iter()
                    .filter(|key| key.key_id.as_deref() == Some(kid))
                    .cloned()
                    .collect();
                if matching.is_empty() {
                    return Err(verification(format!("no verifying key with kid '{kid}'")));
                }
                matching
            }
            None => verifying_keys.to_vec(),
        }
    } else if let Some(x5c) = &header.x5c {
        vec![x5c_issuer_key(x5c, credential_issuer)?]
    } else {
        return Err(verification("no verifying keys available for the credential issuer"));
    };

    for key in &candidates {
        match sd_jwt.verify(key) {
            Ok(revealed) => return Ok(revealed),
            Err(SdJwtError::Signature(e)) => {
                debug!(kid = ?key.key_id, "credential did not verify: {e:#}")
            }
            Err(e) => return Err(verification(e)),
        }
    }

    Err(verification("credential could not be verified with any issuer key"))
}

/// The key of the `x5c` leaf certificate, if the certificate names the credential issuer.
fn x5c_issuer_key(x5c: &[String], credential_issuer: &str) -> Result<JWK, IssuanceError> {
    let leaf = x5c_leaf(x5c).map_err(|e| verification(format!("{e:#}")))?;

    let host = Url::parse(credential_issuer)
        .ok()
        .and_then(|url| url.host_str().map(ToOwned::to_owned))
        .ok_or_else(|| verification(format!("credential issuer '{credential_issuer}' has no host")))?;
    let names = dns_subject_alt_names(&leaf);
    if !names.iter().any(|name| name.eq_ignore_ascii_case(&host)) {
        return Err(verification(format!(
            "x5c leaf certificate is not issued to '{host}', found {names:?}"
        )));
    }

    certificate_jwk(&leaf).map_err(|e| verification(format!("{e:#}")))
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use ssi::claims::jws::Header;

    use crate::{core::jose, error::ServiceError, store::MemoryStore};

    use super::*;

    const ISSUER: &str = "https://issuer.example.com";

    fn configuration() -> CredentialConfiguration {
        serde_json::from_value(json!({
            "format": "vc+sd-jwt",
            "vct": "https://credentials.example.com/identity_credential",
            "claims": { "given_name": {}, "family_name": {} }
        }))
        .unwrap()
    }

    fn mint(header: Header, iat: i64, key: &JWK) -> String {
        let Json::Object(claims) = json!({
            "iss": ISSUER,
            "iat": iat,
            "vct": "https://credentials.example.com/identity_credential"
        }) else {
            unreachable!()
        };
        SdJwt::issue(
            header,
            claims,
            &[
                ("given_name", json!("Inga")),
                ("family_name", json!("Silverstone")),
                ("birthdate", json!("1991-11-06")),
            ],
            key,
        )
        .unwrap()
        .to_string()
    }

    fn issue(kid: Option<&str>) -> (JWK, String) {
        let mut jwk = jose::generate_p256().unwrap();
        jwk.key_id = kid.map(ToOwned::to_owned);
        let credential = mint(
            Header {
                key_id: jwk.key_id.clone(),
                ..Default::default()
            },
            1700000000,
            &jwk,
        );
        (jwk.to_public(), credential)
    }

    fn other_key() -> JWK {
        jose::generate_p256().unwrap().to_public()
    }

    #[tokio::test]
    async fn processes_and_stores() {
        let store = MemoryStore::default();
        let (jwk, credential) = issue(Some("key-1"));

        let processed = SdJwtCredentialProcessor::new(&store)
            .process_credential(
                &credential,
                &[other_key(), jwk],
                ISSUER,
                &configuration(),
                Some(DisplayCredential {
                    title: Some("Identity Credential".into()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(processed.display.id, Some(1));
        assert_eq!(processed.display.issued_at, 1700000000000);
        assert_eq!(processed.display.title.as_deref(), Some("Identity Credential"));
        assert_eq!(
            processed.display.claims,
            Some(
                json!({"given_name": "Inga", "family_name": "Silverstone"})
                    .as_object()
                    .unwrap()
                    .clone()
            )
        );

        let stored = store.find_all(StoreName::Credentials).await.unwrap();
        assert_eq!(stored.len(), 1);
        let restored =
            ProcessedCredential::from_record(&stored[0].key, stored[0].value.clone()).unwrap();
        assert_eq!(restored, processed);
    }

    #[tokio::test]
    async fn tries_each_key_without_kid() {
        let store = MemoryStore::default();
        let (jwk, credential) = issue(None);

        SdJwtCredentialProcessor::new(&store)
            .process_credential(&credential, &[other_key(), jwk], ISSUER, &configuration(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_unknown_kid() {
        let store = MemoryStore::default();
        let (_, credential) = issue(Some("key-1"));
        let mut other = other_key();
        other.key_id = Some("key-2".into());

        assert!(matches!(
            SdJwtCredentialProcessor::new(&store)
                .process_credential(&credential, &[other], ISSUER, &configuration(), None)
                .await,
            Err(ServiceError::Issuance(
                IssuanceError::CredentialVerification(_)
            ))
        ));
        assert!(store
            .find_all(StoreName::Credentials)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rejects_wrong_key() {
        let store = MemoryStore::default();
        let (_, credential) = issue(None);

        assert!(SdJwtCredentialProcessor::new(&store)
            .process_credential(&credential, &[other_key()], ISSUER, &configuration(), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn rejects_overflowing_issuance_time() {
        let store = MemoryStore::default();
        let jwk = jose::generate_p256().unwrap();
        let credential = mint(Header::default(), i64::MAX, &jwk);

        assert!(matches!(
            SdJwtCredentialProcessor::new(&store)
                .process_credential(
                    &credential,
                    &[jwk.to_public()],
                    ISSUER,
                    &configuration(),
                    None
                )
                .await,
            Err(ServiceError::Issuance(
                IssuanceError::CredentialVerification(_)
            ))
        ));
    }

    #[tokio::test]
    async fn x5c_leaf_must_name_the_credential_issuer() {
        let store = MemoryStore::default();
        let jwk: JWK = serde_json::from_str(include_str!("../../tests/examples/verifier.jwk")).unwrap();
        let credential = mint(
            Header {
                x509_certificate_chain: Some(vec![include_str!(
                    "../../tests/examples/verifier.x5c"
                )
                .trim()
                .to_owned()]),
                ..Default::default()
            },
            1700000000,
            &jwk,
        );

        // Self-signed for verifier.example.com, presented by issuer.example.com.
        assert!(matches!(
            SdJwtCredentialProcessor::new(&store)
                .process_credential(&credential, &[], ISSUER, &configuration(), None)
                .await,
            Err(ServiceError::Issuance(
                IssuanceError::CredentialVerification(_)
            ))
        ));

        SdJwtCredentialProcessor::new(&store)
            .process_credential(
                &credential,
                &[],
                "https://verifier.example.com",
                &configuration(),
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn requires_a_verifying_key_or_x5c() {
        let store = MemoryStore::default();
        let (_, credential) = issue(None);

        assert!(matches!(
            SdJwtCredentialProcessor::new(&store)
                .process_credential(&credential, &[], ISSUER, &configuration(), None)
                .await,
            Err(ServiceError::Issuance(
                IssuanceError::CredentialVerification(_)
            ))
        ));
    }
}
