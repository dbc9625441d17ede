use serde::{Deserialize, Serialize};
use ssi::{
    claims::jws::Header,
    jwk::{Algorithm, JWK},
};

use super::IdentityManager;
use crate::{
    core::jose,
    error::{IssuanceError, Result},
    store::KeyValueStore,
    utils::unix_timestamp,
};

pub const PROOF_JWT_TYPE: &str = "openid4vci-proof+jwt";

/// Proof of possession of the key a credential is to be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "proof_type", rename_all = "snake_case")]
pub enum KeyProof {
    Jwt { jwt: String },
}

#[derive(Debug, Clone, Serialize)]
struct ProofClaims<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
    aud: &'a str,
    iat: i64,
    nonce: &'a str,
}

/// Signs key proofs with the wallet identity.
#[derive(Debug)]
pub struct IdentityProofGenerator<'a, S: ?Sized> {
    identity: IdentityManager<'a, S>,
}

impl<'a, S: KeyValueStore + ?Sized> IdentityProofGenerator<'a, S> {
    pub fn new(identity: IdentityManager<'a, S>) -> Self {
        Self { identity }
    }

    /// Build a JWT key proof for `audience` (the credential issuer) over `nonce`.
    ///
    /// `client_id` becomes the `iss` claim when known. The wallet algorithm must be one of
    /// `supported_algorithms`.
    pub async fn generate(
        &self,
        audience: &str,
        nonce: &str,
        client_id: Option<&str>,
        supported_algorithms: &[String],
    ) -> Result<KeyProof> {
        let jwk = self.identity.initialize().await?;
        check_algorithm(&jwk, supported_algorithms)?;

        let header = Header {
            type_: Some(PROOF_JWT_TYPE.to_owned()),
            jwk: Some(jwk.to_public()),
            ..Default::default()
        };
        let claims = ProofClaims {
            iss: client_id,
            aud: audience,
            iat: unix_timestamp(),
            nonce,
        };

        let jwt = jose::sign(header, &claims, &jwk)?;
        Ok(KeyProof::Jwt { jwt })
    }
}

fn check_algorithm(jwk: &JWK, supported: &[String]) -> Result<(), IssuanceError> {
    let alg = jwk
        .algorithm
        .ok_or(IssuanceError::MissingSigningAlgorithm)?;
    if alg != Algorithm::ES256 || !supported.iter().any(|supported| supported == alg.as_str()) {
        return Err(IssuanceError::UnsupportedSigningAlgorithm(
            alg.as_str().to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use serde_json::{json, Value as Json};

    use crate::{
        core::jose::CompactJws,
        error::ServiceError,
        store::MemoryStore,
    };

    use super::*;

    #[tokio::test]
    async fn jwt_proof() {
        let store = MemoryStore::default();
        let generator = IdentityProofGenerator::new(IdentityManager::new(&store));

        let proof = generator
            .generate(
                "https://issuer.example.com",
                "tZignsnFbp",
                Some("wallet-client"),
                &["ES256".into()],
            )
            .await
            .unwrap();
        let KeyProof::Jwt { jwt } = &proof;

        let serialized = serde_json::to_value(&proof).unwrap();
        assert_eq!(serialized["proof_type"], json!("jwt"));
        assert_eq!(serialized["jwt"], json!(jwt));

        let compact = CompactJws::split(jwt).unwrap();
        let header = compact.header().unwrap();
        assert_eq!(header.typ.as_deref(), Some(PROOF_JWT_TYPE));
        let public = header.jwk.unwrap();
        let identity = IdentityManager::new(&store).identity().await.unwrap().unwrap();
        assert_eq!(public, identity.to_public());
        compact.verify(&public).unwrap();

        let claims: Json = compact.payload().unwrap();
        assert_eq!(claims["aud"], json!("https://issuer.example.com"));
        assert_eq!(claims["nonce"], json!("tZignsnFbp"));
        assert_eq!(claims["iss"], json!("wallet-client"));
    }

    #[tokio::test]
    async fn anonymous_proof_has_no_issuer() {
        let store = MemoryStore::default();
        let generator = IdentityProofGenerator::new(IdentityManager::new(&store));
        let KeyProof::Jwt { jwt } = generator
            .generate("https://issuer.example.com", "n", None, &["ES256".into()])
            .await
            .unwrap();
        let claims: Json = CompactJws::split(&jwt).unwrap().payload().unwrap();
        assert!(claims.get("iss").is_none());
    }

    #[tokio::test]
    async fn unsupported_algorithm() {
        let store = MemoryStore::default();
        let generator = IdentityProofGenerator::new(IdentityManager::new(&store));
        assert!(matches!(
            generator
                .generate("https://issuer.example.com", "n", None, &["EdDSA".into()])
                .await,
            Err(ServiceError::Issuance(
                IssuanceError::UnsupportedSigningAlgorithm(_)
            ))
        ));
    }

    #[test]
    fn missing_algorithm() {
        let mut jwk = jose::generate_p256().unwrap();
        jwk.algorithm = None;
        assert!(matches!(
            check_algorithm(&jwk, &["ES256".into()]),
            Err(IssuanceError::MissingSigningAlgorithm)
        ));
    }
}
