//! JOSE glue over `ssi`: key generation, compact JWS inspection and signing.

use anyhow::{bail, Context, Result};
use base64::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use ssi::{
    claims::{
        jws::{self, Header},
        jwt,
    },
    jwk::{Algorithm, JWK},
};

pub mod x509;

pub use x509::{certificate_jwk, dns_subject_alt_names, x5c_leaf};

/// Generate a fresh P-256 key pair for ES256, identified by its thumbprint.
pub fn generate_p256() -> Result<JWK> {
    let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
    let mut jwk: JWK = serde_json::from_str(&secret.to_jwk_string())
        .context("unable to convert P-256 key into a jwk")?;
    jwk.algorithm = Some(Algorithm::ES256);
    jwk.key_id = Some(jwk.thumbprint().context("unable to compute jwk thumbprint")?);
    Ok(jwk)
}

/// A JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwkSet {
    pub keys: Vec<JWK>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&JWK> {
        self.keys
            .iter()
            .find(|key| key.key_id.as_deref() == Some(kid))
    }
}

/// The protected header of a received JWS, restricted to the parameters this crate acts upon.
///
/// Every field is optional so that missing parameters can be reported precisely.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct JwsHeader {
    pub alg: Option<String>,
    pub typ: Option<String>,
    pub kid: Option<String>,
    pub x5c: Option<Vec<String>>,
    pub jwk: Option<JWK>,
}

/// A JWS in compact serialization.
#[derive(Debug, Clone, Copy)]
pub struct CompactJws<'a> {
    encoded: &'a str,
    header: &'a str,
    signature: &'a str,
}

impl<'a> CompactJws<'a> {
    pub fn split(jws: &'a str) -> Result<Self> {
        let encoded = jws.trim();
        let (header, _payload, signature) =
            jws::split_jws(encoded).context("jws must consist of three dot-separated segments")?;
        if signature.contains('.') {
            bail!("jws must consist of three dot-separated segments")
        }
        Ok(Self {
            encoded,
            header,
            signature,
        })
    }

    pub fn header(&self) -> Result<JwsHeader> {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(self.header)
            .context("jws header is not valid base64url")?;
        serde_json::from_slice(&bytes).context("jws header is not valid json")
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        jwt::decode_unverified(self.encoded).context("invalid jws payload")
    }

    /// Whether the JWS carries a signature at all (i.e. it is not an `alg: none` JWT).
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Verify the signature with the public `jwk`.
    pub fn verify(&self, jwk: &JWK) -> Result<()> {
        jws::decode_verify(self.encoded, jwk).context("jws signature could not be verified")?;
        Ok(())
    }
}

/// Sign `payload` as a compact JWS with `key`, using the algorithm declared by the key.
///
/// `header` supplies every other protected header parameter.
pub fn sign<P: Serialize>(mut header: Header, payload: &P, key: &JWK) -> Result<String> {
    header.algorithm = key.algorithm.unwrap_or(Algorithm::ES256);
    let payload = serde_json::to_string(payload)?;
    jws::encode_sign_custom_header(&payload, key, &header).context("unable to sign jws")
}

#[cfg(test)]
mod test {
    use serde_json::{json, Value as Json};

    use super::*;

    #[test]
    fn sign_and_verify() {
        let jwk = generate_p256().unwrap();

        let jws = sign(
            Header {
                type_: Some("JWT".into()),
                key_id: jwk.key_id.clone(),
                ..Default::default()
            },
            &json!({"sub": "holder"}),
            &jwk,
        )
        .unwrap();

        let compact = CompactJws::split(&jws).unwrap();
        assert!(compact.is_signed());
        let header = compact.header().unwrap();
        assert_eq!(header.alg.as_deref(), Some("ES256"));
        assert_eq!(header.kid, jwk.key_id);
        assert_eq!(
            compact.payload::<Json>().unwrap(),
            json!({"sub": "holder"})
        );

        compact.verify(&jwk.to_public()).unwrap();
        assert!(compact.verify(&generate_p256().unwrap().to_public()).is_err());
    }

    #[test]
    fn generated_key_is_identified_by_thumbprint() {
        let jwk = generate_p256().unwrap();
        let public = jwk.to_public();
        assert_ne!(public, jwk);
        assert_eq!(public.thumbprint().unwrap(), jwk.thumbprint().unwrap());
        assert_eq!(jwk.key_id, Some(jwk.thumbprint().unwrap()));
        assert_eq!(jwk.algorithm, Some(Algorithm::ES256));

        let set = JwkSet {
            keys: vec![public.clone()],
        };
        assert_eq!(set.find(jwk.key_id.as_deref().unwrap()), Some(&public));
        assert!(set.find("other").is_none());
    }

    #[test]
    fn rejects_malformed_compact_jws() {
        assert!(CompactJws::split("a.b").is_err());
        assert!(CompactJws::split("a.b.c.d").is_err());
        let unsigned = CompactJws::split("e30.e30.").unwrap();
        assert!(!unsigned.is_signed());
    }
}
