//! Selective Disclosure JWTs, decoded and revealed with `ssi`.
//!
//! See: <https://datatracker.ietf.org/doc/html/draft-ietf-oauth-selective-disclosure-jwt>

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use ssi::{
    claims::{
        jws::Header,
        sd_jwt::{self as sd, DisclosureBuf, DisclosureDescription, RevealError, SdAlg},
    },
    jwk::JWK,
};

use crate::core::jose::{self, CompactJws, JwsHeader};

const SD_CLAIM_NAME: &str = "_sd";
const SD_ALG_CLAIM_NAME: &str = "_sd_alg";
const SD_JWT_SHAPE: &str = "expected `<jwt>~<disclosure>~...~`";

/// SD-JWT error.
#[derive(Debug, thiserror::Error)]
pub enum SdJwtError {
    #[error("invalid SD-JWT: {0}")]
    Malformed(String),

    #[error("SD-JWT could not be revealed: {0}")]
    Reveal(#[from] RevealError),

    #[error("SD-JWT signature could not be verified: {0:#}")]
    Signature(anyhow::Error),
}

/// An SD-JWT in its compact `<issuer-jwt>~<disclosure>~...~` serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SdJwt {
    encoded: String,
}

/// The claims of an SD-JWT with every presented disclosure substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealedClaims {
    /// The full claim set, without `_sd` digests.
    pub claims: Map<String, Json>,
    /// The object property disclosures, at any depth, keyed by claim name.
    ///
    /// Array element disclosures carry no claim name and are skipped.
    pub disclosed: Map<String, Json>,
}

impl SdJwt {
    pub fn parse(encoded: &str) -> Result<Self, SdJwtError> {
        let encoded = encoded.trim();
        sd::SdJwt::new(encoded).map_err(|_| SdJwtError::Malformed(SD_JWT_SHAPE.into()))?;
        Ok(Self {
            encoded: encoded.to_owned(),
        })
    }

    fn as_sd_jwt(&self) -> Result<&sd::SdJwt, SdJwtError> {
        sd::SdJwt::new(self.encoded.as_str()).map_err(|_| SdJwtError::Malformed(SD_JWT_SHAPE.into()))
    }

    /// The issuer-signed JWT.
    pub fn jwt(&self) -> &str {
        self.encoded.split('~').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    fn compact(&self) -> Result<CompactJws<'_>, SdJwtError> {
        CompactJws::split(self.jwt()).map_err(|e| SdJwtError::Malformed(format!("{e:#}")))
    }

    pub fn header(&self) -> Result<JwsHeader, SdJwtError> {
        self.compact()?
            .header()
            .map_err(|e| SdJwtError::Malformed(format!("{e:#}")))
    }

    /// The issuer JWT payload, with disclosure digests in place.
    pub fn payload(&self) -> Result<Map<String, Json>, SdJwtError> {
        self.compact()?
            .payload()
            .map_err(|e| SdJwtError::Malformed(format!("{e:#}")))
    }

    /// Verify the issuer signature with `jwk`, then reveal the claims.
    pub fn verify(&self, jwk: &JWK) -> Result<RevealedClaims, SdJwtError> {
        self.compact()?.verify(jwk).map_err(SdJwtError::Signature)?;
        self.reveal()
    }

    /// Substitute every disclosure at its digest. Unreferenced or reused disclosures are rejected.
    pub fn reveal(&self) -> Result<RevealedClaims, SdJwtError> {
        let revealed = self.as_sd_jwt()?.decode_reveal_any()?;

        let claims = serde_json::to_value(revealed.claims())
            .map_err(|e| SdJwtError::Malformed(format!("claims could not be serialized: {e}")))?;
        let claims = match claims {
            Json::Object(claims) => claims,
            other => {
                return Err(SdJwtError::Malformed(format!(
                    "claims are not an object: {other}"
                )))
            }
        };

        let disclosed = revealed
            .disclosures
            .values()
            .filter_map(|disclosure| match &disclosure.desc {
                DisclosureDescription::ObjectEntry { key, value } => Some((key.clone(), value.clone())),
                DisclosureDescription::ArrayItem(_) => None,
            })
            .collect();

        Ok(RevealedClaims { claims, disclosed })
    }

    /// Issue an SD-JWT whose disclosable claims sit at the top level of `claims`.
    pub fn issue(
        header: Header,
        mut claims: Map<String, Json>,
        disclosures: &[(&str, Json)],
        key: &JWK,
    ) -> anyhow::Result<Self> {
        let disclosures: Vec<DisclosureBuf> = disclosures
            .iter()
            .map(|(name, value)| {
                disclosure(DisclosureDescription::ObjectEntry {
                    key: (*name).to_owned(),
                    value: value.clone(),
                })
            })
            .collect();
        let digests = disclosures
            .iter()
            .map(|disclosure| Json::String(SdAlg::Sha256.hash(disclosure.as_disclosure())))
            .collect();
        claims.insert(SD_CLAIM_NAME.to_owned(), Json::Array(digests));
        claims.insert(
            SD_ALG_CLAIM_NAME.to_owned(),
            Json::String(SdAlg::Sha256.to_str().to_owned()),
        );

        let jwt = jose::sign(header, &claims, key)?;
        Ok(Self::parse(&encode(&jwt, &disclosures))?)
    }
}

/// A disclosure of `kind` under a fresh random salt.
pub fn disclosure(kind: DisclosureDescription) -> DisclosureBuf {
    let salt = BASE64_URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>());
    DisclosureBuf::encode_from_parts(&salt, &kind)
}

fn encode(jwt: &str, disclosures: &[DisclosureBuf]) -> String {
    let mut encoded = format!("{jwt}~");
    for disclosure in disclosures {
        encoded.push_str(&format!("{disclosure}~"));
    }
    encoded
}

impl TryFrom<String> for SdJwt {
    type Error = SdJwtError;

    fn try_from(encoded: String) -> Result<Self, Self::Error> {
        Self::parse(&encoded)
    }
}

impl From<SdJwt> for String {
    fn from(value: SdJwt) -> Self {
        value.encoded
    }
}

impl std::str::FromStr for SdJwt {
    type Err = SdJwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for SdJwt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn issue(disclosures: &[(&str, Json)]) -> (JWK, SdJwt) {
        let jwk = jose::generate_p256().unwrap();
        let Json::Object(claims) = json!({
            "iss": "https://issuer.example.com",
            "iat": 1700000000,
            "vct": "https://credentials.example.com/identity_credential"
        }) else {
            unreachable!()
        };
        let sd_jwt = SdJwt::issue(
            Header {
                type_: Some("vc+sd-jwt".into()),
                ..Default::default()
            },
            claims,
            disclosures,
            &jwk,
        )
        .unwrap();
        (jwk, sd_jwt)
    }

    #[test]
    fn verify_and_reveal() {
        let (jwk, sd_jwt) = issue(&[
            ("given_name", json!("Inga")),
            ("family_name", json!("Silverstone")),
        ]);

        let parsed = SdJwt::parse(sd_jwt.as_str()).unwrap();
        assert_eq!(parsed, sd_jwt);
        assert_eq!(parsed.header().unwrap().typ.as_deref(), Some("vc+sd-jwt"));

        let revealed = parsed.verify(&jwk.to_public()).unwrap();
        assert_eq!(revealed.claims["given_name"], json!("Inga"));
        assert_eq!(revealed.claims["family_name"], json!("Silverstone"));
        assert!(!revealed.claims.contains_key("_sd"));
        assert!(!revealed.claims.contains_key("_sd_alg"));
        assert_eq!(revealed.disclosed.len(), 2);
    }

    #[test]
    fn withheld_disclosures_stay_hidden() {
        let (_, sd_jwt) = issue(&[
            ("given_name", json!("Inga")),
            ("birthdate", json!("1991-11-06")),
        ]);

        let birthdate = sd_jwt.as_str().split('~').nth(2).unwrap();
        let presented = format!("{}~{birthdate}~", sd_jwt.jwt());
        let revealed = SdJwt::parse(&presented).unwrap().reveal().unwrap();
        assert_eq!(revealed.claims.get("birthdate"), Some(&json!("1991-11-06")));
        assert_eq!(revealed.claims.get("given_name"), None);
    }

    #[test]
    fn unreferenced_disclosure() {
        let (_, sd_jwt) = issue(&[("given_name", json!("Inga"))]);
        let forged = disclosure(DisclosureDescription::ObjectEntry {
            key: "given_name".into(),
            value: json!("Mallory"),
        });
        let tampered = format!("{}~{forged}~", sd_jwt.jwt());
        assert!(matches!(
            SdJwt::parse(&tampered).unwrap().reveal(),
            Err(SdJwtError::Reveal(RevealError::UnusedDisclosure(_)))
        ));
    }

    #[test]
    fn wrong_key() {
        let (_, sd_jwt) = issue(&[]);
        let other = jose::generate_p256().unwrap();
        assert!(matches!(
            sd_jwt.verify(&other.to_public()),
            Err(SdJwtError::Signature(_))
        ));
    }

    #[test]
    fn array_element_disclosures_are_not_named_claims() {
        let jwk = jose::generate_p256().unwrap();
        let element = disclosure(DisclosureDescription::ArrayItem(json!("DE")));
        let named = disclosure(DisclosureDescription::ObjectEntry {
            key: "given_name".into(),
            value: json!("Inga"),
        });
        let claims = json!({
            "_sd": [SdAlg::Sha256.hash(named.as_disclosure())],
            "_sd_alg": "sha-256",
            "nationalities": [{ "...": SdAlg::Sha256.hash(element.as_disclosure()) }]
        });
        let jwt = jose::sign(Header::default(), &claims, &jwk).unwrap();
        let sd_jwt = SdJwt::parse(&encode(&jwt, &[element, named])).unwrap();

        let revealed = sd_jwt.verify(&jwk.to_public()).unwrap();
        assert_eq!(revealed.claims["nationalities"], json!(["DE"]));
        assert_eq!(revealed.disclosed.len(), 1);
        assert_eq!(revealed.disclosed["given_name"], json!("Inga"));
    }

    #[test]
    fn rejects_malformed_serialization() {
        assert!(SdJwt::parse("e30.e30.sig").is_err());
        assert!(SdJwt::parse("not a jwt~").is_err());
        assert!(serde_json::from_value::<SdJwt>(json!("e30.e30.sig")).is_err());
    }
}
