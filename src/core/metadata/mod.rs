use std::collections::BTreeMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use super::{
    credential_format::{CredentialFormat, CredentialTypeInfo},
    credential_offer::{CredentialOffer, GrantType},
    jose::JwkSet,
};
use crate::error::Result;

pub const CREDENTIAL_ISSUER_WELL_KNOWN: &str = "/.well-known/openid-credential-issuer";
pub const OPENID_CONFIGURATION_WELL_KNOWN: &str = "/.well-known/openid-configuration";
pub const OAUTH_AUTHORIZATION_SERVER_WELL_KNOWN: &str = "/.well-known/oauth-authorization-server";
pub const JWT_ISSUER_WELL_KNOWN: &str = "/.well-known/jwt-issuer";

/// Append a well-known `path` to an issuer or authorization server identifier.
pub fn well_known_url(base: &str, path: &str) -> Result<Url> {
    let url = format!("{}{path}", base.trim_end_matches('/'));
    Ok(Url::parse(&url).context(format!("invalid well-known url '{url}'"))?)
}

/// Credential issuer metadata.
///
/// See: [https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-issuer-metadata](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-issuer-metadata)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialIssuerMetadata {
    pub credential_issuer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_servers: Vec<String>,
    pub credential_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_credential_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_response_encryption: Option<CredentialResponseEncryption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<Display>,
    #[serde(default)]
    pub credential_configurations_supported: BTreeMap<String, CredentialConfiguration>,
}

impl CredentialIssuerMetadata {
    /// Whether the issuer only answers with encrypted credential responses.
    pub fn requires_encrypted_response(&self) -> bool {
        self.credential_response_encryption
            .as_ref()
            .is_some_and(|encryption| encryption.encryption_required)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialResponseEncryption {
    #[serde(default)]
    pub alg_values_supported: Vec<String>,
    #[serde(default)]
    pub enc_values_supported: Vec<String>,
    #[serde(default)]
    pub encryption_required: bool,
}

/// An entry of `credential_configurations_supported`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfiguration {
    pub format: CredentialFormat,
    #[serde(flatten)]
    pub type_info: CredentialTypeInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cryptographic_binding_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credential_signing_alg_values_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub proof_types_supported: BTreeMap<String, ProofTypeSupported>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<Display>,
}

impl CredentialConfiguration {
    /// Whether the issuer binds credentials of this configuration to a holder key.
    pub fn requires_key_binding(&self) -> bool {
        !self.cryptographic_binding_methods_supported.is_empty()
    }

    /// Algorithms the issuer accepts for JWT key proofs.
    ///
    /// Falls back to `credential_signing_alg_values_supported` for issuers that do not advertise
    /// `proof_types_supported`.
    pub fn proof_signing_algorithms(&self) -> &[String] {
        match self.proof_types_supported.get("jwt") {
            Some(jwt) => &jwt.proof_signing_alg_values_supported,
            None => &self.credential_signing_alg_values_supported,
        }
    }

    /// Names of the top-level claims the issuer declares for this configuration.
    ///
    /// Both the object form (`{"given_name": {..}}`) and the claims path form
    /// (`[{"path": ["given_name"]}]`) are understood.
    pub fn expected_claims(&self) -> Vec<String> {
        match &self.claims {
            Some(Json::Object(claims)) => claims.keys().cloned().collect(),
            Some(Json::Array(claims)) => claims
                .iter()
                .filter_map(|claim| claim.get("path")?.get(0)?.as_str())
                .map(ToOwned::to_owned)
                .collect(),
            _ => vec![],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofTypeSupported {
    #[serde(default)]
    pub proof_signing_alg_values_supported: Vec<String>,
}

/// Display properties of an issuer or a credential configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Display {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Logo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logo {
    #[serde(alias = "url")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// OAuth 2.0 authorization server metadata (RFC 8414), as far as the holder needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types_supported: Vec<String>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl AuthorizationServerMetadata {
    pub fn supports_grant(&self, grant_type: GrantType) -> bool {
        self.grant_types_supported
            .iter()
            .any(|supported| supported == grant_type.as_str())
    }
}

/// Metadata published by an issuer of JWT-secured credentials.
///
/// See: [https://datatracker.ietf.org/doc/html/draft-ietf-oauth-sd-jwt-vc#name-jwt-vc-issuer-metadata](https://datatracker.ietf.org/doc/html/draft-ietf-oauth-sd-jwt-vc#name-jwt-vc-issuer-metadata)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtIssuerMetadata {
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<Url>,
}

/// The metadata discovered while resolving a credential offer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_issuer_metadata: Option<CredentialIssuerMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server_metadata: Option<AuthorizationServerMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_issuer_metadata: Option<JwtIssuerMetadata>,
}

/// A credential offer together with the metadata of the parties involved in redeeming it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCredentialOffer {
    pub credential_offer: CredentialOffer,
    pub discovery_metadata: DiscoveryMetadata,
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn well_known() {
        assert_eq!(
            well_known_url("https://issuer.example.com/", CREDENTIAL_ISSUER_WELL_KNOWN)
                .unwrap()
                .as_str(),
            "https://issuer.example.com/.well-known/openid-credential-issuer"
        );
    }

    #[test]
    fn credential_configuration() {
        let configuration: CredentialConfiguration = serde_json::from_value(json!({
            "format": "vc+sd-jwt",
            "vct": "https://credentials.example.com/identity_credential",
            "cryptographic_binding_methods_supported": ["jwk"],
            "credential_signing_alg_values_supported": ["ES256"],
            "proof_types_supported": {
                "jwt": { "proof_signing_alg_values_supported": ["ES256", "ES384"] }
            },
            "claims": {
                "given_name": { "display": [{ "name": "Given Name" }] },
                "family_name": {}
            }
        }))
        .unwrap();

        assert_eq!(configuration.format, CredentialFormat::VcSdJwt);
        assert!(configuration.requires_key_binding());
        assert_eq!(configuration.proof_signing_algorithms(), ["ES256", "ES384"]);
        let mut claims = configuration.expected_claims();
        claims.sort();
        assert_eq!(claims, ["family_name", "given_name"]);
        assert_eq!(
            configuration.type_info.vct.as_deref(),
            Some("https://credentials.example.com/identity_credential")
        );
    }

    #[test]
    fn claims_path_form() {
        let configuration: CredentialConfiguration = serde_json::from_value(json!({
            "format": "dc+sd-jwt",
            "vct": "urn:example:pid",
            "claims": [{ "path": ["birthdate"] }, { "path": ["address", "street_address"] }]
        }))
        .unwrap();
        assert_eq!(
            configuration.expected_claims(),
            vec!["birthdate".to_string(), "address".to_string()]
        );
        assert!(configuration.proof_signing_algorithms().is_empty());
    }
}
