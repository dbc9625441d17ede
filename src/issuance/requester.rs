use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use ssi::jwk::JWK;
use tracing::{debug, info};
use url::Url;

use super::processor::{DisplayCredential, ProcessedCredential, SdJwtCredentialProcessor};
use crate::{
    core::{
        credential_offer::{GrantType, PreAuthorizedCodeGrant},
        jose::JwkSet,
        metadata::{
            AuthorizationServerMetadata, CredentialConfiguration, CredentialIssuerMetadata,
            JwtIssuerMetadata, ResolvedCredentialOffer,
        },
        token::{determine_token_url, TokenErrorResponse, TokenRequest, TokenResponse, TokenUrlOptions},
        util::{AsyncHttpClient, OpenIdFetcher, ResponseBody},
    },
    error::{IssuanceError, Result},
    identity::{IdentityManager, IdentityProofGenerator},
    store::KeyValueStore,
};

/// The holder's choices for redeeming an offer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRequestOptions {
    /// Key of the credential configuration to request.
    pub credential_type_key: String,
    /// The transaction code entered by the user, if the offer requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NonceResponse {
    c_nonce: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IssuedCredential {
    Wrapped { credential: Json },
    Plain(Json),
}

impl IssuedCredential {
    fn into_inner(self) -> Json {
        match self {
            Self::Wrapped { credential } => credential,
            Self::Plain(credential) => credential,
        }
    }
}

/// Credential endpoint response, single or batch.
#[derive(Debug, Clone, Deserialize)]
struct CredentialResponse {
    #[serde(default)]
    credential: Option<Json>,
    #[serde(default)]
    credentials: Option<Vec<IssuedCredential>>,
    #[serde(default)]
    transaction_id: Option<String>,
}

impl CredentialResponse {
    fn into_credential(self) -> Result<String, IssuanceError> {
        let credential = match (self.credential, self.credentials, self.transaction_id) {
            (Some(credential), _, _) => credential,
            (None, Some(credentials), _) if !credentials.is_empty() => {
                if credentials.len() > 1 {
                    debug!(
                        "credential endpoint returned {} credentials, keeping the first",
                        credentials.len()
                    );
                }
                credentials
                    .into_iter()
                    .next()
                    .map(IssuedCredential::into_inner)
                    .unwrap_or_default()
            }
            (None, _, Some(_)) => return Err(IssuanceError::DeferredIssuanceUnsupported),
            _ => {
                return Err(IssuanceError::CredentialVerification(
                    "credential response carries no credential".into(),
                ))
            }
        };

        match credential {
            Json::String(credential) => Ok(credential),
            other => Err(IssuanceError::CredentialVerification(format!(
                "expected an SD-JWT string, found '{other}'"
            ))),
        }
    }
}

/// Runs the pre-authorized code flow for one credential of a resolved offer.
pub struct CredentialRequester<'a, H: ?Sized, S: ?Sized> {
    fetcher: OpenIdFetcher<'a, H>,
    store: &'a S,
}

impl<'a, H, S> CredentialRequester<'a, H, S>
where
    H: AsyncHttpClient + ?Sized,
    S: KeyValueStore + ?Sized,
{
    pub fn new(fetcher: OpenIdFetcher<'a, H>, store: &'a S) -> Self {
        Self { fetcher, store }
    }

    /// Exchange the offer's pre-authorized code for an access token, request the credential
    /// selected in `options`, then verify and store it.
    pub async fn request_credential_issuance(
        &self,
        resolved: &ResolvedCredentialOffer,
        options: &CredentialRequestOptions,
        grant_type: GrantType,
    ) -> Result<ProcessedCredential> {
        if grant_type != GrantType::PreAuthorizedCode {
            return Err(IssuanceError::UnsupportedGrantType(grant_type.to_string()).into());
        }
        let grant = resolved
            .credential_offer
            .pre_authorized_code()
            .ok_or_else(|| IssuanceError::UnsupportedGrantType(grant_type.to_string()))?;

        let discovery = &resolved.discovery_metadata;
        let issuer_metadata = discovery
            .credential_issuer_metadata
            .as_ref()
            .ok_or(IssuanceError::MissingDiscoveryMetadata(
                "credential issuer metadata",
            ))?;
        let authorization_server_metadata = discovery
            .authorization_server_metadata
            .as_ref()
            .ok_or(IssuanceError::MissingDiscoveryMetadata(
                "authorization server metadata",
            ))?;

        let token = self
            .acquire_token(grant, authorization_server_metadata, options.tx_code.as_deref())
            .await?;

        let configuration = issuer_metadata
            .credential_configurations_supported
            .get(&options.credential_type_key)
            .ok_or_else(|| {
                IssuanceError::UnknownCredentialConfiguration(options.credential_type_key.clone())
            })?;
        if issuer_metadata.requires_encrypted_response() {
            return Err(IssuanceError::EncryptedResponseUnsupported.into());
        }
        if !configuration.format.is_sd_jwt() {
            return Err(IssuanceError::UnsupportedFormat(configuration.format.to_string()).into());
        }

        let Json::Object(mut request) = configuration.format.type_selector(&configuration.type_info)?
        else {
            return Err(anyhow::anyhow!("credential type selector is not an object").into());
        };

        if configuration.requires_key_binding() {
            let nonce = self.nonce(&token, issuer_metadata).await?;
            let issuer = &issuer_metadata.credential_issuer;
            let client_id = Url::parse(issuer)
                .ok()
                .and_then(|url| self.fetcher.config().client_id_for(&url));

            let proof = IdentityProofGenerator::new(IdentityManager::new(self.store))
                .generate(
                    issuer,
                    &nonce,
                    client_id,
                    configuration.proof_signing_algorithms(),
                )
                .await?;
            request.insert(
                "proof".into(),
                serde_json::to_value(proof).context("unable to serialize key proof")?,
            );
        }

        debug!(endpoint = %issuer_metadata.credential_endpoint, "requesting credential");
        let credential = self
            .fetcher
            .post_json(
                &issuer_metadata.credential_endpoint,
                &Json::Object(request),
                Some(&token.access_token),
            )
            .await?
            .json::<CredentialResponse>()?
            .into_credential()?;

        let verifying_keys = self.verifying_keys(discovery.jwt_issuer_metadata.as_ref()).await?;
        let processed = SdJwtCredentialProcessor::new(self.store)
            .process_credential(
                &credential,
                &verifying_keys,
                &issuer_metadata.credential_issuer,
                configuration,
                Some(display_starter(issuer_metadata, configuration)),
            )
            .await?;

        info!(
            issuer = %issuer_metadata.credential_issuer,
            credential_type = %options.credential_type_key,
            "credential issued"
        );
        Ok(processed)
    }

    async fn acquire_token(
        &self,
        grant: &PreAuthorizedCodeGrant,
        authorization_server_metadata: &AuthorizationServerMetadata,
        tx_code: Option<&str>,
    ) -> Result<TokenResponse> {
        match tx_code {
            Some(code) if code.trim().is_empty() => return Err(IssuanceError::InvalidClient.into()),
            None if grant.tx_code.is_some() => return Err(IssuanceError::MissingTxCode.into()),
            _ => {}
        }

        let token_url = determine_token_url(&TokenUrlOptions {
            authorization_server: grant.authorization_server.as_deref(),
            metadata_token_endpoint: authorization_server_metadata.token_endpoint.as_ref(),
            issuer: Some(&authorization_server_metadata.issuer),
            allow_insecure_endpoints: self.fetcher.config().allow_insecure_endpoints(),
            ..Default::default()
        })?;

        let request = TokenRequest {
            grant_type: GrantType::PreAuthorizedCode,
            pre_authorized_code: grant.pre_authorized_code.clone(),
            tx_code: tx_code.map(ToOwned::to_owned),
            client_id: self
                .fetcher
                .config()
                .client_id_for(&token_url)
                .map(ToOwned::to_owned),
        };

        debug!(%token_url, "requesting access token");
        let response = self.fetcher.post_form(&token_url, &request, None).await?;

        if let Some(ResponseBody::Json(body)) = response.error_body() {
            if let Ok(error) = serde_json::from_value::<TokenErrorResponse>(body.clone()) {
                return Err(IssuanceError::TokenRejected(error).into());
            }
        }

        response.json()
    }

    async fn nonce(
        &self,
        token: &TokenResponse,
        issuer_metadata: &CredentialIssuerMetadata,
    ) -> Result<String> {
        if let Some(c_nonce) = &token.c_nonce {
            return Ok(c_nonce.clone());
        }
        let Some(nonce_endpoint) = &issuer_metadata.nonce_endpoint else {
            return Err(IssuanceError::MissingNonce.into());
        };

        debug!(%nonce_endpoint, "requesting c_nonce");
        let empty: [(&str, &str); 0] = [];
        let response: NonceResponse = self
            .fetcher
            .post_form(nonce_endpoint, &empty, None)
            .await?
            .json()?;
        Ok(response.c_nonce)
    }

    /// The issuer's verifying keys, from inline `jwks` or `jwks_uri`.
    async fn verifying_keys(&self, metadata: Option<&JwtIssuerMetadata>) -> Result<Vec<JWK>> {
        let Some(metadata) = metadata else {
            return Ok(vec![]);
        };
        if let Some(jwks) = &metadata.jwks {
            return Ok(jwks.keys.clone());
        }
        let Some(jwks_uri) = &metadata.jwks_uri else {
            return Ok(vec![]);
        };
        let jwks: JwkSet = self.fetcher.get(jwks_uri, None).await?.json()?;
        Ok(jwks.keys)
    }
}

/// Display fields known before the credential is decoded.
fn display_starter(
    issuer_metadata: &CredentialIssuerMetadata,
    configuration: &CredentialConfiguration,
) -> DisplayCredential {
    let credential_display = configuration.display.first();
    let issuer_display = issuer_metadata.display.first();

    DisplayCredential {
        title: credential_display.and_then(|display| display.name.clone()),
        issuer: issuer_display
            .and_then(|display| display.name.clone())
            .or_else(|| Some(issuer_metadata.credential_issuer.clone())),
        logo: credential_display
            .or(issuer_display)
            .and_then(|display| display.logo.as_ref())
            .map(|logo| logo.uri.clone()),
        ..Default::default()
    }
}
