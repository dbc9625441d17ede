use std::fmt;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use super::credential_offer::GrantType;
use crate::error::{IssuanceError, Result};

/// A pre-authorized code token request, sent form-encoded to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRequest {
    pub grant_type: GrantType,
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<Json>,
}

/// An OAuth error response (RFC 6749, section 5.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl fmt::Display for TokenErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => self.error.fmt(f),
        }
    }
}

/// The inputs [determine_token_url] chooses between, in order of precedence.
#[derive(Debug, Clone, Default)]
pub struct TokenUrlOptions<'a> {
    /// An explicitly chosen authorization server. Its token endpoint is `{authorization_server}/token`.
    pub authorization_server: Option<&'a str>,
    /// The `token_endpoint` from authorization server metadata.
    pub metadata_token_endpoint: Option<&'a Url>,
    /// The credential issuer, used when it acts as its own authorization server.
    pub issuer: Option<&'a str>,
    /// Path of the token endpoint relative to `issuer`. Defaults to `/token`.
    pub issuer_token_endpoint: Option<&'a str>,
    pub allow_insecure_endpoints: bool,
}

/// Determine the token endpoint.
///
/// Fails if none of the options names an endpoint, or if the endpoint is not `https` and
/// insecure endpoints are not allowed. Endpoints without a scheme are assumed to be `https`.
pub fn determine_token_url(options: &TokenUrlOptions<'_>) -> Result<Url> {
    let url = if let Some(authorization_server) = options.authorization_server {
        format!("{}/token", authorization_server.trim_end_matches('/'))
    } else if let Some(token_endpoint) = options.metadata_token_endpoint {
        token_endpoint.to_string()
    } else if let Some(issuer) = options.issuer {
        let path = options.issuer_token_endpoint.unwrap_or("/token");
        format!(
            "{}/{}",
            issuer.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    } else {
        return Err(IssuanceError::UndeterminedTokenEndpoint.into());
    };

    let url = if url.contains("://") {
        url
    } else {
        format!("https://{url}")
    };
    let url = Url::parse(&url).context(format!("invalid token endpoint '{url}'"))?;

    if url.scheme() == "http" && !options.allow_insecure_endpoints {
        return Err(IssuanceError::InsecureEndpoint(url.to_string()).into());
    }

    Ok(url)
}
