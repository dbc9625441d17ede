use std::fmt;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use crate::{
    error::{IssuanceError, Result},
    utils::NonEmptyVec,
};

/// Scheme of wallet-bound credential offer links.
pub const CREDENTIAL_OFFER_SCHEME: &str = "openid-credential-offer://";

const CREDENTIAL_OFFER: &str = "credential_offer";
const CREDENTIAL_OFFER_URI: &str = "credential_offer_uri";

const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
const GRANT_TYPE_PRE_AUTHORIZED_CODE: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

/// A credential offer, as sent out-of-band by a credential issuer.
///
/// See: [https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-offer-parameters](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-offer-parameters)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialOffer {
    pub credential_issuer: String,
    pub credential_configuration_ids: NonEmptyVec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grants>,
}

impl CredentialOffer {
    /// The pre-authorized code grant of the offer, if any.
    pub fn pre_authorized_code(&self) -> Option<&PreAuthorizedCodeGrant> {
        self.grants.as_ref()?.pre_authorized_code.as_ref()
    }

    /// Encode the offer by value into an offer link with the given scheme, e.g.
    /// [CREDENTIAL_OFFER_SCHEME].
    pub fn to_offer_uri(&self, scheme: &str) -> Result<String> {
        let offer = serde_json::to_string(self).context("unable to serialize credential offer")?;
        let query = serde_urlencoded::to_string([(CREDENTIAL_OFFER, offer)])
            .context("unable to encode credential offer")?;
        Ok(format!("{scheme}?{query}"))
    }

    pub(crate) fn from_json(value: Json) -> Result<Self, IssuanceError> {
        if value.get("credential_issuer").is_none() {
            return Err(IssuanceError::MissingCredentialIssuer);
        }
        serde_json::from_value(value)
            .map_err(|e| IssuanceError::DeserializationError(e.to_string()))
    }

    /// Parse an offer from its JSON text.
    pub fn from_json_str(s: &str) -> Result<Self, IssuanceError> {
        let value = serde_json::from_str(s)
            .map_err(|e| IssuanceError::DeserializationError(e.to_string()))?;
        Self::from_json(value)
    }
}

/// The grants an offer can be redeemed with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(
        rename = "authorization_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authorization_code: Option<AuthorizationCodeGrant>,
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    /// Present when the issuer requires a transaction code alongside the pre-authorized code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

/// Describes the transaction code the user has to enter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OAuth grant types relevant to credential offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code")]
    PreAuthorizedCode,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => GRANT_TYPE_AUTHORIZATION_CODE,
            Self::PreAuthorizedCode => GRANT_TYPE_PRE_AUTHORIZED_CODE,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A credential offer link, before any network access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOfferRequest {
    ByValue(CredentialOffer),
    ByReference(Url),
}

impl CredentialOfferRequest {
    /// Parse the query of an offer link.
    ///
    /// The link must carry exactly one query parameter, either `credential_offer` or
    /// `credential_offer_uri`.
    pub fn parse(offer: &str) -> Result<Self, IssuanceError> {
        let Some((_, query)) = offer.split_once('?') else {
            return Err(IssuanceError::MissingQueryString);
        };

        let params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let [(name, value)] = params.as_slice() else {
            return Err(IssuanceError::WrongParamCount(params.len()));
        };

        match name.as_str() {
            CREDENTIAL_OFFER => CredentialOffer::from_json_str(value).map(Self::ByValue),
            CREDENTIAL_OFFER_URI => value
                .parse()
                .map(Self::ByReference)
                .map_err(|e| IssuanceError::DeserializationError(format!("{name}: {e}"))),
            _ => Err(IssuanceError::MissingRequiredParams),
        }
    }
}
