use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use self::parameters::{
    ClientId, ClientIdScheme, ClientMetadata, Nonce, PresentationDefinitionUri, RedirectUri,
    ResponseMode, ResponseType, ResponseUri, State,
};
use super::{
    jose::CompactJws,
    object::{ParsingErrorContext, TypedParameter, UntypedObject},
    presentation_definition::PresentationDefinition,
    util::{AsyncHttpClient, OpenIdFetcher, ResponseBody},
};
use crate::error::{PresentationError, Result};

pub mod client_metadata;
pub mod parameters;
pub mod verification;

pub use client_metadata::ClientMetadataResolver;
pub use verification::RequestObjectValidator;

/// An Authorization Request, as received by the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,
    #[serde(flatten)]
    pub request_indirection: RequestIndirection,
}

/// A RequestObject, passed by value or by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestIndirection {
    #[serde(rename = "request")]
    ByValue(String),
    #[serde(rename = "request_uri")]
    ByReference(Url),
}

impl AuthorizationRequest {
    /// Parse from an authorization request uri, e.g. `openid4vp://?client_id=..&request_uri=..`.
    /// ```
    /// # use openid4vc_holder::core::authorization_request::AuthorizationRequest;
    /// # use openid4vc_holder::core::authorization_request::RequestIndirection;
    /// let authorization_request =
    ///     AuthorizationRequest::from_uri("openid4vp://?client_id=xyz&request=test").unwrap();
    ///
    /// assert_eq!(authorization_request.client_id, "xyz");
    ///
    /// let RequestIndirection::ByValue(request_object) = authorization_request.request_indirection
    /// else { panic!("expected request-by-value") };
    /// assert_eq!(request_object, "test");
    /// ```
    pub fn from_uri(uri: &str) -> Result<Self, PresentationError> {
        let Some((_, query)) = uri.split_once('?') else {
            return Err(PresentationError::MissingQueryString);
        };
        Self::from_query_params(query)
    }

    /// Parse from urlencoded query parameters.
    pub fn from_query_params(query_params: &str) -> Result<Self, PresentationError> {
        serde_urlencoded::from_str(query_params).map_err(|e| {
            debug!("unable to parse authorization request: {e}");
            PresentationError::MissingRequiredParams
        })
    }

    /// Encode as [Url], using the `authorization_endpoint` as a base.
    pub fn to_url(&self, mut authorization_endpoint: Url) -> anyhow::Result<Url> {
        let query = serde_urlencoded::to_string(self)?;
        authorization_endpoint.set_query(Some(&query));
        Ok(authorization_endpoint)
    }
}

/// A request object with every by-reference parameter dereferenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRequestObject {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_scheme: Option<ClientIdScheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<ClientMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<PresentationDefinition>,
    /// The request object JWT as received.
    pub request: String,
}

impl ResolvedRequestObject {
    /// Uri to submit the response at.
    ///
    /// AKA [ResponseUri] or [RedirectUri], exactly one of which is set.
    pub fn return_uri(&self) -> Option<&Url> {
        self.response_uri.as_ref().or(self.redirect_uri.as_ref())
    }
}

/// Resolves authorization request uris into [ResolvedRequestObjects](ResolvedRequestObject).
pub struct RequestObjectResolver<'a, H: ?Sized> {
    fetcher: OpenIdFetcher<'a, H>,
}

impl<'a, H: AsyncHttpClient + ?Sized> RequestObjectResolver<'a, H> {
    pub fn new(fetcher: OpenIdFetcher<'a, H>) -> Self {
        Self { fetcher }
    }

    pub async fn resolve(&self, uri: &str) -> Result<ResolvedRequestObject> {
        let authorization_request = AuthorizationRequest::from_uri(uri)?;

        let request = match authorization_request.request_indirection {
            RequestIndirection::ByValue(jwt) => jwt,
            RequestIndirection::ByReference(url) => self.fetch_request_object(&url).await?,
        };

        let payload: UntypedObject = CompactJws::split(&request)
            .and_then(|jws| jws.payload())
            .map_err(|e| PresentationError::InvalidRequestObjectJwt(format!("{e:#}")))?;

        let client_id = match payload.get::<ClientId>() {
            Some(client_id) => {
                let ClientId(client_id) = client_id
                    .parsing_error()
                    .map_err(|e| PresentationError::InvalidRequestObjectJwt(format!("{e:#}")))?;
                if client_id != authorization_request.client_id {
                    return Err(PresentationError::MismatchedClientId(format!(
                        "authorization request and request object have different client ids: '{}' vs. '{client_id}'",
                        authorization_request.client_id
                    ))
                    .into());
                }
                client_id
            }
            None => authorization_request.client_id,
        };

        let client_metadata = ClientMetadataResolver::new(&self.fetcher)
            .resolve(&payload)
            .await?;
        let presentation_definition = self.presentation_definition(&payload).await?;

        let redirect_uri = optional::<RedirectUri>(&payload)?.map(|RedirectUri(uri)| uri);
        let response_uri = optional::<ResponseUri>(&payload)?.map(|ResponseUri(uri)| uri);
        if redirect_uri.is_some() == response_uri.is_some() {
            return Err(PresentationError::MissingResponseParams.into());
        }

        Ok(ResolvedRequestObject {
            client_id,
            client_id_scheme: optional(&payload)?,
            redirect_uri,
            response_uri,
            response_type: optional(&payload)?,
            response_mode: optional(&payload)?,
            nonce: optional::<Nonce>(&payload)?.map(|Nonce(nonce)| nonce),
            state: optional::<State>(&payload)?.map(|State(state)| state),
            client_metadata,
            presentation_definition,
            request,
        })
    }

    async fn fetch_request_object(&self, url: &Url) -> Result<String> {
        debug!(%url, "fetching request object");
        let response = self
            .fetcher
            .get(url, None)
            .await
            .map_err(|e| PresentationError::UnResolvedRequestObject(e.to_string()))?;

        if !response.is_success() {
            return Err(PresentationError::UnResolvedRequestObject(format!(
                "request to {url} was unsuccessful (status: {})",
                response.status
            ))
            .into());
        }

        match response.body {
            ResponseBody::Text(jwt) if !jwt.trim().is_empty() => Ok(jwt.trim().to_owned()),
            ResponseBody::Json(serde_json::Value::String(jwt)) => Ok(jwt),
            _ => Err(PresentationError::UnResolvedRequestObject(format!(
                "response from {url} carries no request object"
            ))
            .into()),
        }
    }

    async fn presentation_definition(
        &self,
        payload: &UntypedObject,
    ) -> Result<Option<PresentationDefinition>> {
        let unresolved = |e: &dyn std::fmt::Display| {
            PresentationError::UnResolvedPresentationDefinition(format!("{e:#}"))
        };

        if let Some(by_value) = payload.get::<PresentationDefinition>() {
            return Ok(Some(by_value.map_err(|e| unresolved(&e))?));
        }
        let Some(by_reference) = payload.get::<PresentationDefinitionUri>() else {
            return Ok(None);
        };

        let PresentationDefinitionUri(uri) = by_reference.map_err(|e| unresolved(&e))?;
        debug!(%uri, "fetching presentation definition");
        let definition = self
            .fetcher
            .get(&uri, None)
            .await
            .and_then(|response| response.json())
            .map_err(|e| unresolved(&e))?;
        Ok(Some(definition))
    }
}

/// A parameter that may be absent, but must be well-formed when present.
fn optional<T: TypedParameter>(payload: &UntypedObject) -> Result<Option<T>, PresentationError> {
    payload
        .get::<T>()
        .map(|parameter| parameter.parsing_error())
        .transpose()
        .map_err(|e| PresentationError::InvalidRequestObjectJwt(format!("{e:#}")))
}
