use crate::core::token::TokenErrorResponse;

/// Crate-wide result type.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// The error surfaced by every public operation of the holder.
///
/// The message of the error (see [ServiceError::message]) is what a UI layer is expected to show
/// to the user verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Credential offer resolution or credential issuance failed.
    #[error(transparent)]
    Issuance(#[from] IssuanceError),

    /// Request object resolution, validation or presentation matching failed.
    #[error(transparent)]
    Presentation(#[from] PresentationError),

    /// A remote endpoint answered with a non-2xx status.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Any other failure, with context.
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    /// The user-visible message of this error.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// A non-2xx HTTP response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("request to {url} was unsuccessful (status: {status}): {body}")]
pub struct HttpError {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Errors of the credential offer and issuance flows.
#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    #[error("credential offer is missing a query string")]
    MissingQueryString,

    #[error("credential offer must carry exactly one query parameter, found {0}")]
    WrongParamCount(usize),

    #[error("credential offer requires one of 'credential_offer' or 'credential_offer_uri'")]
    MissingRequiredParams,

    #[error("unable to deserialize credential offer: {0}")]
    DeserializationError(String),

    #[error("credential offer is missing 'credential_issuer'")]
    MissingCredentialIssuer,

    #[error("unable to resolve an authorization server for issuer '{0}'")]
    UnresolvableAuthorizationServer(String),

    /// A transaction code was provided but is blank.
    #[error("invalid_client: the transaction code must not be empty")]
    InvalidClient,

    /// The grant requires a transaction code but none was provided.
    #[error("a transaction code is required for this credential offer")]
    MissingTxCode,

    /// The token endpoint rejected the request. The upstream error is kept verbatim.
    #[error("token request was rejected: {0}")]
    TokenRejected(TokenErrorResponse),

    #[error("grant type '{0}' is not supported")]
    UnsupportedGrantType(String),

    #[error("discovery metadata is missing {0}")]
    MissingDiscoveryMetadata(&'static str),

    #[error("credential configuration '{0}' is not supported by the issuer")]
    UnknownCredentialConfiguration(String),

    #[error("encrypted credential responses are not supported")]
    EncryptedResponseUnsupported,

    #[error("wallet identity does not declare a signature algorithm")]
    MissingSigningAlgorithm,

    #[error("issuer does not support the wallet signature algorithm '{0}'")]
    UnsupportedSigningAlgorithm(String),

    #[error("cannot determine token URL if no issuer, metadata and no authorization server values are present")]
    UndeterminedTokenEndpoint,

    #[error("insecure endpoint '{0}' is not allowed")]
    InsecureEndpoint(String),

    #[error("no c_nonce was provided by the issuer")]
    MissingNonce,

    #[error("deferred credential issuance is not supported")]
    DeferredIssuanceUnsupported,

    #[error("credential format '{0}' is not supported")]
    UnsupportedFormat(String),

    #[error("credential verification failed: {0}")]
    CredentialVerification(String),
}

/// Errors of the presentation flow.
#[derive(Debug, thiserror::Error)]
pub enum PresentationError {
    #[error("authorization request is missing a query string")]
    MissingQueryString,

    #[error("authorization request requires 'client_id' and one of 'request' or 'request_uri'")]
    MissingRequiredParams,

    #[error("unable to resolve request object: {0}")]
    UnResolvedRequestObject(String),

    #[error("unable to resolve client metadata: {0}")]
    UnResolvedClientMetadata(String),

    #[error("unable to resolve client metadata jwk: {0}")]
    UnResolvedClientMetadataJwk(String),

    #[error("unable to resolve presentation definition: {0}")]
    UnResolvedPresentationDefinition(String),

    #[error("request object requires exactly one of 'redirect_uri' or 'response_uri'")]
    MissingResponseParams,

    #[error("request object jwt is missing required header parameters")]
    MissingJwtRequiredHeaderParams,

    #[error("unable to resolve a key from jwt header parameters: {0}")]
    UnResolvedJwkHeaderParams(String),

    #[error("invalid request object jwt: {0}")]
    InvalidRequestObjectJwt(String),

    #[error("request object jwt signature could not be verified")]
    InvalidRequestObjectJwtSignature,

    #[error("request object jwt could not be verified with client metadata jwks")]
    InvalidClientMetadataJwks,

    #[error("client_id does not match: {0}")]
    MismatchedClientId(String),

    #[error("client_id_scheme 'redirect_uri' must not be used with signed request objects")]
    MisusedClientIdScheme,

    #[error("client_id_scheme '{0}' is not supported")]
    UnSupportedClientScheme(String),

    #[error("input descriptor '{0}' declares no constraint fields")]
    EmptyConstraintFields(String),
}
