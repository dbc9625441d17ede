use tracing::debug;

use super::{
    parameters::{ClientIdScheme, ClientMetadata},
    ResolvedRequestObject,
};
use crate::{
    core::{
        jose::{CompactJws, JwsHeader},
        object::{ParsingErrorContext, UntypedObject},
    },
    error::PresentationError,
};

pub mod x509_san;

/// Establishes trust in the verifier behind a request object, according to its
/// `client_id_scheme`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestObjectValidator;

impl RequestObjectValidator {
    /// Validate the request object JWT of `request`.
    ///
    /// | `client_id_scheme` | outcome |
    /// |---|---|
    /// | `redirect_uri`, signed | [MisusedClientIdScheme](PresentationError::MisusedClientIdScheme) |
    /// | `redirect_uri`, unsigned | `redirect_uri` must equal `client_id` |
    /// | `pre-registered` | accepted, see [verify_with_client_metadata_jwks](Self::verify_with_client_metadata_jwks) |
    /// | `x509_san_dns` | see [x509_san::validate] |
    /// | anything else | [UnSupportedClientScheme](PresentationError::UnSupportedClientScheme) |
    pub fn validate(&self, request: &ResolvedRequestObject) -> Result<(), PresentationError> {
        let jws = CompactJws::split(&request.request).map_err(invalid_jwt)?;
        let payload: UntypedObject = jws.payload().map_err(invalid_jwt)?;
        let client_id_scheme: ClientIdScheme = payload.get().parsing_error().map_err(invalid_jwt)?;

        debug!(%client_id_scheme, signed = jws.is_signed(), "validating request object");
        match client_id_scheme {
            ClientIdScheme::RedirectUri if jws.is_signed() => {
                Err(PresentationError::MisusedClientIdScheme)
            }
            ClientIdScheme::RedirectUri => validate_redirect_uri(request),
            ClientIdScheme::PreRegistered => Ok(()),
            ClientIdScheme::X509SanDns => {
                let header = jws.header().map_err(invalid_jwt)?;
                x509_san::validate(&jws, &header, &request.client_id)
            }
            other => Err(PresentationError::UnSupportedClientScheme(other.to_string())),
        }
    }

    /// Verify the request object JWT with the key of its `kid` in the resolved client metadata.
    ///
    /// Pre-registered verifiers are trusted through the keys they publish in their metadata.
    pub fn verify_with_client_metadata_jwks(
        &self,
        request: &ResolvedRequestObject,
    ) -> Result<(), PresentationError> {
        let unresolved = |reason: &str| PresentationError::UnResolvedClientMetadataJwk(reason.into());

        let jws = CompactJws::split(&request.request).map_err(invalid_jwt)?;
        let header = jws.header().map_err(invalid_jwt)?;

        let jwks = request
            .client_metadata
            .as_ref()
            .and_then(ClientMetadata::jwks)
            .ok_or_else(|| unresolved("client metadata has no jwks"))?
            .map_err(|e| unresolved(format!("{e:#}").as_str()))?;
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| unresolved("request object header has no kid"))?;
        let key = jwks
            .0
            .find(kid)
            .ok_or_else(|| {
                unresolved(format!("no key with kid '{kid}' in client metadata jwks").as_str())
            })?;

        jws.verify(key).map_err(|e| {
            debug!("request object did not verify with client metadata jwks: {e:#}");
            PresentationError::InvalidClientMetadataJwks
        })
    }
}

/// An unsigned request object with `client_id_scheme` `redirect_uri` must name its
/// `redirect_uri` as `client_id`.
pub fn validate_redirect_uri(request: &ResolvedRequestObject) -> Result<(), PresentationError> {
    let client_id = ClientIdScheme::RedirectUri.strip_prefix(&request.client_id);
    match &request.redirect_uri {
        Some(redirect_uri) if redirect_uri.as_str() == client_id => Ok(()),
        Some(redirect_uri) => Err(PresentationError::MismatchedClientId(format!(
            "redirect_uri '{redirect_uri}' does not match client_id '{client_id}'"
        ))),
        None => Err(PresentationError::MismatchedClientId(
            "request object has no redirect_uri".into(),
        )),
    }
}

fn invalid_jwt(e: anyhow::Error) -> PresentationError {
    PresentationError::InvalidRequestObjectJwt(format!("{e:#}"))
}

/// Header parameters required for scheme checks, decoded once.
pub(crate) fn required_header<'h>(
    header: &'h JwsHeader,
) -> Option<(&'h [String], &'h str, &'h str)> {
    Some((
        header.x5c.as_deref()?,
        header.kid.as_deref()?,
        header.alg.as_deref()?,
    ))
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use ssi::claims::jws::Header;

    use super::*;
    use crate::core::jose;

    fn unsigned(payload: serde_json::Value) -> String {
        use base64::prelude::*;
        format!(
            "{}.{}.",
            BASE64_URL_SAFE_NO_PAD.encode(json!({"alg": "none"}).to_string()),
            BASE64_URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    fn resolved(request: String, redirect_uri: Option<&str>) -> ResolvedRequestObject {
        ResolvedRequestObject {
            client_id: "https://verifier.example.com/cb".into(),
            client_id_scheme: None,
            redirect_uri: redirect_uri.map(|uri| uri.parse().unwrap()),
            response_uri: None,
            response_type: None,
            response_mode: None,
            nonce: None,
            state: None,
            client_metadata: None,
            presentation_definition: None,
            request,
        }
    }

    #[test]
    fn signed_redirect_uri_is_misused() {
        let jwk = jose::generate_p256().unwrap();
        let jwt = jose::sign(
            Header {
                type_: Some("oauth-authz-req+jwt".into()),
                ..Default::default()
            },
            &json!({"client_id_scheme": "redirect_uri"}),
            &jwk,
        )
        .unwrap();
        assert!(matches!(
            RequestObjectValidator.validate(&resolved(jwt, Some("https://verifier.example.com/cb"))),
            Err(PresentationError::MisusedClientIdScheme)
        ));
    }

    #[test]
    fn unsigned_redirect_uri_must_match_client_id() {
        let jwt = unsigned(json!({"client_id_scheme": "redirect_uri"}));
        RequestObjectValidator
            .validate(&resolved(jwt.clone(), Some("https://verifier.example.com/cb")))
            .unwrap();
        assert!(matches!(
            RequestObjectValidator.validate(&resolved(jwt, Some("https://attacker.example.com/cb"))),
            Err(PresentationError::MismatchedClientId(_))
        ));
    }

    #[test]
    fn scheme_dispatch() {
        let pre_registered = unsigned(json!({"client_id_scheme": "pre-registered"}));
        RequestObjectValidator
            .validate(&resolved(pre_registered, None))
            .unwrap();

        let entity_id = unsigned(json!({"client_id_scheme": "entity_id"}));
        assert!(matches!(
            RequestObjectValidator.validate(&resolved(entity_id, None)),
            Err(PresentationError::UnSupportedClientScheme(scheme)) if scheme == "entity_id"
        ));

        let missing = unsigned(json!({}));
        assert!(matches!(
            RequestObjectValidator.validate(&resolved(missing, None)),
            Err(PresentationError::InvalidRequestObjectJwt(_))
        ));

        assert!(matches!(
            RequestObjectValidator.validate(&resolved("not-a-jwt".into(), None)),
            Err(PresentationError::InvalidRequestObjectJwt(_))
        ));
    }

    #[test]
    fn client_metadata_jwks() {
        let mut jwk = jose::generate_p256().unwrap();
        jwk.key_id = Some("verifier-key".into());
        let jwt = jose::sign(
            Header {
                key_id: jwk.key_id.clone(),
                ..Default::default()
            },
            &json!({"client_id_scheme": "pre-registered"}),
            &jwk,
        )
        .unwrap();

        let mut request = resolved(jwt, None);
        assert!(matches!(
            RequestObjectValidator.verify_with_client_metadata_jwks(&request),
            Err(PresentationError::UnResolvedClientMetadataJwk(_))
        ));

        let mut other = jose::generate_p256().unwrap().to_public();
        other.key_id = Some("verifier-key".into());
        request.client_metadata =
            Some(ClientMetadata::try_from(json!({"jwks": {"keys": [other]}})).unwrap());
        assert!(matches!(
            RequestObjectValidator.verify_with_client_metadata_jwks(&request),
            Err(PresentationError::InvalidClientMetadataJwks)
        ));

        request.client_metadata =
            Some(ClientMetadata::try_from(json!({"jwks": {"keys": [jwk.to_public()]}})).unwrap());
        RequestObjectValidator
            .verify_with_client_metadata_jwks(&request)
            .unwrap();
    }
}
