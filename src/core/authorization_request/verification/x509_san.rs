use tracing::debug;

use super::required_header;
use crate::{
    core::{
        authorization_request::parameters::ClientIdScheme,
        jose::{certificate_jwk, dns_subject_alt_names, x5c_leaf, CompactJws, JwsHeader},
    },
    error::PresentationError,
};

/// Request validation for `client_id_scheme` `x509_san_dns`.
///
/// The request object must be signed by the key of the leaf certificate in `x5c`, and
/// `client_id` must be a DNS name listed among that certificate's DNS SubjectAltNames.
pub fn validate(
    jws: &CompactJws<'_>,
    header: &JwsHeader,
    client_id: &str,
) -> Result<(), PresentationError> {
    let (x5c, _kid, _alg) =
        required_header(header).ok_or(PresentationError::MissingJwtRequiredHeaderParams)?;

    let unresolved = |e: anyhow::Error| PresentationError::UnResolvedJwkHeaderParams(format!("{e:#}"));
    let leaf_cert = x5c_leaf(x5c).map_err(unresolved)?;
    let jwk = certificate_jwk(&leaf_cert).map_err(unresolved)?;

    jws.verify(&jwk).map_err(|e| {
        debug!("request signature could not be verified: {e:#}");
        PresentationError::InvalidRequestObjectJwtSignature
    })?;

    let client_id = ClientIdScheme::X509SanDns.strip_prefix(client_id);
    if !is_dns_name(client_id) {
        return Err(PresentationError::MismatchedClientId(format!(
            "'{client_id}' is not a valid DNS name"
        )));
    }

    let names = dns_subject_alt_names(&leaf_cert);
    if names.is_empty() {
        return Err(PresentationError::MismatchedClientId(
            "leaf certificate has no DNS Subject Alternative Name".into(),
        ));
    }
    if !names.iter().any(|dns| {
        debug!("comparing SAN '{dns}' to client_id '{client_id}'");
        dns.eq_ignore_ascii_case(client_id)
    }) {
        return Err(PresentationError::MismatchedClientId(
            "client_id does not match any DNS Subject Alternative Name".into(),
        ));
    }

    Ok(())
}

/// RFC 1123 host name syntax.
pub fn is_dns_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
