use anyhow::{anyhow, Context, Result};
use base64::prelude::*;
use ssi::jwk::JWK;
use tracing::debug;
use x509_cert::{
    der::{referenced::OwnedToRef, Decode},
    ext::pkix::{name::GeneralName, SubjectAltName},
    Certificate,
};

/// Decode the leaf certificate of an `x5c` JOSE header.
///
/// Entries are base64 DER. PEM armor, if present, is stripped.
pub fn x5c_leaf(x5c: &[String]) -> Result<Certificate> {
    let leaf = x5c.first().context("'x5c' was an empty array")?;
    let b64: String = leaf
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.trim().chars())
        .collect();

    let der = BASE64_STANDARD_NO_PAD
        .decode(b64.trim_end_matches('='))
        .context("leaf certificate in 'x5c' was not valid base64")?;

    let certificate =
        Certificate::from_der(&der).context("leaf certificate in 'x5c' was not valid DER")?;
    debug!("Leaf certificate: {certificate:?}");
    Ok(certificate)
}

/// The subject public key of `certificate` as a JWK. Only P-256 keys are supported.
pub fn certificate_jwk(certificate: &Certificate) -> Result<JWK> {
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .owned_to_ref();
    let public_key = p256::PublicKey::try_from(spki)
        .map_err(|e| anyhow!("unable to parse SPKI as a P-256 key: {e}"))?;
    serde_json::from_str(&public_key.to_jwk_string())
        .context("unable to convert certificate key into a jwk")
}

/// The DNS names among the SubjectAltNames of `certificate`.
pub fn dns_subject_alt_names(certificate: &Certificate) -> Vec<String> {
    certificate
        .tbs_certificate
        .filter::<SubjectAltName>()
        .filter_map(|r| match r {
            Ok((_crit, san)) => Some(san.0.into_iter()),
            Err(e) => {
                debug!("unable to parse SubjectAlternativeName from DER: {e}");
                None
            }
        })
        .flatten()
        .filter_map(|gn| match gn {
            GeneralName::DnsName(dns) => Some(dns.to_string()),
            gn => {
                debug!("found non-DNS SAN: {gn:?}");
                None
            }
        })
        .collect()
}
