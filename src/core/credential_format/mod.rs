use core::fmt;
use std::{borrow::Cow, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::error::IssuanceError;

const FORMAT_VC_SD_JWT: &str = "vc+sd-jwt";
const FORMAT_DC_SD_JWT: &str = "dc+sd-jwt";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_LDP_VC: &str = "ldp_vc";
const FORMAT_MSO_MDOC: &str = "mso_mdoc";

/// The format of a credential, as named in the `format` property of an issuer's credential
/// configuration.
///
/// Registry of credential formats: [https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-format-profiles](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html#name-credential-format-profiles)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CredentialFormat {
    /// IETF SD-JWT VC, using the legacy `vc+sd-jwt` media type.
    VcSdJwt,

    /// IETF SD-JWT VC, using the `dc+sd-jwt` media type.
    DcSdJwt,

    /// W3C Verifiable Credential secured as a JWT, without JSON-LD.
    JwtVcJson,

    /// W3C Verifiable Credential secured with a Linked Data Proof.
    LdpVc,

    /// ISO/IEC 18013-5 mobile document.
    MsoMdoc,

    /// Any other format. The value is the name of the format.
    Other(String),
}

impl CredentialFormat {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_VC_SD_JWT => Self::VcSdJwt,
            FORMAT_DC_SD_JWT => Self::DcSdJwt,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_LDP_VC => Self::LdpVc,
            FORMAT_MSO_MDOC => Self::MsoMdoc,
            _ => Self::Other(name.into_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::VcSdJwt => FORMAT_VC_SD_JWT,
            Self::DcSdJwt => FORMAT_DC_SD_JWT,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::LdpVc => FORMAT_LDP_VC,
            Self::MsoMdoc => FORMAT_MSO_MDOC,
            Self::Other(other) => other,
        }
    }

    /// Whether credentials of this format are SD-JWTs.
    pub fn is_sd_jwt(&self) -> bool {
        matches!(self, Self::VcSdJwt | Self::DcSdJwt)
    }

    /// Build the part of a credential request that identifies the requested credential type.
    ///
    /// `type_info` holds the format-specific type identifier taken from the credential
    /// configuration: `vct` for SD-JWT VCs, `doctype` for mdocs and `credential_definition` for
    /// W3C credentials.
    pub fn type_selector(&self, type_info: &CredentialTypeInfo) -> Result<Json, IssuanceError> {
        let missing = |field: &str| {
            IssuanceError::UnsupportedFormat(format!("{self} configuration without '{field}'"))
        };
        Ok(match self {
            Self::VcSdJwt | Self::DcSdJwt => json!({
                "format": self.name(),
                "vct": type_info.vct.as_ref().ok_or_else(|| missing("vct"))?,
            }),
            Self::JwtVcJson | Self::LdpVc => json!({
                "format": self.name(),
                "credential_definition": type_info
                    .credential_definition
                    .as_ref()
                    .ok_or_else(|| missing("credential_definition"))?,
            }),
            Self::MsoMdoc => json!({
                "format": self.name(),
                "doctype": type_info.doctype.as_ref().ok_or_else(|| missing("doctype"))?,
            }),
            Self::Other(other) => return Err(IssuanceError::UnsupportedFormat(other.clone())),
        })
    }
}

/// Format-specific type identifiers of a credential configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialTypeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_definition: Option<Json>,
}

impl From<&str> for CredentialFormat {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for CredentialFormat {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for CredentialFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl fmt::Display for CredentialFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for CredentialFormat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CredentialFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sd_jwt_type_selector() {
        let format: CredentialFormat = serde_json::from_value(json!("vc+sd-jwt")).unwrap();
        assert!(format.is_sd_jwt());

        let selector = format
            .type_selector(&CredentialTypeInfo {
                vct: Some("https://credentials.example.com/identity_credential".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            selector,
            json!({
                "format": "vc+sd-jwt",
                "vct": "https://credentials.example.com/identity_credential"
            })
        );
    }

    #[test]
    fn unknown_format_has_no_selector() {
        let format = CredentialFormat::from("com.example.custom_vc");
        assert_eq!(format, CredentialFormat::Other("com.example.custom_vc".into()));
        assert!(matches!(
            format.type_selector(&CredentialTypeInfo::default()),
            Err(IssuanceError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            CredentialFormat::DcSdJwt.type_selector(&CredentialTypeInfo::default()),
            Err(IssuanceError::UnsupportedFormat(_))
        ));
    }
}
