use std::fmt;

use anyhow::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use crate::core::{
    jose::JwkSet,
    object::{TypedParameter, UntypedObject},
};

/// A parameter wrapping a single value that serializes as-is.
macro_rules! newtype_parameter {
    ($(#[$meta:meta])* $name:ident($inner:ty) = $key:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl TypedParameter for $name {
            const KEY: &'static str = $key;
        }

        impl TryFrom<Json> for $name {
            type Error = Error;

            fn try_from(value: Json) -> Result<Self, Self::Error> {
                Ok(serde_json::from_value(value).map(Self)?)
            }
        }

        impl TryFrom<$name> for Json {
            type Error = Error;

            fn try_from(value: $name) -> Result<Self, Self::Error> {
                Ok(serde_json::to_value(value.0)?)
            }
        }
    };
}

/// A string parameter with a set of registered values.
macro_rules! registered_values_parameter {
    (
        $(#[$meta:meta])* $name:ident = $key:literal {
            $($(#[$variant_meta:meta])* $variant:ident => $value:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(into = "String", from = "String")]
        pub enum $name {
            $($(#[$variant_meta])* $variant,)*
            /// Any unregistered value.
            Other(String),
        }

        impl TypedParameter for $name {
            const KEY: &'static str = $key;
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $($value => Self::$variant,)*
                    _ => Self::Other(s),
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Other(s) => s,
                    known => known.to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $value,)*
                    Self::Other(s) => s.as_str(),
                })
            }
        }

        impl TryFrom<Json> for $name {
            type Error = Error;

            fn try_from(value: Json) -> Result<Self, Self::Error> {
                Ok(serde_json::from_value(value)?)
            }
        }

        impl From<$name> for Json {
            fn from(value: $name) -> Self {
                Json::String(value.into())
            }
        }
    };
}

newtype_parameter!(ClientId(String) = "client_id");

registered_values_parameter!(
    /// How the verifier's `client_id` is to be interpreted and trusted.
    ClientIdScheme = "client_id_scheme" {
        Did => "did",
        EntityId => "entity_id",
        PreRegistered => "pre-registered",
        RedirectUri => "redirect_uri",
        VerifierAttestation => "verifier_attestation",
        X509SanDns => "x509_san_dns",
        X509SanUri => "x509_san_uri",
    }
);

impl ClientIdScheme {
    /// Strip this scheme's `{scheme}:` prefix from a `client_id`, if present.
    pub fn strip_prefix<'a>(&self, client_id: &'a str) -> &'a str {
        client_id
            .strip_prefix(&format!("{self}:"))
            .unwrap_or(client_id)
    }
}

/// `client_metadata` field in the request object, with any `jwks_uri` already dereferenced
/// into `jwks` once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata(pub UntypedObject);

impl ClientMetadata {
    /// The verifier's keys, if present inline.
    pub fn jwks(&self) -> Option<anyhow::Result<Jwks>> {
        self.0.get()
    }
}

impl TypedParameter for ClientMetadata {
    const KEY: &'static str = "client_metadata";
}

impl From<ClientMetadata> for Json {
    fn from(value: ClientMetadata) -> Self {
        value.0.into()
    }
}

impl TryFrom<Json> for ClientMetadata {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        UntypedObject::try_from(value).map(Self)
    }
}

newtype_parameter!(
    /// `client_metadata_uri` field in the request object.
    ClientMetadataUri(Url) = "client_metadata_uri"
);

newtype_parameter!(
    /// `jwks` field in client metadata.
    Jwks(JwkSet) = "jwks"
);

newtype_parameter!(
    /// `jwks_uri` field in client metadata.
    JwksUri(Url) = "jwks_uri"
);

newtype_parameter!(Nonce(String) = "nonce");

newtype_parameter!(
    /// `redirect_uri` field in the request object.
    RedirectUri(Url) = "redirect_uri"
);

newtype_parameter!(
    /// `response_uri` field in the request object.
    ResponseUri(Url) = "response_uri"
);

registered_values_parameter!(
    ResponseMode = "response_mode" {
        /// The `direct_post` response mode as defined in OID4VP.
        DirectPost => "direct_post",
        /// The `direct_post.jwt` response mode as defined in OID4VP.
        DirectPostJwt => "direct_post.jwt",
    }
);

registered_values_parameter!(
    ResponseType = "response_type" {
        VpToken => "vp_token",
        VpTokenIdToken => "vp_token id_token",
    }
);

newtype_parameter!(State(String) = "state");

newtype_parameter!(PresentationDefinitionUri(Url) = "presentation_definition_uri");
