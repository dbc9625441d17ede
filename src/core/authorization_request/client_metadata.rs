use tracing::debug;

use super::parameters::{ClientMetadata, ClientMetadataUri, Jwks, JwksUri};
use crate::{
    core::{
        jose::JwkSet,
        object::{ParsingErrorContext, UntypedObject},
        util::{AsyncHttpClient, OpenIdFetcher},
    },
    error::{PresentationError, Result},
};

/// Resolves the `client_metadata` of a request object, by value or by reference.
pub struct ClientMetadataResolver<'a, H: ?Sized> {
    fetcher: &'a OpenIdFetcher<'a, H>,
}

impl<'a, H: AsyncHttpClient + ?Sized> ClientMetadataResolver<'a, H> {
    pub fn new(fetcher: &'a OpenIdFetcher<'a, H>) -> Self {
        Self { fetcher }
    }

    /// Resolve `client_metadata` or `client_metadata_uri` from `request_object`.
    ///
    /// A `jwks_uri` in the metadata is dereferenced and its keys stored under `jwks`.
    pub async fn resolve(&self, request_object: &UntypedObject) -> Result<Option<ClientMetadata>> {
        let by_value = request_object.get::<ClientMetadata>();
        let by_reference = request_object.get::<ClientMetadataUri>();

        let mut metadata = match (by_value, by_reference) {
            (Some(metadata), _) => metadata
                .parsing_error()
                .map_err(|e| PresentationError::UnResolvedClientMetadata(format!("{e:#}")))?,
            (None, Some(uri)) => {
                let ClientMetadataUri(uri) = uri
                    .parsing_error()
                    .map_err(|e| PresentationError::UnResolvedClientMetadata(format!("{e:#}")))?;
                debug!(%uri, "fetching client metadata");
                self.fetcher
                    .get(&uri, None)
                    .await
                    .and_then(|response| response.json::<UntypedObject>())
                    .map(ClientMetadata)
                    .map_err(|e| PresentationError::UnResolvedClientMetadata(e.to_string()))?
            }
            (None, None) => return Ok(None),
        };

        if metadata.jwks().is_none() {
            if let Some(jwks_uri) = metadata.0.get::<JwksUri>() {
                let jwks = self.jwks(jwks_uri.parsing_error()).await?;
                metadata.0.insert(Jwks(jwks));
            }
        }

        Ok(Some(metadata))
    }

    async fn jwks(&self, jwks_uri: anyhow::Result<JwksUri>) -> Result<JwkSet> {
        let JwksUri(uri) =
            jwks_uri.map_err(|e| PresentationError::UnResolvedClientMetadataJwk(format!("{e:#}")))?;
        debug!(%uri, "fetching client metadata jwks");
        Ok(self
            .fetcher
            .get(&uri, None)
            .await
            .and_then(|response| response.json())
            .map_err(|e| PresentationError::UnResolvedClientMetadataJwk(e.to_string()))?)
    }
}
