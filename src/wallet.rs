use async_trait::async_trait;
use ssi::jwk::JWK;
use tracing::{debug, info};

use crate::{
    config::ConfigClient,
    core::{
        authorization_request::{
            parameters::ClientIdScheme, RequestObjectResolver, RequestObjectValidator,
            ResolvedRequestObject,
        },
        credential_offer::GrantType,
        metadata::ResolvedCredentialOffer,
        util::{AsyncHttpClient, OpenIdFetcher},
    },
    error::{PresentationError, Result},
    holder::{InputDescriptorHandler, SdJwtMatchingCredential},
    identity::IdentityManager,
    issuance::{
        CredentialOfferResolver, CredentialRequestOptions, CredentialRequester,
        ProcessedCredential,
    },
    store::{KeyValueStore, StoreKey, StoreName},
};

/// The holder side of OID4VCI and OID4VP.
///
/// Implementors provide the transport, the storage and the configuration; every protocol step is
/// a provided method.
#[async_trait]
pub trait Wallet: Sync {
    type HttpClient: AsyncHttpClient + Send + Sync + ?Sized;
    type Store: KeyValueStore + ?Sized;

    fn config(&self) -> &ConfigClient;
    fn http_client(&self) -> &Self::HttpClient;
    fn store(&self) -> &Self::Store;

    fn fetcher(&self) -> OpenIdFetcher<'_, Self::HttpClient> {
        OpenIdFetcher::new(self.http_client(), self.config())
    }

    /// Return the wallet's signing key, generating it on first use.
    async fn initialize_identity(&self) -> Result<JWK> {
        IdentityManager::new(self.store()).initialize().await
    }

    /// Resolve a credential offer uri and discover the metadata needed to redeem it.
    async fn resolve_offer(&self, offer: &str) -> Result<ResolvedCredentialOffer> {
        CredentialOfferResolver::new(self.fetcher())
            .resolve(offer)
            .await
    }

    /// Redeem a resolved offer with the pre-authorized code flow and store the credential.
    async fn request_credential(
        &self,
        resolved: &ResolvedCredentialOffer,
        options: &CredentialRequestOptions,
    ) -> Result<ProcessedCredential> {
        CredentialRequester::new(self.fetcher(), self.store())
            .request_credential_issuance(resolved, options, GrantType::PreAuthorizedCode)
            .await
    }

    /// Every stored credential, in insertion order.
    async fn credentials(&self) -> Result<Vec<ProcessedCredential>> {
        self.store()
            .find_all(StoreName::Credentials)
            .await?
            .into_iter()
            .map(|record| ProcessedCredential::from_record(&record.key, record.value))
            .collect()
    }

    async fn delete_credential(&self, id: u64) -> Result<()> {
        self.store()
            .delete(StoreName::Credentials, &StoreKey::from(id))
            .await?;
        info!(id, "deleted credential");
        Ok(())
    }

    /// Resolve an authorization request uri and validate the request object against its
    /// `client_id_scheme`.
    async fn resolve_request_object(&self, uri: &str) -> Result<ResolvedRequestObject> {
        let request = RequestObjectResolver::new(self.fetcher()).resolve(uri).await?;
        RequestObjectValidator.validate(&request)?;
        debug!(client_id = %request.client_id, "request object is valid");
        Ok(request)
    }

    /// Match the stored credentials against the presentation definition of `request`.
    ///
    /// Requests of pre-registered verifiers must also verify with the keys of their client
    /// metadata.
    async fn match_presentation(
        &self,
        request: &ResolvedRequestObject,
    ) -> Result<Vec<SdJwtMatchingCredential>> {
        if request.client_id_scheme == Some(ClientIdScheme::PreRegistered) {
            RequestObjectValidator.verify_with_client_metadata_jwks(request)?;
        }

        let definition = request.presentation_definition.as_ref().ok_or_else(|| {
            PresentationError::UnResolvedPresentationDefinition(
                "request object has no presentation definition".into(),
            )
        })?;

        let credentials = self.credentials().await?;
        let matches = InputDescriptorHandler.handle(definition.input_descriptors(), &credentials)?;
        info!(
            definition = %definition.id(),
            matches = matches.len(),
            "matched stored credentials"
        );
        Ok(matches)
    }
}
