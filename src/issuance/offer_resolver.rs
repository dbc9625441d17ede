use tracing::{debug, warn};

use crate::{
    core::{
        credential_offer::{CredentialOffer, CredentialOfferRequest, GrantType},
        metadata::{
            well_known_url, AuthorizationServerMetadata, CredentialIssuerMetadata,
            DiscoveryMetadata, JwtIssuerMetadata, ResolvedCredentialOffer,
            CREDENTIAL_ISSUER_WELL_KNOWN, JWT_ISSUER_WELL_KNOWN,
            OAUTH_AUTHORIZATION_SERVER_WELL_KNOWN, OPENID_CONFIGURATION_WELL_KNOWN,
        },
        util::{AsyncHttpClient, OpenIdFetcher, ResponseBody},
    },
    error::{IssuanceError, Result},
};

/// Turns an offer link into a [ResolvedCredentialOffer].
pub struct CredentialOfferResolver<'a, H: ?Sized> {
    fetcher: OpenIdFetcher<'a, H>,
}

impl<'a, H: AsyncHttpClient + ?Sized> CredentialOfferResolver<'a, H> {
    pub fn new(fetcher: OpenIdFetcher<'a, H>) -> Self {
        Self { fetcher }
    }

    /// Parse `offer`, dereferencing `credential_offer_uri` if needed, then discover the issuer,
    /// its authorization server and (best effort) its JWT issuer metadata.
    pub async fn resolve(&self, offer: &str) -> Result<ResolvedCredentialOffer> {
        let credential_offer = match CredentialOfferRequest::parse(offer)? {
            CredentialOfferRequest::ByValue(offer) => offer,
            CredentialOfferRequest::ByReference(uri) => {
                debug!(%uri, "dereferencing credential offer");
                match self.fetcher.get(&uri, None).await?.error_for_status()?.body {
                    ResponseBody::Json(json) => CredentialOffer::from_json(json)?,
                    ResponseBody::Text(text) => CredentialOffer::from_json_str(&text)?,
                    ResponseBody::Empty => {
                        return Err(IssuanceError::DeserializationError(format!(
                            "empty response from {uri}"
                        ))
                        .into())
                    }
                }
            }
        };

        let discovery_metadata = self.discover(&credential_offer).await?;

        Ok(ResolvedCredentialOffer {
            credential_offer,
            discovery_metadata,
        })
    }

    async fn discover(&self, offer: &CredentialOffer) -> Result<DiscoveryMetadata> {
        let issuer = &offer.credential_issuer;

        let url = well_known_url(issuer, CREDENTIAL_ISSUER_WELL_KNOWN)?;
        debug!(%url, "fetching credential issuer metadata");
        let issuer_metadata: CredentialIssuerMetadata = self.fetcher.get(&url, None).await?.json()?;

        let authorization_server_metadata =
            self.authorization_server(offer, &issuer_metadata).await?;
        let jwt_issuer_metadata = self.jwt_issuer(issuer).await;

        Ok(DiscoveryMetadata {
            credential_issuer_metadata: Some(issuer_metadata),
            authorization_server_metadata: Some(authorization_server_metadata),
            jwt_issuer_metadata,
        })
    }

    /// Select the authorization server the pre-authorized code is redeemed at.
    async fn authorization_server(
        &self,
        offer: &CredentialOffer,
        issuer_metadata: &CredentialIssuerMetadata,
    ) -> Result<AuthorizationServerMetadata> {
        let unresolvable =
            || IssuanceError::UnresolvableAuthorizationServer(offer.credential_issuer.clone());
        let hint = offer
            .pre_authorized_code()
            .and_then(|grant| grant.authorization_server.as_deref());

        if let Some(hint) = hint {
            if !issuer_metadata
                .authorization_servers
                .iter()
                .any(|server| server == hint)
            {
                warn!(authorization_server = hint, "offer names an undeclared authorization server");
                return Err(unresolvable().into());
            }
            return self.authorization_server_metadata(hint).await;
        }

        if issuer_metadata.authorization_servers.is_empty() {
            return self
                .authorization_server_metadata(&offer.credential_issuer)
                .await;
        }

        for server in &issuer_metadata.authorization_servers {
            match self.authorization_server_metadata(server).await {
                Ok(metadata) if metadata.supports_grant(GrantType::PreAuthorizedCode) => {
                    return Ok(metadata)
                }
                Ok(_) => debug!(
                    authorization_server = %server,
                    "authorization server does not support the pre-authorized code grant"
                ),
                Err(e) => warn!(authorization_server = %server, "skipping authorization server: {e}"),
            }
        }

        Err(unresolvable().into())
    }

    async fn authorization_server_metadata(
        &self,
        server: &str,
    ) -> Result<AuthorizationServerMetadata> {
        let url = well_known_url(server, OPENID_CONFIGURATION_WELL_KNOWN)?;
        debug!(%url, "fetching authorization server metadata");
        match self.fetcher.get(&url, None).await.and_then(|r| r.json()) {
            Ok(metadata) => return Ok(metadata),
            Err(e) => warn!("openid configuration unavailable, trying oauth metadata: {e}"),
        }

        let url = well_known_url(server, OAUTH_AUTHORIZATION_SERVER_WELL_KNOWN)?;
        debug!(%url, "fetching authorization server metadata");
        self.fetcher.get(&url, None).await?.json()
    }

    async fn jwt_issuer(&self, issuer: &str) -> Option<JwtIssuerMetadata> {
        match self.jwt_issuer_metadata(issuer).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("jwt issuer metadata unavailable: {e}");
                None
            }
        }
    }

    async fn jwt_issuer_metadata(&self, issuer: &str) -> Result<JwtIssuerMetadata> {
        let url = well_known_url(issuer, JWT_ISSUER_WELL_KNOWN)?;
        debug!(%url, "fetching jwt issuer metadata");
        self.fetcher.get(&url, None).await?.json()
    }
}
