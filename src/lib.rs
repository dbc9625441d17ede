//! This library implements the holder side of [OID4VCI] and [OID4VP] for SD-JWT credentials.
//!
//! [OID4VCI]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
//! [OID4VP]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! # Wallet Usage
//!
//! A wallet is anything implementing the [`Wallet`] trait, which only asks for an HTTP client, a
//! key-value store and a [`ConfigClient`]:
//!
//! ```ignore
//! use openid4vc_holder::{
//!     config::{Config, ConfigClient},
//!     core::util::ReqwestClient,
//!     issuance::CredentialRequestOptions,
//!     store::MemoryStore,
//!     wallet::Wallet,
//! };
//!
//! struct MyWallet {
//!     config: ConfigClient,
//!     http_client: ReqwestClient,
//!     store: MemoryStore,
//! }
//!
//! impl Wallet for MyWallet {
//!     type HttpClient = ReqwestClient;
//!     type Store = MemoryStore;
//!
//!     fn config(&self) -> &ConfigClient {
//!         &self.config
//!     }
//!
//!     fn http_client(&self) -> &Self::HttpClient {
//!         &self.http_client
//!     }
//!
//!     fn store(&self) -> &Self::Store {
//!         &self.store
//!     }
//! }
//!
//! // Redeem a pre-authorized credential offer.
//! let resolved = wallet.resolve_offer(offer_uri).await?;
//! let credential = wallet
//!     .request_credential(
//!         &resolved,
//!         &CredentialRequestOptions {
//!             credential_type_key: "IdentityCredential".into(),
//!             tx_code: Some("493536".into()),
//!         },
//!     )
//!     .await?;
//!
//! // Answer a presentation request.
//! let request = wallet.resolve_request_object(authorization_request_uri).await?;
//! let matches = wallet.match_presentation(&request).await?;
//! ```
//!
//! [`Wallet`]: crate::wallet::Wallet
//! [`ConfigClient`]: crate::config::ConfigClient
//!
//! # Protocol Overview
//!
//! ## Issuance
//!
//! 1. *Offer resolution*: the [`CredentialOfferResolver`] parses a credential offer, by value or
//!    by reference, and discovers the issuer, its authorization server and its JWT issuer
//!    metadata.
//! 2. *Token exchange*: the [`CredentialRequester`] redeems the pre-authorized code, and signs a
//!    key proof with the wallet identity managed by the [`IdentityManager`].
//! 3. *Credential processing*: the [`SdJwtCredentialProcessor`] verifies the issued SD-JWT,
//!    extracts its declared claims and stores it.
//!
//! [`CredentialOfferResolver`]: crate::issuance::CredentialOfferResolver
//! [`CredentialRequester`]: crate::issuance::CredentialRequester
//! [`IdentityManager`]: crate::identity::IdentityManager
//! [`SdJwtCredentialProcessor`]: crate::issuance::SdJwtCredentialProcessor
//!
//! ## Presentation
//!
//! 1. *Request resolution*: the [`RequestObjectResolver`] dereferences the request object, its
//!    client metadata and its presentation definition.
//! 2. *Trust*: the [`RequestObjectValidator`] checks the request object according to its
//!    `client_id_scheme`.
//! 3. *Matching*: the [`InputDescriptorHandler`] selects the stored credentials and the
//!    disclosures satisfying the presentation definition.
//!
//! Building and submitting the authorization response is left to the caller.
//!
//! [`RequestObjectResolver`]: crate::core::authorization_request::RequestObjectResolver
//! [`RequestObjectValidator`]: crate::core::authorization_request::RequestObjectValidator
//! [`InputDescriptorHandler`]: crate::holder::InputDescriptorHandler

pub mod config;
pub mod core;
pub mod error;
pub mod holder;
pub mod identity;
pub mod issuance;
pub mod sd_jwt;
pub mod store;
pub mod utils;
pub mod wallet;
