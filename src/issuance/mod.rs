//! The OID4VCI pre-authorized code flow: offer resolution, credential request and processing.

pub mod offer_resolver;
pub mod processor;
pub mod requester;

pub use offer_resolver::CredentialOfferResolver;
pub use processor::{DisplayCredential, ProcessedCredential, SdJwtCredentialProcessor};
pub use requester::{CredentialRequestOptions, CredentialRequester};
