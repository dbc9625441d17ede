pub mod authorization_request;
pub mod credential_format;
pub mod credential_offer;
pub mod input_descriptor;
pub mod jose;
pub mod metadata;
pub mod object;
pub mod presentation_definition;
pub mod token;
pub mod util;
