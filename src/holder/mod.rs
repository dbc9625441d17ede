pub mod input_descriptor_handler;

pub use input_descriptor_handler::{InputDescriptorHandler, SdJwtMatchingCredential};
