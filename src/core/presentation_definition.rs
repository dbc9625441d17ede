use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{input_descriptor::InputDescriptor, object::TypedParameter};

/// The verifier's request, as a set of [InputDescriptors](InputDescriptor).
///
/// `submission_requirements` are not evaluated by this library: every input descriptor is
/// matched independently.
///
/// See: <https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition>
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<Json>,
}

impl PresentationDefinition {
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_input_descriptor(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    pub fn input_descriptors(&self) -> &[InputDescriptor] {
        &self.input_descriptors
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    /// The raw `format` object, keyed by claim format designation.
    pub fn format(&self) -> Option<&Json> {
        self.format.as_ref()
    }
}

impl TypedParameter for PresentationDefinition {
    const KEY: &'static str = "presentation_definition";
}

impl TryFrom<Json> for PresentationDefinition {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(value).context("invalid presentation definition")
    }
}

impl TryFrom<PresentationDefinition> for Json {
    type Error = Error;

    fn try_from(value: PresentationDefinition) -> Result<Self, Self::Error> {
        serde_json::to_value(value).context("unable to serialize presentation definition")
    }
}
