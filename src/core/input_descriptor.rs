use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};

use crate::utils::NonEmptyVec;

/// A JSONPath is a string that represents a path to a specific value within a JSON object.
///
/// Only the direct member forms `$.key`, `$['key']` and `$["key"]` are resolved by this library.
///
/// For syntax details, see [https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition)
pub type JsonPath = String;

/// Resolve a [JsonPath] to the top-level claim name it selects.
///
/// Returns `None` for any path that is not a direct member of the root object, e.g. nested,
/// wildcard or array paths.
///
/// ```
/// # use openid4vc_holder::core::input_descriptor::claim_name;
/// assert_eq!(claim_name("$.given_name"), Some("given_name"));
/// assert_eq!(claim_name("$['family_name']"), Some("family_name"));
/// assert_eq!(claim_name("$.address.country"), None);
/// assert_eq!(claim_name("$.nationalities[0]"), None);
/// ```
pub fn claim_name(path: &str) -> Option<&str> {
    let rest = path.strip_prefix('$')?;
    let name = if let Some(name) = rest.strip_prefix('.') {
        name
    } else {
        let quoted = rest.strip_prefix('[')?.strip_suffix(']')?;
        quoted
            .strip_prefix('\'')
            .and_then(|q| q.strip_suffix('\''))
            .or_else(|| quoted.strip_prefix('"').and_then(|q| q.strip_suffix('"')))?
    };

    let is_member = !name.is_empty() && !name.contains(['.', '[', ']', '*', '\'', '"']);
    is_member.then_some(name)
}

/// What the verifier requires of one credential.
///
/// See: <https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object>
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    id: String,
    #[serde(default)]
    constraints: Constraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
}

impl InputDescriptor {
    pub fn new(id: String, constraints: Constraints) -> Self {
        Self {
            id,
            constraints,
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Human readable purpose of the request, for display to the user.
    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }
}

/// The field constraints of an [InputDescriptor]. A missing `fields` member reads as empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit_disclosure: Option<LimitDisclosure>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[ConstraintsField] {
        &self.fields
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LimitDisclosure {
    Required,
    Preferred,
}

/// A single claim requirement: candidate paths, an optional JSON Schema `filter` applied to
/// the resolved value, and whether the claim may be left out.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintsField {
    path: NonEmptyVec<JsonPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
}

impl ConstraintsField {
    pub fn new(path: JsonPath) -> Self {
        Self {
            path: NonEmptyVec::new(path),
            ..Default::default()
        }
    }

    pub fn add_path(mut self, path: JsonPath) -> Self {
        self.path.push(path);
        self
    }

    pub fn set_filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    pub fn path(&self) -> &NonEmptyVec<JsonPath> {
        &self.path
    }

    /// Compile the `filter`, if any.
    pub fn validator(&self) -> Option<Result<JSONSchema, ValidationError>> {
        self.filter.as_ref().map(JSONSchema::compile)
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or_default()
    }

    pub fn is_required(&self) -> bool {
        !self.is_optional()
    }

    /// The claim names selected by the field's paths, in path order.
    pub fn claim_names(&self) -> impl Iterator<Item = &str> {
        self.path.iter().filter_map(|path| claim_name(path))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn member_paths() {
        assert_eq!(claim_name("$[\"vct\"]"), Some("vct"));
        assert_eq!(claim_name("$.*"), None);
        assert_eq!(claim_name("$..given_name"), None);
        assert_eq!(claim_name("given_name"), None);
        assert_eq!(claim_name("$"), None);
    }

    #[test]
    fn missing_fields_deserialize_empty() {
        let descriptor: InputDescriptor =
            serde_json::from_value(json!({"id": "pid", "constraints": {}})).unwrap();
        assert!(descriptor.constraints().fields().is_empty());
    }

    #[test]
    fn field_paths_resolve_in_order() {
        let field = ConstraintsField::new("$.vc.given_name".into())
            .add_path("$.given_name".into())
            .add_path("$['first_name']".into());
        assert_eq!(
            field.claim_names().collect::<Vec<_>>(),
            vec!["given_name", "first_name"]
        );
        assert!(field.is_required());
    }
}
