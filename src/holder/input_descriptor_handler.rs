use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::{
    core::input_descriptor::{ConstraintsField, InputDescriptor},
    error::PresentationError,
    issuance::{DisplayCredential, ProcessedCredential},
    sd_jwt::{RevealedClaims, SdJwt},
};

/// A stored credential that satisfies an input descriptor, with the disclosures it would
/// have to reveal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdJwtMatchingCredential {
    pub input_descriptor_id: String,
    pub credential: DisplayCredential,
    /// The disclosed claim values chosen for the descriptor's fields, keyed by claim name.
    pub disclosures: Map<String, Json>,
}

/// The claims of one stored credential, as seen by the matcher.
struct CredentialClaims<'c> {
    credential: &'c ProcessedCredential,
    disclosed: Map<String, Json>,
    all: Map<String, Json>,
}

/// A value a field path resolved to.
struct Candidate<'v> {
    name: &'v str,
    value: &'v Json,
    disclosed: bool,
}

/// Matches stored SD-JWT credentials against the input descriptors of a presentation
/// definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputDescriptorHandler;

impl InputDescriptorHandler {
    /// Every (credential, descriptor) pair where the credential satisfies all required fields of
    /// the descriptor.
    ///
    /// Field paths are looked up among the credential's disclosures first, then among its
    /// always-visible claims. Only values found in disclosures are added to
    /// [SdJwtMatchingCredential::disclosures].
    ///
    /// # Errors
    ///
    /// Fails if any descriptor declares no constraint fields.
    pub fn handle(
        &self,
        input_descriptors: &[InputDescriptor],
        credentials: &[ProcessedCredential],
    ) -> Result<Vec<SdJwtMatchingCredential>, PresentationError> {
        if let Some(empty) = input_descriptors
            .iter()
            .find(|descriptor| descriptor.constraints().fields().is_empty())
        {
            return Err(PresentationError::EmptyConstraintFields(empty.id().to_owned()));
        }

        let credentials: Vec<CredentialClaims> =
            credentials.iter().filter_map(CredentialClaims::decode).collect();

        let mut matches = vec![];
        for descriptor in input_descriptors {
            let fields: Vec<(&ConstraintsField, Option<JSONSchema>)> = descriptor
                .constraints()
                .fields()
                .iter()
                .map(|field| (field, compile_filter(descriptor, field)))
                .collect();

            for claims in &credentials {
                if let Some(disclosures) = claims.match_fields(&fields) {
                    debug!(
                        input_descriptor = descriptor.id(),
                        credential = ?claims.credential.display.id,
                        "credential matches input descriptor"
                    );
                    matches.push(SdJwtMatchingCredential {
                        input_descriptor_id: descriptor.id().to_owned(),
                        credential: claims.credential.display.clone(),
                        disclosures,
                    });
                }
            }
        }

        Ok(matches)
    }
}

fn compile_filter(descriptor: &InputDescriptor, field: &ConstraintsField) -> Option<JSONSchema> {
    match field.validator()? {
        Ok(schema) => Some(schema),
        Err(e) => {
            // An unusable filter can never validate.
            warn!(input_descriptor = descriptor.id(), "invalid field filter: {e}");
            Some(JSONSchema::compile(&Json::Bool(false)).ok()?)
        }
    }
}

impl<'c> CredentialClaims<'c> {
    fn decode(credential: &'c ProcessedCredential) -> Option<Self> {
        match SdJwt::parse(&credential.encoded).and_then(|sd_jwt| sd_jwt.reveal()) {
            Ok(RevealedClaims { claims, disclosed }) => Some(Self {
                credential,
                disclosed,
                all: claims,
            }),
            Err(e) => {
                warn!(credential = ?credential.display.id, "skipping undecodable credential: {e}");
                None
            }
        }
    }

    fn resolve<'v>(&'v self, field: &'v ConstraintsField) -> Vec<Candidate<'v>> {
        field
            .claim_names()
            .filter_map(|name| {
                if let Some(value) = self.disclosed.get(name) {
                    return Some(Candidate {
                        name,
                        value,
                        disclosed: true,
                    });
                }
                self.all.get(name).map(|value| Candidate {
                    name,
                    value,
                    disclosed: false,
                })
            })
            .collect()
    }

    /// The disclosures satisfying `fields`, or `None` if a required field is unsatisfied.
    fn match_fields(
        &self,
        fields: &[(&ConstraintsField, Option<JSONSchema>)],
    ) -> Option<Map<String, Json>> {
        let mut disclosures = Map::new();

        for (field, filter) in fields {
            let candidates = self.resolve(field);
            let chosen = match filter {
                Some(filter) => candidates
                    .into_iter()
                    .rev()
                    .find(|candidate| filter.is_valid(candidate.value)),
                None => candidates.into_iter().next(),
            };

            match chosen {
                Some(candidate) if candidate.disclosed => {
                    disclosures.insert(candidate.name.to_owned(), candidate.value.clone());
                }
                Some(_) => {}
                None if field.is_required() => return None,
                None => debug!(paths = ?field.path(), "optional field unsatisfied"),
            }
        }

        Some(disclosures)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use ssi::claims::jws::Header;

    use super::*;
    use crate::core::{
        input_descriptor::Constraints, jose, presentation_definition::PresentationDefinition,
    };

    fn credential() -> ProcessedCredential {
        let jwk = jose::generate_p256().unwrap();
        let Json::Object(claims) = json!({
            "iss": "https://issuer.example.com",
            "iat": 1700000000,
            "vct": "https://credentials.example.com/identity_credential"
        }) else {
            unreachable!()
        };
        let sd_jwt = SdJwt::issue(
            Header::default(),
            claims,
            &[
                ("given_name", json!("Inga")),
                ("family_name", json!("Silverstone")),
                ("birthdate", json!("1991-11-06")),
            ],
            &jwk,
        )
        .unwrap();

        ProcessedCredential {
            encoded: sd_jwt.to_string(),
            display: DisplayCredential {
                id: Some(1),
                issued_at: 1700000000000,
                ..Default::default()
            },
        }
    }

    fn descriptors(definition: Json) -> Vec<InputDescriptor> {
        PresentationDefinition::try_from(definition)
            .unwrap()
            .input_descriptors()
            .to_vec()
    }

    #[test]
    fn discloses_only_matched_fields() {
        let descriptors = descriptors(json!({
            "id": "given-name",
            "input_descriptors": [{
                "id": "identity",
                "constraints": {
                    "fields": [{ "path": ["$.given_name"], "filter": { "type": "string" } }]
                }
            }]
        }));

        let matches = InputDescriptorHandler
            .handle(&descriptors, &[credential()])
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].input_descriptor_id, "identity");
        assert_eq!(matches[0].credential.id, Some(1));
        assert_eq!(
            Json::Object(matches[0].disclosures.clone()),
            json!({"given_name": "Inga"})
        );
    }

    #[test]
    fn unsatisfied_required_field() {
        let descriptors = descriptors(json!({
            "id": "email",
            "input_descriptors": [{
                "id": "email",
                "constraints": {
                    "fields": [{
                        "path": ["$.vct"],
                        "filter": { "type": "string", "const": "https://credentials.idunion.org/VerifiedEMail" }
                    }]
                }
            }]
        }));

        assert!(InputDescriptorHandler
            .handle(&descriptors, &[credential()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn visible_claims_match_without_disclosure() {
        let descriptors = descriptors(json!({
            "id": "identity",
            "input_descriptors": [{
                "id": "identity",
                "constraints": {
                    "fields": [
                        {
                            "path": ["$.vct"],
                            "filter": { "type": "string", "const": "https://credentials.example.com/identity_credential" }
                        },
                        { "path": ["$.family_name"] },
                        { "path": ["$.nationality"], "optional": true }
                    ]
                }
            }]
        }));

        let matches = InputDescriptorHandler
            .handle(&descriptors, &[credential()])
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            Json::Object(matches[0].disclosures.clone()),
            json!({"family_name": "Silverstone"})
        );
    }

    #[test]
    fn last_validating_path_wins() {
        let field = ConstraintsField::new("$.given_name".into())
            .add_path("$.birthdate".into())
            .set_filter(json!({ "type": "string" }));
        let descriptor = InputDescriptor::new("any".into(), Constraints::new().add_constraint(field));

        let matches = InputDescriptorHandler
            .handle(&[descriptor], &[credential()])
            .unwrap();
        assert_eq!(
            Json::Object(matches[0].disclosures.clone()),
            json!({"birthdate": "1991-11-06"})
        );
    }

    #[test]
    fn empty_fields_are_rejected() {
        let descriptors = descriptors(json!({
            "id": "broken",
            "input_descriptors": [{ "id": "broken", "constraints": {} }]
        }));

        assert!(matches!(
            InputDescriptorHandler.handle(&descriptors, &[]),
            Err(PresentationError::EmptyConstraintFields(id)) if id == "broken"
        ));
    }
}
