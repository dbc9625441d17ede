use anyhow::{bail, Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A JSON object as received from a verifier, read through [TypedParameters](TypedParameter).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UntypedObject(pub(crate) Map<String, Json>);

/// A parameter stored under a fixed key of an [UntypedObject].
pub trait TypedParameter:
    TryFrom<Json, Error = anyhow::Error> + TryInto<Json> + Clone + std::fmt::Debug
{
    const KEY: &'static str;
}

impl UntypedObject {
    /// Parse `T` from a clone of its value, if the key is present.
    pub fn get<T: TypedParameter>(&self) -> Option<Result<T>> {
        let value = self.0.get(T::KEY)?.clone();
        Some(T::try_from(value))
    }

    /// Store `t` under its key, returning the parameter it replaced.
    pub fn insert<T: TypedParameter>(&mut self, t: T) -> Option<Result<T>> {
        let Ok(value) = t.try_into() else {
            return Some(Err(Error::msg(format!("'{}' could not be serialized", T::KEY))));
        };
        let previous = self.0.insert(T::KEY.to_owned(), value)?;
        Some(T::try_from(previous))
    }
}

impl From<UntypedObject> for Json {
    fn from(value: UntypedObject) -> Self {
        Json::Object(value.0)
    }
}

impl TryFrom<Json> for UntypedObject {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self> {
        match value {
            Json::Object(map) => Ok(Self(map)),
            other => bail!("expected a JSON object, found '{other}'"),
        }
    }
}

/// Attaches the parameter key to errors from missing or unparsable parameters.
pub trait ParsingErrorContext {
    type T: TypedParameter;

    fn parsing_error(self) -> Result<Self::T>;
}

impl<T: TypedParameter> ParsingErrorContext for Option<Result<T>> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.with_context(|| format!("'{}' is missing", T::KEY))?
            .parsing_error()
    }
}

impl<T: TypedParameter> ParsingErrorContext for Result<T> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.with_context(|| format!("'{}' could not be parsed", T::KEY))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::core::authorization_request::parameters::{ClientId, Nonce, State};

    #[test]
    fn typed_access() {
        let mut object =
            UntypedObject::try_from(json!({ "client_id": "verifier", "nonce": 7 })).unwrap();

        let ClientId(client_id) = object.get::<ClientId>().parsing_error().unwrap();
        assert_eq!(client_id, "verifier");

        let error = object.get::<Nonce>().parsing_error().unwrap_err();
        assert_eq!(error.to_string(), "'nonce' could not be parsed");
        let error = object.get::<State>().parsing_error().unwrap_err();
        assert_eq!(error.to_string(), "'state' is missing");

        let replaced = object.insert(ClientId("other".into())).unwrap().unwrap();
        assert_eq!(replaced, ClientId("verifier".into()));
        assert!(UntypedObject::try_from(json!([])).is_err());
    }
}
