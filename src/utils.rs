use std::ops::Deref;

use anyhow::{ensure, Error};
use serde::{Deserialize, Serialize};

/// A [Vec] holding at least one element, enforced on deserialization.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
pub struct NonEmptyVec<T: Clone>(Vec<T>);

impl<T: Clone> NonEmptyVec<T> {
    pub fn new(first: T) -> Self {
        Self(vec![first])
    }

    pub fn push(&mut self, t: T) {
        self.0.push(t)
    }
}

impl<T: Clone> TryFrom<Vec<T>> for NonEmptyVec<T> {
    type Error = Error;

    fn try_from(items: Vec<T>) -> Result<Self, Error> {
        ensure!(!items.is_empty(), "expected at least one element");
        Ok(Self(items))
    }
}

impl<T: Clone> From<NonEmptyVec<T>> for Vec<T> {
    fn from(items: NonEmptyVec<T>) -> Self {
        items.0
    }
}

impl<T: Clone> Deref for NonEmptyVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

/// Current unix time in seconds.
pub(crate) fn unix_timestamp() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
