//! Ordered list of output field names shared by every rank.

use crate::output_error::OutputError;
use serde::{Deserialize, Serialize};

/// Column names of the surface output, in value order.
///
/// The catalog length is the per-point value count; the `"Point"` id column
/// is implicit and never part of the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FieldCatalog {
    names: Vec<String>,
}

impl FieldCatalog {
    /// Build a catalog; at least one field is required.
    pub fn new<I, S>(names: I) -> Result<Self, OutputError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(OutputError::EmptyCatalog);
        }
        Ok(Self { names })
    }

    /// Number of values per point.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// `true` if no field is named, which a constructed catalog never is.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Position of `name` in the catalog.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

impl TryFrom<Vec<String>> for FieldCatalog {
    type Error = OutputError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        FieldCatalog::new(names)
    }
}

impl From<FieldCatalog> for Vec<String> {
    fn from(catalog: FieldCatalog) -> Self {
        catalog.names
    }
}
