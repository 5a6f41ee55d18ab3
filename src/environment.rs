use serde::Deserialize;
use std::collections::HashMap;

/// Environment variables a catalog entry sets for its process.
///
/// These are overrides only. The launched process inherits the harness's
/// own environment untouched, with these variables set on top.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Environment(HashMap<String, String>);

impl Environment {
    /// Gets the value of an environment variable.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    /// Iterates over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
