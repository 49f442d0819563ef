use std::collections::HashMap;

use crate::value::Value;

/// The single flat namespace of one execution.
///
/// Nested blocks and included scripts all read and write the same store;
/// loop variables are ordinary bindings that outlive their loop.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means the name is undefined, which is distinct from `Null`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All bindings as a JSON object, keys sorted by name.
    pub fn to_json(&self) -> serde_json::Value {
        let mut names: Vec<&String> = self.vars.keys().collect();
        names.sort();
        let map: serde_json::Map<String, serde_json::Value> = names
            .into_iter()
            .map(|name| (name.clone(), self.vars[name].to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for VariableStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}
