// Ordered name-or-position keyed parameter collection.

use super::value::Value;
use std::fmt;

/// A parameter key: a name (`from`, `timeout`) or a zero-based position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterKey {
    Name(String),
    Position(usize),
}

impl ParameterKey {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            ParameterKey::Name(name) => Some(name),
            ParameterKey::Position(_) => None,
        }
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKey::Name(name) => f.write_str(name),
            ParameterKey::Position(position) => write!(f, "{position}"),
        }
    }
}

impl From<&str> for ParameterKey {
    fn from(name: &str) -> Self {
        ParameterKey::Name(name.to_string())
    }
}

impl From<String> for ParameterKey {
    fn from(name: String) -> Self {
        ParameterKey::Name(name)
    }
}

impl From<usize> for ParameterKey {
    fn from(position: usize) -> Self {
        ParameterKey::Position(position)
    }
}

/// The parameters of one method invocation.
///
/// Keys are unique; inserting an existing key replaces its value in place.
/// Handlers only ever see `&ParameterBag`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBag {
    entries: Vec<(ParameterKey, Value)>,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bag holding `values` at positions `0..n`.
    pub fn from_positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut bag = Self::new();
        for (position, value) in values.into_iter().enumerate() {
            bag.insert(position, value);
        }
        bag
    }

    /// Builder form of [`ParameterBag::insert`].
    pub fn with(mut self, key: impl Into<ParameterKey>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<ParameterKey>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParameterKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterKey, &Value)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    pub fn contains_key(&self, key: &ParameterKey) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &ParameterKey) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// Shorthand for looking up a named parameter.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_name() == Some(name))
            .map(|(_, value)| value)
    }

    /// The value stored under `key`, or `default` when the key is absent.
    pub fn get_or<'a>(&'a self, key: &ParameterKey, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// Look a parameter up by name, falling back to its positional alias.
    /// The name wins when both are present.
    pub fn get_name_or_position(&self, name: &str, position: usize) -> Option<&Value> {
        self.get_named(name)
            .or_else(|| self.get(&ParameterKey::Position(position)))
    }
}
