use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A node of an in-memory aggregate graph.
///
/// Sets keep insertion order and never hold two equal elements; use
/// [`Value::set_of`] to build one from arbitrary values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Entity(Entity),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Set(Vec<Value>),
}

impl Value {
    /// Build a set, dropping later duplicates
    pub fn set_of(values: impl IntoIterator<Item = Value>) -> Self {
        let mut elements: Vec<Value> = Vec::new();
        for value in values {
            if !elements.contains(&value) {
                elements.push(value);
            }
        }
        Self::Set(elements)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Entity(_) => "entity",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&[Value]> {
        match self {
            Self::Set(values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "'{}'", s),
            Self::Entity(entity) => write!(f, "{}", entity),
            Self::List(values) => write!(f, "list[{}]", values.len()),
            Self::Map(entries) => write!(f, "map[{}]", entries.len()),
            Self::Set(values) => write!(f, "set[{}]", values.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Entity> for Value {
    fn from(value: Entity) -> Self {
        Self::Entity(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// An instance of a mapped entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property assignment
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns `None` for both missing and null properties.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).filter(|value| !value.is_null())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.properties.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(name.into(), value.into())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.properties.get("id") {
            Some(id) if !id.is_null() => write!(f, "{}#{}", self.type_name, id),
            _ => write!(f, "{}#new", self.type_name),
        }
    }
}
