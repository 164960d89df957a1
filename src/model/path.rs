use crate::error::{RelationalError, Result};
use crate::model::{EntityDef, MappingContext, PersistentProperty};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable sequence of properties leading from an aggregate root to a
/// nested property. Paths order lexicographically, so a path sorts before
/// every path it is a prefix of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersistentPropertyPath {
    segments: Vec<PersistentProperty>,
}

impl PersistentPropertyPath {
    pub fn new(segments: Vec<PersistentProperty>) -> Self {
        Self { segments }
    }

    pub fn of(property: PersistentProperty) -> Self {
        Self::new(vec![property])
    }

    pub fn segments(&self) -> &[PersistentProperty] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn leaf(&self) -> Option<&PersistentProperty> {
        self.segments.last()
    }

    pub fn required_leaf(&self) -> Result<&PersistentProperty> {
        self.leaf()
            .ok_or_else(|| RelationalError::invalid_state("Property path has no leaf property"))
    }

    pub fn nested(&self, property: PersistentProperty) -> Self {
        let mut segments = self.segments.clone();
        segments.push(property);
        Self::new(segments)
    }

    pub fn to_dot_path(&self) -> String {
        self.segments.iter().map(|p| p.name.as_str()).join(".")
    }
}

impl fmt::Display for PersistentPropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dot_path())
    }
}

/// A property path bound to the mapping context it was resolved against,
/// giving access to the entity metadata at the end of the path.
#[derive(Debug, Clone)]
pub struct PersistentPropertyPathExtension<'a> {
    context: &'a MappingContext,
    path: PersistentPropertyPath,
}

impl<'a> PersistentPropertyPathExtension<'a> {
    pub fn new(context: &'a MappingContext, path: PersistentPropertyPath) -> Self {
        Self { context, path }
    }

    pub fn path(&self) -> &PersistentPropertyPath {
        &self.path
    }

    /// The entity type the leaf property points to
    pub fn leaf_entity(&self) -> Option<&'a EntityDef> {
        self.path
            .leaf()
            .and_then(|p| p.kind.target_entity())
            .and_then(|name| self.context.get_persistent_entity(name))
    }

    pub fn required_leaf_entity(&self) -> Result<&'a EntityDef> {
        self.leaf_entity().ok_or_else(|| {
            RelationalError::invalid_state(format!(
                "Path '{}' does not lead to a mapped entity",
                self.path
            ))
        })
    }

    pub fn has_id_property(&self) -> bool {
        self.leaf_entity().map_or(false, EntityDef::has_id_property)
    }

    pub fn required_id_property(&self) -> Result<&'a PersistentProperty> {
        self.required_leaf_entity()?.required_id_property()
    }

    pub fn extend_by(&self, property: &PersistentProperty) -> Self {
        Self::new(self.context, self.path.nested(property.clone()))
    }

    pub fn required_persistent_property_path(&self) -> Result<&PersistentPropertyPath> {
        if self.path.is_empty() {
            return Err(RelationalError::invalid_state(
                "No property path available for the aggregate root",
            ));
        }
        Ok(&self.path)
    }
}
