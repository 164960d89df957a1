use crate::error::{RelationalError, Result};
use crate::model::PersistentPropertyPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Integer,
    Float,
    Text,
    Boolean,
    Uuid,
}

/// What a collection-valued property holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Simple(ScalarType),
    Entity(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Simple(ScalarType),
    /// One-to-one reference to an owned entity
    Entity(String),
    List(ElementType),
    Map(ElementType),
    Set(ElementType),
}

impl PropertyKind {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// The entity type reached through this property, if any
    pub fn target_entity(&self) -> Option<&str> {
        match self {
            Self::Entity(name) => Some(name),
            Self::List(ElementType::Entity(name))
            | Self::Map(ElementType::Entity(name))
            | Self::Set(ElementType::Entity(name)) => Some(name),
            _ => None,
        }
    }
}

/// A mapped property of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersistentProperty {
    pub owner: String,
    pub name: String,
    pub kind: PropertyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl PersistentProperty {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            kind,
            column: None,
        }
    }

    pub fn column_name(&self) -> String {
        self.column
            .clone()
            .unwrap_or_else(|| to_snake_case(&self.name))
    }

    pub fn is_entity(&self) -> bool {
        self.kind.target_entity().is_some()
    }
}

/// Mapping metadata for one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_property: Option<String>,
    pub properties: Vec<PersistentProperty>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            id_property: None,
            properties: Vec::new(),
        }
    }

    /// Declare the identifier property
    pub fn with_id(mut self, name: impl Into<String>, scalar: ScalarType) -> Self {
        let name = name.into();
        self.id_property = Some(name.clone());
        self.with_property(name, PropertyKind::Simple(scalar))
    }

    pub fn with_property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        let property = PersistentProperty::new(self.name.clone(), name, kind);
        self.properties.retain(|p| p.name != property.name);
        self.properties.push(property);
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&PersistentProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn required_property(&self, name: &str) -> Result<&PersistentProperty> {
        self.property(name)
            .ok_or_else(|| RelationalError::UnknownProperty {
                entity: self.name.clone(),
                property: name.to_string(),
            })
    }

    pub fn id_property(&self) -> Option<&PersistentProperty> {
        self.id_property.as_deref().and_then(|name| self.property(name))
    }

    pub fn has_id_property(&self) -> bool {
        self.id_property().is_some()
    }

    pub fn required_id_property(&self) -> Result<&PersistentProperty> {
        self.id_property().ok_or_else(|| {
            RelationalError::invalid_state(format!(
                "Required identifier property not found for {}",
                self.name
            ))
        })
    }

    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| to_snake_case(&self.name))
    }
}

/// Registry of all mapped entity types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingContext {
    entities: BTreeMap<String, EntityDef>,
}

impl MappingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.register(entity);
        self
    }

    /// Register an entity type, replacing an earlier definition of the same name
    pub fn register(&mut self, entity: EntityDef) {
        self.entities.insert(entity.name.clone(), entity);
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.values()
    }

    pub fn get_persistent_entity(&self, type_name: &str) -> Option<&EntityDef> {
        self.entities.get(type_name)
    }

    pub fn get_required_persistent_entity(&self, type_name: &str) -> Result<&EntityDef> {
        self.get_persistent_entity(type_name)
            .ok_or_else(|| RelationalError::UnmappedType(type_name.to_string()))
    }

    /// Resolve a dotted path such as `"items.product"` starting at `root_type`
    pub fn persistent_property_path(
        &self,
        root_type: &str,
        dotted: &str,
    ) -> Result<PersistentPropertyPath> {
        let mut owner = self.get_required_persistent_entity(root_type)?;
        let mut segments = Vec::new();
        let mut names = dotted.split('.').filter(|s| !s.is_empty()).peekable();

        while let Some(name) = names.next() {
            let property = owner.required_property(name)?;
            segments.push(property.clone());

            if names.peek().is_some() {
                let target = property.kind.target_entity().ok_or_else(|| {
                    RelationalError::navigation(
                        dotted,
                        format!("'{}' does not lead to an entity", name),
                    )
                })?;
                owner = self.get_required_persistent_entity(target)?;
            }
        }

        Ok(PersistentPropertyPath::new(segments))
    }

    /// Check that identifier names and entity references resolve
    pub fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            if let Some(id_name) = &entity.id_property {
                entity.required_property(id_name)?;
            }
            for property in &entity.properties {
                if let Some(target) = property.kind.target_entity() {
                    self.get_required_persistent_entity(target)?;
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
