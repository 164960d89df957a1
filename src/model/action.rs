use crate::logic::Interpreter;
use crate::model::{Entity, PersistentPropertyPath, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of a single action within an aggregate change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keys (list index, map key or set element) selecting one element of each
/// collection-valued property on the way from the root to an entity
pub type Qualifiers = BTreeMap<PersistentPropertyPath, Value>;

/// An action operating on a concrete entity instance
pub trait WithEntity {
    fn action_id(&self) -> ActionId;

    fn entity(&self) -> &Entity;

    fn entity_type(&self) -> &str {
        &self.entity().type_name
    }
}

/// An action on a non-root entity, which only exists in relation to the
/// action on its parent
pub trait WithDependingOn: WithEntity {
    fn property_path(&self) -> &PersistentPropertyPath;

    fn depending_on(&self) -> &Arc<DbAction>;

    fn qualifiers(&self) -> &Qualifiers;
}

#[derive(Debug, Clone)]
pub struct InsertRoot {
    id: ActionId,
    pub entity: Entity,
}

impl InsertRoot {
    pub fn new(entity: Entity) -> Self {
        Self {
            id: ActionId::new(),
            entity,
        }
    }
}

impl WithEntity for InsertRoot {
    fn action_id(&self) -> ActionId {
        self.id
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }
}

#[derive(Debug, Clone)]
pub struct Insert {
    id: ActionId,
    pub entity: Entity,
    pub property_path: PersistentPropertyPath,
    pub depending_on: Arc<DbAction>,
    pub qualifiers: Qualifiers,
}

impl Insert {
    pub fn new(
        entity: Entity,
        property_path: PersistentPropertyPath,
        depending_on: Arc<DbAction>,
        qualifiers: Qualifiers,
    ) -> Self {
        Self {
            id: ActionId::new(),
            entity,
            property_path,
            depending_on,
            qualifiers,
        }
    }
}

/// Insert-or-update of a dependent entity
#[derive(Debug, Clone)]
pub struct Merge {
    id: ActionId,
    pub entity: Entity,
    pub property_path: PersistentPropertyPath,
    pub depending_on: Arc<DbAction>,
    pub qualifiers: Qualifiers,
}

impl Merge {
    pub fn new(
        entity: Entity,
        property_path: PersistentPropertyPath,
        depending_on: Arc<DbAction>,
        qualifiers: Qualifiers,
    ) -> Self {
        Self {
            id: ActionId::new(),
            entity,
            property_path,
            depending_on,
            qualifiers,
        }
    }
}

macro_rules! impl_depending_on {
    ($action:ty) => {
        impl WithEntity for $action {
            fn action_id(&self) -> ActionId {
                self.id
            }

            fn entity(&self) -> &Entity {
                &self.entity
            }
        }

        impl WithDependingOn for $action {
            fn property_path(&self) -> &PersistentPropertyPath {
                &self.property_path
            }

            fn depending_on(&self) -> &Arc<DbAction> {
                &self.depending_on
            }

            fn qualifiers(&self) -> &Qualifiers {
                &self.qualifiers
            }
        }
    };
}

impl_depending_on!(Insert);
impl_depending_on!(Merge);

#[derive(Debug, Clone)]
pub struct UpdateRoot {
    id: ActionId,
    pub entity: Entity,
}

impl UpdateRoot {
    pub fn new(entity: Entity) -> Self {
        Self {
            id: ActionId::new(),
            entity,
        }
    }
}

impl WithEntity for UpdateRoot {
    fn action_id(&self) -> ActionId {
        self.id
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }
}

#[derive(Debug, Clone)]
pub struct Update {
    id: ActionId,
    pub entity: Entity,
    pub property_path: PersistentPropertyPath,
}

impl Update {
    pub fn new(entity: Entity, property_path: PersistentPropertyPath) -> Self {
        Self {
            id: ActionId::new(),
            entity,
            property_path,
        }
    }
}

impl WithEntity for Update {
    fn action_id(&self) -> ActionId {
        self.id
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }
}

#[derive(Debug, Clone)]
pub struct DeleteRoot {
    id: ActionId,
    pub entity_type: String,
    pub root_id: Value,
}

impl DeleteRoot {
    pub fn new(entity_type: impl Into<String>, root_id: impl Into<Value>) -> Self {
        Self {
            id: ActionId::new(),
            entity_type: entity_type.into(),
            root_id: root_id.into(),
        }
    }
}

/// Deletes all entities at `property_path` below the root with `root_id`
#[derive(Debug, Clone)]
pub struct Delete {
    id: ActionId,
    pub root_id: Value,
    pub property_path: PersistentPropertyPath,
}

impl Delete {
    pub fn new(root_id: impl Into<Value>, property_path: PersistentPropertyPath) -> Self {
        Self {
            id: ActionId::new(),
            root_id: root_id.into(),
            property_path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteAllRoot {
    id: ActionId,
    pub entity_type: String,
}

impl DeleteAllRoot {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            id: ActionId::new(),
            entity_type: entity_type.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteAll {
    id: ActionId,
    pub property_path: PersistentPropertyPath,
}

impl DeleteAll {
    pub fn new(property_path: PersistentPropertyPath) -> Self {
        Self {
            id: ActionId::new(),
            property_path,
        }
    }
}

/// A single step of an aggregate change
#[derive(Debug, Clone)]
pub enum DbAction {
    InsertRoot(InsertRoot),
    Insert(Insert),
    Merge(Merge),
    UpdateRoot(UpdateRoot),
    Update(Update),
    DeleteRoot(DeleteRoot),
    Delete(Delete),
    DeleteAllRoot(DeleteAllRoot),
    DeleteAll(DeleteAll),
}

impl DbAction {
    pub fn id(&self) -> ActionId {
        match self {
            Self::InsertRoot(a) => a.id,
            Self::Insert(a) => a.id,
            Self::Merge(a) => a.id,
            Self::UpdateRoot(a) => a.id,
            Self::Update(a) => a.id,
            Self::DeleteRoot(a) => a.id,
            Self::Delete(a) => a.id,
            Self::DeleteAllRoot(a) => a.id,
            Self::DeleteAll(a) => a.id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InsertRoot(_) => "InsertRoot",
            Self::Insert(_) => "Insert",
            Self::Merge(_) => "Merge",
            Self::UpdateRoot(_) => "UpdateRoot",
            Self::Update(_) => "Update",
            Self::DeleteRoot(_) => "DeleteRoot",
            Self::Delete(_) => "Delete",
            Self::DeleteAllRoot(_) => "DeleteAllRoot",
            Self::DeleteAll(_) => "DeleteAll",
        }
    }

    /// Type of the entity the action operates on. Path based deletes report
    /// the entity type the path leads to.
    pub fn entity_type(&self) -> &str {
        match self {
            Self::InsertRoot(a) => a.entity_type(),
            Self::Insert(a) => a.entity_type(),
            Self::Merge(a) => a.entity_type(),
            Self::UpdateRoot(a) => a.entity_type(),
            Self::Update(a) => a.entity_type(),
            Self::DeleteRoot(a) => &a.entity_type,
            Self::DeleteAllRoot(a) => &a.entity_type,
            Self::Delete(Delete { property_path, .. })
            | Self::DeleteAll(DeleteAll { property_path, .. }) => property_path
                .leaf()
                .and_then(|p| p.kind.target_entity())
                .unwrap_or_default(),
        }
    }

    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Self::InsertRoot(a) => Some(&a.entity),
            Self::Insert(a) => Some(&a.entity),
            Self::Merge(a) => Some(&a.entity),
            Self::UpdateRoot(a) => Some(&a.entity),
            Self::Update(a) => Some(&a.entity),
            _ => None,
        }
    }

    pub fn property_path(&self) -> Option<&PersistentPropertyPath> {
        match self {
            Self::Insert(a) => Some(&a.property_path),
            Self::Merge(a) => Some(&a.property_path),
            Self::Update(a) => Some(&a.property_path),
            Self::Delete(a) => Some(&a.property_path),
            Self::DeleteAll(a) => Some(&a.property_path),
            _ => None,
        }
    }

    pub fn as_depending_on(&self) -> Option<&dyn WithDependingOn> {
        match self {
            Self::Insert(a) => Some(a),
            Self::Merge(a) => Some(a),
            _ => None,
        }
    }

    /// Whether the store may generate an identifier while executing this action
    pub fn generates_id(&self) -> bool {
        matches!(self, Self::InsertRoot(_) | Self::Insert(_) | Self::Merge(_))
    }

    pub fn is_root_insert(&self) -> bool {
        matches!(self, Self::InsertRoot(_))
    }

    /// Hand the action to the interpreter. Returns the identifier generated by
    /// the store, if any.
    pub fn execute_with<I: Interpreter + ?Sized>(
        &self,
        interpreter: &I,
    ) -> anyhow::Result<Option<Value>> {
        match self {
            Self::InsertRoot(a) => interpreter.insert_root(a),
            Self::Insert(a) => interpreter.insert(a),
            Self::Merge(a) => interpreter.merge(a),
            Self::UpdateRoot(a) => interpreter.update_root(a).map(|_| None),
            Self::Update(a) => interpreter.update(a).map(|_| None),
            Self::DeleteRoot(a) => interpreter.delete_root(a).map(|_| None),
            Self::Delete(a) => interpreter.delete(a).map(|_| None),
            Self::DeleteAllRoot(a) => interpreter.delete_all_root(a).map(|_| None),
            Self::DeleteAll(a) => interpreter.delete_all(a).map(|_| None),
        }
    }
}

impl fmt::Display for DbAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.property_path() {
            Some(path) => write!(f, "{}({} -> {})", self.kind_name(), path, self.entity_type()),
            None => write!(f, "{}({})", self.kind_name(), self.entity_type()),
        }
    }
}

macro_rules! impl_from_action {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for DbAction {
                fn from(action: $variant) -> Self {
                    Self::$variant(action)
                }
            }
        )*
    };
}

impl_from_action!(InsertRoot, Insert, Merge, UpdateRoot, Update, DeleteRoot, Delete, DeleteAllRoot, DeleteAll);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementType, PersistentProperty, PropertyKind};

    fn items_path() -> PersistentPropertyPath {
        PersistentPropertyPath::of(PersistentProperty::new(
            "Order",
            "items",
            PropertyKind::List(ElementType::Entity("Item".into())),
        ))
    }

    #[test]
    fn test_action_metadata() {
        let root = Arc::new(DbAction::from(InsertRoot::new(Entity::new("Order"))));
        let mut qualifiers = Qualifiers::new();
        qualifiers.insert(items_path(), Value::Integer(0));
        let insert = DbAction::from(Insert::new(Entity::new("Item"), items_path(), root.clone(), qualifiers));

        assert!(root.generates_id());
        assert!(root.is_root_insert());
        assert!(root.as_depending_on().is_none());
        assert_eq!(insert.entity_type(), "Item");
        assert_eq!(insert.to_string(), "Insert(items -> Item)");

        let dependent = insert.as_depending_on().unwrap();
        assert_eq!(dependent.depending_on().id(), root.id());
        assert_eq!(dependent.qualifiers().get(&items_path()), Some(&Value::Integer(0)));
    }

    #[test]
    fn test_delete_entity_type_from_path() {
        let delete = DbAction::from(Delete::new(42, items_path()));
        assert_eq!(delete.entity_type(), "Item");
        assert!(delete.entity().is_none());
        assert!(!delete.generates_id());
        assert_eq!(DbAction::from(DeleteAllRoot::new("Order")).to_string(), "DeleteAllRoot(Order)");
    }

    #[test]
    fn test_action_ids_are_unique() {
        let a = DbAction::from(UpdateRoot::new(Entity::new("Order")));
        let b = DbAction::from(UpdateRoot::new(Entity::new("Order")));
        assert_ne!(a.id(), b.id());
    }
}
