use crate::error::{RelationalError, Result};
use crate::logic::{HandlerFactory, Interpreter, PropertyAccessor, RelationalConverter, TraversalContext};
use crate::model::{
    ActionId, DbAction, Entity, EntityDef, MappingContext, PersistentPropertyPathExtension, Value,
    WithDependingOn, WithEntity,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The kind of action to be performed on an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    /// Insert or update of the root plus inserts, updates and deletes of the
    /// other entities of the aggregate
    Save,
    /// Delete of all entities of the aggregate
    Delete,
}

/// The change happening to an aggregate as a whole: an ordered list of
/// database actions plus the aggregate root they apply to.
#[derive(Debug, Clone)]
pub struct AggregateChange {
    kind: Kind,
    /// Type of the aggregate root to be changed
    entity_type: String,
    actions: Vec<Arc<DbAction>>,
    /// Aggregate root the change applies to, if available
    entity: Option<Entity>,
}

impl AggregateChange {
    pub fn new(kind: Kind, entity_type: impl Into<String>, entity: Option<Entity>) -> Self {
        Self {
            kind,
            entity_type: entity_type.into(),
            actions: Vec::new(),
            entity,
        }
    }

    pub fn save(entity: Entity) -> Self {
        let entity_type = entity.type_name.clone();
        Self::new(Kind::Save, entity_type, Some(entity))
    }

    pub fn delete(entity_type: impl Into<String>, entity: Option<Entity>) -> Self {
        Self::new(Kind::Delete, entity_type, entity)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn actions(&self) -> &[Arc<DbAction>] {
        &self.actions
    }

    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    pub fn set_entity(&mut self, aggregate_root: Option<Entity>) {
        self.entity = aggregate_root;
    }

    pub fn into_entity(self) -> Option<Entity> {
        self.entity
    }

    /// Append an action. The returned handle lets dependent actions refer to it.
    pub fn add_action(&mut self, action: impl Into<DbAction>) -> Arc<DbAction> {
        let action = Arc::new(action.into());
        self.actions.push(action.clone());
        action
    }

    /// Execute all actions in order and write generated ids back into the
    /// aggregate.
    ///
    /// Stops at the first failing action. The held entity is replaced by the
    /// accessor's bean in either case, so ids assigned before the failure
    /// remain visible.
    pub fn execute_with<I, C>(
        &mut self,
        interpreter: &I,
        context: &MappingContext,
        converter: &C,
    ) -> Result<()>
    where
        I: Interpreter + ?Sized,
        C: RelationalConverter + ?Sized,
    {
        let persistent_entity = match &self.entity {
            Some(entity) => Some(context.get_required_persistent_entity(&entity.type_name)?),
            None => None,
        };

        let mut accessor = match (persistent_entity, &self.entity) {
            (Some(def), Some(entity)) => Some(converter.property_accessor(def, entity.clone())?),
            _ => None,
        };

        let mut propagation = IdPropagation {
            context,
            converter,
            root_type: &self.entity_type,
            root_entity: persistent_entity,
            set_elements: tracked_set_elements(&self.actions),
        };

        let outcome = self.actions.iter().try_for_each(|action| {
            debug!("Executing {}", action);
            let generated_id = action.execute_with(interpreter)?;
            propagation.process(accessor.as_deref_mut(), action, generated_id)
        });

        if let Some(accessor) = accessor {
            self.entity = Some(accessor.into_bean());
        }

        match &outcome {
            Ok(()) => info!(
                "Executed {} actions for {:?} of {}",
                self.actions.len(),
                self.kind,
                self.entity_type
            ),
            Err(err) => warn!("{:?} of {} failed: {}", self.kind, self.entity_type, err),
        }
        outcome
    }
}

/// Dependent actions whose entity sits in a set. Set elements are addressed
/// by equality, so their current form is tracked while ids are written.
fn tracked_set_elements(actions: &[Arc<DbAction>]) -> HashMap<ActionId, Entity> {
    actions
        .iter()
        .filter_map(|action| action.as_depending_on())
        .filter(|dependent| {
            dependent
                .property_path()
                .leaf()
                .map_or(false, |leaf| leaf.kind.is_set())
        })
        .map(|dependent| (dependent.action_id(), dependent.entity().clone()))
        .collect()
}

/// State for writing generated ids during one `execute_with` call
struct IdPropagation<'a, C: ?Sized> {
    context: &'a MappingContext,
    converter: &'a C,
    root_type: &'a str,
    root_entity: Option<&'a EntityDef>,
    set_elements: HashMap<ActionId, Entity>,
}

impl<'a, C: RelationalConverter + ?Sized> IdPropagation<'a, C> {
    fn process(
        &mut self,
        accessor: Option<&mut (dyn PropertyAccessor + 'static)>,
        action: &DbAction,
        generated_id: Option<Value>,
    ) -> Result<()> {
        if !action.generates_id() {
            return Ok(());
        }

        let root_entity = self.root_entity.ok_or_else(|| {
            RelationalError::invalid_state(
                "For statements triggering database side id generation a persistent entity must be provided",
            )
        })?;
        let accessor = accessor
            .ok_or_else(|| RelationalError::invalid_state("Property accessor must not be missing"))?;

        let generated_id = match generated_id {
            Some(id) if !id.is_null() => id,
            _ => {
                debug!("No id generated for {}", action);
                return Ok(());
            }
        };

        if action.is_root_insert() {
            if action.entity_type() != self.root_type {
                warn!(
                    "Ignoring id generated for {}; aggregate root type is {}",
                    action, self.root_type
                );
                return Ok(());
            }
            let id_property = root_entity.required_id_property()?;
            let converted = self.converter.read_value(generated_id, &id_property.kind)?;
            debug!("Setting root id {}.{} = {}", self.root_type, id_property.name, converted);
            return accessor.set_simple_property(id_property, converted);
        }

        match action.as_depending_on() {
            Some(dependent) => self.set_id_of_non_root_entity(accessor, dependent, generated_id),
            None => Ok(()),
        }
    }

    fn set_id_of_non_root_entity(
        &mut self,
        accessor: &mut dyn PropertyAccessor,
        action: &dyn WithDependingOn,
        generated_id: Value,
    ) -> Result<()> {
        let path_to_entity = action.property_path();
        let extension = PersistentPropertyPathExtension::new(self.context, path_to_entity.clone());

        let (mut traversal, set_links) = self.create_traversal_context(action)?;

        if accessor.get_property(path_to_entity, &traversal)?.is_none() {
            return Err(RelationalError::invalid_state(format!(
                "Trying to set an ID for an element that does not exist at '{}'",
                path_to_entity
            )));
        }

        if !extension.has_id_property() {
            debug!("{} has no id property; nothing to set", action.entity_type());
            return Ok(());
        }

        let id_property = extension.required_id_property()?;
        let path_to_id = extension.extend_by(id_property);
        let converted = self.converter.read_value(generated_id, &id_property.kind)?;

        debug!("Setting {} = {}", path_to_id.path(), converted);
        accessor.set_property(
            path_to_id.required_persistent_property_path()?,
            converted,
            &mut traversal,
        )?;

        for (old, new) in traversal.replacements() {
            self.track_replacement(&set_links, old, new);
        }
        Ok(())
    }

    /// Register element handlers for the whole dependency chain, outermost
    /// ancestor first, so each action's own set handler comes after those of
    /// its ancestors. Also returns the chain's actions that sit in a set.
    fn create_traversal_context(
        &self,
        action: &dyn WithDependingOn,
    ) -> Result<(TraversalContext, Vec<ActionId>)> {
        let mut chain = vec![action];
        let mut parent = action.depending_on();
        while let Some(ancestor) = parent.as_depending_on() {
            chain.push(ancestor);
            parent = ancestor.depending_on();
        }

        let mut traversal = TraversalContext::new();
        let mut set_links = Vec::new();
        for link in chain.into_iter().rev() {
            for (qualifier_path, key) in link.qualifiers() {
                let leaf = qualifier_path.required_leaf()?;
                HandlerFactory::register_handler_for(&mut traversal, leaf, key)?;
            }

            let leaf = link.property_path().required_leaf()?;
            if leaf.kind.is_set() {
                traversal.register_set_handler(leaf.clone(), Value::Entity(self.current_form(link)));
                set_links.push(link.action_id());
            }
        }
        Ok((traversal, set_links))
    }

    fn current_form(&self, action: &dyn WithDependingOn) -> Entity {
        self.set_elements
            .get(&action.action_id())
            .cloned()
            .unwrap_or_else(|| action.entity().clone())
    }

    /// Only the set elements written through this chain changed. Equal
    /// elements in sets under other parents keep their form.
    fn track_replacement(&mut self, set_links: &[ActionId], old: &Value, new: &Value) {
        let (Value::Entity(old), Value::Entity(new)) = (old, new) else {
            return;
        };
        for link in set_links {
            if let Some(form) = self.set_elements.get_mut(link) {
                if form == old {
                    *form = new.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::BasicRelationalConverter;
    use crate::model::{
        Delete, DeleteAll, DeleteAllRoot, DeleteRoot, ElementType, Insert, InsertRoot, Merge,
        PropertyKind, Qualifiers, ScalarType, Update, UpdateRoot,
    };
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::collections::{BTreeMap, VecDeque};

    /// Hands out scripted ids and records the order of execution
    #[derive(Default)]
    struct ScriptedInterpreter {
        ids: RefCell<VecDeque<Option<Value>>>,
        executed: RefCell<Vec<String>>,
        fail_on_update: bool,
    }

    impl ScriptedInterpreter {
        fn with_ids(ids: Vec<Option<Value>>) -> Self {
            Self {
                ids: RefCell::new(ids.into()),
                ..Default::default()
            }
        }

        fn next_id(&self, what: &str) -> anyhow::Result<Option<Value>> {
            self.executed.borrow_mut().push(what.to_string());
            Ok(self.ids.borrow_mut().pop_front().flatten())
        }

        fn record(&self, what: &str) -> anyhow::Result<()> {
            self.executed.borrow_mut().push(what.to_string());
            Ok(())
        }
    }

    impl Interpreter for ScriptedInterpreter {
        fn insert_root(&self, _: &InsertRoot) -> anyhow::Result<Option<Value>> {
            self.next_id("insert_root")
        }
        fn insert(&self, _: &Insert) -> anyhow::Result<Option<Value>> {
            self.next_id("insert")
        }
        fn merge(&self, _: &Merge) -> anyhow::Result<Option<Value>> {
            self.next_id("merge")
        }
        fn update_root(&self, _: &UpdateRoot) -> anyhow::Result<()> {
            if self.fail_on_update {
                return Err(anyhow!("update rejected"));
            }
            self.record("update_root")
        }
        fn update(&self, _: &Update) -> anyhow::Result<()> {
            self.record("update")
        }
        fn delete_root(&self, _: &DeleteRoot) -> anyhow::Result<()> {
            self.record("delete_root")
        }
        fn delete(&self, _: &Delete) -> anyhow::Result<()> {
            self.record("delete")
        }
        fn delete_all_root(&self, _: &DeleteAllRoot) -> anyhow::Result<()> {
            self.record("delete_all_root")
        }
        fn delete_all(&self, _: &DeleteAll) -> anyhow::Result<()> {
            self.record("delete_all")
        }
    }

    fn mapping() -> MappingContext {
        MappingContext::new()
            .with_entity(
                EntityDef::new("Order")
                    .with_id("id", ScalarType::Integer)
                    .with_property("total", PropertyKind::Simple(ScalarType::Integer))
                    .with_property("items", PropertyKind::List(ElementType::Entity("Item".into())))
                    .with_property("notes", PropertyKind::Map(ElementType::Entity("Note".into())))
                    .with_property("tags", PropertyKind::Set(ElementType::Entity("Tag".into())))
                    .with_property("memo", PropertyKind::Entity("Memo".into())),
            )
            .with_entity(
                EntityDef::new("Item")
                    .with_id("id", ScalarType::Integer)
                    .with_property("tags", PropertyKind::Set(ElementType::Entity("Tag".into()))),
            )
            .with_entity(EntityDef::new("Note").with_id("id", ScalarType::Text))
            .with_entity(
                EntityDef::new("Tag")
                    .with_id("id", ScalarType::Integer)
                    .with_property("label", PropertyKind::Simple(ScalarType::Text))
                    .with_property("children", PropertyKind::List(ElementType::Entity("Item".into()))),
            )
            .with_entity(EntityDef::new("Memo").with_property("text", PropertyKind::Simple(ScalarType::Text)))
    }

    fn qualifiers(context: &MappingContext, entries: &[(&str, Value)]) -> Qualifiers {
        entries
            .iter()
            .map(|(path, key)| (context.persistent_property_path("Order", path).unwrap(), key.clone()))
            .collect()
    }

    fn item(name: &str) -> Value {
        Value::Entity(Entity::new("Item").with("name", name))
    }

    #[test]
    fn test_root_insert_sets_root_id() {
        let context = mapping();
        let mut change = AggregateChange::save(Entity::new("Order").with("total", 100));
        change.add_action(InsertRoot::new(Entity::new("Order").with("total", 100)));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(42))]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        let order = change.entity().unwrap();
        assert_eq!(order.get("id"), Some(&Value::Integer(42)));
        assert_eq!(order.get("total"), Some(&Value::Integer(100)));
    }

    #[test]
    fn test_list_element_receives_id_at_its_index_only() {
        let context = mapping();
        let order = Entity::new("Order").with(
            "items",
            Value::List(vec![
                Value::Entity(Entity::new("Item").with("id", 1).with("name", "a")),
                Value::Entity(Entity::new("Item").with("id", 2).with("name", "b")),
                item("c"),
            ]),
        );
        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(InsertRoot::new(order));
        change.add_action(Insert::new(
            Entity::new("Item").with("name", "c"),
            context.persistent_property_path("Order", "items").unwrap(),
            root,
            qualifiers(&context, &[("items", Value::Integer(2))]),
        ));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(42)), Some(Value::Integer(7))]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        let order = change.entity().unwrap();
        assert_eq!(order.get("id"), Some(&Value::Integer(42)));
        let items = order.get("items").unwrap().as_list().unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.as_entity().unwrap().get("id").cloned()).collect();
        assert_eq!(ids, vec![Some(Value::Integer(1)), Some(Value::Integer(2)), Some(Value::Integer(7))]);
    }

    #[test]
    fn test_map_entry_receives_converted_id() {
        let context = mapping();
        let mut notes = BTreeMap::new();
        notes.insert("first".to_string(), Value::Entity(Entity::new("Note").with("body", "x")));
        notes.insert("second".to_string(), Value::Entity(Entity::new("Note").with("body", "y")));
        let order = Entity::new("Order").with("id", 1).with("notes", Value::Map(notes));

        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(UpdateRoot::new(order));
        change.add_action(Insert::new(
            Entity::new("Note").with("body", "y"),
            context.persistent_property_path("Order", "notes").unwrap(),
            root,
            qualifiers(&context, &[("notes", Value::from("second"))]),
        ));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(5))]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        let notes = change.entity().unwrap().get("notes").unwrap().as_map().unwrap();
        assert_eq!(notes["second"].as_entity().unwrap().get("id"), Some(&Value::from("5")));
        assert!(notes["first"].as_entity().unwrap().get("id").is_none());
    }

    #[test]
    fn test_set_element_is_replaced() {
        let context = mapping();
        let red = Entity::new("Tag").with("label", "red");
        let blue = Entity::new("Tag").with("label", "blue");
        let order = Entity::new("Order").with("id", 1).with(
            "tags",
            Value::set_of(vec![Value::Entity(red.clone()), Value::Entity(blue.clone())]),
        );

        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(UpdateRoot::new(order));
        change.add_action(Insert::new(
            red.clone(),
            context.persistent_property_path("Order", "tags").unwrap(),
            root,
            Qualifiers::new(),
        ));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(3))]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        let tags = change.entity().unwrap().get("tags").unwrap().as_set().unwrap();
        assert_eq!(
            tags,
            &[Value::Entity(blue), Value::Entity(red.with("id", 3))]
        );
    }

    #[test]
    fn test_child_of_set_element_after_parent_got_its_id() {
        let context = mapping();
        let tag = Entity::new("Tag")
            .with("label", "red")
            .with("children", Value::List(vec![item("x")]));
        let order = Entity::new("Order").with("id", 1).with("tags", Value::set_of(vec![Value::Entity(tag.clone())]));

        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(UpdateRoot::new(order));
        let tag_insert = change.add_action(Insert::new(
            tag,
            context.persistent_property_path("Order", "tags").unwrap(),
            root,
            Qualifiers::new(),
        ));
        change.add_action(Insert::new(
            Entity::new("Item").with("name", "x"),
            context.persistent_property_path("Order", "tags.children").unwrap(),
            tag_insert,
            qualifiers(&context, &[("tags.children", Value::Integer(0))]),
        ));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(5)), Some(Value::Integer(9))]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        let tags = change.entity().unwrap().get("tags").unwrap().as_set().unwrap();
        assert_eq!(tags.len(), 1);
        let tag = tags[0].as_entity().unwrap();
        assert_eq!(tag.get("id"), Some(&Value::Integer(5)));
        let child = tag.get("children").unwrap().as_list().unwrap()[0].as_entity().unwrap();
        assert_eq!(child.get("id"), Some(&Value::Integer(9)));
    }

    fn red_tag() -> Entity {
        Entity::new("Tag").with("label", "red")
    }

    fn item_tagged(tag: &Entity) -> Value {
        Value::Entity(Entity::new("Item").with("tags", Value::set_of(vec![Value::Entity(tag.clone())])))
    }

    fn tag_ids(order: &Entity) -> Vec<Option<Value>> {
        order
            .get("items")
            .unwrap()
            .as_list()
            .unwrap()
            .iter()
            .map(|item| {
                let tags = item.as_entity().unwrap().get("tags").unwrap().as_set().unwrap();
                assert_eq!(tags.len(), 1);
                tags[0].as_entity().unwrap().get("id").cloned()
            })
            .collect()
    }

    #[test]
    fn test_equal_set_elements_under_different_list_parents() {
        let context = mapping();
        let order = Entity::new("Order").with("items", Value::List(vec![item_tagged(&red_tag()), item_tagged(&red_tag())]));

        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(InsertRoot::new(order));
        for index in 0..2 {
            let item_insert = change.add_action(Insert::new(
                Entity::new("Item"),
                context.persistent_property_path("Order", "items").unwrap(),
                root.clone(),
                qualifiers(&context, &[("items", Value::Integer(index))]),
            ));
            change.add_action(Insert::new(
                red_tag(),
                context.persistent_property_path("Order", "items.tags").unwrap(),
                item_insert,
                qualifiers(&context, &[("items", Value::Integer(index))]),
            ));
        }

        let ids = [1, 10, 20, 11, 21].map(|id| Some(Value::Integer(id))).to_vec();
        let interpreter = ScriptedInterpreter::with_ids(ids);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        let order = change.entity().unwrap();
        assert_eq!(tag_ids(order), vec![Some(Value::Integer(20)), Some(Value::Integer(21))]);
        let items = order.get("items").unwrap().as_list().unwrap();
        assert_eq!(items[0].as_entity().unwrap().get("id"), Some(&Value::Integer(10)));
        assert_eq!(items[1].as_entity().unwrap().get("id"), Some(&Value::Integer(11)));
    }

    #[test]
    fn test_list_below_equal_set_elements_under_qualified_parents() {
        let context = mapping();
        let tag = red_tag().with("children", Value::List(vec![item("x")]));
        let order = Entity::new("Order").with("items", Value::List(vec![item_tagged(&tag), item_tagged(&tag)]));

        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(InsertRoot::new(order));
        for index in 0..2 {
            let item_insert = change.add_action(Insert::new(
                Entity::new("Item"),
                context.persistent_property_path("Order", "items").unwrap(),
                root.clone(),
                qualifiers(&context, &[("items", Value::Integer(index))]),
            ));
            let tag_insert = change.add_action(Insert::new(
                tag.clone(),
                context.persistent_property_path("Order", "items.tags").unwrap(),
                item_insert,
                qualifiers(&context, &[("items", Value::Integer(index))]),
            ));
            change.add_action(Insert::new(
                Entity::new("Item").with("name", "x"),
                context.persistent_property_path("Order", "items.tags.children").unwrap(),
                tag_insert,
                qualifiers(
                    &context,
                    &[("items", Value::Integer(index)), ("items.tags.children", Value::Integer(0))],
                ),
            ));
        }

        let ids = [1, 10, 20, 30, 11, 21, 31].map(|id| Some(Value::Integer(id))).to_vec();
        let interpreter = ScriptedInterpreter::with_ids(ids);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        let order = change.entity().unwrap();
        assert_eq!(tag_ids(order), vec![Some(Value::Integer(20)), Some(Value::Integer(21))]);
        let child_ids: Vec<_> = order
            .get("items")
            .unwrap()
            .as_list()
            .unwrap()
            .iter()
            .map(|item| {
                let tags = item.as_entity().unwrap().get("tags").unwrap().as_set().unwrap();
                let children = tags[0].as_entity().unwrap().get("children").unwrap().as_list().unwrap();
                children[0].as_entity().unwrap().get("id").cloned()
            })
            .collect();
        assert_eq!(child_ids, vec![Some(Value::Integer(30)), Some(Value::Integer(31))]);
    }

    #[test]
    fn test_null_generated_id_changes_nothing() {
        let context = mapping();
        let order = Entity::new("Order").with("total", 1);
        let mut change = AggregateChange::save(order.clone());
        change.add_action(InsertRoot::new(order.clone()));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Null)]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();
        assert_eq!(change.entity(), Some(&order));
    }

    #[test]
    fn test_absent_target_is_an_invalid_state() {
        let context = mapping();
        let order = Entity::new("Order").with("items", Value::List(vec![item("a")]));
        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(InsertRoot::new(order));
        change.add_action(Insert::new(
            Entity::new("Item").with("name", "b"),
            context.persistent_property_path("Order", "items").unwrap(),
            root,
            qualifiers(&context, &[("items", Value::Integer(4))]),
        ));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(1)), Some(Value::Integer(2))]);
        let result = change.execute_with(&interpreter, &context, &BasicRelationalConverter);

        assert!(matches!(result, Err(RelationalError::InvalidState(_))));
        // the root id assigned before the failure stays visible
        assert_eq!(change.entity().unwrap().get("id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_entity_without_id_property_is_left_alone() {
        let context = mapping();
        let order = Entity::new("Order").with("id", 1).with("memo", Entity::new("Memo").with("text", "hi"));
        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(UpdateRoot::new(order.clone()));
        change.add_action(Insert::new(
            Entity::new("Memo").with("text", "hi"),
            context.persistent_property_path("Order", "memo").unwrap(),
            root,
            Qualifiers::new(),
        ));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(77))]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();
        assert_eq!(change.entity(), Some(&order));
    }

    #[test]
    fn test_generated_id_without_entity_is_an_invalid_state() {
        let context = mapping();
        let mut change = AggregateChange::new(Kind::Save, "Order", None);
        change.add_action(InsertRoot::new(Entity::new("Order")));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(1))]);
        let result = change.execute_with(&interpreter, &context, &BasicRelationalConverter);
        assert!(matches!(result, Err(RelationalError::InvalidState(_))));
    }

    #[test]
    fn test_root_insert_of_other_type_is_ignored() {
        let context = mapping();
        let order = Entity::new("Order");
        let mut change = AggregateChange::save(order.clone());
        change.add_action(InsertRoot::new(Entity::new("Item")));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::Integer(8))]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();
        assert_eq!(change.entity(), Some(&order));
    }

    #[test]
    fn test_interpreter_failure_stops_execution() {
        let context = mapping();
        let order = Entity::new("Order").with("id", 1);
        let mut change = AggregateChange::save(order.clone());
        change.add_action(UpdateRoot::new(order.clone()));
        change.add_action(DeleteAll::new(context.persistent_property_path("Order", "items").unwrap()));

        let interpreter = ScriptedInterpreter {
            fail_on_update: true,
            ..Default::default()
        };
        let err = change
            .execute_with(&interpreter, &context, &BasicRelationalConverter)
            .unwrap_err();

        assert!(matches!(err, RelationalError::Interpreter(_)));
        assert_eq!(err.to_string(), "update rejected");
        assert!(interpreter.executed.borrow().is_empty());
    }

    #[test]
    fn test_delete_change_runs_actions_in_order() {
        let context = mapping();
        let mut change = AggregateChange::delete("Order", None);
        change.add_action(Delete::new(1, context.persistent_property_path("Order", "items").unwrap()));
        change.add_action(DeleteRoot::new("Order", 1));
        change.add_action(DeleteAllRoot::new("Order"));

        let interpreter = ScriptedInterpreter::default();
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        assert_eq!(change.kind(), Kind::Delete);
        assert_eq!(*interpreter.executed.borrow(), vec!["delete", "delete_root", "delete_all_root"]);
        assert!(change.entity().is_none());
    }

    #[test]
    fn test_executing_without_actions_keeps_entity() {
        let context = mapping();
        let order = Entity::new("Order").with("id", 3);
        let mut change = AggregateChange::save(order.clone());

        let interpreter = ScriptedInterpreter::default();
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();
        assert_eq!(change.entity(), Some(&order));
    }

    #[test]
    fn test_unmapped_root_type_fails_before_any_action() {
        let context = mapping();
        let mut change = AggregateChange::save(Entity::new("Invoice"));
        change.add_action(DeleteAllRoot::new("Invoice"));

        let interpreter = ScriptedInterpreter::default();
        let result = change.execute_with(&interpreter, &context, &BasicRelationalConverter);
        assert!(matches!(result, Err(RelationalError::UnmappedType(_))));
        assert!(interpreter.executed.borrow().is_empty());
    }

    #[test]
    fn test_merge_propagates_like_insert() {
        let context = mapping();
        let order = Entity::new("Order").with("id", 1).with("items", Value::List(vec![item("a")]));
        let mut change = AggregateChange::save(order.clone());
        let root = change.add_action(UpdateRoot::new(order));
        change.add_action(Merge::new(
            Entity::new("Item").with("name", "a"),
            context.persistent_property_path("Order", "items").unwrap(),
            root,
            qualifiers(&context, &[("items", Value::Integer(0))]),
        ));

        let interpreter = ScriptedInterpreter::with_ids(vec![Some(Value::from("12"))]);
        change.execute_with(&interpreter, &context, &BasicRelationalConverter).unwrap();

        let items = change.entity().unwrap().get("items").unwrap().as_list().unwrap();
        assert_eq!(items[0].as_entity().unwrap().get("id"), Some(&Value::Integer(12)));
    }
}
