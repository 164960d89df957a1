use crate::error::{RelationalError, Result};
use crate::logic::AggregateChange;
use crate::model::{
    DbAction, Delete, DeleteRoot, Entity, EntityDef, Insert, InsertRoot, MappingContext,
    PersistentPropertyPath, Qualifiers, UpdateRoot, Value,
};
use log::debug;
use std::sync::Arc;

/// Build the change saving `root` and everything it contains.
///
/// A root without an id is inserted. A root with an id is updated, after
/// all of its dependent rows have been deleted, and every contained entity
/// is inserted again.
pub fn plan_save(context: &MappingContext, root: &Entity) -> Result<AggregateChange> {
    let def = context.get_required_persistent_entity(&root.type_name)?;
    let root_id = def.id_property().and_then(|p| root.get(&p.name)).cloned();

    let mut change = AggregateChange::save(root.clone());
    let root_action = match root_id {
        None => change.add_action(InsertRoot::new(root.clone())),
        Some(root_id) => {
            for path in dependent_paths(context, def, &PersistentPropertyPath::default())?
                .into_iter()
                .rev()
            {
                change.add_action(Delete::new(root_id.clone(), path));
            }
            change.add_action(UpdateRoot::new(root.clone()))
        }
    };

    add_dependents(
        context,
        &mut change,
        def,
        root,
        &PersistentPropertyPath::default(),
        &root_action,
        &Qualifiers::new(),
    )?;

    debug!("Planned {} actions to save {}", change.actions().len(), root);
    Ok(change)
}

/// Build the change deleting the aggregate with `root_id`: dependents
/// (children before parents), then the root.
pub fn plan_delete(
    context: &MappingContext,
    entity_type: &str,
    root_id: impl Into<Value>,
) -> Result<AggregateChange> {
    let def = context.get_required_persistent_entity(entity_type)?;
    let root_id = root_id.into();

    let mut change = AggregateChange::delete(entity_type, None);
    for path in dependent_paths(context, def, &PersistentPropertyPath::default())?
        .into_iter()
        .rev()
    {
        change.add_action(Delete::new(root_id.clone(), path));
    }
    change.add_action(DeleteRoot::new(entity_type, root_id));
    Ok(change)
}

/// Every path to an entity-valued property below `def`, parents before children
fn dependent_paths(
    context: &MappingContext,
    def: &EntityDef,
    base: &PersistentPropertyPath,
) -> Result<Vec<PersistentPropertyPath>> {
    let mut paths = Vec::new();
    for property in def.properties.iter().filter(|p| p.is_entity()) {
        if base.segments().contains(property) {
            return Err(RelationalError::invalid_state(format!(
                "Aggregate {} is not a tree: {} repeats in '{}'",
                def.name, property.name, base
            )));
        }
        let path = base.nested(property.clone());
        let target = target_entity(context, &path)?;
        paths.push(path.clone());
        paths.extend(dependent_paths(context, target, &path)?);
    }
    Ok(paths)
}

fn target_entity<'a>(
    context: &'a MappingContext,
    path: &PersistentPropertyPath,
) -> Result<&'a EntityDef> {
    let leaf = path.required_leaf()?;
    let target = leaf.kind.target_entity().ok_or_else(|| {
        RelationalError::invalid_state(format!("'{}' does not lead to an entity", path))
    })?;
    context.get_required_persistent_entity(target)
}

fn add_dependents(
    context: &MappingContext,
    change: &mut AggregateChange,
    def: &EntityDef,
    entity: &Entity,
    base: &PersistentPropertyPath,
    parent: &Arc<DbAction>,
    qualifiers: &Qualifiers,
) -> Result<()> {
    for property in def.properties.iter().filter(|p| p.is_entity()) {
        let Some(value) = entity.get(&property.name) else {
            continue;
        };
        let path = base.nested(property.clone());
        let target = target_entity(context, &path)?;

        // (qualifier, element); sets and single references carry no qualifier
        let elements: Vec<(Option<Value>, &Value)> = match value {
            Value::List(values) => values
                .iter()
                .enumerate()
                .map(|(index, element)| (Some(Value::Integer(index as i64)), element))
                .collect(),
            Value::Map(entries) => entries
                .iter()
                .map(|(key, element)| (Some(Value::Text(key.clone())), element))
                .collect(),
            Value::Set(values) => values.iter().map(|element| (None, element)).collect(),
            single => vec![(None, single)],
        };

        for (key, element) in elements {
            let child = element.as_entity().ok_or_else(|| {
                RelationalError::navigation(
                    &path,
                    format!("expected {} entities, found {}", target.name, element.type_name()),
                )
            })?;

            let mut child_qualifiers = qualifiers.clone();
            if let Some(key) = key {
                child_qualifiers.insert(path.clone(), key);
            }

            let action = change.add_action(Insert::new(
                child.clone(),
                path.clone(),
                parent.clone(),
                child_qualifiers.clone(),
            ));
            add_dependents(context, change, target, child, &path, &action, &child_qualifiers)?;
        }
    }
    Ok(())
}
