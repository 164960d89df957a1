use crate::error::{RelationalError, Result};
use crate::logic::TraversalContext;
use crate::model::{Entity, PersistentProperty, PersistentPropertyPath, Value};

/// Read/write access to the properties of an aggregate root and the
/// entities nested inside it.
pub trait PropertyAccessor {
    /// Value at `path`, or `None` when the path runs into a missing or null value
    fn get_property(
        &self,
        path: &PersistentPropertyPath,
        context: &TraversalContext,
    ) -> Result<Option<Value>>;

    fn set_property(
        &mut self,
        path: &PersistentPropertyPath,
        value: Value,
        context: &mut TraversalContext,
    ) -> Result<()>;

    /// Set a property declared directly on the root
    fn set_simple_property(&mut self, property: &PersistentProperty, value: Value) -> Result<()>;

    /// The current root instance
    fn bean(&self) -> &Entity;

    fn into_bean(self: Box<Self>) -> Entity;
}

/// Accessor over an owned [`Entity`] graph.
///
/// Elements of collection properties are only reachable through a handler
/// registered in the traversal context. Writes through a handler copy the
/// element out, update the copy and store it back through the handler.
#[derive(Debug, Clone)]
pub struct EntityPropertyAccessor {
    bean: Entity,
}

impl EntityPropertyAccessor {
    pub fn new(bean: Entity) -> Self {
        Self { bean }
    }
}

impl PropertyAccessor for EntityPropertyAccessor {
    fn get_property(
        &self,
        path: &PersistentPropertyPath,
        context: &TraversalContext,
    ) -> Result<Option<Value>> {
        let segments = path.segments();
        let mut current = &self.bean;

        for (position, property) in segments.iter().enumerate() {
            let Some(raw) = current.properties.get(&property.name) else {
                return Ok(None);
            };

            let value = match context.handler_for(property) {
                Some(handler) => match handler.read(raw)? {
                    Some(element) => element,
                    None => return Ok(None),
                },
                None => raw,
            };

            if value.is_null() {
                return Ok(None);
            }
            if position + 1 == segments.len() {
                return Ok(Some(value.clone()));
            }

            current = value.as_entity().ok_or_else(|| {
                RelationalError::navigation(
                    path,
                    format!("'{}' holds a {} value, not an entity", property.name, value.type_name()),
                )
            })?;
        }

        Ok(Some(Value::Entity(self.bean.clone())))
    }

    fn set_property(
        &mut self,
        path: &PersistentPropertyPath,
        value: Value,
        context: &mut TraversalContext,
    ) -> Result<()> {
        if path.is_empty() {
            return Err(RelationalError::invalid_state(
                "Cannot replace the aggregate root through an empty property path",
            ));
        }
        set_nested(&mut self.bean, path, path.segments(), value, context)
    }

    fn set_simple_property(&mut self, property: &PersistentProperty, value: Value) -> Result<()> {
        if property.owner != self.bean.type_name {
            return Err(RelationalError::UnknownProperty {
                entity: self.bean.type_name.clone(),
                property: property.name.clone(),
            });
        }
        self.bean.set(property.name.clone(), value);
        Ok(())
    }

    fn bean(&self) -> &Entity {
        &self.bean
    }

    fn into_bean(self: Box<Self>) -> Entity {
        self.bean
    }
}

fn set_nested(
    entity: &mut Entity,
    path: &PersistentPropertyPath,
    segments: &[PersistentProperty],
    value: Value,
    context: &mut TraversalContext,
) -> Result<()> {
    let Some((property, rest)) = segments.split_first() else {
        return Ok(());
    };
    let handler = context.handler_for(property).cloned();

    let Some(handler) = handler else {
        if rest.is_empty() {
            entity.set(property.name.clone(), value);
            return Ok(());
        }
        let next = match entity.properties.get_mut(&property.name) {
            Some(Value::Entity(next)) => next,
            Some(Value::Null) | None => {
                return Err(RelationalError::navigation(
                    path,
                    format!("'{}' is null", property.name),
                ))
            }
            Some(other) => {
                return Err(RelationalError::navigation(
                    path,
                    format!(
                        "'{}' is a {} and no element was selected",
                        property.name,
                        other.type_name()
                    ),
                ))
            }
        };
        return set_nested(next, path, rest, value, context);
    };

    let container = entity.properties.get_mut(&property.name).ok_or_else(|| {
        RelationalError::navigation(path, format!("collection '{}' is missing", property.name))
    })?;

    let element = if rest.is_empty() {
        value
    } else {
        let mut element = handler.read(container)?.cloned().ok_or_else(|| {
            RelationalError::navigation(
                path,
                format!("no element of '{}' matches {:?}", property.name, handler),
            )
        })?;
        let target = element.as_entity_mut().ok_or_else(|| {
            RelationalError::navigation(
                path,
                format!("elements of '{}' are not entities", property.name),
            )
        })?;
        set_nested(target, path, rest, value, context)?;
        element
    };

    if let Some((old, new)) = handler.write(container, element)? {
        context.record_replacement(old, new);
    }
    Ok(())
}
