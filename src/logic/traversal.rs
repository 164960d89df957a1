use crate::error::{RelationalError, Result};
use crate::model::{PersistentProperty, PropertyKind, Value};
use log::{debug, trace};
use std::collections::HashMap;

/// Reads and writes one element of a collection-valued property.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerHandler {
    ListElement(usize),
    MapEntry(String),
    /// Sets have no position; the element doubles as its own key.
    SetElement(Value),
}

impl ContainerHandler {
    /// Select the element from `container`. A null container yields `None`.
    pub fn read<'v>(&self, container: &'v Value) -> Result<Option<&'v Value>> {
        match (self, container) {
            (_, Value::Null) => Ok(None),
            (Self::ListElement(index), Value::List(values)) => Ok(values.get(*index)),
            (Self::MapEntry(key), Value::Map(entries)) => Ok(entries.get(key)),
            (Self::SetElement(key), Value::Set(values)) => {
                Ok(values.iter().find(|element| *element == key))
            }
            (handler, other) => Err(mismatch(handler, other)),
        }
    }

    /// Store `new_value` in `container` in place of the selected element.
    ///
    /// For sets this removes the key element and adds the new one, returning
    /// the `(old, new)` pair when the element actually changed.
    pub fn write(&self, container: &mut Value, new_value: Value) -> Result<Option<(Value, Value)>> {
        match (self, container) {
            (Self::ListElement(index), Value::List(values)) => {
                let len = values.len();
                let slot = values.get_mut(*index).ok_or_else(|| {
                    RelationalError::invalid_state(format!(
                        "List index {} out of bounds for length {}",
                        index, len
                    ))
                })?;
                *slot = new_value;
                Ok(None)
            }
            (Self::MapEntry(key), Value::Map(entries)) => {
                entries.insert(key.clone(), new_value);
                Ok(None)
            }
            (Self::SetElement(key), Value::Set(values)) => {
                if *key == new_value {
                    return Ok(None);
                }
                values.retain(|element| element != key);
                if !values.contains(&new_value) {
                    values.push(new_value.clone());
                }
                Ok(Some((key.clone(), new_value)))
            }
            (handler, other) => Err(mismatch(handler, other)),
        }
    }
}

fn mismatch(handler: &ContainerHandler, container: &Value) -> RelationalError {
    RelationalError::invalid_state(format!(
        "Handler {:?} cannot address a {} value",
        handler,
        container.type_name()
    ))
}

/// The container kinds an element handler can be created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFactory {
    List,
    Map,
    Set,
}

impl HandlerFactory {
    /// Checked in this order; the first factory handling a property wins
    pub const ALL: [HandlerFactory; 3] = [Self::List, Self::Map, Self::Set];

    pub fn handles(&self, kind: &PropertyKind) -> bool {
        match self {
            Self::List => kind.is_list(),
            Self::Map => kind.is_map(),
            Self::Set => kind.is_set(),
        }
    }

    pub fn find(kind: &PropertyKind) -> Option<HandlerFactory> {
        Self::ALL.into_iter().find(|factory| factory.handles(kind))
    }

    /// Create the handler addressing the element identified by `key`
    pub fn handler(&self, key: &Value) -> Result<ContainerHandler> {
        match (self, key) {
            (Self::List, Value::Integer(index)) if *index >= 0 => {
                Ok(ContainerHandler::ListElement(*index as usize))
            }
            (Self::Map, Value::Text(key)) => Ok(ContainerHandler::MapEntry(key.clone())),
            (Self::Map, Value::Integer(key)) => Ok(ContainerHandler::MapEntry(key.to_string())),
            (Self::Map, Value::Boolean(key)) => Ok(ContainerHandler::MapEntry(key.to_string())),
            (Self::Set, element) => Ok(ContainerHandler::SetElement(element.clone())),
            (factory, key) => Err(RelationalError::invalid_state(format!(
                "{} is not a valid {:?} qualifier",
                key, factory
            ))),
        }
    }

    /// Register a handler for `property` if it is collection-valued.
    /// Other properties keep plain navigation.
    pub fn register_handler_for(
        context: &mut TraversalContext,
        property: &PersistentProperty,
        key: &Value,
    ) -> Result<()> {
        let Some(factory) = Self::find(&property.kind) else {
            trace!("No container handler for property {}", property.name);
            return Ok(());
        };

        context.register_handler(property.clone(), factory.handler(key)?);
        Ok(())
    }
}

/// Element handlers to use while navigating one property path.
///
/// Built for a single id propagation and dropped afterwards.
#[derive(Debug, Default)]
pub struct TraversalContext {
    handlers: HashMap<PersistentProperty, ContainerHandler>,
    replacements: Vec<(Value, Value)>,
}

impl TraversalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `property`; a later registration replaces an earlier one
    pub fn register_handler(&mut self, property: PersistentProperty, handler: ContainerHandler) {
        debug!("Registering {:?} for {}.{}", handler, property.owner, property.name);
        if let Some(previous) = self.handlers.insert(property, handler) {
            trace!("Replaced handler {:?}", previous);
        }
    }

    pub fn register_set_handler(&mut self, property: PersistentProperty, element: Value) {
        self.register_handler(property, ContainerHandler::SetElement(element));
    }

    pub fn handler_for(&self, property: &PersistentProperty) -> Option<&ContainerHandler> {
        self.handlers.get(property)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn record_replacement(&mut self, old: Value, new: Value) {
        self.replacements.push((old, new));
    }

    /// Set elements replaced by writes through this context, in write order
    pub fn replacements(&self) -> &[(Value, Value)] {
        &self.replacements
    }
}
