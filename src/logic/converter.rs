use crate::error::{RelationalError, Result};
use crate::logic::{EntityPropertyAccessor, PropertyAccessor};
use crate::model::{Entity, EntityDef, PropertyKind, ScalarType, Value};
use uuid::Uuid;

/// Bridges store-native values and the in-memory entity graph.
pub trait RelationalConverter {
    fn property_accessor(
        &self,
        entity: &EntityDef,
        instance: Entity,
    ) -> Result<Box<dyn PropertyAccessor>>;

    /// Convert a value read from the store into the declared type of a property
    fn read_value(&self, value: Value, target: &PropertyKind) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicRelationalConverter;

impl BasicRelationalConverter {
    pub fn new() -> Self {
        Self
    }

    fn convert_scalar(value: Value, target: ScalarType) -> Result<Value> {
        let failed = |value: &Value| RelationalError::ConversionFailed {
            value: value.to_string(),
            target: format!("{:?}", target),
        };

        let converted = match (target, &value) {
            (_, Value::Null) => Some(Value::Null),

            (ScalarType::Integer, Value::Integer(_)) => Some(value.clone()),
            (ScalarType::Integer, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Some(Value::Integer(*f as i64))
            }
            (ScalarType::Integer, Value::Text(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),

            (ScalarType::Float, Value::Float(_)) => Some(value.clone()),
            (ScalarType::Float, Value::Integer(i)) => Some(Value::Float(*i as f64)),
            (ScalarType::Float, Value::Text(s)) => s.trim().parse::<f64>().ok().map(Value::Float),

            (ScalarType::Text, Value::Text(_)) => Some(value.clone()),
            (ScalarType::Text, Value::Integer(i)) => Some(Value::Text(i.to_string())),
            (ScalarType::Text, Value::Float(f)) => Some(Value::Text(f.to_string())),
            (ScalarType::Text, Value::Boolean(b)) => Some(Value::Text(b.to_string())),

            (ScalarType::Boolean, Value::Boolean(_)) => Some(value.clone()),
            (ScalarType::Boolean, Value::Integer(0)) => Some(Value::Boolean(false)),
            (ScalarType::Boolean, Value::Integer(1)) => Some(Value::Boolean(true)),
            (ScalarType::Boolean, Value::Text(s)) => s.trim().parse::<bool>().ok().map(Value::Boolean),

            (ScalarType::Uuid, Value::Text(s)) => Uuid::parse_str(s.trim())
                .ok()
                .map(|uuid| Value::Text(uuid.hyphenated().to_string())),

            _ => None,
        };

        converted.ok_or_else(|| failed(&value))
    }
}

impl RelationalConverter for BasicRelationalConverter {
    fn property_accessor(
        &self,
        entity: &EntityDef,
        instance: Entity,
    ) -> Result<Box<dyn PropertyAccessor>> {
        if instance.type_name != entity.name {
            return Err(RelationalError::invalid_state(format!(
                "Instance of {} cannot be accessed as {}",
                instance.type_name, entity.name
            )));
        }
        Ok(Box::new(EntityPropertyAccessor::new(instance)))
    }

    fn read_value(&self, value: Value, target: &PropertyKind) -> Result<Value> {
        match target {
            PropertyKind::Simple(scalar) => Self::convert_scalar(value, *scalar),
            _ => Ok(value),
        }
    }
}
