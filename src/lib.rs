pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

pub use error::{RelationalError, Result};

// Export logic types
pub use logic::{
    AggregateChange, BasicRelationalConverter, ContainerHandler, EntityPropertyAccessor,
    HandlerFactory, Interpreter, Kind, PropertyAccessor, RelationalConverter, TraversalContext,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{IdGeneration, IdStrategy, InMemoryInterpreter};

/// Plan, execute and return the sample order save against a fresh in-memory
/// store. Used by the demo binary.
pub fn run_demo(config: &config::AppConfig) -> anyhow::Result<(Entity, InMemoryInterpreter)> {
    let context = seed::order_mapping();
    context.validate()?;

    let interpreter = InMemoryInterpreter::new(context.clone(), config.id_generation()?);
    let mut change = seed::plan_save(&context, &seed::sample_order())?;
    change.execute_with(&interpreter, &context, &BasicRelationalConverter)?;

    let order = change
        .into_entity()
        .ok_or_else(|| anyhow::anyhow!("Save change lost its aggregate root"))?;
    Ok((order, interpreter))
}
