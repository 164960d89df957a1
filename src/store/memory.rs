use crate::logic::Interpreter;
use crate::model::{
    ActionId, Delete, DeleteAll, DeleteAllRoot, DeleteRoot, Entity, EntityDef, Insert, InsertRoot,
    MappingContext, Merge, PersistentPropertyPathExtension, PropertyKind, Update, UpdateRoot, Value,
    WithDependingOn, WithEntity,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// How identifiers are generated for rows inserted without one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Per-table integer sequence
    #[default]
    Sequence,
    /// Random uuid rendered as text
    Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGeneration {
    pub strategy: IdStrategy,
    /// First value handed out by each table sequence
    pub start: i64,
    pub step: i64,
}

impl Default for IdGeneration {
    fn default() -> Self {
        Self {
            strategy: IdStrategy::Sequence,
            start: 1,
            step: 1,
        }
    }
}

/// A stored row. Dependent rows remember the path they were reached
/// through, the ids of their aggregate root and parent, and their list
/// index or map key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: Option<Value>,
    pub columns: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
}

/// One executed statement
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub executed_at: DateTime<Utc>,
    pub verb: &'static str,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub affected: usize,
}

/// Ids known for an executed action, used to link its dependents.
/// Only the actions since the latest root action are kept.
#[derive(Debug, Clone, Default)]
struct Linkage {
    id: Option<Value>,
    root_id: Option<Value>,
}

#[derive(Debug, Default)]
struct Tables {
    rows: BTreeMap<String, Vec<Row>>,
    sequences: HashMap<String, i64>,
    linkage: HashMap<ActionId, Linkage>,
    statements: Vec<Statement>,
}

impl Tables {
    fn record(&mut self, verb: &'static str, table: &str, id: Option<Value>, affected: usize) {
        debug!(
            "{} {} id={} ({} rows)",
            verb,
            table,
            id.as_ref().map_or_else(|| "-".to_string(), Value::to_string),
            affected
        );
        self.statements.push(Statement {
            executed_at: Utc::now(),
            verb,
            table: table.to_string(),
            id,
            affected,
        });
    }

    /// Dependents only link to actions of the same aggregate change, and
    /// every change starts with its root action.
    fn start_aggregate(&mut self) {
        self.linkage.clear();
    }

    fn remove_where(&mut self, table: &str, predicate: impl Fn(&Row) -> bool) -> usize {
        match self.rows.get_mut(table) {
            Some(rows) => {
                let before = rows.len();
                rows.retain(|row| !predicate(row));
                before - rows.len()
            }
            None => 0,
        }
    }
}

/// Interpreter executing actions against in-memory tables.
///
/// Tables are named by the mapping's naming strategy. Ids are generated
/// only for entities whose id property is null.
#[derive(Debug)]
pub struct InMemoryInterpreter {
    context: MappingContext,
    ids: IdGeneration,
    state: Mutex<Tables>,
}

impl InMemoryInterpreter {
    pub fn new(context: MappingContext, ids: IdGeneration) -> Self {
        Self {
            context,
            ids,
            state: Mutex::new(Tables::default()),
        }
    }

    pub fn context(&self) -> &MappingContext {
        &self.context
    }

    /// Snapshot of all tables
    pub fn tables(&self) -> BTreeMap<String, Vec<Row>> {
        self.state.lock().rows.clone()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state.lock().rows.get(table).cloned().unwrap_or_default()
    }

    pub fn find_row(&self, table: &str, id: &Value) -> Option<Row> {
        self.state
            .lock()
            .rows
            .get(table)
            .and_then(|rows| rows.iter().find(|row| row.id.as_ref() == Some(id)).cloned())
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().statements.clone()
    }

    /// Simple-typed, non-id properties of `entity` keyed by column name
    fn columns(def: &EntityDef, entity: &Entity) -> BTreeMap<String, Value> {
        def.properties
            .iter()
            .filter(|p| matches!(p.kind, PropertyKind::Simple(_)))
            .filter(|p| def.id_property.as_deref() != Some(p.name.as_str()))
            .filter_map(|p| entity.get(&p.name).map(|value| (p.column_name(), value.clone())))
            .collect()
    }

    fn next_id(&self, state: &mut Tables, table: &str) -> Value {
        match self.ids.strategy {
            IdStrategy::Sequence => {
                let next = state.sequences.entry(table.to_string()).or_insert(self.ids.start);
                let id = *next;
                *next += self.ids.step;
                Value::Integer(id)
            }
            IdStrategy::Uuid => Value::Text(Uuid::new_v4().to_string()),
        }
    }

    /// The entity's own id, or a fresh one when it is null. The flag tells
    /// whether the id was generated.
    fn assign_id(
        &self,
        state: &mut Tables,
        def: &EntityDef,
        entity: &Entity,
        table: &str,
    ) -> (Option<Value>, bool) {
        let Some(id_property) = def.id_property() else {
            return (None, false);
        };
        match entity.get(&id_property.name) {
            Some(id) => (Some(id.clone()), false),
            None => (Some(self.next_id(state, table)), true),
        }
    }

    fn write_dependent(&self, action: &dyn WithDependingOn, merge: bool) -> Result<Option<Value>> {
        let path = action.property_path();
        let extension = PersistentPropertyPathExtension::new(&self.context, path.clone());
        let def = extension.required_leaf_entity()?;
        let table = def.table_name();
        let dot_path = Some(path.to_dot_path());
        let key = action.qualifiers().get(path).cloned();
        let entity = action.entity();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let parent = state
            .linkage
            .get(&action.depending_on().id())
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "{} depends on {} which has not been executed",
                    entity,
                    action.depending_on()
                )
            })?;

        if merge {
            let own_id = def.id_property().and_then(|p| entity.get(&p.name)).cloned();
            let existing = state.rows.get_mut(&table).and_then(|rows| {
                rows.iter_mut().find(|row| {
                    row.path == dot_path
                        && row.root_id == parent.root_id
                        && match &own_id {
                            Some(id) => row.id.as_ref() == Some(id),
                            None => key.is_some() && row.parent_id == parent.id && row.key == key,
                        }
                })
            });
            if let Some(row) = existing {
                row.columns = Self::columns(def, entity);
                let id = row.id.clone();
                state.linkage.insert(
                    action.action_id(),
                    Linkage {
                        id: id.clone(),
                        root_id: parent.root_id,
                    },
                );
                state.record("MERGE", &table, id, 1);
                return Ok(None);
            }
        }

        let (id, generated) = self.assign_id(state, def, entity, &table);
        state.rows.entry(table.clone()).or_default().push(Row {
            id: id.clone(),
            columns: Self::columns(def, entity),
            path: dot_path,
            root_id: parent.root_id.clone(),
            parent_id: parent.id,
            key,
        });
        state.linkage.insert(
            action.action_id(),
            Linkage {
                id: id.clone(),
                root_id: parent.root_id,
            },
        );
        state.record(if merge { "MERGE" } else { "INSERT" }, &table, id.clone(), 1);

        Ok(if generated { id } else { None })
    }

    fn update_row(
        &self,
        action_id: ActionId,
        def: &EntityDef,
        entity: &Entity,
        path: Option<String>,
    ) -> Result<()> {
        let id_property = def.required_id_property()?;
        let id = entity
            .get(&id_property.name)
            .cloned()
            .ok_or_else(|| anyhow!("Cannot update {} without an id", entity))?;
        let table = def.table_name();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let row = state
            .rows
            .get_mut(&table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| row.id.as_ref() == Some(&id) && row.path == path)
            })
            .ok_or_else(|| anyhow!("Update of {} matched no row in {}", entity, table))?;

        row.columns = Self::columns(def, entity);
        let root_id = match path {
            Some(_) => row.root_id.clone(),
            None => {
                state.start_aggregate();
                Some(id.clone())
            }
        };

        state.linkage.insert(
            action_id,
            Linkage {
                id: Some(id.clone()),
                root_id,
            },
        );
        state.record("UPDATE", &table, Some(id), 1);
        Ok(())
    }
}

impl Interpreter for InMemoryInterpreter {
    fn insert_root(&self, insert: &InsertRoot) -> Result<Option<Value>> {
        let def = self.context.get_required_persistent_entity(insert.entity_type())?;
        let table = def.table_name();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.start_aggregate();
        let (id, generated) = self.assign_id(state, def, &insert.entity, &table);
        state.rows.entry(table.clone()).or_default().push(Row {
            id: id.clone(),
            columns: Self::columns(def, &insert.entity),
            path: None,
            root_id: None,
            parent_id: None,
            key: None,
        });
        state.linkage.insert(
            insert.action_id(),
            Linkage {
                id: id.clone(),
                root_id: id.clone(),
            },
        );
        state.record("INSERT", &table, id.clone(), 1);

        Ok(if generated { id } else { None })
    }

    fn insert(&self, insert: &Insert) -> Result<Option<Value>> {
        self.write_dependent(insert, false)
    }

    fn merge(&self, merge: &Merge) -> Result<Option<Value>> {
        self.write_dependent(merge, true)
    }

    fn update_root(&self, update: &UpdateRoot) -> Result<()> {
        let def = self.context.get_required_persistent_entity(update.entity_type())?;
        self.update_row(update.action_id(), def, &update.entity, None)
    }

    fn update(&self, update: &Update) -> Result<()> {
        let extension = PersistentPropertyPathExtension::new(&self.context, update.property_path.clone());
        let def = extension.required_leaf_entity()?;
        self.update_row(
            update.action_id(),
            def,
            &update.entity,
            Some(update.property_path.to_dot_path()),
        )
    }

    fn delete_root(&self, delete: &DeleteRoot) -> Result<()> {
        let table = self.context.get_required_persistent_entity(&delete.entity_type)?.table_name();
        let mut state = self.state.lock();
        state.start_aggregate();
        let affected = state.remove_where(&table, |row| {
            row.path.is_none() && row.id.as_ref() == Some(&delete.root_id)
        });
        state.record("DELETE", &table, Some(delete.root_id.clone()), affected);
        Ok(())
    }

    fn delete(&self, delete: &Delete) -> Result<()> {
        let extension = PersistentPropertyPathExtension::new(&self.context, delete.property_path.clone());
        let table = extension.required_leaf_entity()?.table_name();
        let dot_path = delete.property_path.to_dot_path();

        let mut state = self.state.lock();
        let affected = state.remove_where(&table, |row| {
            row.path.as_deref() == Some(dot_path.as_str())
                && row.root_id.as_ref() == Some(&delete.root_id)
        });
        state.record("DELETE", &table, Some(delete.root_id.clone()), affected);
        Ok(())
    }

    fn delete_all_root(&self, delete: &DeleteAllRoot) -> Result<()> {
        let table = self.context.get_required_persistent_entity(&delete.entity_type)?.table_name();
        let mut state = self.state.lock();
        state.start_aggregate();
        let affected = state.remove_where(&table, |row| row.path.is_none());
        state.record("DELETE", &table, None, affected);
        Ok(())
    }

    fn delete_all(&self, delete: &DeleteAll) -> Result<()> {
        let extension = PersistentPropertyPathExtension::new(&self.context, delete.property_path.clone());
        let table = extension.required_leaf_entity()?.table_name();
        let dot_path = delete.property_path.to_dot_path();

        let mut state = self.state.lock();
        let affected = state.remove_where(&table, |row| row.path.as_deref() == Some(dot_path.as_str()));
        state.record("DELETE", &table, None, affected);
        Ok(())
    }
}
