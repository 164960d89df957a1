use crate::model::{
    Delete, DeleteAll, DeleteAllRoot, DeleteRoot, Insert, InsertRoot, Merge, Update, UpdateRoot,
    Value,
};
use anyhow::Result;

/// Performs the actual persistence operation for each kind of database action.
///
/// Insert-like operations return the identifier generated by the store, or
/// `None` when the store did not generate one.
pub trait Interpreter {
    /// Insert the aggregate root
    fn insert_root(&self, insert: &InsertRoot) -> Result<Option<Value>>;
    /// Insert a dependent entity
    fn insert(&self, insert: &Insert) -> Result<Option<Value>>;
    /// Insert or update a dependent entity
    fn merge(&self, merge: &Merge) -> Result<Option<Value>>;
    /// Update the aggregate root
    fn update_root(&self, update: &UpdateRoot) -> Result<()>;
    /// Update a dependent entity
    fn update(&self, update: &Update) -> Result<()>;
    /// Delete the aggregate root with the given id
    fn delete_root(&self, delete: &DeleteRoot) -> Result<()>;
    /// Delete the entities at a path below one aggregate root
    fn delete(&self, delete: &Delete) -> Result<()>;
    /// Delete all aggregate roots of a type
    fn delete_all_root(&self, delete: &DeleteAllRoot) -> Result<()>;
    /// Delete all entities at a path, for every aggregate
    fn delete_all(&self, delete: &DeleteAll) -> Result<()>;
}
