#![allow(dead_code)]

use recordstore_core::{Model, PersistentId, Schema, StorageConfig, StoreContainer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub title: String,
    pub priority: Priority,
    pub created: i64,
    pub is_completed: bool,
    pub project: Option<PersistentId>,
}

impl Model for Todo {
    const ENTITY: &'static str = "Todo";
    const FIELDS: &'static [&'static str] =
        &["title", "priority", "created", "is_completed", "project"];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
}

impl Model for Project {
    const ENTITY: &'static str = "Project";
    const FIELDS: &'static [&'static str] = &["name"];
}

/// Shares the `Todo` entity name with an incompatible payload shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedTodo {
    pub title: i64,
}

impl Model for MalformedTodo {
    const ENTITY: &'static str = "Todo";
    const FIELDS: &'static [&'static str] = &["title"];
}

pub fn todo(title: &str, priority: Priority, created: i64) -> Todo {
    Todo {
        title: title.to_string(),
        priority,
        created,
        is_completed: false,
        project: None,
    }
}

pub fn schema() -> Schema {
    Schema::new().with::<Todo>().with::<Project>()
}

pub fn in_memory_container() -> StoreContainer {
    StoreContainer::configure(schema(), None, StorageConfig::in_memory()).unwrap()
}

pub fn titles<'a>(records: impl IntoIterator<Item = &'a recordstore_core::Record<Todo>>) -> Vec<String> {
    records
        .into_iter()
        .map(|record| record.title.clone())
        .collect()
}
