//! Schema built from the set of persisted record types.
//!
//! # Invariants
//! - A valid schema has at least one entity.
//! - Entity and field names are ASCII identifiers; entity names are unique
//!   and field names are unique per entity.

use crate::model::record::Model;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-facing description of one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

impl EntityDescriptor {
    pub fn of<M: Model>() -> Self {
        Self {
            name: M::ENTITY,
            fields: M::FIELDS,
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|known| *known == field)
    }
}

/// Ordered set of record types a store is configured for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    entities: Vec<EntityDescriptor>,
}

/// Schema validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    Empty,
    InvalidEntityName(String),
    DuplicateEntity(String),
    InvalidFieldName { entity: String, field: String },
    DuplicateField { entity: String, field: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "schema must contain at least one entity"),
            Self::InvalidEntityName(name) => write!(f, "invalid entity name `{name}`"),
            Self::DuplicateEntity(name) => write!(f, "entity registered twice: {name}"),
            Self::InvalidFieldName { entity, field } => {
                write!(f, "invalid field name `{field}` on entity {entity}")
            }
            Self::DuplicateField { entity, field } => {
                write!(f, "field `{field}` declared twice on entity {entity}")
            }
        }
    }
}

impl Error for SchemaError {}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record type to the schema.
    #[must_use]
    pub fn with<M: Model>(mut self) -> Self {
        self.entities.push(EntityDescriptor::of::<M>());
        self
    }

    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entity(name).is_some()
    }

    /// Checks naming and uniqueness rules for every entity.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.entities.is_empty() {
            return Err(SchemaError::Empty);
        }

        for (index, entity) in self.entities.iter().enumerate() {
            if !is_identifier(entity.name) {
                return Err(SchemaError::InvalidEntityName(entity.name.to_string()));
            }
            if self.entities[..index]
                .iter()
                .any(|earlier| earlier.name == entity.name)
            {
                return Err(SchemaError::DuplicateEntity(entity.name.to_string()));
            }

            for (field_index, field) in entity.fields.iter().enumerate() {
                if !is_identifier(field) {
                    return Err(SchemaError::InvalidFieldName {
                        entity: entity.name.to_string(),
                        field: (*field).to_string(),
                    });
                }
                if entity.fields[..field_index].contains(field) {
                    return Err(SchemaError::DuplicateField {
                        entity: entity.name.to_string(),
                        field: (*field).to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub(crate) fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
