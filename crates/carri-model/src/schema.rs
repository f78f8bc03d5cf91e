//! Static storage layout of a loaded domain and problem.
//!
//! The schema is built once from a parsed [`Domain`] and [`Problem`] and is
//! immutable afterwards. It owns the constant tables, the storage strategy
//! of every entity type, the initial state and the problem's iteration
//! batches.

use crate::state::{Item, ItemCollection, State};
use crate::value::Value;
use carri_syntax::{
    Domain, InitValue, ItemsDecl, Literal, Problem, ProblemEntry, ValueKind, VarDecl, VarRef,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Error raised while laying out a problem against its domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("line {line}: unknown entity or variable '{name}'")]
    UnknownName { name: String, line: u32 },

    #[error("line {line}: '{name}' is initialized twice")]
    DuplicateEntry { name: String, line: u32 },

    #[error("line {line}: '{name}' needs a single non-negative count")]
    InvalidCardinality { name: String, line: u32 },

    #[error("line {line}: '{name}' has {expected} instances but {found} values were given")]
    ShapeMismatch {
        name: String,
        expected: usize,
        found: usize,
        line: u32,
    },

    #[error("line {line}: index {index} is out of range for '{name}' with {length} instances")]
    IndexOutOfRange {
        name: String,
        index: usize,
        length: usize,
        line: u32,
    },

    #[error("line {line}: '{name}' expects a {expected:?} value, found {found}")]
    KindMismatch {
        name: String,
        expected: ValueKind,
        found: String,
        line: u32,
    },

    #[error("line {line}: '{name}' items have {expected} fields, found {found}")]
    FieldCount {
        name: String,
        expected: usize,
        found: usize,
        line: u32,
    },

    #[error("line {line}: item field '{name}' is initialized through its item rows")]
    FieldInitialized { name: String, line: u32 },

    #[error("line {line}: iteration batches may only add items, found '{name}'")]
    ScalarInIteration { name: String, line: u32 },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// How instances of an entity type are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStorage {
    /// Dense ids `0..count`.
    Positional { count: i64 },
    /// Ids of a live item collection.
    Dynamic { collection: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityLayout {
    pub name: String,
    pub base_role: Option<String>,
    pub storage: EntityStorage,
}

impl EntityLayout {
    pub fn is_dynamic(&self) -> bool {
        matches!(self.storage, EntityStorage::Dynamic { .. })
    }
}

/// Layout of a constant or mutable variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarLayout {
    pub name: String,
    pub kind: ValueKind,
    pub owner: Option<usize>,
    pub role: Option<String>,
    /// Number of values: the owner's cardinality, or 1 for a global.
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub kind: ValueKind,
    pub constant: bool,
    /// Index within the constant or mutable group.
    pub slot: usize,
}

/// Layout of one item collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionLayout {
    pub name: String,
    pub entity: usize,
    /// Fields in declaration order.
    pub fields: Vec<FieldLayout>,
}

/// Field values of one item row, split into constant and mutable groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub consts: Vec<Value>,
    pub vars: Vec<Value>,
}

impl ItemRow {
    pub fn into_item(self) -> Item {
        Item::new(self.consts, self.vars)
    }
}

impl CollectionLayout {
    /// The field recording which entity holds the item.
    pub fn on_entity_field(&self) -> Option<&FieldLayout> {
        self.fields.first()
    }

    /// Value of the on-entity field of an item.
    pub fn on_entity<'a>(&self, item: &'a Item) -> Option<&'a Value> {
        let field = self.on_entity_field()?;
        if field.constant {
            item.consts.get(field.slot)
        } else {
            item.vars.get(field.slot)
        }
    }

    /// Split field values given in declaration order into an item row.
    ///
    /// Returns the offending field when a value has the wrong kind.
    pub fn row(&self, values: Vec<Value>) -> Result<ItemRow, &FieldLayout> {
        let mut row = ItemRow {
            consts: Vec::new(),
            vars: Vec::new(),
        };
        for (field, value) in self.fields.iter().zip(values) {
            if !value.matches(field.kind) {
                return Err(field);
            }
            if field.constant {
                row.consts.push(value);
            } else {
                row.vars.push(value);
            }
        }
        Ok(row)
    }
}

/// A new item introduced by an iteration batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub collection: usize,
    pub row: ItemRow,
}

/// Immutable layout of a loaded problem.
#[derive(Debug, Clone)]
pub struct Schema {
    entities: Vec<EntityLayout>,
    const_layouts: Vec<VarLayout>,
    constants: Vec<Vec<Value>>,
    var_layouts: Vec<VarLayout>,
    collections: Vec<CollectionLayout>,
    names: HashMap<String, VarRef>,
    initial: State,
    iterations: Vec<Vec<NewItem>>,
}

impl Schema {
    /// Lay out `problem` against `domain` and build the initial state.
    pub fn build(domain: &Domain, problem: &Problem) -> SchemaResult<Schema> {
        let entries = index_entries(&problem.initial)?;

        let mut entities = Vec::with_capacity(domain.entities().len());
        for decl in domain.entities() {
            let storage = match decl.collection {
                Some(collection) => EntityStorage::Dynamic { collection },
                None => {
                    let count = match entries.get(decl.name.as_str()) {
                        Some(entry) => cardinality(entry)?,
                        None => {
                            warn!(entity = %decl.name, "no cardinality given, assuming 0");
                            0
                        }
                    };
                    EntityStorage::Positional { count }
                }
            };
            entities.push(EntityLayout {
                name: decl.name.clone(),
                base_role: decl.base_role.clone(),
                storage,
            });
        }

        let mut collections: Vec<CollectionLayout> = Vec::with_capacity(domain.items.len());
        let mut items_decls: Vec<&ItemsDecl> = domain.items.iter().collect();
        items_decls.sort_by_key(|d| d.collection);
        for decl in items_decls {
            collections.push(CollectionLayout {
                name: entities
                    .get(decl.entity)
                    .map(|e| e.name.clone())
                    .unwrap_or_default(),
                entity: decl.entity,
                fields: decl
                    .fields
                    .iter()
                    .map(|f| FieldLayout {
                        name: f.name.clone(),
                        kind: f.kind,
                        constant: f.constant,
                        slot: f.slot,
                    })
                    .collect(),
            });
        }

        let mut const_layouts = Vec::new();
        let mut constants = Vec::new();
        let mut var_layouts = Vec::new();
        let mut vars = Vec::new();
        let mut names = HashMap::new();
        for decl in &domain.variables {
            let layout = var_layout(decl, &entities);
            let values = match entries.get(decl.name.as_str()) {
                Some(entry) => fill_values(&layout, entry)?,
                None => vec![Value::default_for(layout.kind); layout.len],
            };
            if decl.constant {
                names.insert(decl.name.clone(), VarRef::Const(const_layouts.len()));
                const_layouts.push(layout);
                constants.push(values);
            } else {
                names.insert(decl.name.clone(), VarRef::Var(var_layouts.len()));
                var_layouts.push(layout);
                vars.push(values);
            }
        }
        for (index, collection) in collections.iter().enumerate() {
            for field in &collection.fields {
                names.insert(
                    field.name.clone(),
                    VarRef::Field {
                        collection: index,
                        field: field.slot,
                        constant: field.constant,
                    },
                );
            }
        }

        // Anything left in the problem must be an entity or a variable.
        for entry in &problem.initial {
            let known_entity = entities.iter().any(|e| e.name == entry.name);
            match names.get(&entry.name) {
                Some(VarRef::Field { .. }) => {
                    return Err(SchemaError::FieldInitialized {
                        name: entry.name.clone(),
                        line: entry.line,
                    })
                }
                Some(_) => {}
                None if known_entity => {}
                None => {
                    return Err(SchemaError::UnknownName {
                        name: entry.name.clone(),
                        line: entry.line,
                    })
                }
            }
        }

        let mut items = vec![ItemCollection::new(); collections.len()];
        for entry in &problem.initial {
            if let Some(collection) = dynamic_collection(&entities, &entry.name) {
                for new_item in item_rows(&collections, collection, entry)? {
                    items[collection].insert(new_item.row.into_item());
                }
            }
        }

        let mut iterations = Vec::with_capacity(problem.iterations.len());
        for batch in &problem.iterations {
            let mut new_items = Vec::new();
            for entry in batch {
                let Some(collection) = dynamic_collection(&entities, &entry.name) else {
                    return Err(SchemaError::ScalarInIteration {
                        name: entry.name.clone(),
                        line: entry.line,
                    });
                };
                new_items.extend(item_rows(&collections, collection, entry)?);
            }
            iterations.push(new_items);
        }

        debug!(
            entities = entities.len(),
            constants = const_layouts.len(),
            variables = var_layouts.len(),
            collections = collections.len(),
            iterations = iterations.len(),
            "built schema"
        );

        Ok(Schema {
            entities,
            const_layouts,
            constants,
            var_layouts,
            collections,
            names,
            initial: State::new(vars, items),
            iterations,
        })
    }

    /// A fresh copy of the initial state.
    pub fn initial_state(&self) -> State {
        self.initial.snapshot()
    }

    pub fn entity(&self, index: usize) -> Option<&EntityLayout> {
        self.entities.get(index)
    }

    pub fn entities(&self) -> &[EntityLayout] {
        &self.entities
    }

    pub fn entity_index(&self, name: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.name == name)
    }

    /// Values of a constant, one per instance of its owner.
    pub fn constant(&self, slot: usize) -> Option<&[Value]> {
        self.constants.get(slot).map(Vec::as_slice)
    }

    pub fn const_layout(&self, slot: usize) -> Option<&VarLayout> {
        self.const_layouts.get(slot)
    }

    pub fn var_layout(&self, slot: usize) -> Option<&VarLayout> {
        self.var_layouts.get(slot)
    }

    pub fn var_layouts(&self) -> &[VarLayout] {
        &self.var_layouts
    }

    pub fn const_layouts(&self) -> &[VarLayout] {
        &self.const_layouts
    }

    pub fn collection(&self, index: usize) -> Option<&CollectionLayout> {
        self.collections.get(index)
    }

    pub fn collections(&self) -> &[CollectionLayout] {
        &self.collections
    }

    /// Storage of a variable or item field by name.
    pub fn lookup(&self, name: &str) -> Option<VarRef> {
        self.names.get(name).copied()
    }

    /// Declared kind of the storage behind `var`.
    pub fn kind_of(&self, var: VarRef) -> Option<ValueKind> {
        match var {
            VarRef::Const(slot) => self.const_layouts.get(slot).map(|l| l.kind),
            VarRef::Var(slot) => self.var_layouts.get(slot).map(|l| l.kind),
            VarRef::Field {
                collection,
                field,
                constant,
            } => self.collections.get(collection).and_then(|c| {
                c.fields
                    .iter()
                    .find(|f| f.constant == constant && f.slot == field)
                    .map(|f| f.kind)
            }),
        }
    }

    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    /// Items added by iteration batch `index` (0 is the first batch after
    /// the initial values).
    pub fn iteration(&self, index: usize) -> Option<&[NewItem]> {
        self.iterations.get(index).map(Vec::as_slice)
    }
}

fn index_entries(entries: &[ProblemEntry]) -> SchemaResult<HashMap<&str, &ProblemEntry>> {
    let mut seen = HashSet::new();
    let mut index = HashMap::new();
    for entry in entries {
        if !seen.insert(entry.name.as_str()) {
            return Err(SchemaError::DuplicateEntry {
                name: entry.name.clone(),
                line: entry.line,
            });
        }
        index.insert(entry.name.as_str(), entry);
    }
    Ok(index)
}

fn cardinality(entry: &ProblemEntry) -> SchemaResult<i64> {
    match entry.values.as_slice() {
        [InitValue {
            index: None,
            value: Literal::Int(n),
            ..
        }] if *n >= 0 => Ok(*n),
        _ => Err(SchemaError::InvalidCardinality {
            name: entry.name.clone(),
            line: entry.line,
        }),
    }
}

fn dynamic_collection(entities: &[EntityLayout], name: &str) -> Option<usize> {
    entities
        .iter()
        .find(|e| e.name == name)
        .and_then(|e| match e.storage {
            EntityStorage::Dynamic { collection } => Some(collection),
            EntityStorage::Positional { .. } => None,
        })
}

fn var_layout(decl: &VarDecl, entities: &[EntityLayout]) -> VarLayout {
    let len = match decl.owner.and_then(|o| entities.get(o)).map(|e| e.storage) {
        Some(EntityStorage::Positional { count }) => count as usize,
        _ => 1,
    };
    VarLayout {
        name: decl.name.clone(),
        kind: decl.kind,
        owner: decl.owner,
        role: decl.role.clone(),
        len,
    }
}

fn convert(name: &str, kind: ValueKind, value: &InitValue) -> SchemaResult<Value> {
    Value::from_literal(&value.value, kind).ok_or_else(|| SchemaError::KindMismatch {
        name: name.to_string(),
        expected: kind,
        found: format!("{:?}", value.value),
        line: value.line,
    })
}

/// Initial values of a variable.
///
/// A single unindexed value is a default for every instance. Otherwise
/// unindexed values fill consecutive positions and `k. value` lines set
/// position `k`; unset positions keep the kind's default.
fn fill_values(layout: &VarLayout, entry: &ProblemEntry) -> SchemaResult<Vec<Value>> {
    let mut values = vec![Value::default_for(layout.kind); layout.len];
    match entry.values.as_slice() {
        [] => return Ok(values),
        [single] if single.index.is_none() => {
            let value = convert(&layout.name, layout.kind, single)?;
            values.fill(value);
            return Ok(values);
        }
        all if all.iter().all(|v| v.index.is_none()) && all.len() != layout.len => {
            return Err(SchemaError::ShapeMismatch {
                name: layout.name.clone(),
                expected: layout.len,
                found: all.len(),
                line: entry.line,
            });
        }
        _ => {}
    }

    let mut cursor = 0;
    for init in &entry.values {
        let position = init.index.unwrap_or(cursor);
        if position >= layout.len {
            return Err(SchemaError::IndexOutOfRange {
                name: layout.name.clone(),
                index: position,
                length: layout.len,
                line: init.line,
            });
        }
        values[position] = convert(&layout.name, layout.kind, init)?;
        cursor = position + 1;
    }
    Ok(values)
}

fn item_rows(
    collections: &[CollectionLayout],
    collection: usize,
    entry: &ProblemEntry,
) -> SchemaResult<Vec<NewItem>> {
    let Some(layout) = collections.get(collection) else {
        return Ok(Vec::new());
    };
    let mut rows = Vec::with_capacity(entry.values.len());
    for init in &entry.values {
        let literals: Vec<&Literal> = match &init.value {
            Literal::Tuple(fields) => fields.iter().collect(),
            single => vec![single],
        };
        if literals.len() != layout.fields.len() {
            return Err(SchemaError::FieldCount {
                name: layout.name.clone(),
                expected: layout.fields.len(),
                found: literals.len(),
                line: init.line,
            });
        }
        let mut values = Vec::with_capacity(literals.len());
        for (field, literal) in layout.fields.iter().zip(literals) {
            let value = Value::from_literal(literal, field.kind).ok_or_else(|| {
                SchemaError::KindMismatch {
                    name: field.name.clone(),
                    expected: field.kind,
                    found: format!("{:?}", literal),
                    line: init.line,
                }
            })?;
            values.push(value);
        }
        let row = layout.row(values).map_err(|field| SchemaError::KindMismatch {
            name: field.name.clone(),
            expected: field.kind,
            found: "a value of another kind".to_string(),
            line: init.line,
        })?;
        rows.push(NewItem { collection, row });
    }
    Ok(rows)
}
