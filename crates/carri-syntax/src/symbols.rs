//! Name resolution tables used while parsing.

use crate::ast::{EntityDecl, ValueKind, VarRef};
use std::collections::HashMap;

/// Global names of a domain: entity types, variables and item fields.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entities: Vec<EntityDecl>,
    entity_index: HashMap<String, usize>,
    /// Variable and item-field names to their storage.
    variables: HashMap<String, (VarRef, ValueKind)>,
    /// Entity type index of each item collection.
    collections: Vec<usize>,
    /// Declared field count of each item collection.
    collection_fields: Vec<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    // === Entities ===

    /// Declare an entity type. Returns `None` if the name is taken.
    pub fn define_entity(
        &mut self,
        name: String,
        base_role: Option<String>,
        line: u32,
    ) -> Option<usize> {
        if self.entity_index.contains_key(&name) {
            return None;
        }
        let index = self.entities.len();
        self.entity_index.insert(name.clone(), index);
        self.entities.push(EntityDecl {
            name,
            index,
            base_role,
            collection: None,
            line,
        });
        Some(index)
    }

    pub fn lookup_entity(&self, name: &str) -> Option<usize> {
        self.entity_index.get(name).copied()
    }

    pub fn entity(&self, index: usize) -> Option<&EntityDecl> {
        self.entities.get(index)
    }

    pub fn entities(&self) -> &[EntityDecl] {
        &self.entities
    }

    pub fn entity_name(&self, index: usize) -> &str {
        self.entities
            .get(index)
            .map(|e| e.name.as_str())
            .unwrap_or("?")
    }

    // === Item collections ===

    /// Make an entity type dynamic. Returns `None` if it already is.
    pub fn define_collection(&mut self, entity: usize, field_count: usize) -> Option<usize> {
        let decl = self.entities.get_mut(entity)?;
        if decl.collection.is_some() {
            return None;
        }
        let collection = self.collections.len();
        decl.collection = Some(collection);
        self.collections.push(entity);
        self.collection_fields.push(field_count);
        Some(collection)
    }

    /// Collection index of a dynamic entity type.
    pub fn collection_of(&self, entity: usize) -> Option<usize> {
        self.entities.get(entity).and_then(|e| e.collection)
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn field_count(&self, collection: usize) -> usize {
        self.collection_fields.get(collection).copied().unwrap_or(0)
    }

    // === Variables ===

    /// Declare a variable or field name. Returns `false` if the name is taken.
    pub fn define_variable(&mut self, name: String, var: VarRef, kind: ValueKind) -> bool {
        if self.variables.contains_key(&name) {
            return false;
        }
        self.variables.insert(name, (var, kind));
        true
    }

    pub fn lookup_variable(&self, name: &str) -> Option<VarRef> {
        self.variables.get(name).map(|(var, _)| *var)
    }

    pub fn variable_kind(&self, name: &str) -> Option<ValueKind> {
        self.variables.get(name).map(|(_, kind)| *kind)
    }
}

/// What a scope slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Action parameter or `All` iterator ranging over an entity type.
    Entity(usize),
    /// Local introduced by `NewVal`.
    Local,
}

#[derive(Debug, Clone, PartialEq)]
struct ScopeEntry {
    name: String,
    kind: SlotKind,
}

/// Ordered parameter scope. The position of an entry is its binding slot.
///
/// Scopes are extended by copy so nested blocks never leak names into
/// their siblings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    entries: Vec<ScopeEntry>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this scope with one more slot appended.
    pub fn extend(&self, name: impl Into<String>, kind: SlotKind) -> Scope {
        let mut entries = self.entries.clone();
        entries.push(ScopeEntry {
            name: name.into(),
            kind,
        });
        Scope { entries }
    }

    /// Append a slot in place; used while building an action's parameter list.
    pub fn push(&mut self, name: impl Into<String>, kind: SlotKind) -> usize {
        self.entries.push(ScopeEntry {
            name: name.into(),
            kind,
        });
        self.entries.len() - 1
    }

    /// Find the innermost slot with this name.
    pub fn lookup(&self, name: &str) -> Option<(usize, SlotKind)> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| e.name == name)
            .map(|(slot, e)| (slot, e.kind))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_entity_rejected() {
        let mut symbols = SymbolTable::new();
        assert_eq!(symbols.define_entity("Vehicle".into(), None, 1), Some(0));
        assert_eq!(symbols.define_entity("Vehicle".into(), None, 2), None);
        assert_eq!(symbols.lookup_entity("Vehicle"), Some(0));
    }

    #[test]
    fn test_collection_binding() {
        let mut symbols = SymbolTable::new();
        symbols.define_entity("Vehicle".into(), None, 1);
        let package = symbols
            .define_entity("Package".into(), None, 1)
            .unwrap();
        assert_eq!(symbols.define_collection(package, 2), Some(0));
        assert_eq!(symbols.define_collection(package, 2), None);
        assert_eq!(symbols.collection_of(package), Some(0));
        assert_eq!(symbols.collection_of(0), None);
        assert_eq!(symbols.field_count(0), 2);
    }

    #[test]
    fn test_scope_extension_is_by_copy() {
        let outer = Scope::new().extend("v", SlotKind::Entity(0));
        let inner = outer.extend("d", SlotKind::Local);
        assert_eq!(outer.len(), 1);
        assert_eq!(inner.lookup("d"), Some((1, SlotKind::Local)));
        assert_eq!(outer.lookup("d"), None);
    }

    #[test]
    fn test_scope_lookup_prefers_innermost() {
        let scope = Scope::new()
            .extend("x", SlotKind::Entity(0))
            .extend("x", SlotKind::Local);
        assert_eq!(scope.lookup("x"), Some((1, SlotKind::Local)));
    }
}
