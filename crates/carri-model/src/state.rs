//! Mutable simulation state.

use crate::schema::{EntityStorage, Schema};
use crate::value::Value;
use std::collections::btree_map::{self, BTreeMap};
use std::ops::Range;
use std::sync::Arc;

/// One live item of a dynamic entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Item {
    /// Constant fields, shared between snapshots.
    pub consts: Arc<[Value]>,
    /// Mutable fields, copied on snapshot.
    pub vars: Vec<Value>,
}

impl Item {
    pub fn new(consts: Vec<Value>, vars: Vec<Value>) -> Self {
        Self {
            consts: consts.into(),
            vars,
        }
    }
}

/// Items of one dynamic entity, keyed by id.
///
/// Ids come from a counter owned by the collection: they increase
/// monotonically and are never reused after a removal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemCollection {
    items: BTreeMap<i64, Item>,
    next_id: i64,
}

impl ItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item under a fresh id and return the id.
    pub fn insert(&mut self, item: Item) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.insert(id, item);
        id
    }

    pub fn remove(&mut self, id: i64) -> Option<Item> {
        self.items.remove(&id)
    }

    /// Replace the fields of a live item, keeping its id.
    pub fn replace(&mut self, id: i64, item: Item) -> Option<Item> {
        let slot = self.items.get_mut(&id)?;
        Some(std::mem::replace(slot, item))
    }

    pub fn get(&self, id: i64) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.items.contains_key(&id)
    }

    /// Live ids in increasing order.
    pub fn ids(&self) -> btree_map::Keys<'_, i64, Item> {
        self.items.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, i64, Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Id the next inserted item will get.
    pub fn next_id(&self) -> i64 {
        self.next_id
    }
}

/// Ids of the live instances of one entity type.
pub enum EntityIds<'a> {
    Range(Range<i64>),
    Items(btree_map::Keys<'a, i64, Item>),
}

impl Iterator for EntityIds<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        match self {
            EntityIds::Range(range) => range.next(),
            EntityIds::Items(keys) => keys.next().copied(),
        }
    }
}

/// Mutable variable values and item collections for one simulation step.
///
/// `vars` is indexed like the schema's mutable variable slots; each entry
/// holds one value per instance of the owning entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    vars: Vec<Vec<Value>>,
    items: Vec<ItemCollection>,
}

impl State {
    pub fn new(vars: Vec<Vec<Value>>, items: Vec<ItemCollection>) -> Self {
        Self { vars, items }
    }

    /// Independent deep copy of this state.
    ///
    /// Every variable array and item field sequence is copied; only the
    /// immutable constant field tuples are shared.
    pub fn snapshot(&self) -> State {
        State {
            vars: self.vars.clone(),
            items: self.items.clone(),
        }
    }

    pub fn var(&self, slot: usize) -> Option<&[Value]> {
        self.vars.get(slot).map(Vec::as_slice)
    }

    pub fn var_mut(&mut self, slot: usize) -> Option<&mut Vec<Value>> {
        self.vars.get_mut(slot)
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn collection(&self, index: usize) -> Option<&ItemCollection> {
        self.items.get(index)
    }

    pub fn collection_mut(&mut self, index: usize) -> Option<&mut ItemCollection> {
        self.items.get_mut(index)
    }

    pub fn collection_count(&self) -> usize {
        self.items.len()
    }

    /// Live ids of an entity type, in increasing order.
    pub fn entity_ids(&self, schema: &Schema, entity: usize) -> EntityIds<'_> {
        match schema.entity(entity).map(|e| e.storage) {
            Some(EntityStorage::Positional { count }) => EntityIds::Range(0..count),
            Some(EntityStorage::Dynamic { collection }) => match self.items.get(collection) {
                Some(items) => EntityIds::Items(items.ids()),
                None => EntityIds::Range(0..0),
            },
            None => EntityIds::Range(0..0),
        }
    }

    /// True if `id` names a live instance of the entity type.
    pub fn entity_exists(&self, schema: &Schema, entity: usize, id: i64) -> bool {
        match schema.entity(entity).map(|e| e.storage) {
            Some(EntityStorage::Positional { count }) => (0..count).contains(&id),
            Some(EntityStorage::Dynamic { collection }) => self
                .items
                .get(collection)
                .is_some_and(|items| items.contains(id)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(on: i64) -> Item {
        Item::new(vec![Value::int(9)], vec![Value::int(on)])
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut items = ItemCollection::new();
        let a = items.insert(package(0));
        let b = items.insert(package(1));
        assert!(items.remove(a).is_some());
        let c = items.insert(package(2));
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(items.ids().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(items.next_id(), 3);
        assert!(items.ids().all(|id| *id < items.next_id()));
    }

    #[test]
    fn test_replace_keeps_id() {
        let mut items = ItemCollection::new();
        let id = items.insert(package(0));
        assert!(items.replace(id, package(5)).is_some());
        assert_eq!(items.get(id).unwrap().vars[0], Value::int(5));
        assert!(items.replace(42, package(1)).is_none());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut items = ItemCollection::new();
        items.insert(package(0));
        let original = State::new(vec![vec![Value::int(5), Value::set([1])]], vec![items]);

        let mut copy = original.snapshot();
        copy.var_mut(0).unwrap()[0] = Value::int(6);
        if let Value::Set(s) = &mut copy.var_mut(0).unwrap()[1] {
            s.insert(2);
        }
        copy.collection_mut(0).unwrap().get_mut(0).unwrap().vars[0] = Value::int(3);
        copy.collection_mut(0).unwrap().insert(package(1));

        assert_eq!(original.var(0).unwrap()[0], Value::int(5));
        assert_eq!(original.var(0).unwrap()[1], Value::set([1]));
        assert_eq!(original.collection(0).unwrap().get(0).unwrap().vars[0], Value::int(0));
        assert_eq!(original.collection(0).unwrap().len(), 1);
        assert_eq!(original.collection(0).unwrap().next_id(), 1);
    }
}
