//! Ordered middleware registration with id-relative positioning.

use crate::error::StackError;
use crate::middleware::{Middleware, Pivot};

/// Ordered sequence of uniquely-identified middleware stages.
///
/// Order is the sole ranking mechanism: stages execute in the order they
/// appear, and positioning is expressed relative to existing ids through
/// [`Pivot`] references. Ids are unique at all times; every mutating
/// operation either fully succeeds or fails leaving the stack unchanged.
///
/// Lookups scan the backing `Vec` — pipelines are a handful of stages, and
/// structural changes happen single-threaded during application assembly
/// before the gateway starts serving traffic.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareStack {
    items: Vec<Middleware>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a stack from an ordered collection, rejecting duplicate ids.
    pub fn with_items(
        items: impl IntoIterator<Item = Middleware>,
    ) -> Result<Self, StackError> {
        let mut stack = Self::new();
        for item in items {
            stack.push(item)?;
        }
        Ok(stack)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Middleware> {
        self.items.iter()
    }

    /// Stage ids in execution order.
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }

    fn index_of(&self, id: &str) -> Result<usize, StackError> {
        self.items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| StackError::ItemNotFound(id.to_string()))
    }

    fn ensure_new_ids(&self, items: &[Middleware]) -> Result<(), StackError> {
        for (i, item) in items.iter().enumerate() {
            if self.items.iter().any(|existing| existing.id == item.id) {
                return Err(StackError::DuplicateItem(item.id.clone()));
            }
            if items[..i].iter().any(|earlier| earlier.id == item.id) {
                return Err(StackError::DuplicateItem(item.id.clone()));
            }
        }
        Ok(())
    }

    /// Appends a stage at the end of the stack.
    pub fn push(&mut self, item: Middleware) -> Result<&mut Self, StackError> {
        self.ensure_new_ids(std::slice::from_ref(&item))?;
        self.items.push(item);
        Ok(self)
    }

    /// Inserts the given stages relative to `pivot`. A bare-id pivot means
    /// insert-after, matching [`Pivot::Id`] shorthand.
    pub fn insert(
        &mut self,
        pivot: &Pivot,
        items: Vec<Middleware>,
    ) -> Result<&mut Self, StackError> {
        match pivot {
            Pivot::Id(id) | Pivot::After(id) => self.insert_after(id, items),
            Pivot::Before(id) => self.insert_before(id, items),
        }
    }

    /// Splices `items` immediately after the stage with id `pivot_id`,
    /// preserving the relative order of both the batch and existing stages.
    pub fn insert_after(
        &mut self,
        pivot_id: &str,
        items: Vec<Middleware>,
    ) -> Result<&mut Self, StackError> {
        let index = self.index_of(pivot_id)?;
        self.ensure_new_ids(&items)?;
        self.items.splice(index + 1..index + 1, items);
        Ok(self)
    }

    /// Splices `items` immediately before the stage with id `pivot_id`.
    pub fn insert_before(
        &mut self,
        pivot_id: &str,
        items: Vec<Middleware>,
    ) -> Result<&mut Self, StackError> {
        let index = self.index_of(pivot_id)?;
        self.ensure_new_ids(&items)?;
        self.items.splice(index..index, items);
        Ok(self)
    }

    /// Removes and returns the stage with the given id.
    pub fn remove(&mut self, id: &str) -> Result<Middleware, StackError> {
        let index = self.index_of(id)?;
        Ok(self.items.remove(index))
    }

    /// First stage matching the id, if any.
    pub fn find(&self, id: &str) -> Option<&Middleware> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Stages satisfying the predicate, in order. Does not mutate the stack.
    pub fn filter(&self, predicate: impl Fn(&Middleware) -> bool) -> Vec<Middleware> {
        self.items
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    /// Stages not satisfying the predicate, in order.
    pub fn reject(&self, predicate: impl Fn(&Middleware) -> bool) -> Vec<Middleware> {
        self.filter(|item| !predicate(item))
    }

    /// Removes the stage with `id` and reinserts it at the pivot position.
    /// Every other stage keeps its relative order. Bare-id pivots are
    /// rejected: a move must say before or after explicitly.
    pub fn move_to(&mut self, id: &str, pivot: &Pivot) -> Result<&mut Self, StackError> {
        match pivot {
            Pivot::Before(pivot_id) => self.move_before(id, pivot_id),
            Pivot::After(pivot_id) => self.move_after(id, pivot_id),
            Pivot::Id(_) => Err(StackError::InvalidPivot(
                "a move pivot requires an explicit \"before\" or \"after\"".to_string(),
            )),
        }
    }

    pub fn move_before(&mut self, id: &str, pivot_id: &str) -> Result<&mut Self, StackError> {
        let from = self.index_of(id)?;
        if id == pivot_id {
            return Err(StackError::ItemNotFound(pivot_id.to_string()));
        }
        self.index_of(pivot_id)?;
        let item = self.items.remove(from);
        let to = self.index_of(pivot_id)?;
        self.items.insert(to, item);
        Ok(self)
    }

    pub fn move_after(&mut self, id: &str, pivot_id: &str) -> Result<&mut Self, StackError> {
        let from = self.index_of(id)?;
        if id == pivot_id {
            return Err(StackError::ItemNotFound(pivot_id.to_string()));
        }
        self.index_of(pivot_id)?;
        let item = self.items.remove(from);
        let to = self.index_of(pivot_id)?;
        self.items.insert(to + 1, item);
        Ok(self)
    }

    /// Replaces the stage at `id`'s position with `configurator(existing)`,
    /// preserving position and length. A configurator may change the id as
    /// long as the new id does not collide with another stage.
    pub fn config(
        &mut self,
        id: &str,
        configurator: impl FnOnce(Middleware) -> Middleware,
    ) -> Result<&mut Self, StackError> {
        let index = self.index_of(id)?;
        let updated = configurator(self.items[index].clone());
        if updated.id != id
            && self.items.iter().any(|existing| existing.id == updated.id)
        {
            return Err(StackError::DuplicateItem(updated.id));
        }
        self.items[index] = updated;
        Ok(self)
    }
}
