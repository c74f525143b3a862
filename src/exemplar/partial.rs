//! Per-pass state: the read-only view callbacks observe while a draw is in
//! flight, and the named-value map handed to the constructor at the end.

use std::collections::HashMap;
use std::fmt;

use crate::error::{DrawError, DrawResult};
use crate::schema::Schema;

/// Read-only view over the attributes drawn so far in the current pass.
///
/// Owned exclusively by one draw pass and discarded when the pass completes
/// or aborts; nothing leaks between passes. Looking up an attribute that has
/// not been drawn yet is an error, never a sentinel value.
///
/// Default-valued attributes are treated as already drawn at pass start:
/// their values are visible to every callback. Excluded attributes never
/// appear.
pub struct PartialInstance<'a, V> {
    schema: &'a Schema<V>,
    slots: Vec<Option<V>>,
}

impl<'a, V: Clone> PartialInstance<'a, V> {
    pub(crate) fn new(schema: &'a Schema<V>) -> Self {
        let slots = schema
            .attributes()
            .iter()
            .map(|spec| spec.default_value().cloned())
            .collect();
        Self { schema, slots }
    }
}

impl<'a, V> PartialInstance<'a, V> {
    /// Value of an already-drawn attribute.
    ///
    /// Fails with [`DrawError::NotYetDrawn`] when the attribute exists but
    /// has no value yet in this pass, and [`DrawError::UnknownAttribute`]
    /// when the schema does not contain it at all.
    pub fn get(&self, name: &str) -> DrawResult<&V> {
        match self.schema.index_of(name) {
            None => Err(DrawError::UnknownAttribute(name.to_string())),
            Some(at) => self.slots[at]
                .as_ref()
                .ok_or_else(|| DrawError::NotYetDrawn(name.to_string())),
        }
    }

    /// Whether the named attribute has a value in this pass.
    pub fn has(&self, name: &str) -> bool {
        self.schema
            .index_of(name)
            .map(|at| self.slots[at].is_some())
            .unwrap_or(false)
    }

    /// Names with values so far, in draw order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schema
            .attributes()
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.is_some())
            .map(|(spec, _)| spec.name())
    }

    /// Number of attributes with values so far.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    pub(crate) fn set(&mut self, at: usize, value: V) {
        self.slots[at] = Some(value);
    }

    /// Consume the pass state into the constructor's argument map. Excluded
    /// attributes carry no value and are omitted.
    pub(crate) fn into_drawn_values(self) -> DrawnValues<V> {
        let PartialInstance { schema, slots } = self;
        let mut values = HashMap::with_capacity(slots.len());
        for (spec, slot) in schema.attributes().iter().zip(slots) {
            if let Some(value) = slot {
                values.insert(spec.name().to_string(), value);
            }
        }
        DrawnValues { values }
    }
}

impl<'a, V> fmt::Debug for PartialInstance<'a, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialInstance")
            .field("record", &self.schema.record())
            .field("drawn", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// The named arguments handed to the record constructor: every drawn value
/// plus the defaults, minus construction-excluded attributes.
pub struct DrawnValues<V> {
    values: HashMap<String, V>,
}

impl<V> DrawnValues<V> {
    /// Remove and return the value for `name`.
    pub fn take(&mut self, name: &str) -> DrawResult<V> {
        self.values
            .remove(name)
            .ok_or_else(|| DrawError::UnknownAttribute(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
