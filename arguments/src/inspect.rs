use std::fmt;

use object::{IndexedObject, ObjectType, Tagged, Value};

use crate::access;
use crate::realm::ReadOnlyRoots;

/// A raw backing storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Hole,
    Value(Value),
}

/// Everything observable about a built arguments object, detached from the
/// heap so objects from different construction paths can be compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentsSnapshot {
    pub object_type: ObjectType,
    pub map: Value,
    pub length: usize,
    /// Backing storage contents; mapped indices hold the hole.
    pub elements: Vec<Element>,
    /// Values as read through the alias map.
    pub values: Vec<Value>,
    /// Context slot per alias map entry; empty without an alias map.
    pub mapped: Vec<Option<usize>>,
    pub callee: Option<Value>,
    /// `elements` is the shared empty fixed array.
    pub shares_empty_storage: bool,
}

/// # Safety
///
/// `object` must be a live arguments object built against `roots`.
pub unsafe fn snapshot(roots: &ReadOnlyRoots, object: Tagged<IndexedObject>) -> ArgumentsSnapshot {
    // SAFETY: by contract
    unsafe {
        let header = object.as_ref();
        let length = header.len();
        let storage = access::backing_storage(object);

        let elements = storage
            .as_ref()
            .elements()
            .iter()
            .map(|v| if roots.is_the_hole(*v) { Element::Hole } else { Element::Value(*v) })
            .collect();
        let values = (0..length).filter_map(|i| access::get_element(object, i)).collect();
        let mapped = match access::alias_map(object) {
            Some(alias) => (0..alias.as_ref().mapped_count())
                .map(|i| access::mapped_context_index(object, i))
                .collect(),
            None => Vec::new(),
        };

        ArgumentsSnapshot {
            object_type: header.header.object_type(),
            map: header.map,
            length,
            elements,
            values,
            mapped,
            callee: access::callee(object).map(|f| f.value()),
            shares_empty_storage: header.elements == roots.empty_fixed_array.value(),
        }
    }
}

struct Shown(Value);

impl fmt::Display for Shown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_fixnum() {
            Some(n) => write!(f, "{n}"),
            None => write!(f, "{:?}", self.0),
        }
    }
}

impl fmt::Display for ArgumentsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} length={} elements=[", self.object_type, self.length)?;
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match element {
                Element::Hole => f.write_str("<hole>")?,
                Element::Value(v) => write!(f, "{}", Shown(*v))?,
            }
        }
        f.write_str("] values=[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", Shown(*v))?;
        }
        f.write_str("]")?;
        if !self.mapped.is_empty() {
            f.write_str(" mapped=[")?;
            for (i, slot) in self.mapped.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match slot {
                    Some(slot) => write!(f, "ctx[{slot}]")?,
                    None => f.write_str("-")?,
                }
            }
            f.write_str("]")?;
        }
        if self.callee.is_some() {
            f.write_str(" callee")?;
        }
        if self.shares_empty_storage {
            f.write_str(" (empty fixed array)")?;
        }
        Ok(())
    }
}
