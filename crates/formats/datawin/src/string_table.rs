use std::collections::HashMap;

use crate::address::ObjectId;
use crate::context::{ReadCtx, WriteCtx};
use crate::error::Result;

/// Index of a string in the STRG pool.
///
/// Equality is by index: two refs to identical text read from different pool
/// slots stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StringRef(pub u32);

impl StringRef {
    /// Placeholder held by a field whose pointer is still deferred.
    pub(crate) const PENDING: Self = Self(u32::MAX);
}

/// Lookup interface for anything that can turn a [`StringRef`] into text.
pub trait StringResolver {
    fn resolve(&self, s: StringRef) -> Option<&str>;
}

/// Parsed STRG chunk.
///
/// Layout: `count:u32`, `count × ptr` (each to a length prefix), then the
/// strings as `len:u32, bytes, NUL`.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    strings: Vec<String>,
    lookup: HashMap<String, StringRef>,
}

impl PartialEq for StringTable {
    fn eq(&self, other: &Self) -> bool {
        self.strings == other.strings
    }
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, s: StringRef) -> Option<&str> {
        self.strings.get(s.0 as usize).map(String::as_str)
    }

    /// First pool slot holding `text`.
    pub fn find(&self, text: &str) -> Option<StringRef> {
        self.lookup.get(text).copied()
    }

    /// Return the existing slot for `text`, or append it.
    pub fn intern(&mut self, text: &str) -> StringRef {
        match self.find(text) {
            Some(s) => s,
            None => self.push(text.to_owned()),
        }
    }

    /// Append without deduplicating. Files may carry the same text in
    /// several slots and every slot keeps its position.
    pub fn push(&mut self, text: String) -> StringRef {
        let s = StringRef(self.strings.len() as u32);
        self.lookup.entry(text.clone()).or_insert(s);
        self.strings.push(text);
        s
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringRef, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (StringRef(i as u32), s.as_str()))
    }

    pub fn decode(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        let ptrs = r.read_pointer_list()?;
        let mut table = Self::new();
        for (i, ptr) in ptrs.into_iter().enumerate() {
            r.seek(ptr as usize);
            r.enter(ObjectId::String(StringRef(i as u32)))?;
            let text = r.read_gm_string()?;
            table.push(text);
        }
        Ok(table)
    }

    pub fn encode(&self, w: &mut WriteCtx) -> Result<()> {
        w.write_u32(self.strings.len() as u32);
        for i in 0..self.strings.len() {
            w.write_pointer(ObjectId::String(StringRef(i as u32)), 0);
        }
        for (i, text) in self.strings.iter().enumerate() {
            w.enter(ObjectId::String(StringRef(i as u32)))?;
            w.write_gm_string(text);
        }
        Ok(())
    }
}

impl StringResolver for StringTable {
    fn resolve(&self, s: StringRef) -> Option<&str> {
        self.get(s)
    }
}
