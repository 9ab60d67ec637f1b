//! Per-pass state handed to resource codecs.

use std::ops::{Deref, DerefMut};

use crate::address::{AddressSpace, Field, ObjectId, Patch, PendingPointer, Slot, TypeTag};
use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::string_table::StringRef;
use crate::version::FormatVersion;

/// A resource type with a binary form.
///
/// The caller positions the context and registers the object (see
/// [`ReadCtx::enter`] / [`WriteCtx::enter`]) before invoking either method.
pub trait Resource: Sized {
    fn unserialize(r: &mut ReadCtx<'_, '_>) -> Result<Self>;
    fn serialize(&self, w: &mut WriteCtx) -> Result<()>;
}

/// Read-side context: a section cursor, the pass's address space and the
/// format version.
pub struct ReadCtx<'a, 's> {
    cursor: Cursor<'a>,
    space: &'s mut AddressSpace,
    version: FormatVersion,
    owner: ObjectId,
}

impl<'a, 's> ReadCtx<'a, 's> {
    pub fn new(cursor: Cursor<'a>, space: &'s mut AddressSpace, version: FormatVersion) -> Self {
        Self {
            cursor,
            space,
            version,
            owner: ObjectId::Header,
        }
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Object currently being decoded.
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn space(&mut self) -> &mut AddressSpace {
        &mut *self.space
    }

    /// Register `id` at the current position and make it the owner of
    /// subsequently deferred pointers.
    pub fn enter(&mut self, id: ObjectId) -> Result<()> {
        self.space.record(id, self.cursor.position() as u32)?;
        self.owner = id;
        Ok(())
    }

    /// Look up the object at `target`, or defer the pointer into `field` of
    /// the current owner.
    pub fn resolve(
        &mut self,
        source_offset: usize,
        target: u32,
        kind: TypeTag,
        field: Field,
    ) -> Result<Option<ObjectId>> {
        if let Some(object) = self.space.object_at(target, kind)? {
            return Ok(Some(object));
        }
        self.space.defer(PendingPointer {
            source_offset: source_offset as u32,
            target,
            target_kind: kind,
            slot: Slot {
                owner: self.owner,
                field,
            },
        });
        Ok(None)
    }

    /// Read a string pointer (to the character data, 4 bytes past the
    /// length prefix).
    pub fn read_string(&mut self, field: Field) -> Result<StringRef> {
        let at = self.cursor.position();
        let ptr = self.cursor.read_u32()?;
        let target = ptr.checked_sub(4).ok_or_else(|| Error::CorruptPointer {
            offset: at as u32,
            message: format!("string pointer {ptr:#x} precedes any length prefix"),
        })?;
        match self.resolve(at, target, TypeTag::String, field)? {
            Some(ObjectId::String(s)) => Ok(s),
            _ => Ok(StringRef::PENDING),
        }
    }

    /// Read `count` consecutive records, registering the i-th as `id(i)`.
    pub fn read_list<T: Resource>(
        &mut self,
        count: u32,
        id: impl Fn(u32) -> ObjectId,
    ) -> Result<Vec<T>> {
        let mut items = Vec::with_capacity((count as usize).min(self.cursor.remaining()));
        for i in 0..count {
            self.enter(id(i))?;
            items.push(T::unserialize(self)?);
        }
        Ok(items)
    }
}

impl<'a> Deref for ReadCtx<'a, '_> {
    type Target = Cursor<'a>;

    fn deref(&self) -> &Self::Target {
        &self.cursor
    }
}

impl DerefMut for ReadCtx<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cursor
    }
}

/// Write-side context: the output buffer, the pass's address space and the
/// format version.
pub struct WriteCtx {
    writer: Writer,
    space: AddressSpace,
    version: FormatVersion,
    owner: ObjectId,
}

impl WriteCtx {
    pub fn new(version: FormatVersion) -> Self {
        Self {
            writer: Writer::new(),
            space: AddressSpace::new(),
            version,
            owner: ObjectId::Header,
        }
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    /// Register `id` at the current output position.
    pub fn enter(&mut self, id: ObjectId) -> Result<()> {
        self.space.record(id, self.writer.position() as u32)?;
        self.owner = id;
        Ok(())
    }

    /// Write a pointer to `target` plus `addend`. Targets not emitted yet get
    /// a zero placeholder that [`WriteCtx::finish`] fills in.
    pub fn write_pointer(&mut self, target: ObjectId, addend: u32) {
        match self.space.offset_of(target) {
            Some(offset) => self.writer.write_u32(offset + addend),
            None => {
                let at = self.writer.position();
                self.space.queue_patch(Patch { at, target, addend });
                self.writer.write_u32(0);
            }
        }
    }

    pub fn write_string(&mut self, s: StringRef) {
        self.write_pointer(ObjectId::String(s), 4);
    }

    pub fn write_list<T: Resource>(
        &mut self,
        items: &[T],
        id: impl Fn(u32) -> ObjectId,
    ) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            self.enter(id(i as u32))?;
            item.serialize(self)?;
        }
        Ok(())
    }

    /// Apply every queued patch and return the finished buffer.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        for patch in self.space.take_patches() {
            let offset = self
                .space
                .offset_of(patch.target)
                .ok_or(Error::UnresolvedPointer {
                    source_offset: patch.at as u32,
                    target: 0,
                    kind: patch.target.tag(),
                })?;
            tracing::trace!(at = patch.at, target = %patch.target, offset, "patching pointer");
            self.writer.patch_u32(patch.at, offset + patch.addend);
        }
        Ok(self.writer.into_bytes())
    }
}

impl Deref for WriteCtx {
    type Target = Writer;

    fn deref(&self) -> &Self::Target {
        &self.writer
    }
}

impl DerefMut for WriteCtx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::func::FunctionId;

    #[test]
    fn test_forward_pointer_is_patched() {
        let mut w = WriteCtx::new(FormatVersion::default());
        w.write_string(StringRef(0));
        w.write_u32(0xAABB);
        w.enter(ObjectId::String(StringRef(0))).unwrap();
        w.write_gm_string("hi");
        let bytes = w.finish().unwrap();
        assert_eq!(&bytes[..4], &(8u32 + 4).to_le_bytes());
    }

    #[test]
    fn test_backward_pointer_is_immediate() {
        let mut w = WriteCtx::new(FormatVersion::default());
        w.enter(ObjectId::Function(FunctionId(0))).unwrap();
        w.write_u32(1);
        w.write_pointer(ObjectId::Function(FunctionId(0)), 0);
        assert_eq!(w.u32_at(4), 0);
        assert!(w.space().offset_of(ObjectId::Function(FunctionId(0))).is_some());
    }

    #[test]
    fn test_missing_patch_target() {
        let mut w = WriteCtx::new(FormatVersion::default());
        w.write_string(StringRef(9));
        let err = w.finish().unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedPointer {
                source_offset: 0,
                kind: TypeTag::String,
                ..
            }
        ));
    }

    #[test]
    fn test_read_string_defers_then_resolves() {
        let data = [0x0C, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut space = AddressSpace::new();
        let mut r = ReadCtx::new(Cursor::new(&data), &mut space, FormatVersion::default());
        r.enter(ObjectId::Function(FunctionId(0))).unwrap();
        assert_eq!(r.read_string(Field::Name).unwrap(), StringRef::PENDING);
        assert_eq!(space.pending_len(), 1);

        space.record(ObjectId::String(StringRef(2)), 8).unwrap();
        let mut bound = None;
        space
            .drain_pending(|p, object| {
                bound = Some((p.slot.owner, object));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            bound,
            Some((ObjectId::Function(FunctionId(0)), ObjectId::String(StringRef(2))))
        );
    }

    #[test]
    fn test_null_string_pointer() {
        let data = [0u8; 4];
        let mut space = AddressSpace::new();
        let mut r = ReadCtx::new(Cursor::new(&data), &mut space, FormatVersion::default());
        assert!(matches!(
            r.read_string(Field::Name),
            Err(Error::CorruptPointer { offset: 0, .. })
        ));
    }
}
