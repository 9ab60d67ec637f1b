//! Object identity ↔ byte offset bookkeeping for a single read or write pass.
//!
//! On read, every decoded object is registered at the offset it was found at,
//! and pointer fields are looked up here. A pointer whose target has not been
//! decoded yet is parked as a [`PendingPointer`] and bound once every section
//! has been read. On write the roles flip: objects are registered as they are
//! emitted, and pointers to objects that come later are queued as [`Patch`]es.

use std::collections::HashMap;
use std::fmt;

use crate::chunks::code::InstrRef;
use crate::chunks::func::FunctionId;
use crate::chunks::vari::VariableId;
use crate::error::{Error, Result};
use crate::string_table::StringRef;

/// Kind of object a pointer is expected to land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Header,
    String,
    CodeEntry,
    Instruction,
    Function,
    Variable,
    CodeLocals,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::String => "string",
            Self::CodeEntry => "code entry",
            Self::Instruction => "instruction",
            Self::Function => "function",
            Self::Variable => "variable",
            Self::CodeLocals => "code locals",
        };
        f.write_str(name)
    }
}

/// Identity of an addressable object in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectId {
    /// The GEN8 record.
    Header,
    String(StringRef),
    CodeEntry(u32),
    Instruction(InstrRef),
    Function(FunctionId),
    Variable(VariableId),
    CodeLocals(u32),
}

impl ObjectId {
    pub fn tag(self) -> TypeTag {
        match self {
            Self::Header => TypeTag::Header,
            Self::String(_) => TypeTag::String,
            Self::CodeEntry(_) => TypeTag::CodeEntry,
            Self::Instruction(_) => TypeTag::Instruction,
            Self::Function(_) => TypeTag::Function,
            Self::Variable(_) => TypeTag::Variable,
            Self::CodeLocals(_) => TypeTag::CodeLocals,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => f.write_str("header"),
            Self::String(s) => write!(f, "string #{}", s.0),
            Self::CodeEntry(i) => write!(f, "code entry #{i}"),
            Self::Instruction(r) => write!(f, "instruction {}:{}", r.entry, r.index),
            Self::Function(id) => write!(f, "function #{}", id.0),
            Self::Variable(id) => write!(f, "variable #{}", id.0),
            Self::CodeLocals(i) => write!(f, "code locals #{i}"),
        }
    }
}

/// Which pointer field of its owner a pending pointer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    FirstAddress,
    /// Name of the n-th local in a [`CodeLocals`](crate::chunks::func::CodeLocals) record.
    LocalName(u32),
    Filename,
    Config,
    DisplayName,
}

/// Destination of a deferred pointer: a field of an already-decoded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub owner: ObjectId,
    pub field: Field,
}

/// A pointer read before its target was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPointer {
    /// Offset of the pointer field itself.
    pub source_offset: u32,
    /// Offset the pointer resolves to (after any version adjustment).
    pub target: u32,
    pub target_kind: TypeTag,
    pub slot: Slot,
}

/// A pointer field written as zero, to be filled in once `target` is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub at: usize,
    pub target: ObjectId,
    /// Added to the target's offset (string pointers address the bytes after the length prefix).
    pub addend: u32,
}

/// Bidirectional object/offset map plus the deferred and patch-back queues.
#[derive(Debug, Default)]
pub struct AddressSpace {
    offsets: HashMap<ObjectId, u32>,
    objects: HashMap<u32, ObjectId>,
    pending: Vec<PendingPointer>,
    patches: Vec<Patch>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `object` as living at `offset`.
    pub fn record(&mut self, object: ObjectId, offset: u32) -> Result<()> {
        if let Some(&previous) = self.offsets.get(&object) {
            return Err(Error::CorruptPointer {
                offset,
                message: format!("{object} already registered at {previous:#x}"),
            });
        }
        if let Some(&occupant) = self.objects.get(&offset) {
            return Err(Error::CorruptPointer {
                offset,
                message: format!("cannot place {object}: offset already holds {occupant}"),
            });
        }
        self.offsets.insert(object, offset);
        self.objects.insert(offset, object);
        Ok(())
    }

    pub fn offset_of(&self, object: ObjectId) -> Option<u32> {
        self.offsets.get(&object).copied()
    }

    /// Look up the object at `offset`. Nothing there yet is `Ok(None)`; an
    /// object of the wrong kind is a corrupt pointer.
    pub fn object_at(&self, offset: u32, expected: TypeTag) -> Result<Option<ObjectId>> {
        match self.objects.get(&offset) {
            None => Ok(None),
            Some(&object) if object.tag() == expected => Ok(Some(object)),
            Some(&object) => Err(Error::CorruptPointer {
                offset,
                message: format!("expected {expected}, found {object}"),
            }),
        }
    }

    pub fn defer(&mut self, pointer: PendingPointer) {
        tracing::trace!(
            source = pointer.source_offset,
            target = pointer.target,
            kind = %pointer.target_kind,
            "deferring pointer"
        );
        self.pending.push(pointer);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Resolve every deferred pointer and hand it to `apply`. Leaves the
    /// queue empty on success.
    pub fn drain_pending(
        &mut self,
        mut apply: impl FnMut(&PendingPointer, ObjectId) -> Result<()>,
    ) -> Result<()> {
        for pointer in std::mem::take(&mut self.pending) {
            let object = self.object_at(pointer.target, pointer.target_kind)?.ok_or(
                Error::UnresolvedPointer {
                    source_offset: pointer.source_offset,
                    target: pointer.target,
                    kind: pointer.target_kind,
                },
            )?;
            apply(&pointer, object)?;
        }
        Ok(())
    }

    pub fn queue_patch(&mut self, patch: Patch) {
        tracing::trace!(at = patch.at, target = %patch.target, "queueing patch");
        self.patches.push(patch);
    }

    pub fn take_patches(&mut self) -> Vec<Patch> {
        std::mem::take(&mut self.patches)
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
