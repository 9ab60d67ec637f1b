use crate::address::{Field, ObjectId};
use crate::bytecode::{decode_instruction, encode_instruction, Instruction};
use crate::context::{ReadCtx, Resource, WriteCtx};
use crate::error::{Error, Result};
use crate::string_table::StringRef;

/// Identity of one instruction: code entry index and position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrRef {
    pub entry: u32,
    pub index: u32,
}

/// A single code entry in the CODE chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeEntry {
    /// Reference to the entry's name string (e.g., "gml_Script_foo").
    pub name: StringRef,
    /// Number of local variables.
    pub locals_count: u16,
    /// Number of arguments. Bit 15 is "weird local flag" in some tools.
    pub args_count: u16,
    pub instructions: Vec<Instruction>,
}

impl CodeEntry {
    /// Length of the encoded bytecode in bytes.
    pub fn bytecode_len(&self) -> usize {
        self.instructions.iter().map(Instruction::size).sum()
    }
}

fn entry_index(owner: ObjectId) -> Result<u32> {
    match owner {
        ObjectId::CodeEntry(i) => Ok(i),
        other => Err(Error::Parse {
            context: "CODE",
            message: format!("code entry codec invoked for {other}"),
        }),
    }
}

impl Resource for CodeEntry {
    /// Entry header: `name, length:u32, locals:u16, args:u16,
    /// bytecode_rel:i32, offset_in_blob:u32`. `bytecode_rel` is relative to
    /// its own field (entry + 12).
    fn unserialize(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        let entry = entry_index(r.owner())?;
        let name = r.read_string(Field::Name)?;
        let length = r.read_u32()?;
        let locals_count = r.read_u16()?;
        let args_count = r.read_u16()?;
        let rel_field = r.position();
        let bc_rel = r.read_i32()?;
        let offset_in_blob = r.read_u32()?;

        // GMS2.3 child functions share their parent's blob; we only handle
        // one entry per blob.
        if offset_in_blob != 0 {
            return Err(Error::Parse {
                context: "CODE",
                message: format!(
                    "code entry #{entry} starts {offset_in_blob:#x} bytes into a shared bytecode blob"
                ),
            });
        }

        let start = usize::try_from(rel_field as i64 + bc_rel as i64).map_err(|_| {
            Error::CorruptPointer {
                offset: rel_field as u32,
                message: format!("bytecode offset {bc_rel} points before the file"),
            }
        })?;
        let end = start + length as usize;
        let resume = r.position();

        r.seek(start);
        let mut instructions = Vec::new();
        while r.position() < end {
            let index = instructions.len() as u32;
            r.enter(ObjectId::Instruction(InstrRef { entry, index }))?;
            instructions.push(decode_instruction(r)?);
        }
        if r.position() != end {
            return Err(Error::Parse {
                context: "CODE",
                message: format!("last instruction of code entry #{entry} runs past its bytecode"),
            });
        }
        r.seek(resume);

        Ok(Self {
            name,
            locals_count,
            args_count,
            instructions,
        })
    }

    /// Writes the header followed directly by the bytecode (`bytecode_rel = 8`).
    fn serialize(&self, w: &mut WriteCtx) -> Result<()> {
        let entry = entry_index(w.owner())?;
        w.write_string(self.name);
        let length = self.bytecode_len();
        w.write_u32(length as u32);
        w.write_u16(self.locals_count);
        w.write_u16(self.args_count);
        w.write_i32(8);
        w.write_u32(0);

        let start = w.position();
        for (index, inst) in self.instructions.iter().enumerate() {
            w.enter(ObjectId::Instruction(InstrRef {
                entry,
                index: index as u32,
            }))?;
            encode_instruction(inst, w);
        }
        if w.position() - start != length {
            return Err(Error::Parse {
                context: "CODE",
                message: format!(
                    "code entry #{entry} encoded to {} bytes, expected {length}",
                    w.position() - start
                ),
            });
        }
        Ok(())
    }
}

/// Parsed CODE chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Code {
    pub entries: Vec<CodeEntry>,
}

impl Code {
    /// CODE layout: pointer list to entries. Entries are read wherever the
    /// pointers lead, so the cursor ends at the furthest byte any entry used.
    pub fn decode(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        let ptrs = r.read_pointer_list()?;
        let mut entries = Vec::with_capacity(ptrs.len());
        for (i, ptr) in ptrs.into_iter().enumerate() {
            r.seek(ptr as usize);
            r.enter(ObjectId::CodeEntry(i as u32))?;
            entries.push(CodeEntry::unserialize(r)?);
        }
        let furthest = r.furthest();
        r.seek(furthest);
        Ok(Self { entries })
    }

    pub fn encode(&self, w: &mut WriteCtx) -> Result<()> {
        w.write_u32(self.entries.len() as u32);
        for i in 0..self.entries.len() {
            w.write_pointer(ObjectId::CodeEntry(i as u32), 0);
        }
        w.write_list(&self.entries, ObjectId::CodeEntry)
    }

    pub fn instruction(&self, r: InstrRef) -> Option<&Instruction> {
        self.entries
            .get(r.entry as usize)?
            .instructions
            .get(r.index as usize)
    }

    pub fn instruction_mut(&mut self, r: InstrRef) -> Option<&mut Instruction> {
        self.entries
            .get_mut(r.entry as usize)?
            .instructions
            .get_mut(r.index as usize)
    }

    /// Every instruction in code-stream order.
    pub fn instructions(&self) -> impl Iterator<Item = (InstrRef, &Instruction)> {
        self.entries.iter().enumerate().flat_map(|(e, entry)| {
            entry.instructions.iter().enumerate().map(move |(i, inst)| {
                (
                    InstrRef {
                        entry: e as u32,
                        index: i as u32,
                    },
                    inst,
                )
            })
        })
    }
}
