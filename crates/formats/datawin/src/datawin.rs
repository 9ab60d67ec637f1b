use std::collections::HashSet;

use crate::address::{AddressSpace, Field, ObjectId, PendingPointer};
use crate::bytecode::types::Reference;
use crate::chunks::code::{Code, InstrRef};
use crate::chunks::func::{Func, Function, FunctionClassification, FunctionId};
use crate::chunks::gen8::Gen8;
use crate::chunks::vari::{Vari, Variable, VariableId};
use crate::context::{ReadCtx, Resource};
use crate::error::{Error, Result};
use crate::options::{ReadOptions, WriteOptions};
use crate::reader::{find_embedded_form, ChunkIndex};
use crate::refchain::{self, ChainTarget};
use crate::string_table::{StringRef, StringResolver, StringTable};
use crate::version::FormatVersion;
use crate::writer::FormWriter;

/// A chunk we don't model, carried through byte for byte.
///
/// Pointers inside it are not tracked, so it only survives a rewrite intact
/// when it doesn't point into the modeled chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    pub magic: [u8; 4],
    pub data: Vec<u8>,
}

/// One entry of the chunk layout, in file order.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Gen8,
    Strings,
    Code,
    Variables,
    Functions,
    Raw(RawChunk),
}

impl Section {
    pub fn magic(&self) -> [u8; 4] {
        match self {
            Self::Gen8 => *b"GEN8",
            Self::Strings => *b"STRG",
            Self::Code => *b"CODE",
            Self::Variables => *b"VARI",
            Self::Functions => *b"FUNC",
            Self::Raw(raw) => raw.magic,
        }
    }
}

/// A fully resolved GameMaker data.win.
///
/// Cross references are ids into the collections below; byte offsets only
/// exist while a read or write pass is running.
#[derive(Debug, Clone, PartialEq)]
pub struct DataWin {
    pub gen8: Gen8,
    /// Version the pointer encodings follow. GEN8's unless overridden on read.
    pub version: FormatVersion,
    pub strings: StringTable,
    pub code: Code,
    pub vari: Vari,
    pub func: Func,
    /// Chunk order for writing.
    pub layout: Vec<Section>,
}

impl DataWin {
    /// An empty game with the usual chunk order.
    pub fn new(gen8: Gen8) -> Self {
        Self {
            version: gen8.version,
            gen8,
            strings: StringTable::new(),
            code: Code::default(),
            vari: Vari::default(),
            func: Func::default(),
            layout: vec![
                Section::Gen8,
                Section::Code,
                Section::Variables,
                Section::Functions,
                Section::Strings,
            ],
        }
    }

    /// Parse a data.win file (or a PE exe containing an embedded data.win).
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with(data, &ReadOptions::default())
    }

    /// Parse with explicit options.
    ///
    /// GEN8 is decoded first since it carries the version; the remaining
    /// chunks follow in file order. Pointers to objects in later chunks are
    /// bound once every chunk has been read, then the reference chains are
    /// walked. Any error aborts the whole read.
    pub fn parse_with(data: &[u8], options: &ReadOptions) -> Result<Self> {
        let data = strip_pe_prefix(data);
        let index = ChunkIndex::parse(data)?;
        let mut space = AddressSpace::new();

        let gen8_entry = *index
            .find(b"GEN8")
            .ok_or(Error::ChunkNotFound { magic: *b"GEN8" })?;
        let gen8 = {
            let mut r = ReadCtx::new(gen8_entry.cursor(data), &mut space, FormatVersion::default());
            r.enter(ObjectId::Header)?;
            Gen8::unserialize(&mut r)?
        };
        if !gen8.bytecode_version.is_supported() {
            return Err(Error::UnsupportedVersion {
                version: gen8.bytecode_version.0,
            });
        }
        let version = options.version_override.unwrap_or(gen8.version);
        tracing::debug!(bytecode = %gen8.bytecode_version, %version, "decoded GEN8");

        let mut dw = Self {
            gen8,
            version,
            strings: StringTable::new(),
            code: Code::default(),
            vari: Vari::default(),
            func: Func::default(),
            layout: Vec::with_capacity(index.len()),
        };

        let mut seen = HashSet::new();
        for entry in index.chunks() {
            if !seen.insert(entry.magic) {
                return Err(Error::Parse {
                    context: "FORM",
                    message: format!(
                        "duplicate {} chunk at {:#x}",
                        entry.magic_str(),
                        entry.offset
                    ),
                });
            }
            if entry.magic == *b"GEN8" {
                dw.layout.push(Section::Gen8);
                continue;
            }

            let mut r = ReadCtx::new(entry.cursor(data), &mut space, version);
            let section = match &entry.magic {
                b"STRG" => {
                    dw.strings = StringTable::decode(&mut r)?;
                    Section::Strings
                }
                b"CODE" => {
                    dw.code = Code::decode(&mut r)?;
                    Section::Code
                }
                b"VARI" => {
                    dw.vari = Vari::decode(&mut r)?;
                    Section::Variables
                }
                b"FUNC" => {
                    dw.func = Func::decode(&mut r)?;
                    Section::Functions
                }
                _ => {
                    let rest = r.remaining();
                    Section::Raw(RawChunk {
                        magic: entry.magic,
                        data: r.read_bytes(rest)?.to_vec(),
                    })
                }
            };

            let consumed = r.furthest();
            if consumed < entry.end_offset() {
                tracing::debug!(
                    chunk = entry.magic_str(),
                    unused = entry.end_offset() - consumed,
                    "ignoring trailing bytes"
                );
            }
            tracing::debug!(
                chunk = entry.magic_str(),
                offset = entry.offset,
                size = entry.size,
                "decoded chunk"
            );
            dw.layout.push(section);
        }

        tracing::debug!(
            pending = space.pending_len(),
            objects = space.len(),
            "binding deferred pointers"
        );
        space.drain_pending(|pointer, object| dw.bind(pointer, object))?;
        refchain::resolve(&mut dw.code, &dw.func.functions, &dw.vari.variables, &space)?;
        dw.classify_functions();
        Ok(dw)
    }

    /// Store a late-bound pointer into the field it was read from.
    fn bind(&mut self, pointer: &PendingPointer, object: ObjectId) -> Result<()> {
        let misplaced = || Error::CorruptPointer {
            offset: pointer.source_offset,
            message: format!(
                "{:?} of {} cannot point to {object}",
                pointer.slot.field, pointer.slot.owner
            ),
        };

        match (pointer.slot.owner, pointer.slot.field, object) {
            (ObjectId::Header, field, ObjectId::String(s)) => {
                let slot = match field {
                    Field::Filename => &mut self.gen8.filename,
                    Field::Config => &mut self.gen8.config,
                    Field::Name => &mut self.gen8.name,
                    Field::DisplayName => &mut self.gen8.display_name,
                    _ => return Err(misplaced()),
                };
                *slot = s;
            }
            (ObjectId::CodeEntry(i), Field::Name, ObjectId::String(s)) => {
                self.code.entries.get_mut(i as usize).ok_or_else(misplaced)?.name = s;
            }
            (ObjectId::Function(id), Field::Name, ObjectId::String(s)) => {
                self.func.functions.get_mut(id.0 as usize).ok_or_else(misplaced)?.name = s;
            }
            (ObjectId::Function(id), Field::FirstAddress, ObjectId::Instruction(first)) => {
                self.func
                    .functions
                    .get_mut(id.0 as usize)
                    .ok_or_else(misplaced)?
                    .first_address = Some(first);
            }
            (ObjectId::Variable(id), Field::Name, ObjectId::String(s)) => {
                self.vari.variables.get_mut(id.0 as usize).ok_or_else(misplaced)?.name = s;
            }
            (ObjectId::Variable(id), Field::FirstAddress, ObjectId::Instruction(first)) => {
                self.vari
                    .variables
                    .get_mut(id.0 as usize)
                    .ok_or_else(misplaced)?
                    .first_address = Some(first);
            }
            (ObjectId::CodeLocals(i), Field::Name, ObjectId::String(s)) => {
                self.func.code_locals.get_mut(i as usize).ok_or_else(misplaced)?.name = s;
            }
            (ObjectId::CodeLocals(i), Field::LocalName(j), ObjectId::String(s)) => {
                self.func
                    .code_locals
                    .get_mut(i as usize)
                    .and_then(|l| l.locals.get_mut(j as usize))
                    .ok_or_else(misplaced)?
                    .name = s;
            }
            _ => return Err(misplaced()),
        }
        Ok(())
    }

    /// Serialize with the loaded version and no padding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with(&WriteOptions::default())
    }

    /// Serialize the chunks in `layout` order.
    ///
    /// FUNC/VARI roots must agree with the bytecode (see [`DataWin::relink`]).
    /// Reference chains are threaded once every instruction has an offset,
    /// and pointers to later objects are patched last.
    pub fn to_bytes_with(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        let version = options.version_override.unwrap_or(self.version);
        let chains = refchain::collect(&self.code)?;
        refchain::check(&chains, &self.func.functions, &self.vari.variables)?;

        let mut form = FormWriter::new(version, options.chunk_alignment);
        for section in &self.layout {
            let magic = section.magic();
            match section {
                Section::Gen8 => form.chunk(&magic, |w| {
                    w.enter(ObjectId::Header)?;
                    self.gen8.serialize(w)
                })?,
                Section::Strings => form.chunk(&magic, |w| self.strings.encode(w))?,
                Section::Code => form.chunk(&magic, |w| self.code.encode(w))?,
                Section::Variables => form.chunk(&magic, |w| self.vari.encode(w))?,
                Section::Functions => form.chunk(&magic, |w| self.func.encode(w))?,
                Section::Raw(raw) => form.chunk(&magic, |w| {
                    w.write_bytes(&raw.data);
                    Ok(())
                })?,
            }
        }

        refchain::thread(form.ctx_mut(), &chains)?;
        form.finish()
    }

    /// Recompute every `occurrences`/`first_address` from the bytecode.
    /// Call after adding, removing or retargeting calls and variable accesses.
    pub fn relink(&mut self) -> Result<()> {
        let chains = refchain::collect(&self.code)?;
        for (i, function) in self.func.functions.iter_mut().enumerate() {
            let chain = chains.get(ChainTarget::Function(FunctionId(i as u32)));
            function.occurrences = chain.len() as u32;
            function.first_address = chain.first().copied();
        }
        for (i, variable) in self.vari.variables.iter_mut().enumerate() {
            let chain = chains.get(ChainTarget::Variable(VariableId(i as u32)));
            variable.occurrences = chain.len() as u32;
            variable.first_address = chain.first().copied();
        }
        Ok(())
    }

    /// Derive each function's classification and autogenerated flag from the
    /// code entries and the format version.
    pub fn classify_functions(&mut self) {
        let entry_names: HashSet<&str> = self
            .code
            .entries
            .iter()
            .filter_map(|e| self.strings.get(e.name))
            .collect();
        let is_2_3 = self.version.is_at_least(2, 3);

        for function in &mut self.func.functions {
            let name = self.strings.get(function.name).unwrap_or_default();
            let has_code = entry_names.contains(name)
                || entry_names.contains(format!("gml_Script_{name}").as_str());
            function.classification = if !has_code {
                FunctionClassification::Builtin
            } else if name.starts_with("gml_GlobalScript_") {
                FunctionClassification::GlobalScript
            } else {
                FunctionClassification::Script
            };
            function.autogenerated = is_2_3 && name.starts_with("gml_Script_");
        }
    }

    pub fn function_by_name(&self, name: &str) -> Option<(FunctionId, &Function)> {
        self.func
            .functions
            .iter()
            .enumerate()
            .find(|(_, f)| self.strings.get(f.name) == Some(name))
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn variable_by_name(&self, name: &str) -> Option<(VariableId, &Variable)> {
        self.vari
            .variables
            .iter()
            .enumerate()
            .find(|(_, v)| self.strings.get(v.name) == Some(name))
            .map(|(i, v)| (VariableId(i as u32), v))
    }

    /// Usage sites of a function or variable, in code-stream order.
    pub fn references_to(&self, target: ChainTarget) -> Vec<InstrRef> {
        self.code
            .instructions()
            .filter(|(_, inst)| match target {
                ChainTarget::Function(id) => {
                    inst.function_ref().and_then(Reference::target) == Some(id)
                }
                ChainTarget::Variable(id) => {
                    inst.variable_ref().and_then(Reference::target) == Some(id)
                }
            })
            .map(|(r, _)| r)
            .collect()
    }

    pub fn resolve_string(&self, s: StringRef) -> Option<&str> {
        self.strings.get(s)
    }
}

impl StringResolver for DataWin {
    fn resolve(&self, s: StringRef) -> Option<&str> {
        self.strings.get(s)
    }
}

/// Windows builds may ship the FORM appended to the executable.
fn strip_pe_prefix(data: &[u8]) -> &[u8] {
    if data.starts_with(b"MZ") {
        if let Some(offset) = find_embedded_form(data) {
            return &data[offset..];
        }
    }
    data
}
