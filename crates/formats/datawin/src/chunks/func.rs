use serde::{Deserialize, Serialize};

use crate::address::{Field, ObjectId};
use crate::chunks::code::InstrRef;
use crate::context::{ReadCtx, Resource, WriteCtx};
use crate::error::{Error, Result};
use crate::refchain;
use crate::string_table::{StringRef, StringResolver};

/// Index into [`Func::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub u32);

/// What a function name refers to, derived from the code entries present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionClassification {
    /// Runtime-provided; no code entry of that name.
    #[default]
    Builtin,
    /// Has a code entry of the same name.
    Script,
    /// A `gml_GlobalScript_*` entry.
    GlobalScript,
}

/// A function definition in the FUNC chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Reference to the function name string.
    pub name: StringRef,
    /// Number of call sites referencing this function.
    pub occurrences: u32,
    /// First call site, `None` iff `occurrences == 0`.
    pub first_address: Option<InstrRef>,
    /// Not stored in the file; see `DataWin::classify_functions`.
    pub classification: FunctionClassification,
    /// Compiler-generated `gml_Script_*` wrapper (2.3+). Not stored in the file.
    pub autogenerated: bool,
}

impl Function {
    pub fn new(name: StringRef) -> Self {
        Self {
            name,
            occurrences: 0,
            first_address: None,
            classification: FunctionClassification::Builtin,
            autogenerated: false,
        }
    }
}

impl Resource for Function {
    /// `name:ptr, occurrences:u32, first_address:ptr | -1`
    fn unserialize(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        let name = r.read_string(Field::Name)?;
        let (occurrences, first_address) = refchain::read_root(r)?;
        Ok(Self {
            name,
            occurrences,
            first_address,
            classification: FunctionClassification::Builtin,
            autogenerated: false,
        })
    }

    fn serialize(&self, w: &mut WriteCtx) -> Result<()> {
        w.write_string(self.name);
        refchain::write_root(w, self.occurrences, self.first_address);
        Ok(())
    }
}

/// Local variable information for a single code entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeLocals {
    /// Reference to the code entry name (e.g., "gml_Script_foo").
    pub name: StringRef,
    /// Local variables used in this code entry.
    pub locals: Vec<LocalVar>,
}

/// A local variable within a code entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVar {
    /// Local variable index (0-based).
    pub index: u32,
    /// Reference to the variable name string.
    pub name: StringRef,
}

impl CodeLocals {
    pub fn has_local(&self, name: &str, strings: &impl StringResolver) -> bool {
        self.locals
            .iter()
            .any(|l| strings.resolve(l.name) == Some(name))
    }
}

impl Resource for CodeLocals {
    /// `count:u32, name:ptr, count × {index:u32, name:ptr}`
    fn unserialize(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        let start = r.position();
        let declared = r.read_u32()?;
        let name = r.read_string(Field::Name)?;
        let mut locals = Vec::with_capacity((declared as usize).min(r.remaining() / 8));
        for i in 0..declared {
            // A record cut short by the end of the chunk is a count problem,
            // not a truncation.
            if r.remaining() < 8 {
                break;
            }
            let index = r.read_u32()?;
            let name = r.read_string(Field::LocalName(i))?;
            locals.push(LocalVar { index, name });
        }
        if locals.len() as u32 != declared {
            return Err(Error::CountMismatch {
                offset: start,
                what: "code locals",
                declared,
                actual: locals.len() as u32,
            });
        }
        Ok(Self { name, locals })
    }

    fn serialize(&self, w: &mut WriteCtx) -> Result<()> {
        w.write_u32(self.locals.len() as u32);
        w.write_string(self.name);
        for local in &self.locals {
            w.write_u32(local.index);
            w.write_string(local.name);
        }
        Ok(())
    }
}

/// Parsed FUNC chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Func {
    /// Function definitions.
    pub functions: Vec<Function>,
    /// Per-code-entry local variable information.
    pub code_locals: Vec<CodeLocals>,
}

impl Func {
    /// Functions list (count + entries), then CodeLocals list (count + entries).
    /// A 0-size FUNC chunk means the game was compiled with YYC (no bytecode).
    pub fn decode(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        if r.remaining() == 0 {
            return Ok(Self::default());
        }

        let func_count = r.read_u32()?;
        let functions = r.read_list(func_count, |i| ObjectId::Function(FunctionId(i)))?;

        let mut code_locals = Vec::new();
        if r.remaining() >= 4 {
            let locals_count = r.read_u32()?;
            code_locals = r.read_list(locals_count, ObjectId::CodeLocals)?;
        }

        Ok(Self {
            functions,
            code_locals,
        })
    }

    pub fn encode(&self, w: &mut WriteCtx) -> Result<()> {
        w.write_u32(self.functions.len() as u32);
        w.write_list(&self.functions, |i| ObjectId::Function(FunctionId(i)))?;
        w.write_u32(self.code_locals.len() as u32);
        w.write_list(&self.code_locals, ObjectId::CodeLocals)
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0 as usize)
    }

    /// Locals table of the code entry named `name`.
    pub fn locals_for(&self, name: &str, strings: &impl StringResolver) -> Option<&CodeLocals> {
        self.code_locals
            .iter()
            .find(|l| strings.resolve(l.name) == Some(name))
    }
}
