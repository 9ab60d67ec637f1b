use crate::address::{Field, ObjectId};
use crate::chunks::code::InstrRef;
use crate::context::{ReadCtx, Resource, WriteCtx};
use crate::error::Result;
use crate::refchain;
use crate::string_table::StringRef;

/// Index into [`Vari::variables`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(pub u32);

/// Size of one VARI record.
const ENTRY_SIZE: usize = 20;

/// A variable definition in the VARI chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Reference to the variable name string.
    pub name: StringRef,
    /// Instance type for this variable.
    /// -1 = self, -5 = global, -7 = local, etc.
    pub instance_type: i32,
    /// Variable ID within its scope.
    pub var_id: i32,
    /// Number of occurrences in bytecode.
    pub occurrences: u32,
    /// First occurrence, `None` iff `occurrences == 0`.
    pub first_address: Option<InstrRef>,
}

impl Variable {
    pub fn new(name: StringRef, instance_type: i32, var_id: i32) -> Self {
        Self {
            name,
            instance_type,
            var_id,
            occurrences: 0,
            first_address: None,
        }
    }
}

impl Resource for Variable {
    /// `name:ptr, instance_type:i32, var_id:i32, occurrences:u32, first_address:ptr | -1`
    fn unserialize(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        let name = r.read_string(Field::Name)?;
        let instance_type = r.read_i32()?;
        let var_id = r.read_i32()?;
        let (occurrences, first_address) = refchain::read_root(r)?;
        Ok(Self {
            name,
            instance_type,
            var_id,
            occurrences,
            first_address,
        })
    }

    fn serialize(&self, w: &mut WriteCtx) -> Result<()> {
        w.write_string(self.name);
        w.write_i32(self.instance_type);
        w.write_i32(self.var_id);
        refchain::write_root(w, self.occurrences, self.first_address);
        Ok(())
    }
}

/// Parsed VARI chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vari {
    /// Number of instance variables with instance_type >= 0.
    pub instance_var_count: u32,
    /// Total number of instance variable IDs used.
    pub instance_var_count_max: u32,
    /// Maximum local variable count across all code entries.
    pub max_local_var_count: u32,
    /// Variable entries.
    pub variables: Vec<Variable>,
}

impl Vari {
    /// Three u32 header fields, then 20-byte records up to the end of the chunk.
    /// A 0-size VARI chunk means the game was compiled with YYC (no bytecode).
    pub fn decode(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        if r.remaining() == 0 {
            return Ok(Self::default());
        }

        let instance_var_count = r.read_u32()?;
        let instance_var_count_max = r.read_u32()?;
        let max_local_var_count = r.read_u32()?;

        let entry_count = (r.remaining() / ENTRY_SIZE) as u32;
        let variables = r.read_list(entry_count, |i| ObjectId::Variable(VariableId(i)))?;

        Ok(Self {
            instance_var_count,
            instance_var_count_max,
            max_local_var_count,
            variables,
        })
    }

    pub fn encode(&self, w: &mut WriteCtx) -> Result<()> {
        w.write_u32(self.instance_var_count);
        w.write_u32(self.instance_var_count_max);
        w.write_u32(self.max_local_var_count);
        w.write_list(&self.variables, |i| ObjectId::Variable(VariableId(i)))
    }

    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.0 as usize)
    }
}
