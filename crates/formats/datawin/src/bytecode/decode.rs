use crate::bytecode::opcode::Opcode;
use crate::bytecode::types::{ComparisonKind, DataType, Reference, VariableOperand};
use crate::chunks::func::FunctionId;
use crate::chunks::vari::VariableId;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::refchain::LINK_MASK;

/// A decoded instruction.
///
/// Instructions carry no offset: their position is only known to the
/// address space of the pass that read or wrote them.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation.
    pub opcode: Opcode,
    /// First type field (bits 16-19 of the instruction word).
    pub type1: DataType,
    /// Second type field (bits 20-23 of the instruction word).
    pub type2: DataType,
    /// The operand data.
    pub operand: Operand,
}

/// Operand data for an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand.
    None,
    /// 16-bit integer value (inline in the instruction word).
    Int16(i16),
    /// 32-bit integer value.
    Int32(i32),
    /// 64-bit integer value.
    Int64(i64),
    /// 64-bit float value.
    Double(f64),
    /// 32-bit float value.
    Float(f32),
    /// Boolean value.
    Bool(bool),
    /// String reference (index into STRG).
    StringIndex(u32),
    /// Variable reference.
    Variable { var: VariableOperand, instance: i16 },
    /// Branch target (byte offset from current instruction).
    Branch(i32),
    /// Comparison kind.
    Comparison(ComparisonKind),
    /// Function call: function reference and argument count.
    Call {
        function: Reference<FunctionId>,
        argc: u16,
    },
    /// Function pushed as a value (`push.i` in 2.3+ bytecode, e.g. for
    /// `method()`). Decoded as [`Operand::Int32`]; it becomes this once a
    /// FUNC chain walks through it.
    Function(Reference<FunctionId>),
    /// Indirect call: argument count only.
    CallV { argc: u16 },
    /// Dup: extra parameter in lower 16 bits.
    Dup(u16),
    /// Break: signal type in lower 16 bits.
    Break(u16),
}

impl Instruction {
    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self.operand {
            Operand::Double(_) | Operand::Int64(_) => 12,
            Operand::Int32(_)
            | Operand::Float(_)
            | Operand::Bool(_)
            | Operand::StringIndex(_)
            | Operand::Variable { .. }
            | Operand::Call { .. }
            | Operand::Function(_) => 8,
            _ => 4,
        }
    }

    /// Function reference of a `call` or a function push.
    pub fn function_ref(&self) -> Option<Reference<FunctionId>> {
        match self.operand {
            Operand::Call { function, .. } | Operand::Function(function) => Some(function),
            _ => None,
        }
    }

    /// Variable reference of a variable push or pop.
    pub fn variable_ref(&self) -> Option<Reference<VariableId>> {
        match self.operand {
            Operand::Variable { var, .. } => Some(var.target),
            _ => None,
        }
    }
}

/// Decode bytecode for a single code entry.
///
/// `bytecode` is the raw bytecode bytes for this code entry.
/// Returns the list of decoded instructions.
pub fn decode(bytecode: &[u8]) -> Result<Vec<Instruction>> {
    let mut c = Cursor::new(bytecode);
    let mut instructions = Vec::new();
    while !c.is_empty() {
        instructions.push(decode_instruction(&mut c)?);
    }
    Ok(instructions)
}

/// Decode one instruction at the cursor position.
pub fn decode_instruction(c: &mut Cursor<'_>) -> Result<Instruction> {
    let inst_offset = c.position();
    let word = c.read_u32()?;

    let opcode_byte = ((word >> 24) & 0xFF) as u8;
    let type2 = DataType::from_u8(((word >> 20) & 0xF) as u8);
    let type1 = DataType::from_u8(((word >> 16) & 0xF) as u8);
    let val16 = (word & 0xFFFF) as u16;

    let opcode = Opcode::from_u8(opcode_byte).ok_or_else(|| Error::Parse {
        context: "bytecode",
        message: format!("unknown opcode {:#04x} at offset {:#x}", opcode_byte, inst_offset),
    })?;

    let operand = decode_operand(opcode, type1, val16, word, c)?;

    Ok(Instruction {
        opcode,
        type1,
        type2,
        operand,
    })
}

fn decode_operand(
    opcode: Opcode,
    type1: DataType,
    val16: u16,
    word: u32,
    c: &mut Cursor<'_>,
) -> Result<Operand> {
    match opcode {
        // Push variants: read operand based on type1
        Opcode::Push | Opcode::PushLoc | Opcode::PushGlb | Opcode::PushBltn => {
            decode_push_operand(type1, val16, c)
        }

        Opcode::PushI => match type1 {
            DataType::Int32 => Ok(Operand::Int32(c.read_i32()?)),
            _ => Ok(Operand::Int16(val16 as i16)),
        },

        // Pop with an Int16 destination is the swap form and has no variable word.
        Opcode::Pop if type1 == DataType::Int16 => Ok(Operand::Int16(val16 as i16)),
        Opcode::Pop => Ok(Operand::Variable {
            var: VariableOperand::from_raw(c.read_u32()?),
            instance: val16 as i16,
        }),

        // Branch instructions: 23-bit signed offset in bits 22-0 of the word.
        // Bit 23 is NOT part of the offset (it encodes comparison/type info).
        op if op.is_branch() => {
            let raw23 = word & 0x007F_FFFF;
            // Sign-extend from 23 bits
            let offset = if raw23 & 0x40_0000 != 0 {
                (raw23 | 0xFF80_0000) as i32
            } else {
                raw23 as i32
            };
            // Offset is in 4-byte units
            Ok(Operand::Branch(offset * 4))
        }

        // Comparison: comparison kind in bits 15-8
        Opcode::Cmp => {
            let cmp_byte = ((word >> 8) & 0xFF) as u8;
            let kind = ComparisonKind::from_u8(cmp_byte).ok_or_else(|| Error::Parse {
                context: "bytecode",
                message: format!("unknown comparison kind {}", cmp_byte),
            })?;
            Ok(Operand::Comparison(kind))
        }

        // Call: argc in val16, chain link in the next word
        Opcode::Call => Ok(Operand::Call {
            function: Reference::Link(c.read_u32()? & LINK_MASK),
            argc: val16,
        }),

        Opcode::CallV => Ok(Operand::CallV { argc: val16 }),
        Opcode::Dup => Ok(Operand::Dup(val16)),
        Opcode::Break => Ok(Operand::Break(val16)),

        // All others: no operand
        _ => Ok(Operand::None),
    }
}

fn decode_push_operand(type1: DataType, val16: u16, c: &mut Cursor<'_>) -> Result<Operand> {
    match type1 {
        DataType::Double => Ok(Operand::Double(c.read_f64()?)),
        DataType::Float => Ok(Operand::Float(c.read_f32()?)),
        DataType::Int32 => Ok(Operand::Int32(c.read_i32()?)),
        DataType::Int64 => Ok(Operand::Int64(c.read_i64()?)),
        DataType::Bool => Ok(Operand::Bool(c.read_u32()? != 0)),
        DataType::String => Ok(Operand::StringIndex(c.read_u32()?)),
        DataType::Variable => Ok(Operand::Variable {
            var: VariableOperand::from_raw(c.read_u32()?),
            instance: val16 as i16,
        }),
        DataType::Int16 => Ok(Operand::Int16(val16 as i16)),
        DataType::Raw(v) => Err(Error::Parse {
            context: "bytecode",
            message: format!("unknown push data type {v:#x}"),
        }),
    }
}
