use crate::bytecode::decode::{Instruction, Operand};
use crate::cursor::Writer;

/// Encode a list of instructions back into bytecode.
///
/// This is the inverse of `decode::decode`. Each instruction is encoded as
/// a 32-bit primary word (opcode + types + inline data) followed by zero
/// or more 32-bit operand words. Resolved function/variable references are
/// written with a zero link; the container threads the chains afterwards.
pub fn encode(instructions: &[Instruction]) -> Vec<u8> {
    let mut w = Writer::new();
    for inst in instructions {
        encode_instruction(inst, &mut w);
    }
    w.into_bytes()
}

/// Encode a single instruction at the writer's position.
pub fn encode_instruction(inst: &Instruction, w: &mut Writer) {
    let opcode = inst.opcode as u32;
    let type1 = inst.type1.as_u8() as u32;
    let type2 = inst.type2.as_u8() as u32;

    // Layout: [bits 31-24: opcode] [bits 23-20: type2] [bits 19-16: type1] [bits 15-0: val16]
    let header = |low16: u32| (opcode << 24) | (type2 << 20) | (type1 << 16) | (low16 & 0xFFFF);

    match &inst.operand {
        Operand::Branch(byte_offset) => {
            // 23-bit signed offset in 4-byte units. Bit 23 is the high bit of type2.
            let offset_words = (byte_offset / 4) as u32;
            w.write_u32((opcode << 24) | ((type2 & 0x8) << 20) | (offset_words & 0x007F_FFFF));
        }

        // Comparison kind lives in bits 15-8.
        Operand::Comparison(kind) => w.write_u32(header((*kind as u32) << 8)),

        Operand::Int16(v) => w.write_u32(header(*v as u16 as u32)),

        Operand::Call { function, argc } => {
            w.write_u32(header(*argc as u32));
            w.write_u32(function.raw_link());
        }

        Operand::Function(function) => {
            w.write_u32(header(0));
            w.write_u32(function.raw_link());
        }

        Operand::CallV { argc } => w.write_u32(header(*argc as u32)),

        Operand::Variable { var, instance } => {
            w.write_u32(header(*instance as u16 as u32));
            w.write_u32(var.to_raw());
        }

        Operand::Dup(val) | Operand::Break(val) => w.write_u32(header(*val as u32)),

        Operand::None => w.write_u32(header(0)),

        // Extended operands: primary word has val16=0, then extra data words
        Operand::Int32(v) => {
            w.write_u32(header(0));
            w.write_i32(*v);
        }

        Operand::Int64(v) => {
            w.write_u32(header(0));
            w.write_i64(*v);
        }

        Operand::Double(v) => {
            w.write_u32(header(0));
            w.write_f64(*v);
        }

        Operand::Float(v) => {
            w.write_u32(header(0));
            w.write_f32(*v);
        }

        Operand::Bool(v) => {
            w.write_u32(header(0));
            w.write_u32(u32::from(*v));
        }

        Operand::StringIndex(idx) => {
            w.write_u32(header(0));
            w.write_u32(*idx);
        }
    }
}
