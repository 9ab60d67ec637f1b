//! GML VM bytecode (v15+ instruction format).

pub mod decode;
pub mod encode;
pub mod opcode;
pub mod types;

pub use decode::{decode, decode_instruction, Instruction, Operand};
pub use encode::{encode, encode_instruction};
