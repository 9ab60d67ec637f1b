#![allow(dead_code)]

use datawin::bytecode::opcode::Opcode;
use datawin::bytecode::types::{DataType, Reference, VariableOperand};
use datawin::bytecode::{Instruction, Operand};
use datawin::{
    BytecodeVersion, ChunkIndex, CodeEntry, CodeLocals, DataWin, FormatVersion, Function,
    FunctionId, Gen8, LocalVar, Variable, VariableId,
};

pub const LEGACY: FormatVersion = FormatVersion::new(2, 0, 0, 0);
pub const V2_3: FormatVersion = FormatVersion::new(2, 3, 0, 0);

pub const SHOW_DEBUG_MESSAGE: FunctionId = FunctionId(0);
pub const SCR_MOVE: FunctionId = FunctionId(1);
pub const GLOBAL_INIT: FunctionId = FunctionId(2);
pub const UNUSED_FN: FunctionId = FunctionId(3);
pub const SCRIPT_WRAPPER: FunctionId = FunctionId(4);
pub const FUNCTION_COUNT: usize = 5;

pub const X: VariableId = VariableId(0);
pub const SPEED: VariableId = VariableId(1);
pub const UNUSED_VAR: VariableId = VariableId(2);
pub const VARIABLE_COUNT: usize = 3;

pub const CODE_ENTRY_COUNT: usize = 3;

fn inst(opcode: Opcode, type1: DataType, type2: DataType, operand: Operand) -> Instruction {
    Instruction {
        opcode,
        type1,
        type2,
        operand,
    }
}

pub fn call(function: FunctionId, argc: u16) -> Instruction {
    inst(
        Opcode::Call,
        DataType::Int32,
        DataType::Double,
        Operand::Call {
            function: Reference::Target(function),
            argc,
        },
    )
}

/// `push.i` of a function value, as 2.3+ compiles `method()` and friends.
pub fn push_function(function: FunctionId) -> Instruction {
    inst(
        Opcode::PushI,
        DataType::Int32,
        DataType::Double,
        Operand::Function(Reference::Target(function)),
    )
}

pub fn push_var(variable: VariableId) -> Instruction {
    inst(
        Opcode::Push,
        DataType::Variable,
        DataType::Double,
        Operand::Variable {
            var: VariableOperand {
                target: Reference::Target(variable),
                ref_type: 0xA0,
            },
            instance: -1,
        },
    )
}

pub fn pop_var(variable: VariableId) -> Instruction {
    inst(
        Opcode::Pop,
        DataType::Variable,
        DataType::Variable,
        Operand::Variable {
            var: VariableOperand {
                target: Reference::Target(variable),
                ref_type: 0x00,
            },
            instance: -1,
        },
    )
}

pub fn push_int(v: i16) -> Instruction {
    inst(Opcode::PushI, DataType::Int16, DataType::Double, Operand::Int16(v))
}

pub fn popz() -> Instruction {
    inst(Opcode::Popz, DataType::Variable, DataType::Double, Operand::None)
}

pub fn ret() -> Instruction {
    inst(Opcode::Ret, DataType::Variable, DataType::Double, Operand::None)
}

pub fn exit() -> Instruction {
    inst(Opcode::Exit, DataType::Int32, DataType::Double, Operand::None)
}

/// A small game: three code entries calling one builtin and one script,
/// two used variables, and a few functions/variables nothing refers to.
pub fn sample(version: FormatVersion) -> DataWin {
    let mut strings = datawin::StringTable::new();
    let game = strings.intern("game");

    let mut dw = DataWin::new(Gen8::new(game, BytecodeVersion::V17, version));

    let script_entry = strings.intern("gml_Script_scr_move");
    let step_entry = strings.intern("gml_Object_obj_player_Step_0");
    let init_entry = strings.intern("gml_GlobalScript_init");

    dw.code.entries = vec![
        CodeEntry {
            name: script_entry,
            locals_count: 2,
            args_count: 0,
            instructions: vec![
                push_var(X),
                push_int(5),
                call(SHOW_DEBUG_MESSAGE, 1),
                pop_var(SPEED),
                ret(),
            ],
        },
        CodeEntry {
            name: step_entry,
            locals_count: 1,
            args_count: 0,
            instructions: vec![
                call(SCR_MOVE, 0),
                popz(),
                push_var(SPEED),
                call(SHOW_DEBUG_MESSAGE, 1),
                popz(),
                exit(),
            ],
        },
        CodeEntry {
            name: init_entry,
            locals_count: 0,
            args_count: 0,
            instructions: vec![push_int(1), pop_var(X), exit()],
        },
    ];

    dw.func.functions = vec![
        Function::new(strings.intern("show_debug_message")),
        Function::new(strings.intern("scr_move")),
        Function::new(init_entry),
        Function::new(strings.intern("unused_fn")),
        Function::new(script_entry),
    ];

    dw.vari.variables = vec![
        Variable::new(strings.intern("x"), -1, 0),
        Variable::new(strings.intern("speed"), -1, 1),
        Variable::new(strings.intern("unused_var"), -5, 0),
    ];
    dw.vari.instance_var_count = 2;
    dw.vari.instance_var_count_max = 2;
    dw.vari.max_local_var_count = 2;

    // The last table has two locals; error tests rely on that.
    dw.func.code_locals = vec![
        CodeLocals {
            name: step_entry,
            locals: vec![LocalVar {
                index: 0,
                name: strings.intern("arguments"),
            }],
        },
        CodeLocals {
            name: script_entry,
            locals: vec![
                LocalVar {
                    index: 0,
                    name: strings.intern("a"),
                },
                LocalVar {
                    index: 1,
                    name: strings.intern("b"),
                },
            ],
        },
    ];

    dw.strings = strings;
    dw.relink().expect("sample bytecode is fully resolved");
    dw.classify_functions();
    dw
}

pub fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

pub fn write_u32(bytes: &mut [u8], at: usize, v: u32) {
    bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// Absolute offset of a chunk's content.
pub fn chunk_data(bytes: &[u8], magic: &[u8; 4]) -> usize {
    ChunkIndex::parse(bytes)
        .unwrap()
        .find(magic)
        .unwrap_or_else(|| panic!("no {} chunk", String::from_utf8_lossy(magic)))
        .data_offset()
}

/// Offset of the i-th 12-byte function record in FUNC.
pub fn function_record(bytes: &[u8], id: FunctionId) -> usize {
    chunk_data(bytes, b"FUNC") + 4 + id.0 as usize * 12
}

/// Offset of the i-th 20-byte variable record in VARI.
pub fn variable_record(bytes: &[u8], id: VariableId) -> usize {
    chunk_data(bytes, b"VARI") + 12 + id.0 as usize * 20
}

/// Offset of the code locals list count, right after the function records.
pub fn code_locals_list(bytes: &[u8]) -> usize {
    chunk_data(bytes, b"FUNC") + 4 + FUNCTION_COUNT * 12
}

/// Offset of the n-th CODE entry header.
pub fn code_entry(bytes: &[u8], n: usize) -> usize {
    read_u32(bytes, chunk_data(bytes, b"CODE") + 4 + n * 4) as usize
}
