mod common;

use common::*;
use datawin::{DataWin, Error, ObjectId, RawChunk, Section, TypeTag};

fn legacy_bytes() -> Vec<u8> {
    sample(LEGACY).to_bytes().unwrap()
}

fn parse_err(bytes: &[u8]) -> Error {
    DataWin::parse(bytes).unwrap_err()
}

#[test]
fn test_occurrence_count_too_high() {
    let mut bytes = legacy_bytes();
    let at = function_record(&bytes, SHOW_DEBUG_MESSAGE) + 4;
    write_u32(&mut bytes, at, 3);
    match parse_err(&bytes) {
        Error::ChainLengthMismatch {
            target,
            declared,
            walked,
        } => {
            assert_eq!(target, ObjectId::Function(SHOW_DEBUG_MESSAGE));
            assert_eq!((declared, walked), (3, 2));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_occurrence_count_too_low() {
    let mut bytes = legacy_bytes();
    let at = variable_record(&bytes, SPEED) + 12;
    write_u32(&mut bytes, at, 1);
    assert!(matches!(
        parse_err(&bytes),
        Error::ChainLengthMismatch {
            declared: 1,
            walked: 2,
            ..
        }
    ));
}

#[test]
fn test_unused_function_needs_sentinel() {
    let mut bytes = legacy_bytes();
    let at = function_record(&bytes, UNUSED_FN) + 8;
    assert_eq!(read_u32(&bytes, at), u32::MAX);
    write_u32(&mut bytes, at, 0);
    match parse_err(&bytes) {
        Error::FormatInvariant {
            offset,
            expected,
            found,
            ..
        } => {
            assert_eq!(offset, at);
            assert_eq!((expected, found), (-1, 0));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_local_count_disagrees_with_records() {
    let mut bytes = legacy_bytes();
    // Skip the list count and the first table (count, name, one local).
    let at = code_locals_list(&bytes) + 4 + 16;
    assert_eq!(read_u32(&bytes, at), 2);
    write_u32(&mut bytes, at, 3);
    assert!(matches!(
        parse_err(&bytes),
        Error::CountMismatch {
            declared: 3,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn test_code_locals_list_overruns_chunk() {
    let mut bytes = legacy_bytes();
    let at = code_locals_list(&bytes);
    assert_eq!(read_u32(&bytes, at), 2);
    write_u32(&mut bytes, at, 3);
    match parse_err(&bytes) {
        Error::SectionOverrun { magic, .. } => assert_eq!(&magic, b"FUNC"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_name_pointer_to_nowhere() {
    let mut bytes = legacy_bytes();
    let at = function_record(&bytes, SCR_MOVE);
    write_u32(&mut bytes, at, 0x7FFF_FFF0);
    match parse_err(&bytes) {
        Error::UnresolvedPointer {
            source_offset,
            target,
            kind,
        } => {
            assert_eq!(source_offset as usize, at);
            assert_eq!(target, 0x7FFF_FFEC);
            assert_eq!(kind, TypeTag::String);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_name_pointer_to_instruction() {
    let mut bytes = legacy_bytes();
    let first_instruction = code_entry(&bytes, 0) + 20;
    let at = function_record(&bytes, SCR_MOVE);
    write_u32(&mut bytes, at, first_instruction as u32 + 4);
    assert!(matches!(parse_err(&bytes), Error::CorruptPointer { .. }));
}

#[test]
fn test_link_into_operand() {
    let mut bytes = legacy_bytes();
    let first = read_u32(&bytes, function_record(&bytes, SHOW_DEBUG_MESSAGE) + 8) as usize;
    let operand = first + 4;
    let word = read_u32(&bytes, operand);
    assert_ne!(word, 0, "first of two occurrences links onward");
    // Point the link at its own operand word.
    write_u32(&mut bytes, operand, (word & !0x07FF_FFFF) | 4);
    assert!(matches!(parse_err(&bytes), Error::CorruptPointer { .. }));
}

#[test]
fn test_orphan_occurrence() {
    let mut bytes = legacy_bytes();
    let record = function_record(&bytes, SHOW_DEBUG_MESSAGE);
    let first = read_u32(&bytes, record + 8) as usize;
    // End the chain after its first link and shrink the count to match.
    write_u32(&mut bytes, record + 4, 1);
    let word = read_u32(&bytes, first + 4);
    write_u32(&mut bytes, first + 4, word & !0x07FF_FFFF);
    match parse_err(&bytes) {
        Error::UnresolvedPointer { kind, .. } => assert_eq!(kind, TypeTag::Function),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unsupported_bytecode_version() {
    let mut bytes = legacy_bytes();
    let at = chunk_data(&bytes, b"GEN8") + 1;
    bytes[at] = 14;
    assert!(matches!(
        parse_err(&bytes),
        Error::UnsupportedVersion { version: 14 }
    ));
}

#[test]
fn test_shared_bytecode_blob() {
    let mut bytes = legacy_bytes();
    let at = code_entry(&bytes, 1) + 16;
    write_u32(&mut bytes, at, 4);
    assert!(matches!(
        parse_err(&bytes),
        Error::Parse { context: "CODE", .. }
    ));
}

#[test]
fn test_duplicate_chunk() {
    let mut dw = sample(LEGACY);
    let raw = Section::Raw(RawChunk {
        magic: *b"OPTN",
        data: vec![0; 4],
    });
    dw.layout.push(raw.clone());
    dw.layout.push(raw);
    let bytes = dw.to_bytes().unwrap();
    assert!(matches!(
        parse_err(&bytes),
        Error::Parse { context: "FORM", .. }
    ));
}

#[test]
fn test_truncated_file() {
    let bytes = legacy_bytes();
    assert!(matches!(
        parse_err(&bytes[..bytes.len() / 2]),
        Error::UnexpectedEof { .. }
    ));
}

/// Bytes with FUNC as the last chunk, its declared size and the file both
/// cut short by `cut` bytes.
fn truncated_func(cut: usize) -> Vec<u8> {
    let mut dw = sample(LEGACY);
    dw.layout = vec![
        Section::Gen8,
        Section::Code,
        Section::Variables,
        Section::Strings,
        Section::Functions,
    ];
    let mut bytes = dw.to_bytes().unwrap();
    let func_size_at = chunk_data(&bytes, b"FUNC") - 4;
    assert_eq!(func_size_at + 4 + read_u32(&bytes, func_size_at) as usize, bytes.len());

    let form_size = read_u32(&bytes, 4);
    write_u32(&mut bytes, 4, form_size - cut as u32);
    let func_size = read_u32(&bytes, func_size_at);
    write_u32(&mut bytes, func_size_at, func_size - cut as u32);
    bytes.truncate(bytes.len() - cut);
    bytes
}

#[test]
fn test_chunk_ends_inside_local_record() {
    // The second local of the last table loses its name pointer.
    match parse_err(&truncated_func(4)) {
        Error::CountMismatch {
            declared, actual, ..
        } => assert_eq!((declared, actual), (2, 1)),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_chunk_ends_inside_local_table_header() {
    // Only the count of the last table is left.
    match parse_err(&truncated_func(20)) {
        Error::SectionOverrun { magic, need, .. } => {
            assert_eq!(&magic, b"FUNC");
            assert_eq!(need, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_string_pointer_outside_strg() {
    let mut bytes = legacy_bytes();
    let slot = chunk_data(&bytes, b"STRG") + 4;
    let into_func = function_record(&bytes, UNUSED_FN) + 4;
    write_u32(&mut bytes, slot, into_func as u32);
    match parse_err(&bytes) {
        Error::SectionOverrun { magic, offset, .. } => {
            assert_eq!(&magic, b"STRG");
            assert_eq!(offset, into_func);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unbound_call_is_rejected_on_write() {
    let mut dw = sample(LEGACY);
    dw.code.entries[0].instructions[2] = call(datawin::FunctionId(99), 1);
    assert!(matches!(
        dw.to_bytes().unwrap_err(),
        Error::CorruptPointer { .. }
    ));
}
