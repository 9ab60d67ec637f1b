//! Reference chains: the per-function and per-variable linked lists threaded
//! through the bytecode.
//!
//! A FUNC/VARI record stores the occurrence count and the address of the
//! first occurrence. Each occurrence's operand word (instruction + 4) keeps
//! the byte distance to the next occurrence in its low 27 bits; 0 ends the
//! chain. On read the links are replaced by ids; on write they are recomputed
//! from the code stream.

use std::collections::BTreeMap;

use crate::address::{AddressSpace, Field, ObjectId, TypeTag};
use crate::bytecode::types::{DataType, Reference};
use crate::bytecode::{Instruction, Operand};
use crate::chunks::code::{Code, InstrRef};
use crate::chunks::func::{Function, FunctionId};
use crate::chunks::vari::{Variable, VariableId};
use crate::context::{ReadCtx, WriteCtx};
use crate::error::{Error, Result};

/// Link bits of an operand word.
pub const LINK_MASK: u32 = 0x07FF_FFFF;

/// Root of a reference chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainTarget {
    Function(FunctionId),
    Variable(VariableId),
}

impl From<ChainTarget> for ObjectId {
    fn from(target: ChainTarget) -> Self {
        match target {
            ChainTarget::Function(id) => ObjectId::Function(id),
            ChainTarget::Variable(id) => ObjectId::Variable(id),
        }
    }
}

/// Read `occurrences:u32` and the first-occurrence pointer (or `-1`).
///
/// From 2.3 on the pointer addresses the operand word, 4 bytes into the
/// instruction. A target that has not been decoded yet is deferred and the
/// returned address stays `None` until pending pointers are drained.
pub fn read_root(r: &mut ReadCtx<'_, '_>) -> Result<(u32, Option<InstrRef>)> {
    let occurrences = r.read_u32()?;
    let at = r.position();
    let raw = r.read_i32()?;

    if occurrences == 0 {
        if raw != -1 {
            return Err(Error::FormatInvariant {
                offset: at,
                field: "first_address",
                expected: -1,
                found: raw,
            });
        }
        return Ok((0, None));
    }

    let mut target = raw as u32;
    if r.version().first_address_is_operand() {
        target = target.checked_sub(4).ok_or_else(|| Error::CorruptPointer {
            offset: at as u32,
            message: format!("first occurrence {target:#x} cannot address an operand word"),
        })?;
    }
    match r.resolve(at, target, TypeTag::Instruction, Field::FirstAddress)? {
        Some(ObjectId::Instruction(first)) => Ok((occurrences, Some(first))),
        _ => Ok((occurrences, None)),
    }
}

/// Mirror of [`read_root`].
pub fn write_root(w: &mut WriteCtx, occurrences: u32, first: Option<InstrRef>) {
    w.write_u32(occurrences);
    match first {
        Some(first) => {
            let addend = if w.version().first_address_is_operand() { 4 } else { 0 };
            w.write_pointer(ObjectId::Instruction(first), addend);
        }
        None => w.write_i32(-1),
    }
}

fn reference(inst: &Instruction, target: ChainTarget) -> Option<Reference<ChainTarget>> {
    match target {
        ChainTarget::Function(_) => inst
            .function_ref()
            .or_else(|| function_push_link(inst))
            .map(|r| r.map(ChainTarget::Function)),
        ChainTarget::Variable(_) => inst.variable_ref().map(|r| r.map(ChainTarget::Variable)),
    }
}

/// An `Int32` push still holding its raw word. In 2.3+ bytecode this is how
/// a function is pushed as a value, and the word is a chain link; only a
/// FUNC chain landing on it tells the two apart.
fn function_push_link(inst: &Instruction) -> Option<Reference<FunctionId>> {
    match inst.operand {
        Operand::Int32(raw) if inst.opcode.is_push() && inst.type1 == DataType::Int32 => {
            Some(Reference::Link(raw as u32 & LINK_MASK))
        }
        _ => None,
    }
}

fn bind(inst: &mut Instruction, target: ChainTarget) {
    match target {
        ChainTarget::Function(id) => {
            if matches!(inst.operand, Operand::Int32(_)) {
                inst.operand = Operand::Function(Reference::Target(id));
            }
            if let Operand::Call { function, .. } | Operand::Function(function) =
                &mut inst.operand
            {
                *function = Reference::Target(id);
            }
        }
        ChainTarget::Variable(id) => {
            if let Operand::Variable { var, .. } = &mut inst.operand {
                var.target = Reference::Target(id);
            }
        }
    }
}

fn instruction_offset(space: &AddressSpace, r: InstrRef) -> Result<u32> {
    space
        .offset_of(ObjectId::Instruction(r))
        .ok_or(Error::UnresolvedPointer {
            source_offset: 0,
            target: 0,
            kind: TypeTag::Instruction,
        })
}

#[derive(Clone, Copy)]
enum Walk {
    At(InstrRef),
    Done,
}

/// Follow one chain from `first`, checking it against `declared`.
fn walk(
    code: &Code,
    space: &AddressSpace,
    target: ChainTarget,
    declared: u32,
    first: Option<InstrRef>,
) -> Result<Vec<InstrRef>> {
    let mut chain = Vec::new();
    let mut state = match first {
        Some(first) => Walk::At(first),
        None => Walk::Done,
    };

    while let Walk::At(current) = state {
        chain.push(current);
        if chain.len() as u32 > declared {
            return Err(Error::ChainLengthMismatch {
                target: target.into(),
                declared,
                walked: chain.len() as u32,
            });
        }

        let offset = instruction_offset(space, current)?;
        let operand_at = offset + 4;
        let inst = code.instruction(current).ok_or_else(|| Error::CorruptPointer {
            offset,
            message: format!("{} is not in the code stream", ObjectId::Instruction(current)),
        })?;
        let link = match reference(inst, target) {
            Some(Reference::Link(link)) => link,
            Some(Reference::Target(other)) => {
                return Err(Error::CorruptPointer {
                    offset: operand_at,
                    message: format!(
                        "occurrence of {} already belongs to {}",
                        ObjectId::from(target),
                        ObjectId::from(other)
                    ),
                });
            }
            None => {
                return Err(Error::CorruptPointer {
                    offset,
                    message: format!(
                        "{:?} instruction cannot reference {}",
                        inst.opcode,
                        ObjectId::from(target)
                    ),
                });
            }
        };

        state = if link == 0 {
            Walk::Done
        } else {
            let next = offset.checked_add(link).ok_or_else(|| Error::CorruptPointer {
                offset: operand_at,
                message: format!("link {link:#x} overflows"),
            })?;
            match space.object_at(next, TypeTag::Instruction)? {
                Some(ObjectId::Instruction(next)) => Walk::At(next),
                _ => {
                    return Err(Error::CorruptPointer {
                        offset: operand_at,
                        message: format!("link {link:#x} does not land on an instruction"),
                    });
                }
            }
        };
    }

    if chain.len() as u32 != declared {
        return Err(Error::ChainLengthMismatch {
            target: target.into(),
            declared,
            walked: chain.len() as u32,
        });
    }
    Ok(chain)
}

/// Walk every chain of a freshly read file and replace the links with ids.
pub fn resolve(
    code: &mut Code,
    functions: &[Function],
    variables: &[Variable],
    space: &AddressSpace,
) -> Result<()> {
    let roots = functions
        .iter()
        .enumerate()
        .map(|(i, f)| (ChainTarget::Function(FunctionId(i as u32)), f.occurrences, f.first_address))
        .chain(variables.iter().enumerate().map(|(i, v)| {
            (ChainTarget::Variable(VariableId(i as u32)), v.occurrences, v.first_address)
        }));

    for (target, declared, first) in roots {
        let chain = walk(code, space, target, declared, first)?;
        for r in chain {
            if let Some(inst) = code.instruction_mut(r) {
                bind(inst, target);
            }
        }
    }

    // Any link left over was not reachable from a FUNC/VARI root.
    for (r, inst) in code.instructions() {
        let orphan = match (inst.function_ref(), inst.variable_ref()) {
            (Some(Reference::Link(link)), _) => Some((link, TypeTag::Function)),
            (_, Some(Reference::Link(link))) => Some((link, TypeTag::Variable)),
            _ => None,
        };
        if let Some((link, kind)) = orphan {
            let offset = instruction_offset(space, r)?;
            return Err(Error::UnresolvedPointer {
                source_offset: offset + 4,
                target: offset.wrapping_add(link),
                kind,
            });
        }
    }
    Ok(())
}

/// Occurrences of every function and variable, in code-stream order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chains {
    pub functions: BTreeMap<FunctionId, Vec<InstrRef>>,
    pub variables: BTreeMap<VariableId, Vec<InstrRef>>,
}

impl Chains {
    pub fn get(&self, target: ChainTarget) -> &[InstrRef] {
        let chain = match target {
            ChainTarget::Function(id) => self.functions.get(&id),
            ChainTarget::Variable(id) => self.variables.get(&id),
        };
        chain.map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Gather the chains from resolved bytecode. A reference still holding a raw
/// link cannot be threaded.
pub fn collect(code: &Code) -> Result<Chains> {
    let mut chains = Chains::default();
    for (r, inst) in code.instructions() {
        if let Some(function) = inst.function_ref() {
            match function {
                Reference::Target(id) => chains.functions.entry(id).or_default().push(r),
                Reference::Link(link) => return Err(unbound(link, TypeTag::Function)),
            }
        }
        if let Some(variable) = inst.variable_ref() {
            match variable {
                Reference::Target(id) => chains.variables.entry(id).or_default().push(r),
                Reference::Link(link) => return Err(unbound(link, TypeTag::Variable)),
            }
        }
    }
    Ok(chains)
}

fn unbound(link: u32, kind: TypeTag) -> Error {
    Error::UnresolvedPointer {
        source_offset: 0,
        target: link,
        kind,
    }
}

/// Check FUNC/VARI roots against the collected chains before writing.
pub fn check(chains: &Chains, functions: &[Function], variables: &[Variable]) -> Result<()> {
    if let Some((&id, _)) = chains.functions.range(FunctionId(functions.len() as u32)..).next() {
        return Err(dangling(ObjectId::Function(id)));
    }
    if let Some((&id, _)) = chains.variables.range(VariableId(variables.len() as u32)..).next() {
        return Err(dangling(ObjectId::Variable(id)));
    }

    let roots = functions
        .iter()
        .enumerate()
        .map(|(i, f)| (ChainTarget::Function(FunctionId(i as u32)), f.occurrences, f.first_address))
        .chain(variables.iter().enumerate().map(|(i, v)| {
            (ChainTarget::Variable(VariableId(i as u32)), v.occurrences, v.first_address)
        }));

    for (target, declared, first) in roots {
        let chain = chains.get(target);
        if chain.len() as u32 != declared {
            return Err(Error::ChainLengthMismatch {
                target: target.into(),
                declared,
                walked: chain.len() as u32,
            });
        }
        if chain.first().copied() != first {
            return Err(Error::CorruptPointer {
                offset: 0,
                message: format!(
                    "first_address of {} disagrees with its first occurrence",
                    ObjectId::from(target)
                ),
            });
        }
    }
    Ok(())
}

fn dangling(object: ObjectId) -> Error {
    Error::CorruptPointer {
        offset: 0,
        message: format!("bytecode references {object}, which does not exist"),
    }
}

/// Patch the link of every occurrence once all instructions have offsets.
pub fn thread(w: &mut WriteCtx, chains: &Chains) -> Result<()> {
    for chain in chains.functions.values().chain(chains.variables.values()) {
        let offsets = chain
            .iter()
            .map(|&r| instruction_offset(w.space(), r))
            .collect::<Result<Vec<_>>>()?;

        for (k, &offset) in offsets.iter().enumerate() {
            let link = match offsets.get(k + 1) {
                Some(&next) => next
                    .checked_sub(offset)
                    .filter(|&d| d <= LINK_MASK)
                    .ok_or_else(|| Error::CorruptPointer {
                        offset,
                        message: format!("next occurrence at {next:#x} is not reachable by a link"),
                    })?,
                None => 0,
            };
            let operand_at = offset as usize + 4;
            let word = w.u32_at(operand_at);
            w.patch_u32(operand_at, (word & !LINK_MASK) | link);
        }
        tracing::trace!(occurrences = offsets.len(), "threaded chain");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcode::Opcode;
    use crate::chunks::code::CodeEntry;
    use crate::string_table::StringRef;

    fn call(link: u32) -> Instruction {
        Instruction {
            opcode: Opcode::Call,
            type1: DataType::Int32,
            type2: DataType::Double,
            operand: Operand::Call {
                function: Reference::Link(link),
                argc: 0,
            },
        }
    }

    fn ret() -> Instruction {
        Instruction {
            opcode: Opcode::Ret,
            type1: DataType::Variable,
            type2: DataType::Double,
            operand: Operand::None,
        }
    }

    fn push_i32(v: i32) -> Instruction {
        Instruction {
            opcode: Opcode::PushI,
            type1: DataType::Int32,
            type2: DataType::Double,
            operand: Operand::Int32(v),
        }
    }

    /// One entry at offset 0x100: call, ret, call, call.
    fn fixture(links: [u32; 3]) -> (Code, AddressSpace) {
        layout(vec![call(links[0]), ret(), call(links[1]), call(links[2])])
    }

    /// One entry holding `instructions`, laid out from offset 0x100.
    fn layout(instructions: Vec<Instruction>) -> (Code, AddressSpace) {
        let mut space = AddressSpace::new();
        let mut offset = 0x100;
        for (i, inst) in instructions.iter().enumerate() {
            space
                .record(ObjectId::Instruction(InstrRef { entry: 0, index: i as u32 }), offset)
                .unwrap();
            offset += inst.size() as u32;
        }
        let code = Code {
            entries: vec![CodeEntry {
                name: StringRef(0),
                locals_count: 0,
                args_count: 0,
                instructions,
            }],
        };
        (code, space)
    }

    fn at(index: u32) -> InstrRef {
        InstrRef { entry: 0, index }
    }

    fn function(occurrences: u32, first: Option<InstrRef>) -> Function {
        let mut f = Function::new(StringRef(0));
        f.occurrences = occurrences;
        f.first_address = first;
        f
    }

    #[test]
    fn test_walk_binds_chain() {
        // call@0x100 -> call@0x10C -> call@0x114
        let (mut code, space) = fixture([0x0C, 0x08, 0]);
        resolve(&mut code, &[function(3, Some(at(0)))], &[], &space).unwrap();
        let chains = collect(&code).unwrap();
        assert_eq!(chains.get(ChainTarget::Function(FunctionId(0))), [at(0), at(2), at(3)]);
    }

    #[test]
    fn test_chain_through_function_push() {
        // call@0x100 -> push.i@0x108; the push.i@0x110 is a plain integer.
        let (mut code, space) = layout(vec![call(0x08), push_i32(0), push_i32(0x10)]);
        resolve(&mut code, &[function(2, Some(at(0)))], &[], &space).unwrap();

        let insts = &code.entries[0].instructions;
        assert_eq!(insts[1].operand, Operand::Function(Reference::Target(FunctionId(0))));
        assert_eq!(insts[1].size(), 8);
        assert_eq!(insts[2].operand, Operand::Int32(0x10));
        let chains = collect(&code).unwrap();
        assert_eq!(chains.get(ChainTarget::Function(FunctionId(0))), [at(0), at(1)]);
    }

    #[test]
    fn test_declared_too_high() {
        let (mut code, space) = fixture([0x0C, 0x08, 0]);
        let err = resolve(&mut code, &[function(4, Some(at(0)))], &[], &space).unwrap_err();
        assert!(matches!(
            err,
            Error::ChainLengthMismatch {
                declared: 4,
                walked: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_declared_too_low_stops_early() {
        let (mut code, space) = fixture([0x0C, 0x08, 0]);
        let err = resolve(&mut code, &[function(2, Some(at(0)))], &[], &space).unwrap_err();
        assert!(matches!(
            err,
            Error::ChainLengthMismatch {
                declared: 2,
                walked: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_link_into_operand() {
        let (mut code, space) = fixture([0x04, 0, 0]);
        let err = resolve(&mut code, &[function(2, Some(at(0)))], &[], &space).unwrap_err();
        assert!(matches!(err, Error::CorruptPointer { offset: 0x104, .. }));
    }

    #[test]
    fn test_shared_occurrence() {
        // Both functions claim the call at 0x114.
        let (mut code, space) = fixture([0, 0x08, 0]);
        let functions = [function(2, Some(at(2))), function(1, Some(at(3)))];
        let err = resolve(&mut code, &functions, &[], &space).unwrap_err();
        assert!(matches!(err, Error::CorruptPointer { offset: 0x118, .. }));
    }

    #[test]
    fn test_orphan_link() {
        let (mut code, space) = fixture([0x0C, 0, 0]);
        let err = resolve(&mut code, &[function(2, Some(at(0)))], &[], &space).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedPointer {
                source_offset: 0x118,
                kind: TypeTag::Function,
                ..
            }
        ));
    }

    #[test]
    fn test_check_before_write() {
        let (mut code, space) = fixture([0x0C, 0x08, 0]);
        resolve(&mut code, &[function(3, Some(at(0)))], &[], &space).unwrap();
        let chains = collect(&code).unwrap();

        assert!(check(&chains, &[function(3, Some(at(0)))], &[]).is_ok());
        assert!(matches!(
            check(&chains, &[function(2, Some(at(0)))], &[]),
            Err(Error::ChainLengthMismatch { declared: 2, walked: 3, .. })
        ));
        assert!(matches!(
            check(&chains, &[function(3, Some(at(2)))], &[]),
            Err(Error::CorruptPointer { .. })
        ));
        assert!(matches!(check(&chains, &[], &[]), Err(Error::CorruptPointer { .. })));
    }

    #[test]
    fn test_collect_rejects_raw_links() {
        let (code, _) = fixture([0x0C, 0x08, 0]);
        assert!(matches!(
            collect(&code),
            Err(Error::UnresolvedPointer {
                kind: TypeTag::Function,
                ..
            })
        ));
    }
}
