//! Instruction selection: one MIR instruction becomes one bytecode
//! instruction, and a whole [`MirProgram`] becomes one assembled
//! [`bytecode::Module`] (§4.3, §4.4).

use std::collections::HashMap;

use super::alloc::{allocate, Assignment};
use super::RegAllocError;
use crate::ast::{InfixOp, PrefixOp};
use crate::bytecode::encode::{CallArgKind, InstrWriter};
use crate::bytecode::{Constant as BcConstant, FunctionRecord, Module as BcModule, ParamRecord};
use crate::mir::{BlockId, Constant as MirConstant, Instr, MirArg, MirFunction, MirProgram, Reg, Terminator};

#[derive(PartialEq, Eq, Hash, Clone)]
enum ConstKey {
    Integer(i64),
    Float(u64),
    String(String),
    Boolean(bool),
    Empty,
}

/// Deduplicates constant-pool entries, including the interned strings
/// used as `LoadName`/`StoreName`/named-argument operands (§4.4: no
/// separate name section, just string constants referenced by index).
struct ConstPool {
    values: Vec<BcConstant>,
    index: HashMap<ConstKey, u16>,
}

impl ConstPool {
    fn new() -> Self {
        Self {
            values: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn intern(&mut self, value: MirConstant) -> u16 {
        let key = match &value {
            MirConstant::Integer(n) => ConstKey::Integer(*n),
            MirConstant::Float(x) => ConstKey::Float(x.to_bits()),
            MirConstant::String(s) => ConstKey::String(s.clone()),
            MirConstant::Boolean(b) => ConstKey::Boolean(*b),
            MirConstant::Empty => ConstKey::Empty,
        };
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.values.len() as u16;
        self.values.push(to_bc_constant(value));
        self.index.insert(key, idx);
        idx
    }

    fn intern_name(&mut self, name: &str) -> u16 {
        self.intern(MirConstant::String(name.to_string()))
    }
}

fn to_bc_constant(value: MirConstant) -> BcConstant {
    match value {
        MirConstant::Integer(n) => BcConstant::Integer(n),
        MirConstant::Float(x) => BcConstant::Float(x),
        MirConstant::String(s) => BcConstant::String(s),
        MirConstant::Boolean(b) => BcConstant::Boolean(b),
        MirConstant::Empty => BcConstant::Empty,
    }
}

/// Assembles a whole program into one module. Top-level code is emitted
/// first, at byte offset 0 of the shared instruction stream — it has no
/// entry in the function table, matching a module with no utilities at
/// all still running its top-level statements straight out of the
/// instruction section (§4.4). Utilities and their default-value thunks
/// follow, each getting a `FunctionRecord` so `Call` can resolve them by
/// name.
pub fn assemble_module(program: &MirProgram, module_name: &str) -> Result<BcModule, RegAllocError> {
    let mut name_to_idx: HashMap<String, u16> = HashMap::new();
    for (i, f) in program.functions.iter().enumerate() {
        name_to_idx.insert(f.name.clone(), i as u16);
    }

    let mut assignments = Vec::with_capacity(program.functions.len());
    for f in &program.functions {
        assignments.push(allocate(f)?);
    }
    let top_assignment = allocate(&program.top_level)?;

    let mut pool = ConstPool::new();
    let mut writer = InstrWriter::new();

    assemble_function(
        &mut writer,
        &mut pool,
        &name_to_idx,
        &program.top_level,
        &top_assignment,
    );

    let mut records = Vec::with_capacity(program.functions.len());
    for (f, assignment) in program.functions.iter().zip(assignments.iter()) {
        let entry_offset = assemble_function(&mut writer, &mut pool, &name_to_idx, f, assignment);
        records.push(function_record(f, assignment, entry_offset));
    }

    Ok(BcModule {
        version: crate::bytecode::VERSION,
        flags: 0,
        name: module_name.to_string(),
        constants: pool.values,
        functions: records,
        code: writer.code,
        top_level_register_count: top_assignment.register_count,
    })
}

fn function_record(f: &MirFunction, assignment: &Assignment, entry_offset: u32) -> FunctionRecord {
    FunctionRecord {
        name: f.name.clone(),
        params: f
            .params
            .iter()
            .map(|p| ParamRecord {
                name: p.name.clone(),
                required: p.required,
                default_fn: p.default_fn.map(|i| i as u32),
            })
            .collect(),
        output_ty: f.output_ty,
        register_count: assignment.register_count,
        entry_offset,
    }
}

fn assemble_function(
    writer: &mut InstrWriter,
    pool: &mut ConstPool,
    name_to_idx: &HashMap<String, u16>,
    func: &MirFunction,
    assignment: &Assignment,
) -> u32 {
    let entry_offset = writer.position();
    let mut block_offsets: HashMap<BlockId, u32> = HashMap::new();
    let mut patches: Vec<(usize, BlockId)> = Vec::new();

    let block_count = func.blocks.len();
    for (bi, block) in func.blocks.iter().enumerate() {
        let id = BlockId(bi as u32);
        block_offsets.insert(id, writer.position());

        for instr in &block.instrs {
            emit_instr(writer, pool, name_to_idx, &assignment.phys, instr);
        }

        if let Some(copies) = assignment.phi_copies.get(&id) {
            for (dst, src) in copies {
                if dst != src {
                    writer.copy(*dst, *src);
                }
            }
        }

        let next = if bi + 1 < block_count {
            Some(BlockId((bi + 1) as u32))
        } else {
            None
        };
        emit_terminator(writer, &assignment.phys, &block.term, next, &mut patches);
    }

    for (operand_offset, target) in patches {
        let target_offset = block_offsets[&target];
        writer.patch_target(operand_offset, target_offset);
    }

    entry_offset
}

fn emit_terminator(
    writer: &mut InstrWriter,
    phys: &HashMap<Reg, u8>,
    term: &Terminator,
    next: Option<BlockId>,
    patches: &mut Vec<(usize, BlockId)>,
) {
    match term {
        Terminator::Jump(target) => {
            if next != Some(*target) {
                let pos = writer.jump();
                patches.push((pos as usize + 1, *target));
            }
        }
        Terminator::Branch {
            cond,
            if_true,
            if_false,
        } => {
            let cond = phys[cond];
            if next == Some(*if_false) {
                let pos = writer.branch_if_true(cond);
                patches.push((pos as usize + 2, *if_true));
            } else if next == Some(*if_true) {
                let pos = writer.branch_if_false(cond);
                patches.push((pos as usize + 2, *if_false));
            } else {
                let pos = writer.branch_if_true(cond);
                patches.push((pos as usize + 2, *if_true));
                let jump_pos = writer.jump();
                patches.push((jump_pos as usize + 1, *if_false));
            }
        }
        Terminator::Return(reg) => {
            writer.ret(reg.as_ref().map(|r| phys[r]));
        }
        Terminator::Unset => {
            unreachable!("mir::build always terminates every block before handing off")
        }
    }
}

fn emit_instr(
    writer: &mut InstrWriter,
    pool: &mut ConstPool,
    name_to_idx: &HashMap<String, u16>,
    phys: &HashMap<Reg, u8>,
    instr: &Instr,
) {
    let p = |r: &Reg| phys[r];
    match instr {
        Instr::LoadConst { dst, value } => {
            let idx = pool.intern(value.clone());
            writer.load_const(p(dst), idx);
        }
        Instr::Copy { dst, src } => {
            writer.copy(p(dst), p(src));
        }
        Instr::LoadName { dst, name } => {
            let idx = pool.intern_name(name);
            writer.load_name(p(dst), idx);
        }
        Instr::StoreName { name, src } => {
            let idx = pool.intern_name(name);
            writer.store_name(idx, p(src));
        }
        Instr::UnOp { dst, op, src } => match op {
            PrefixOp::Neg => {
                writer.neg(p(dst), p(src));
            }
            PrefixOp::Not => {
                writer.not(p(dst), p(src));
            }
        },
        Instr::BinOp { dst, op, lhs, rhs } => {
            let (d, l, r) = (p(dst), p(lhs), p(rhs));
            match op {
                InfixOp::Add => {
                    writer.add(d, l, r);
                }
                InfixOp::Sub => {
                    writer.sub(d, l, r);
                }
                InfixOp::Mul => {
                    writer.mul(d, l, r);
                }
                InfixOp::Div => {
                    writer.div(d, l, r);
                }
                InfixOp::Lt => {
                    writer.lt(d, l, r);
                }
                InfixOp::Le => {
                    writer.le(d, l, r);
                }
                InfixOp::Gt => {
                    writer.gt(d, l, r);
                }
                InfixOp::Ge => {
                    writer.ge(d, l, r);
                }
                InfixOp::Eq => {
                    writer.eq(d, l, r);
                }
                InfixOp::StrictEq => {
                    writer.strict_eq(d, l, r);
                }
                InfixOp::StrictNe => {
                    writer.strict_ne(d, l, r);
                }
                InfixOp::And | InfixOp::Or => unreachable!(
                    "and/or never reach instruction selection: mir::build lowers their \
                     short-circuit semantics to branches and a phi first"
                ),
            }
        }
        Instr::Phi { .. } => {
            // Resolved into moves at each predecessor's block exit; see
            // `assemble_function`'s `phi_copies` handling.
        }
        Instr::Call { dst, callee, args } => {
            let fn_idx = *name_to_idx.get(callee).unwrap_or_else(|| {
                panic!("unknown callee `{callee}` should have been caught as a compile diagnostic")
            });
            let arg_regs: Vec<(CallArgKind, u8)> = args
                .iter()
                .map(|a| match a {
                    MirArg::Positional(r) => (CallArgKind::Positional, p(r)),
                    MirArg::Named(name, r) => {
                        let idx = pool.intern_name(name);
                        (CallArgKind::Named(idx), p(r))
                    }
                })
                .collect();
            writer.call(dst.as_ref().map(p), fn_idx, &arg_regs);
        }
        Instr::Say(reg) => {
            writer.say(p(reg));
        }
        Instr::NewList { dst, elem_ty } => {
            let tag = match elem_ty {
                Some(t) => 1 + *t as u8,
                None => 0,
            };
            writer.new_list(p(dst), tag);
        }
        Instr::NewDict { dst } => {
            writer.new_dict(p(dst));
        }
        Instr::ListAppend { list, value } => {
            writer.list_append(p(list), p(value));
        }
        Instr::ListSet { list, index, value } => {
            writer.list_set(p(list), p(index), p(value));
        }
        Instr::ListGet { dst, list, index } => {
            writer.list_get(p(dst), p(list), p(index));
        }
        Instr::ListInsert { list, index, value } => {
            writer.list_insert(p(list), p(index), p(value));
        }
        Instr::ListRemove { list, value } => {
            writer.list_remove(p(list), p(value));
        }
        Instr::ListLen { dst, list } => {
            writer.list_len(p(dst), p(list));
        }
        Instr::DictSet { dict, key, value } => {
            writer.dict_set(p(dict), p(key), p(value));
        }
        Instr::DictGet { dst, dict, key } => {
            writer.dict_get(p(dst), p(dict), p(key));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Program, Span, Spanned, Statement};
    use crate::bytecode::{decode, Opcode};
    use crate::hir::lower_program;
    use crate::mir::build_program;

    fn say(expr: Expr) -> Spanned<Statement> {
        Spanned::new(
            Statement::Say {
                value: Spanned::new(expr, Span::synthetic()),
            },
            Span::synthetic(),
        )
    }

    #[test]
    fn say_literal_assembles_and_round_trips_through_the_container() {
        let program = Program {
            statements: vec![say(Expr::IntegerLit(42))],
        };
        let (hir, diags) = lower_program(&program);
        assert!(diags.is_empty(), "{diags:?}");
        let mir = build_program(&hir);
        let module = assemble_module(&mir, "test").expect("assembly should succeed");

        let bytes = crate::bytecode::encode(&module);
        let decoded = decode(&bytes).expect("decode should succeed");
        assert_eq!(decoded.code[0], Opcode::LoadConstR as u8, "top-level code starts at offset 0");
    }

    #[test]
    fn if_else_merge_shares_a_register_across_branches() {
        let cond = Spanned::new(Expr::BooleanLit(true), Span::synthetic());
        let program = Program {
            statements: vec![Spanned::new(
                Statement::If {
                    cond,
                    then_branch: vec![say(Expr::IntegerLit(1))],
                    else_branch: Some(vec![say(Expr::IntegerLit(2))]),
                },
                Span::synthetic(),
            )],
        };
        let (hir, diags) = lower_program(&program);
        assert!(diags.is_empty(), "{diags:?}");
        let mir = build_program(&hir);
        let module = assemble_module(&mir, "test").expect("assembly should succeed");
        assert!(!module.code.is_empty());
        assert_eq!(module.code[0], Opcode::LoadConstR as u8, "top-level code starts at offset 0");
    }
}
