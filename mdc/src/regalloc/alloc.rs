//! Live-interval computation and linear-scan assignment (§4.3).
//!
//! Every virtual register in this MIR is defined exactly once, and no
//! register ever survives a loop back-edge: [`crate::mir::build`] carries
//! loop-carried state through named variables (`LoadName`/`StoreName`),
//! never through a register, and a `while` body's only back edge jumps
//! to the condition block without any register flowing along it. So a
//! single linear pass over a function's blocks in the order the builder
//! created them already gives every register a correct live range,
//! without a general dominance-frontier liveness analysis.

use std::collections::HashMap;

use super::RegAllocError;
use crate::mir::{BlockId, Instr, MirArg, MirFunction, Reg, Terminator};

pub const MAX_REGISTERS: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Interval {
    reg: Reg,
    start: u32,
    end: u32,
}

/// The result of allocating one function: a physical slot for every
/// virtual register it uses, plus the parallel-copy moves phi resolution
/// needs inserted right before each predecessor block's terminator.
pub struct Assignment {
    pub phys: HashMap<Reg, u8>,
    pub register_count: u16,
    pub phi_copies: HashMap<BlockId, Vec<(u8, u8)>>,
}

pub fn allocate(func: &MirFunction) -> Result<Assignment, RegAllocError> {
    let positions = number_instructions(func);
    let intervals = build_intervals(func, &positions);
    let phys = linear_scan(&intervals, &func.name)?;
    let register_count = phys.values().map(|&r| r as u32 + 1).max().unwrap_or(0) as u16;
    let phi_copies = resolve_phis(func, &phys);
    Ok(Assignment {
        phys,
        register_count,
        phi_copies,
    })
}

struct Positions {
    instr: HashMap<(BlockId, usize), u32>,
    block_end: HashMap<BlockId, u32>,
}

fn number_instructions(func: &MirFunction) -> Positions {
    let mut instr = HashMap::new();
    let mut block_end = HashMap::new();
    let mut pos = 0u32;
    for (bi, block) in func.blocks.iter().enumerate() {
        let id = BlockId(bi as u32);
        for ii in 0..block.instrs.len() {
            instr.insert((id, ii), pos);
            pos += 1;
        }
        block_end.insert(id, pos);
        pos += 1;
    }
    Positions { instr, block_end }
}

fn mark(start: &mut [u32], end: &mut [u32], seen: &mut [bool], reg: Reg, at: u32) {
    let i = reg.0 as usize;
    seen[i] = true;
    start[i] = start[i].min(at);
    end[i] = end[i].max(at);
}

fn instr_def(instr: &Instr) -> Option<Reg> {
    use Instr::*;
    match instr {
        LoadConst { dst, .. }
        | Copy { dst, .. }
        | LoadName { dst, .. }
        | UnOp { dst, .. }
        | BinOp { dst, .. }
        | Phi { dst, .. }
        | NewList { dst, .. }
        | NewDict { dst }
        | ListGet { dst, .. }
        | ListLen { dst, .. }
        | DictGet { dst, .. } => Some(*dst),
        Call { dst, .. } => *dst,
        StoreName { .. }
        | Say(_)
        | ListAppend { .. }
        | ListSet { .. }
        | ListInsert { .. }
        | ListRemove { .. }
        | DictSet { .. } => None,
    }
}

fn instr_uses(instr: &Instr) -> Vec<Reg> {
    use Instr::*;
    match instr {
        LoadConst { .. } | LoadName { .. } | NewList { .. } | NewDict { .. } | Phi { .. } => vec![],
        Copy { src, .. } => vec![*src],
        UnOp { src, .. } => vec![*src],
        BinOp { lhs, rhs, .. } => vec![*lhs, *rhs],
        Call { args, .. } => args
            .iter()
            .map(|a| match a {
                MirArg::Positional(r) => *r,
                MirArg::Named(_, r) => *r,
            })
            .collect(),
        Say(r) => vec![*r],
        ListAppend { list, value } => vec![*list, *value],
        ListSet { list, index, value } => vec![*list, *index, *value],
        ListGet { list, index, .. } => vec![*list, *index],
        ListInsert { list, index, value } => vec![*list, *index, *value],
        ListRemove { list, value } => vec![*list, *value],
        ListLen { list, .. } => vec![*list],
        DictSet { dict, key, value } => vec![*dict, *key, *value],
        DictGet { dict, key, .. } => vec![*dict, *key],
        StoreName { src, .. } => vec![*src],
    }
}

fn build_intervals(func: &MirFunction, pos: &Positions) -> Vec<Interval> {
    let n = func.reg_types.len();
    let mut start = vec![u32::MAX; n];
    let mut end = vec![0u32; n];
    let mut seen = vec![false; n];

    for (bi, block) in func.blocks.iter().enumerate() {
        let id = BlockId(bi as u32);
        for (ii, instr) in block.instrs.iter().enumerate() {
            let at = pos.instr[&(id, ii)];
            if let Instr::Phi { dst, inputs } = instr {
                mark(&mut start, &mut end, &mut seen, *dst, at);
                for (pred, src) in inputs {
                    let use_at = pos.block_end[pred];
                    mark(&mut start, &mut end, &mut seen, *src, use_at);
                }
                continue;
            }
            if let Some(dst) = instr_def(instr) {
                mark(&mut start, &mut end, &mut seen, dst, at);
            }
            for reg in instr_uses(instr) {
                mark(&mut start, &mut end, &mut seen, reg, at);
            }
        }
        let at = pos.block_end[&id];
        match &block.term {
            Terminator::Branch { cond, .. } => mark(&mut start, &mut end, &mut seen, *cond, at),
            Terminator::Return(Some(reg)) => mark(&mut start, &mut end, &mut seen, *reg, at),
            Terminator::Jump(_) | Terminator::Return(None) | Terminator::Unset => {}
        }
    }

    (0..n)
        .filter(|&i| seen[i])
        .map(|i| Interval {
            reg: Reg(i as u32),
            start: start[i],
            end: end[i],
        })
        .collect()
}

fn linear_scan(intervals: &[Interval], func_name: &str) -> Result<HashMap<Reg, u8>, RegAllocError> {
    let mut sorted: Vec<Interval> = intervals.to_vec();
    sorted.sort_by_key(|i| i.start);

    let mut active: Vec<Interval> = Vec::new();
    let mut free_pool: Vec<u8> = (0..MAX_REGISTERS as u8).rev().collect();
    let mut phys: HashMap<Reg, u8> = HashMap::new();

    for interval in sorted {
        let mut still_active = Vec::with_capacity(active.len());
        for a in active.drain(..) {
            if a.end < interval.start {
                free_pool.push(phys[&a.reg]);
            } else {
                still_active.push(a);
            }
        }
        active = still_active;
        free_pool.sort_unstable_by(|a, b| b.cmp(a));

        let slot = free_pool
            .pop()
            .ok_or_else(|| RegAllocError::Overflow(func_name.to_string()))?;
        phys.insert(interval.reg, slot);
        active.push(interval);
    }

    Ok(phys)
}

/// Every merge block this MIR builds holds at most one live phi (a
/// `Select` or a short-circuited `and`/`or`), so resolving them is
/// always a plain sequence of moves, never a permutation that needs a
/// temporary to break a cycle.
fn resolve_phis(func: &MirFunction, phys: &HashMap<Reg, u8>) -> HashMap<BlockId, Vec<(u8, u8)>> {
    let mut copies: HashMap<BlockId, Vec<(u8, u8)>> = HashMap::new();
    for block in &func.blocks {
        for instr in &block.instrs {
            if let Instr::Phi { dst, inputs } = instr {
                let dst_phys = phys[dst];
                for (pred, src) in inputs {
                    let src_phys = phys[src];
                    copies.entry(*pred).or_default().push((dst_phys, src_phys));
                }
            }
        }
    }
    copies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeAnn;
    use crate::mir::{BasicBlock, Constant, MirFunction};

    fn straight_line_function() -> MirFunction {
        let mut func = MirFunction {
            name: "demo".into(),
            params: vec![],
            output_ty: TypeAnn::WholeNumber,
            reg_types: vec![],
            blocks: vec![BasicBlock::default()],
            entry: BlockId(0),
        };
        let a = func.new_reg(TypeAnn::WholeNumber);
        let b = func.new_reg(TypeAnn::WholeNumber);
        let c = func.new_reg(TypeAnn::WholeNumber);
        func.blocks[0].instrs.push(Instr::LoadConst {
            dst: a,
            value: Constant::Integer(1),
        });
        func.blocks[0].instrs.push(Instr::LoadConst {
            dst: b,
            value: Constant::Integer(2),
        });
        func.blocks[0].instrs.push(Instr::BinOp {
            dst: c,
            op: crate::ast::InfixOp::Add,
            lhs: a,
            rhs: b,
        });
        func.blocks[0].term = Terminator::Return(Some(c));
        func
    }

    #[test]
    fn allocates_disjoint_registers_for_overlapping_live_ranges() {
        let func = straight_line_function();
        let assignment = allocate(&func).expect("allocation should succeed");
        let slots: std::collections::HashSet<u8> = assignment.phys.values().copied().collect();
        assert_eq!(slots.len(), 3, "a, b, and c are all simultaneously live");
    }

    #[test]
    fn reuses_a_register_once_its_value_is_dead() {
        let mut func = MirFunction {
            name: "demo".into(),
            params: vec![],
            output_ty: TypeAnn::WholeNumber,
            reg_types: vec![],
            blocks: vec![BasicBlock::default()],
            entry: BlockId(0),
        };
        let a = func.new_reg(TypeAnn::WholeNumber);
        let b = func.new_reg(TypeAnn::WholeNumber);
        let c = func.new_reg(TypeAnn::WholeNumber);
        func.blocks[0].instrs.push(Instr::LoadConst {
            dst: a,
            value: Constant::Integer(1),
        });
        func.blocks[0].instrs.push(Instr::UnOp {
            dst: b,
            op: crate::ast::PrefixOp::Neg,
            src: a,
        });
        func.blocks[0].instrs.push(Instr::LoadConst {
            dst: c,
            value: Constant::Integer(2),
        });
        func.blocks[0].term = Terminator::Return(Some(c));

        let assignment = allocate(&func).unwrap();
        assert_eq!(assignment.phys[&a], assignment.phys[&c], "a is dead once b is computed");
    }
}
