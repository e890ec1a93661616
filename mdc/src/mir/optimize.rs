//! MIR optimization passes (§4.2).
//!
//! Passes run in the order the spec fixes: constant folding, copy
//! propagation, block-local common subexpression elimination, dead-code
//! elimination, branch folding (identical phi inputs), then
//! type-specialization. Each pass reports its before/after instruction
//! count and the rewrites it applied to an [`OptimizationReporter`].

use std::collections::HashMap;

use crate::ast::{InfixOp, PrefixOp, TypeAnn};

use super::reporting::{OptimizationReporter, PassReport};
use super::{Constant, Instr, MirFunction, MirProgram, Reg, Terminator};

/// One optimization level, selecting which passes run (§4.2, §6 `--optimize`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    None,
    Basic,
    Aggressive,
}

impl std::str::FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(OptLevel::None),
            "basic" => Ok(OptLevel::Basic),
            "aggressive" => Ok(OptLevel::Aggressive),
            other => Err(format!("unknown optimization level `{other}`")),
        }
    }
}

pub trait OptimizationPass {
    fn name(&self) -> &'static str;
    /// Run once over `func`, returning the rewrites it applied (empty if
    /// it made no changes).
    fn run_on_function(&self, func: &mut MirFunction) -> Vec<String>;
}

pub struct OptimizationPipeline {
    passes: Vec<Box<dyn OptimizationPass>>,
    max_iterations: usize,
}

impl OptimizationPipeline {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            max_iterations: 10,
        }
    }

    pub fn for_level(level: OptLevel) -> Self {
        let mut pipeline = Self::new();
        match level {
            OptLevel::None => {}
            OptLevel::Basic => {
                pipeline.add_pass(Box::new(ConstantFolding));
                pipeline.add_pass(Box::new(CopyPropagation));
                pipeline.add_pass(Box::new(DeadCodeElimination));
            }
            OptLevel::Aggressive => {
                pipeline.add_pass(Box::new(ConstantFolding));
                pipeline.add_pass(Box::new(CopyPropagation));
                pipeline.add_pass(Box::new(CommonSubexpressionElimination));
                pipeline.add_pass(Box::new(DeadCodeElimination));
                pipeline.add_pass(Box::new(BranchFolding));
                pipeline.add_pass(Box::new(TypeSpecialization));
            }
        }
        pipeline
    }

    pub fn add_pass(&mut self, pass: Box<dyn OptimizationPass>) {
        self.passes.push(pass);
    }

    pub fn set_max_iterations(&mut self, n: usize) {
        self.max_iterations = n;
    }

    /// Run every pass over every function in `program`, to a fixed point
    /// bounded by `max_iterations`, recording each pass invocation that
    /// changed anything into `reporter`.
    pub fn run(&self, program: &mut MirProgram, reporter: &mut OptimizationReporter) {
        self.run_function(&mut program.top_level, reporter);
        for func in &mut program.functions {
            self.run_function(func, reporter);
        }
    }

    fn run_function(&self, func: &mut MirFunction, reporter: &mut OptimizationReporter) {
        for _ in 0..self.max_iterations {
            let mut any_changed = false;
            for pass in &self.passes {
                let before = instr_count(func);
                let rewrites = pass.run_on_function(func);
                let after = instr_count(func);
                if before != after || !rewrites.is_empty() {
                    any_changed = true;
                }
                reporter.record(PassReport {
                    pass_name: pass.name().to_string(),
                    function_name: func.name.clone(),
                    instrs_before: before,
                    instrs_after: after,
                    rewrites,
                });
            }
            if !any_changed {
                break;
            }
        }
    }
}

impl Default for OptimizationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn instr_count(func: &MirFunction) -> usize {
    func.blocks.iter().map(|b| b.instrs.len()).sum()
}

/// The destination register an instruction writes, if any.
fn instr_dst(instr: &Instr) -> Option<Reg> {
    match instr {
        Instr::LoadConst { dst, .. }
        | Instr::Copy { dst, .. }
        | Instr::LoadName { dst, .. }
        | Instr::UnOp { dst, .. }
        | Instr::BinOp { dst, .. }
        | Instr::Phi { dst, .. }
        | Instr::NewList { dst, .. }
        | Instr::NewDict { dst }
        | Instr::ListGet { dst, .. }
        | Instr::ListLen { dst, .. }
        | Instr::DictGet { dst, .. } => Some(*dst),
        Instr::Call { dst, .. } => *dst,
        Instr::StoreName { .. }
        | Instr::Say(_)
        | Instr::ListAppend { .. }
        | Instr::ListSet { .. }
        | Instr::ListInsert { .. }
        | Instr::ListRemove { .. }
        | Instr::DictSet { .. } => None,
    }
}

/// Every register an instruction reads.
fn instr_uses(instr: &Instr) -> Vec<Reg> {
    match instr {
        Instr::LoadConst { .. } | Instr::LoadName { .. } | Instr::NewDict { .. } => vec![],
        Instr::NewList { .. } => vec![],
        Instr::Copy { src, .. } => vec![*src],
        Instr::StoreName { src, .. } => vec![*src],
        Instr::UnOp { src, .. } => vec![*src],
        Instr::BinOp { lhs, rhs, .. } => vec![*lhs, *rhs],
        Instr::Phi { inputs, .. } => inputs.iter().map(|(_, r)| *r).collect(),
        Instr::Call { args, .. } => args
            .iter()
            .map(|a| match a {
                super::MirArg::Positional(r) => *r,
                super::MirArg::Named(_, r) => *r,
            })
            .collect(),
        Instr::Say(r) => vec![*r],
        Instr::ListAppend { list, value } => vec![*list, *value],
        Instr::ListSet { list, index, value } => vec![*list, *index, *value],
        Instr::ListGet { list, index, .. } => vec![*list, *index],
        Instr::ListInsert { list, index, value } => vec![*list, *index, *value],
        Instr::ListRemove { list, value } => vec![*list, *value],
        Instr::ListLen { list, .. } => vec![*list],
        Instr::DictSet { dict, key, value } => vec![*dict, *key, *value],
        Instr::DictGet { dict, key, .. } => vec![*dict, *key],
    }
}

fn has_side_effect(instr: &Instr) -> bool {
    matches!(
        instr,
        Instr::StoreName { .. }
            | Instr::Say(_)
            | Instr::Call { .. }
            | Instr::ListAppend { .. }
            | Instr::ListSet { .. }
            | Instr::ListInsert { .. }
            | Instr::ListRemove { .. }
            | Instr::DictSet { .. }
    )
}

// ---------------------------------------------------------------------
// Constant folding
// ---------------------------------------------------------------------

pub struct ConstantFolding;

impl OptimizationPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run_on_function(&self, func: &mut MirFunction) -> Vec<String> {
        let mut known: HashMap<Reg, Constant> = HashMap::new();
        let mut rewrites = Vec::new();

        for block in &mut func.blocks {
            for instr in &mut block.instrs {
                match instr {
                    Instr::LoadConst { dst, value } => {
                        known.insert(*dst, value.clone());
                    }
                    Instr::UnOp { dst, op, src } => {
                        if let Some(c) = known.get(src).and_then(|c| fold_unop(*op, c)) {
                            rewrites.push(format!("folded unary op into {dst:?}"));
                            known.insert(*dst, c.clone());
                            *instr = Instr::LoadConst { dst: *dst, value: c };
                        }
                    }
                    Instr::BinOp { dst, op, lhs, rhs } => {
                        if let (Some(a), Some(b)) = (known.get(lhs), known.get(rhs)) {
                            if let Some(c) = fold_binop(*op, a, b) {
                                rewrites.push(format!("folded binary op into {dst:?}"));
                                known.insert(*dst, c.clone());
                                *instr = Instr::LoadConst { dst: *dst, value: c };
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        rewrites
    }
}

fn fold_unop(op: PrefixOp, value: &Constant) -> Option<Constant> {
    match (op, value) {
        (PrefixOp::Neg, Constant::Integer(n)) => Some(Constant::Integer(-n)),
        (PrefixOp::Neg, Constant::Float(x)) => Some(Constant::Float(-x)),
        (PrefixOp::Not, Constant::Boolean(b)) => Some(Constant::Boolean(!b)),
        _ => None,
    }
}

fn fold_binop(op: InfixOp, a: &Constant, b: &Constant) -> Option<Constant> {
    use Constant::*;
    use InfixOp::*;
    match (op, a, b) {
        // Division by zero is preserved for the VM to raise at runtime
        // (§4.2), never folded away.
        (Div, Float(_), Float(v)) if *v == 0.0 => None,
        (Div, Integer(_), Integer(0)) => None,

        // Integer overflow traps as TypeMismatch at runtime (OQ1); folding
        // must leave the same operations unfolded so the VM raises it.
        (Add, Integer(x), Integer(y)) => x.checked_add(*y).map(Integer),
        (Sub, Integer(x), Integer(y)) => x.checked_sub(*y).map(Integer),
        (Mul, Integer(x), Integer(y)) => x.checked_mul(*y).map(Integer),
        (Div, Integer(x), Integer(y)) => Some(Float(*x as f64 / *y as f64)),

        (Add, Float(x), Float(y)) => Some(Float(x + y)),
        (Sub, Float(x), Float(y)) => Some(Float(x - y)),
        (Mul, Float(x), Float(y)) => Some(Float(x * y)),
        (Div, Float(x), Float(y)) => Some(Float(x / y)),

        (Add, Integer(x), Float(y)) | (Add, Float(y), Integer(x)) => Some(Float(*x as f64 + y)),
        (Sub, Integer(x), Float(y)) => Some(Float(*x as f64 - y)),
        (Sub, Float(x), Integer(y)) => Some(Float(x - *y as f64)),
        (Mul, Integer(x), Float(y)) | (Mul, Float(y), Integer(x)) => Some(Float(*x as f64 * y)),
        (Div, Integer(x), Float(y)) => Some(Float(*x as f64 / y)),
        (Div, Float(x), Integer(y)) => Some(Float(x / *y as f64)),

        (Lt, Integer(x), Integer(y)) => Some(Boolean(x < y)),
        (Le, Integer(x), Integer(y)) => Some(Boolean(x <= y)),
        (Gt, Integer(x), Integer(y)) => Some(Boolean(x > y)),
        (Ge, Integer(x), Integer(y)) => Some(Boolean(x >= y)),
        (Eq, Integer(x), Integer(y)) => Some(Boolean(x == y)),
        (Eq, Float(x), Float(y)) => Some(Boolean(x == y)),
        (Eq, Integer(x), Float(y)) | (Eq, Float(y), Integer(x)) => Some(Boolean(*x as f64 == *y)),
        (StrictEq, Integer(x), Integer(y)) => Some(Boolean(x == y)),
        (StrictEq, Float(x), Float(y)) => Some(Boolean(x == y)),
        (StrictEq, Integer(_), Float(_)) | (StrictEq, Float(_), Integer(_)) => {
            Some(Boolean(false))
        }
        (StrictNe, a, b) => fold_binop(StrictEq, a, b).and_then(|c| match c {
            Boolean(v) => Some(Boolean(!v)),
            _ => None,
        }),
        (And, Boolean(x), Boolean(y)) => Some(Boolean(*x && *y)),
        (Or, Boolean(x), Boolean(y)) => Some(Boolean(*x || *y)),

        (Eq, String(x), String(y)) => Some(Boolean(x == y)),
        (StrictEq, String(x), String(y)) => Some(Boolean(x == y)),
        (Lt, String(x), String(y)) => Some(Boolean(x < y)),
        (Le, String(x), String(y)) => Some(Boolean(x <= y)),
        (Gt, String(x), String(y)) => Some(Boolean(x > y)),
        (Ge, String(x), String(y)) => Some(Boolean(x >= y)),

        _ => None,
    }
}

// ---------------------------------------------------------------------
// Copy propagation
// ---------------------------------------------------------------------

pub struct CopyPropagation;

impl OptimizationPass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn run_on_function(&self, func: &mut MirFunction) -> Vec<String> {
        let mut aliases: HashMap<Reg, Reg> = HashMap::new();
        for block in &func.blocks {
            for instr in &block.instrs {
                if let Instr::Copy { dst, src } = instr {
                    let root = *aliases.get(src).unwrap_or(src);
                    aliases.insert(*dst, root);
                }
            }
        }
        if aliases.is_empty() {
            return vec![];
        }

        let resolve = |r: Reg| -> Reg { *aliases.get(&r).unwrap_or(&r) };
        let mut rewrites = Vec::new();
        for block in &mut func.blocks {
            for instr in &mut block.instrs {
                substitute_uses(instr, &resolve, &mut rewrites);
            }
            substitute_terminator(&mut block.term, &resolve);
        }
        rewrites
    }
}

fn substitute_uses(instr: &mut Instr, resolve: &impl Fn(Reg) -> Reg, rewrites: &mut Vec<String>) {
    let before = instr_uses(instr);
    match instr {
        Instr::Copy { src, .. } => *src = resolve(*src),
        Instr::StoreName { src, .. } => *src = resolve(*src),
        Instr::UnOp { src, .. } => *src = resolve(*src),
        Instr::BinOp { lhs, rhs, .. } => {
            *lhs = resolve(*lhs);
            *rhs = resolve(*rhs);
        }
        Instr::Phi { inputs, .. } => {
            for (_, r) in inputs.iter_mut() {
                *r = resolve(*r);
            }
        }
        Instr::Call { args, .. } => {
            for a in args.iter_mut() {
                match a {
                    super::MirArg::Positional(r) => *r = resolve(*r),
                    super::MirArg::Named(_, r) => *r = resolve(*r),
                }
            }
        }
        Instr::Say(r) => *r = resolve(*r),
        Instr::ListAppend { list, value } => {
            *list = resolve(*list);
            *value = resolve(*value);
        }
        Instr::ListSet { list, index, value } => {
            *list = resolve(*list);
            *index = resolve(*index);
            *value = resolve(*value);
        }
        Instr::ListGet { list, index, .. } => {
            *list = resolve(*list);
            *index = resolve(*index);
        }
        Instr::ListInsert { list, index, value } => {
            *list = resolve(*list);
            *index = resolve(*index);
            *value = resolve(*value);
        }
        Instr::ListRemove { list, value } => {
            *list = resolve(*list);
            *value = resolve(*value);
        }
        Instr::ListLen { list, .. } => *list = resolve(*list),
        Instr::DictSet { dict, key, value } => {
            *dict = resolve(*dict);
            *key = resolve(*key);
            *value = resolve(*value);
        }
        Instr::DictGet { dict, key, .. } => {
            *dict = resolve(*dict);
            *key = resolve(*key);
        }
        Instr::LoadConst { .. } | Instr::LoadName { .. } | Instr::NewList { .. } | Instr::NewDict { .. } => {}
    }
    if instr_uses(instr) != before {
        rewrites.push("propagated copy into use".to_string());
    }
}

fn substitute_terminator(term: &mut Terminator, resolve: &impl Fn(Reg) -> Reg) {
    if let Terminator::Branch { cond, .. } = term {
        *cond = resolve(*cond);
    }
    if let Terminator::Return(Some(r)) = term {
        *r = resolve(*r);
    }
}

// ---------------------------------------------------------------------
// Common subexpression elimination (block-local)
// ---------------------------------------------------------------------

pub struct CommonSubexpressionElimination;

impl OptimizationPass for CommonSubexpressionElimination {
    fn name(&self) -> &'static str {
        "common-subexpression-elimination"
    }

    fn run_on_function(&self, func: &mut MirFunction) -> Vec<String> {
        let mut rewrites = Vec::new();
        for block in &mut func.blocks {
            let mut seen: HashMap<(InfixOp, Reg, Reg), Reg> = HashMap::new();
            for instr in &mut block.instrs {
                if let Instr::BinOp { dst, op, lhs, rhs } = instr {
                    let key = (*op, *lhs, *rhs);
                    if let Some(&existing) = seen.get(&key) {
                        rewrites.push(format!("reused {existing:?} for duplicate expression into {dst:?}"));
                        let dst = *dst;
                        *instr = Instr::Copy { dst, src: existing };
                    } else {
                        seen.insert(key, *dst);
                    }
                }
            }
        }
        rewrites
    }
}

// ---------------------------------------------------------------------
// Dead-instruction elimination
// ---------------------------------------------------------------------

pub struct DeadCodeElimination;

impl OptimizationPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run_on_function(&self, func: &mut MirFunction) -> Vec<String> {
        let mut used: std::collections::HashSet<Reg> = std::collections::HashSet::new();
        for block in &func.blocks {
            for instr in &block.instrs {
                for r in instr_uses(instr) {
                    used.insert(r);
                }
            }
            if let Terminator::Branch { cond, .. } = &block.term {
                used.insert(*cond);
            }
            if let Terminator::Return(Some(r)) = &block.term {
                used.insert(*r);
            }
        }

        let mut rewrites = Vec::new();
        for block in &mut func.blocks {
            let before = block.instrs.len();
            block.instrs.retain(|instr| {
                if has_side_effect(instr) {
                    return true;
                }
                match instr_dst(instr) {
                    Some(dst) => used.contains(&dst),
                    None => true,
                }
            });
            if block.instrs.len() != before {
                rewrites.push(format!(
                    "removed {} dead instruction(s)",
                    before - block.instrs.len()
                ));
            }
        }
        rewrites
    }
}

// ---------------------------------------------------------------------
// Branch folding (identical phi inputs)
// ---------------------------------------------------------------------

pub struct BranchFolding;

impl OptimizationPass for BranchFolding {
    fn name(&self) -> &'static str {
        "branch-folding"
    }

    fn run_on_function(&self, func: &mut MirFunction) -> Vec<String> {
        let mut known: HashMap<Reg, Constant> = HashMap::new();
        for block in &func.blocks {
            for instr in &block.instrs {
                if let Instr::LoadConst { dst, value } = instr {
                    known.insert(*dst, value.clone());
                }
            }
        }

        let mut rewrites = Vec::new();
        for block in &mut func.blocks {
            for instr in &mut block.instrs {
                if let Instr::Phi { dst, inputs } = instr {
                    let mut values = inputs.iter().map(|(_, r)| known.get(r));
                    let first = values.next().flatten();
                    if let Some(first) = first {
                        if values.clone().all(|v| v == Some(first)) {
                            rewrites.push(format!("folded phi with identical inputs into {dst:?}"));
                            let dst = *dst;
                            let value = first.clone();
                            *instr = Instr::LoadConst { dst, value };
                        }
                    }
                }
            }
        }
        rewrites
    }
}

// ---------------------------------------------------------------------
// Type specialization
// ---------------------------------------------------------------------

/// When every input to an arithmetic op is statically Whole-Number, keep
/// the destination register typed Whole-Number (the VM's integer path);
/// otherwise widen it to Float (§4.2, §4.6).
pub struct TypeSpecialization;

impl OptimizationPass for TypeSpecialization {
    fn name(&self) -> &'static str {
        "type-specialization"
    }

    fn run_on_function(&self, func: &mut MirFunction) -> Vec<String> {
        let mut rewrites = Vec::new();
        let blocks = func.blocks.clone();
        for block in &blocks {
            for instr in &block.instrs {
                if let Instr::BinOp { dst, op, lhs, rhs } = instr {
                    if !matches!(op, InfixOp::Add | InfixOp::Sub | InfixOp::Mul) {
                        continue;
                    }
                    let lhs_ty = func.reg_types[lhs.0 as usize];
                    let rhs_ty = func.reg_types[rhs.0 as usize];
                    let specialized = if lhs_ty == TypeAnn::WholeNumber && rhs_ty == TypeAnn::WholeNumber {
                        TypeAnn::WholeNumber
                    } else {
                        TypeAnn::Float
                    };
                    let slot = &mut func.reg_types[dst.0 as usize];
                    if *slot != specialized {
                        rewrites.push(format!("specialized {dst:?} to {specialized}"));
                        *slot = specialized;
                    }
                }
            }
        }
        rewrites
    }
}
