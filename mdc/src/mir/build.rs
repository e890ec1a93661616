//! HIR -> MIR construction (§4.2).

use crate::ast::{InfixOp, TypeAnn};
use crate::hir::{HCall, HExpr, HExprKind, HProgram, HStmt, HUtility};

use super::{BasicBlock, BlockId, Constant, Instr, MirArg, MirFunction, MirParam, MirProgram, Reg, Terminator};

/// Lower a whole program: the flat utility table plus a synthetic
/// top-level function for the statements outside any utility (§3.4: "a
/// module is a list of functions plus a top-level function").
pub fn build_program(hir: &HProgram) -> MirProgram {
    let mut functions = Vec::new();

    // Pass 1: give every optional parameter's default expression its own
    // thunk function, since the call protocol evaluates it lazily "in the
    // callee's definition environment" only when the caller omits the
    // argument (§4.5) — a plain inline expression can't be re-evaluated on
    // demand once MIR has been assembled into straight-line code.
    let mut default_fns: Vec<Vec<Option<usize>>> = Vec::with_capacity(hir.utilities.len());
    for utility in &hir.utilities {
        let mut fn_indices = Vec::with_capacity(utility.params.len());
        for param in &utility.params {
            if let Some(default) = &param.default {
                let thunk = build_function(
                    &format!("__default_{}_{}", utility.name, param.name),
                    &[],
                    param.ty,
                    &[HStmt::GiveBack(Some(default.clone()))],
                );
                fn_indices.push(Some(functions.len()));
                functions.push(thunk);
            } else {
                fn_indices.push(None);
            }
        }
        default_fns.push(fn_indices);
    }

    // Pass 2: lower every utility body, now that default-thunk indices are
    // known.
    for (utility, defaults) in hir.utilities.iter().zip(default_fns.iter()) {
        functions.push(build_utility(utility, defaults));
    }

    let top_level = build_function("main", &[], TypeAnn::Any, &hir.top_level);

    MirProgram {
        top_level,
        functions,
    }
}

fn build_utility(utility: &HUtility, default_fns: &[Option<usize>]) -> MirFunction {
    let mut func = build_function(&utility.name, &[], utility.output_ty, &[]);
    func.params = utility
        .params
        .iter()
        .zip(default_fns.iter())
        .map(|(p, default_fn)| MirParam {
            name: p.name.clone(),
            ty: p.ty,
            required: p.required,
            default_fn: *default_fn,
        })
        .collect();

    let mut builder = Builder::new(func);
    builder.lower_block(&utility.body);
    builder.finish()
}

fn build_function(name: &str, params: &[MirParam], output_ty: TypeAnn, body: &[HStmt]) -> MirFunction {
    let func = MirFunction {
        name: name.to_string(),
        params: params.to_vec(),
        output_ty,
        reg_types: Vec::new(),
        blocks: Vec::new(),
        entry: BlockId(0),
    };
    let mut builder = Builder::new(func);
    builder.lower_block(body);
    builder.finish()
}

struct Builder {
    func: MirFunction,
    current: BlockId,
}

impl Builder {
    fn new(mut func: MirFunction) -> Self {
        func.blocks.push(BasicBlock::default());
        func.entry = BlockId(0);
        Self {
            func,
            current: BlockId(0),
        }
    }

    fn finish(mut self) -> MirFunction {
        // A function whose body never explicitly returns falls off the end
        // giving back Empty, matching the VM's "no Give-Back produced"
        // default (§4.5 Termination). Any other block left without a
        // terminator is unreachable dead code (already flagged at HIR
        // lowering); give it the same harmless terminator so assembly
        // never has to special-case an incomplete block.
        for block in &mut self.func.blocks {
            if matches!(block.term, Terminator::Unset) {
                block.term = Terminator::Return(None);
            }
        }
        self.func
    }

    fn block(&self) -> &BasicBlock {
        self.func.block(self.current)
    }

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.func.blocks.len() as u32);
        self.func.blocks.push(BasicBlock::default());
        id
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    fn emit(&mut self, instr: Instr) {
        self.func.block_mut(self.current).instrs.push(instr);
    }

    fn terminate(&mut self, term: Terminator) {
        self.func.block_mut(self.current).term = term;
    }

    fn is_terminated(&self) -> bool {
        !matches!(self.block().term, Terminator::Unset)
    }

    fn link(&mut self, from: BlockId, to: BlockId) {
        self.func.block_mut(to).preds.push(from);
    }

    fn new_reg(&mut self, ty: TypeAnn) -> Reg {
        self.func.new_reg(ty)
    }

    fn lower_block(&mut self, stmts: &[HStmt]) {
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
    }

    fn lower_stmt(&mut self, stmt: &HStmt) {
        if self.is_terminated() {
            // Dead code after a `Give Back` (flagged already at HIR
            // lowering, §4.1): give it a fresh, disconnected block so it
            // can still be lowered without corrupting the terminated one.
            let dead = self.new_block();
            self.switch_to(dead);
        }
        match stmt {
            HStmt::Set { name, value } => {
                let src = self.lower_expr(value);
                self.emit(Instr::StoreName {
                    name: name.clone(),
                    src,
                });
            }
            HStmt::Define { .. } => {}
            HStmt::GiveBack(value) => {
                let reg = value.as_ref().map(|v| self.lower_expr(v));
                self.terminate(Terminator::Return(reg));
            }
            HStmt::Say(expr) => {
                let reg = self.lower_expr(expr);
                self.emit(Instr::Say(reg));
            }
            HStmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch),
            HStmt::While { cond, body } => self.lower_while(cond, body),
            HStmt::Call(call) => {
                self.lower_call(call, false);
            }
            HStmt::ListAppend { list, value } => {
                let list_reg = self.load_name(list);
                let value_reg = self.lower_expr(value);
                self.emit(Instr::ListAppend {
                    list: list_reg,
                    value: value_reg,
                });
            }
            HStmt::DictSet { dict, key, value } => {
                let dict_reg = self.load_name(dict);
                let key_reg = self.new_reg(TypeAnn::Text);
                self.emit(Instr::LoadConst {
                    dst: key_reg,
                    value: Constant::String(key.clone()),
                });
                let value_reg = self.lower_expr(value);
                self.emit(Instr::DictSet {
                    dict: dict_reg,
                    key: key_reg,
                    value: value_reg,
                });
            }
            HStmt::Expr(expr) => {
                self.lower_expr(expr);
            }
        }
    }

    fn load_name(&mut self, name: &str) -> Reg {
        let dst = self.new_reg(TypeAnn::Any);
        self.emit(Instr::LoadName {
            dst,
            name: name.to_string(),
        });
        dst
    }

    fn lower_if(&mut self, cond: &HExpr, then_branch: &[HStmt], else_branch: &[HStmt]) {
        let cond_reg = self.lower_expr(cond);
        let then_block = self.new_block();
        let else_block = self.new_block();
        let merge_block = self.new_block();
        self.terminate(Terminator::Branch {
            cond: cond_reg,
            if_true: then_block,
            if_false: else_block,
        });

        self.switch_to(then_block);
        self.lower_block(then_branch);
        if !self.is_terminated() {
            self.terminate(Terminator::Jump(merge_block));
            self.link(self.current, merge_block);
        }

        self.switch_to(else_block);
        self.lower_block(else_branch);
        if !self.is_terminated() {
            self.terminate(Terminator::Jump(merge_block));
            self.link(self.current, merge_block);
        }

        self.switch_to(merge_block);
    }

    fn lower_while(&mut self, cond: &HExpr, body: &[HStmt]) {
        let cond_block = self.new_block();
        let body_block = self.new_block();
        let after_block = self.new_block();

        self.terminate(Terminator::Jump(cond_block));
        self.link(self.current, cond_block);

        self.switch_to(cond_block);
        let cond_reg = self.lower_expr(cond);
        self.terminate(Terminator::Branch {
            cond: cond_reg,
            if_true: body_block,
            if_false: after_block,
        });

        self.switch_to(body_block);
        self.lower_block(body);
        if !self.is_terminated() {
            self.terminate(Terminator::Jump(cond_block));
            self.link(self.current, cond_block);
        }

        self.switch_to(after_block);
        self.link(cond_block, after_block);
    }

    /// `and`/`or` short-circuit: the right operand is only evaluated when
    /// the left one didn't already decide the result (§4.2: "Short-circuit
    /// lowered to branches in MIR").
    fn lower_short_circuit(&mut self, is_and: bool, left: &HExpr, right: &HExpr) -> Reg {
        let lhs = self.lower_expr(left);
        let origin = self.current;
        let rhs_block = self.new_block();
        let merge_block = self.new_block();

        let (if_true, if_false) = if is_and {
            (rhs_block, merge_block)
        } else {
            (merge_block, rhs_block)
        };
        self.terminate(Terminator::Branch {
            cond: lhs,
            if_true,
            if_false,
        });
        self.link(origin, merge_block);

        self.switch_to(rhs_block);
        let rhs = self.lower_expr(right);
        self.terminate(Terminator::Jump(merge_block));
        self.link(rhs_block, merge_block);

        self.switch_to(merge_block);
        let dst = self.new_reg(TypeAnn::YesNo);
        self.emit(Instr::Phi {
            dst,
            inputs: vec![(origin, lhs), (rhs_block, rhs)],
        });
        dst
    }

    fn lower_call(&mut self, call: &HCall, wants_value: bool) -> Option<Reg> {
        let args = call
            .args
            .iter()
            .map(|a| match a {
                crate::hir::HArg::Positional(e) => MirArg::Positional(self.lower_expr(e)),
                crate::hir::HArg::Named(name, e) => {
                    MirArg::Named(name.clone(), self.lower_expr(e))
                }
            })
            .collect();
        let dst = wants_value.then(|| self.new_reg(TypeAnn::Any));
        self.emit(Instr::Call {
            dst,
            callee: call.callee.clone(),
            args,
        });
        dst
    }

    fn lower_expr(&mut self, expr: &HExpr) -> Reg {
        match &expr.kind {
            HExprKind::IntegerLit(n) => self.load_const(Constant::Integer(*n), expr.ty),
            HExprKind::FloatLit(x) => self.load_const(Constant::Float(*x), expr.ty),
            HExprKind::StringLit(s) => self.load_const(Constant::String(s.clone()), expr.ty),
            HExprKind::UrlLit(s) => self.load_const(Constant::String(s.clone()), expr.ty),
            HExprKind::BooleanLit(b) => self.load_const(Constant::Boolean(*b), expr.ty),
            HExprKind::EmptyLit => self.load_const(Constant::Empty, expr.ty),
            HExprKind::Name(name) => self.load_name(name),
            HExprKind::Prefix { op, expr: inner } => {
                let src = self.lower_expr(inner);
                let dst = self.new_reg(expr.ty);
                self.emit(Instr::UnOp { dst, op: *op, src });
                dst
            }
            HExprKind::Infix { left, op, right } => match op {
                InfixOp::And => self.lower_short_circuit(true, left, right),
                InfixOp::Or => self.lower_short_circuit(false, left, right),
                _ => {
                    let lhs = self.lower_expr(left);
                    let rhs = self.lower_expr(right);
                    let dst = self.new_reg(expr.ty);
                    self.emit(Instr::BinOp {
                        dst,
                        op: *op,
                        lhs,
                        rhs,
                    });
                    dst
                }
            },
            HExprKind::Select {
                cond,
                then_expr,
                else_expr,
            } => self.lower_select(cond, then_expr, else_expr, expr.ty),
            HExprKind::Call(call) => self
                .lower_call(call, true)
                .expect("lower_call(.., true) always allocates a destination"),
            HExprKind::NewList(elem_ty) => {
                let dst = self.new_reg(expr.ty);
                self.emit(Instr::NewList {
                    dst,
                    elem_ty: *elem_ty,
                });
                dst
            }
            HExprKind::NewDict => {
                let dst = self.new_reg(expr.ty);
                self.emit(Instr::NewDict { dst });
                dst
            }
            HExprKind::Index { collection, index } => {
                let list = self.lower_expr(collection);
                let index = self.lower_expr(index);
                let dst = self.new_reg(expr.ty);
                self.emit(Instr::ListGet { dst, list, index });
                dst
            }
            HExprKind::Len(inner) => {
                let list = self.lower_expr(inner);
                let dst = self.new_reg(TypeAnn::WholeNumber);
                self.emit(Instr::ListLen { dst, list });
                dst
            }
            HExprKind::Block { stmts, result } => {
                self.lower_block(stmts);
                self.lower_expr(result)
            }
        }
    }

    fn load_const(&mut self, value: Constant, ty: TypeAnn) -> Reg {
        let dst = self.new_reg(ty);
        self.emit(Instr::LoadConst { dst, value });
        dst
    }

    fn lower_select(&mut self, cond: &HExpr, then_expr: &HExpr, else_expr: &HExpr, ty: TypeAnn) -> Reg {
        let cond_reg = self.lower_expr(cond);
        let then_block = self.new_block();
        let else_block = self.new_block();
        let merge_block = self.new_block();
        self.terminate(Terminator::Branch {
            cond: cond_reg,
            if_true: then_block,
            if_false: else_block,
        });

        self.switch_to(then_block);
        let then_reg = self.lower_expr(then_expr);
        let then_exit = self.current;
        self.terminate(Terminator::Jump(merge_block));
        self.link(then_exit, merge_block);

        self.switch_to(else_block);
        let else_reg = self.lower_expr(else_expr);
        let else_exit = self.current;
        self.terminate(Terminator::Jump(merge_block));
        self.link(else_exit, merge_block);

        self.switch_to(merge_block);
        let dst = self.new_reg(ty);
        self.emit(Instr::Phi {
            dst,
            inputs: vec![(then_exit, then_reg), (else_exit, else_reg)],
        });
        dst
    }
}
