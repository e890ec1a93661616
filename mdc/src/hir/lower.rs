//! AST -> HIR lowering (§4.1).

use std::collections::HashMap;

use crate::ast::{self, Arg, CallExpr, Expr, InfixOp, PrefixOp, Program, Span, Spanned, Statement, TypeAnn};
use crate::error::{DiagnosticKind, Diagnostics};

use super::types::TypeEnv;
use super::{HArg, HCall, HExpr, HExprKind, HParam, HProgram, HStmt, HUtility};

struct UtilitySig {
    total_params: usize,
}

struct Lowerer {
    type_env: TypeEnv,
    diagnostics: Diagnostics,
    utilities: HashMap<String, UtilitySig>,
    /// Names with an explicit `Define x as <Type>` in scope, checked
    /// against every later `Set` to that name.
    declared_types: HashMap<String, TypeAnn>,
    temp_counter: usize,
}

/// Lower a parsed [`ast::Program`] into [`HProgram`]. Returns the lowered
/// program together with any diagnostics collected along the way;
/// diagnostics of [`crate::error::Severity::Error`] mean the program is
/// invalid even though a (best-effort) tree is still returned, mirroring
/// how `rustc` keeps lowering after a resolution error to surface more
/// diagnostics in one pass.
pub fn lower_program(ast: &Program) -> (HProgram, Diagnostics) {
    let mut lowerer = Lowerer {
        type_env: TypeEnv::new(),
        diagnostics: Diagnostics::new(),
        utilities: HashMap::new(),
        declared_types: HashMap::new(),
        temp_counter: 0,
    };
    lowerer.collect_utility_signatures(ast);

    let mut utilities = Vec::new();
    let mut top_level = Vec::new();

    for stmt in &ast.statements {
        match &stmt.node {
            Statement::UtilityDef(def) | Statement::InteractionDef(def) => {
                utilities.push(lowerer.lower_utility(def));
            }
            other => {
                top_level.extend(lowerer.lower_stmt(other, stmt.span));
            }
        }
    }
    check_unreachable(&mut lowerer.diagnostics, &top_level);
    for u in &utilities {
        check_unreachable(&mut lowerer.diagnostics, &u.body);
    }

    (
        HProgram {
            top_level,
            utilities,
        },
        lowerer.diagnostics,
    )
}

/// Any statement after a `Give Back` in the same block can never execute.
fn check_unreachable(diags: &mut Diagnostics, body: &[HStmt]) {
    let mut seen_return = false;
    for stmt in body {
        if seen_return {
            diags.push(DiagnosticKind::UnreachableCode, Span::synthetic());
        }
        if matches!(stmt, HStmt::GiveBack(_)) {
            seen_return = true;
        }
        match stmt {
            HStmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                check_unreachable(diags, then_branch);
                check_unreachable(diags, else_branch);
            }
            HStmt::While { body, .. } => check_unreachable(diags, body),
            _ => {}
        }
    }
}

impl Lowerer {
    fn collect_utility_signatures(&mut self, ast: &Program) {
        for stmt in &ast.statements {
            if let Statement::UtilityDef(def) | Statement::InteractionDef(def) = &stmt.node {
                let mut seen = std::collections::HashSet::new();
                for p in &def.params {
                    if !seen.insert(p.name.node.clone()) {
                        self.diagnostics.push(
                            DiagnosticKind::DuplicateParameter(p.name.node.clone()),
                            p.name.span,
                        );
                    }
                }
                self.utilities.insert(
                    def.name.node.clone(),
                    UtilitySig {
                        total_params: def.params.len(),
                    },
                );
            }
        }
    }

    fn fresh_temp(&mut self, hint: &str) -> String {
        self.temp_counter += 1;
        format!("__{hint}_{}", self.temp_counter)
    }

    fn lower_utility(&mut self, def: &ast::UtilityDef) -> HUtility {
        self.type_env.push_scope();
        let mut params = Vec::new();
        for p in &def.params {
            let ty = p.ty.as_ref().map(|t| t.node).unwrap_or(TypeAnn::Any);
            self.type_env.declare(p.name.node.clone(), ty);
            let default = p.default.as_ref().map(|d| self.lower_expr(&d.node, d.span));
            params.push(HParam {
                name: p.name.node.clone(),
                ty,
                required: p.is_required(),
                default,
            });
        }
        let output_ty = def.output_ty.as_ref().map(|t| t.node).unwrap_or(TypeAnn::Any);

        let mut body = Vec::new();
        for stmt in &def.body {
            body.extend(self.lower_stmt(&stmt.node, stmt.span));
        }
        self.type_env.pop_scope();

        HUtility {
            name: def.name.node.clone(),
            params,
            output_ty,
            body,
            span: def.span,
        }
    }

    /// Lowers one AST statement. Returns a `Vec` because `For Each` and
    /// literal-collection assignment expand into several HIR statements
    /// (§4.1).
    fn lower_stmt(&mut self, stmt: &Statement, _span: Span) -> Vec<HStmt> {
        match stmt {
            Statement::Set { target, value } => {
                self.lower_assignment(&target.node, &value.node, value.span)
            }
            Statement::SetUsing { target, call } => {
                // "Set-Using lowers to a Call followed by a Set of the
                // result register" (§4.1) — the call result is the value
                // being assigned, so a single `Set` carries the same
                // meaning once MIR evaluates it before storing.
                let call_expr = Expr::Call(call.clone());
                self.lower_assignment(&target.node, &call_expr, target.span)
            }
            Statement::Define { name, ty } => {
                self.type_env.declare(name.node.clone(), ty.node);
                self.declared_types.insert(name.node.clone(), ty.node);
                vec![HStmt::Define {
                    name: name.node.clone(),
                    ty: ty.node,
                }]
            }
            Statement::GiveBack { value } => {
                vec![HStmt::GiveBack(
                    value.as_ref().map(|v| self.lower_expr(&v.node, v.span)),
                )]
            }
            Statement::Say { value } | Statement::Tell { value } => {
                vec![HStmt::Say(self.lower_expr(&value.node, value.span))]
            }
            Statement::If {
                cond,
                then_branch,
                else_branch,
            } => vec![self.lower_if(cond, then_branch, else_branch.as_deref())],
            Statement::When {
                cond,
                then_branch,
                otherwise_branch,
            } => vec![self.lower_if(cond, then_branch, otherwise_branch.as_deref())],
            Statement::While { cond, body } => {
                let cond = self.lower_expr(&cond.node, cond.span);
                self.type_env.push_scope();
                let body = body.iter().flat_map(|s| self.lower_stmt(&s.node, s.span)).collect();
                self.type_env.pop_scope();
                vec![HStmt::While { cond, body }]
            }
            Statement::ForEach {
                var,
                collection,
                body,
            } => self.lower_for_each(var, collection, body),
            Statement::UtilityDef(_) | Statement::InteractionDef(_) => {
                // Nested utility definitions are hoisted to the module's
                // flat utility table by the caller; nothing to do here.
                vec![]
            }
            Statement::Call(call) | Statement::Use(call) => {
                vec![HStmt::Call(self.lower_call(call))]
            }
            Statement::Expr(e) => vec![HStmt::Expr(self.lower_expr(&e.node, e.span))],
        }
    }

    /// `Set x to v`: if `v` is a literal list/dict, expand into the
    /// build-then-populate sequence (§4.1) ending with `x` bound to the
    /// freshly built collection; otherwise a plain `HStmt::Set`.
    fn lower_assignment(&mut self, target: &str, value: &Expr, span: Span) -> Vec<HStmt> {
        let value = self.lower_expr(value, span);
        if let Some(&declared) = self.declared_types.get(target) {
            if !declared.compatible_with(value.ty) {
                self.diagnostics.push(
                    DiagnosticKind::TypeMismatch {
                        expected: declared.to_string(),
                        found: value.ty.to_string(),
                    },
                    span,
                );
            }
        }
        self.type_env.declare(target.to_string(), value.ty);
        match value.kind {
            HExprKind::Block { stmts, result } => {
                let mut out = stmts;
                out.push(HStmt::Set {
                    name: target.to_string(),
                    value: *result,
                });
                out
            }
            _ => vec![HStmt::Set {
                name: target.to_string(),
                value,
            }],
        }
    }

    fn lower_if(
        &mut self,
        cond: &Spanned<Expr>,
        then_branch: &[Spanned<Statement>],
        else_branch: Option<&[Spanned<Statement>]>,
    ) -> HStmt {
        let cond_h = self.lower_expr(&cond.node, cond.span);
        self.type_env.push_scope();
        let then_h = then_branch
            .iter()
            .flat_map(|s| self.lower_stmt(&s.node, s.span))
            .collect();
        self.type_env.pop_scope();
        self.type_env.push_scope();
        let else_h = else_branch
            .map(|b| {
                b.iter()
                    .flat_map(|s| self.lower_stmt(&s.node, s.span))
                    .collect()
            })
            .unwrap_or_default();
        self.type_env.pop_scope();
        HStmt::If {
            cond: cond_h,
            then_branch: then_h,
            else_branch: else_h,
        }
    }

    /// `For Each var in collection: body` desugars to an explicit counted
    /// `While` (§4.1): allocate an index, compute the length once, loop
    /// while the index is in bounds, bind `var` to the current element,
    /// run `body`, then increment.
    fn lower_for_each(
        &mut self,
        var: &Spanned<String>,
        collection: &Spanned<Expr>,
        body: &[Spanned<Statement>],
    ) -> Vec<HStmt> {
        let span = collection.span;
        let coll = self.lower_expr(&collection.node, span);
        let idx_name = self.fresh_temp("idx");
        let len_name = self.fresh_temp("len");

        let mut out = Vec::new();
        out.push(HStmt::Set {
            name: idx_name.clone(),
            value: HExpr::new(HExprKind::IntegerLit(0), TypeAnn::WholeNumber, span),
        });
        out.push(HStmt::Set {
            name: len_name.clone(),
            value: HExpr::new(
                HExprKind::Len(Box::new(coll.clone())),
                TypeAnn::WholeNumber,
                span,
            ),
        });

        self.type_env.declare(idx_name.clone(), TypeAnn::WholeNumber);
        self.type_env.declare(len_name.clone(), TypeAnn::WholeNumber);
        self.type_env.push_scope();
        self.type_env.declare(var.node.clone(), TypeAnn::Any);

        let name_expr = |name: &str, ty, span| HExpr::new(HExprKind::Name(name.to_string()), ty, span);

        let mut while_body = Vec::new();
        while_body.push(HStmt::Set {
            name: var.node.clone(),
            value: HExpr::new(
                HExprKind::Index {
                    collection: Box::new(coll.clone()),
                    index: Box::new(name_expr(&idx_name, TypeAnn::WholeNumber, span)),
                },
                TypeAnn::Any,
                span,
            ),
        });
        for stmt in body {
            while_body.extend(self.lower_stmt(&stmt.node, stmt.span));
        }
        while_body.push(HStmt::Set {
            name: idx_name.clone(),
            value: HExpr::new(
                HExprKind::Infix {
                    left: Box::new(name_expr(&idx_name, TypeAnn::WholeNumber, span)),
                    op: InfixOp::Add,
                    right: Box::new(HExpr::new(
                        HExprKind::IntegerLit(1),
                        TypeAnn::WholeNumber,
                        span,
                    )),
                },
                TypeAnn::WholeNumber,
                span,
            ),
        });
        self.type_env.pop_scope();

        out.push(HStmt::While {
            cond: HExpr::new(
                HExprKind::Infix {
                    left: Box::new(name_expr(&idx_name, TypeAnn::WholeNumber, span)),
                    op: InfixOp::Lt,
                    right: Box::new(name_expr(&len_name, TypeAnn::WholeNumber, span)),
                },
                TypeAnn::YesNo,
                span,
            ),
            body: while_body,
        });
        out
    }

    fn lower_call(&mut self, call: &CallExpr) -> HCall {
        let callee = call.callee.node.clone();
        let args: Vec<HArg> = call
            .args
            .iter()
            .map(|a| match a {
                Arg::Positional(e) => HArg::Positional(self.lower_expr(&e.node, e.span)),
                Arg::Named(name, e) => {
                    HArg::Named(name.node.clone(), self.lower_expr(&e.node, e.span))
                }
            })
            .collect();

        if let Some(sig) = self.utilities.get(&callee) {
            let positional = args.iter().filter(|a| matches!(a, HArg::Positional(_))).count();
            if positional > sig.total_params {
                self.diagnostics.push(
                    DiagnosticKind::ArityMismatch {
                        callee: callee.clone(),
                        expected: sig.total_params,
                        found: positional,
                    },
                    call.callee.span,
                );
            }
        } else {
            self.diagnostics.push(
                DiagnosticKind::UnknownIdentifier(callee.clone()),
                call.callee.span,
            );
        }

        HCall { callee, args }
    }

    fn lower_expr(&mut self, expr: &Expr, span: Span) -> HExpr {
        match expr {
            Expr::IntegerLit(n) => HExpr::new(HExprKind::IntegerLit(*n), TypeAnn::WholeNumber, span),
            Expr::FloatLit(x) => HExpr::new(HExprKind::FloatLit(*x), TypeAnn::Float, span),
            Expr::StringLit(s) => HExpr::new(HExprKind::StringLit(s.clone()), TypeAnn::Text, span),
            Expr::UrlLit(s) => HExpr::new(HExprKind::UrlLit(s.clone()), TypeAnn::Url, span),
            Expr::BooleanLit(b) => HExpr::new(HExprKind::BooleanLit(*b), TypeAnn::YesNo, span),
            Expr::EmptyLit => HExpr::new(HExprKind::EmptyLit, TypeAnn::Empty, span),
            Expr::Identifier(name) => {
                let ty = self.type_env.lookup(name).unwrap_or_else(|| {
                    if !self.utilities.contains_key(name) {
                        self.diagnostics.push(
                            DiagnosticKind::UnknownIdentifier(name.clone()),
                            span,
                        );
                    }
                    TypeAnn::Any
                });
                HExpr::new(HExprKind::Name(name.clone()), ty, span)
            }
            Expr::Prefix { op, expr } => {
                let inner = self.lower_expr(&expr.node, expr.span);
                let ty = match op {
                    PrefixOp::Neg => inner.ty,
                    PrefixOp::Not => TypeAnn::YesNo,
                };
                HExpr::new(
                    HExprKind::Prefix {
                        op: *op,
                        expr: Box::new(inner),
                    },
                    ty,
                    span,
                )
            }
            Expr::Infix { left, op, right } => {
                let l = self.lower_expr(&left.node, left.span);
                let r = self.lower_expr(&right.node, right.span);
                let ty = infix_result_type(*op, l.ty, r.ty);
                HExpr::new(
                    HExprKind::Infix {
                        left: Box::new(l),
                        op: *op,
                        right: Box::new(r),
                    },
                    ty,
                    span,
                )
            }
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond_h = self.lower_expr(&cond.node, cond.span);
                let then_h = self.lower_expr(&then_expr.node, then_expr.span);
                let else_h = self.lower_expr(&else_expr.node, else_expr.span);
                let ty = if then_h.ty.compatible_with(else_h.ty) {
                    then_h.ty
                } else {
                    TypeAnn::Any
                };
                HExpr::new(
                    HExprKind::Select {
                        cond: Box::new(cond_h),
                        then_expr: Box::new(then_h),
                        else_expr: Box::new(else_h),
                    },
                    ty,
                    span,
                )
            }
            Expr::Call(call) => {
                let h = self.lower_call(call);
                HExpr::new(HExprKind::Call(h), TypeAnn::Any, span)
            }
            Expr::ListLit(items) => self.lower_list_lit(items, span),
            Expr::DictLit(entries) => self.lower_dict_lit(entries, span),
        }
    }

    /// Literal list materialization (§4.1): build an empty list, append
    /// each element in order, yield the list.
    fn lower_list_lit(&mut self, items: &[Spanned<Expr>], span: Span) -> HExpr {
        let tmp = self.fresh_temp("list");
        let mut stmts = vec![HStmt::Set {
            name: tmp.clone(),
            value: HExpr::new(HExprKind::NewList(None), TypeAnn::OrderedList, span),
        }];
        for item in items {
            let v = self.lower_expr(&item.node, item.span);
            stmts.push(HStmt::ListAppend {
                list: tmp.clone(),
                value: v,
            });
        }
        self.type_env.declare(tmp.clone(), TypeAnn::OrderedList);
        HExpr::new(
            HExprKind::Block {
                stmts,
                result: Box::new(HExpr::new(
                    HExprKind::Name(tmp),
                    TypeAnn::OrderedList,
                    span,
                )),
            },
            TypeAnn::OrderedList,
            span,
        )
    }

    /// Literal dict materialization (§4.1): build an empty dict, insert
    /// each key/value pair in order, yield the dict.
    fn lower_dict_lit(&mut self, entries: &[(Spanned<String>, Spanned<Expr>)], span: Span) -> HExpr {
        let tmp = self.fresh_temp("dict");
        let mut stmts = vec![HStmt::Set {
            name: tmp.clone(),
            value: HExpr::new(HExprKind::NewDict, TypeAnn::NamedList, span),
        }];
        for (key, value) in entries {
            let v = self.lower_expr(&value.node, value.span);
            stmts.push(HStmt::DictSet {
                dict: tmp.clone(),
                key: key.node.clone(),
                value: v,
            });
        }
        self.type_env.declare(tmp.clone(), TypeAnn::NamedList);
        HExpr::new(
            HExprKind::Block {
                stmts,
                result: Box::new(HExpr::new(HExprKind::Name(tmp), TypeAnn::NamedList, span)),
            },
            TypeAnn::NamedList,
            span,
        )
    }
}

/// Best-effort result type for an infix operator, used only to seed later
/// declared-type checks — the VM re-derives the real type dynamically.
fn infix_result_type(op: InfixOp, left: TypeAnn, right: TypeAnn) -> TypeAnn {
    use InfixOp::*;
    match op {
        Add | Sub | Mul | Div => {
            if op == Div {
                TypeAnn::Float
            } else if left == TypeAnn::Float || right == TypeAnn::Float {
                TypeAnn::Float
            } else if left == TypeAnn::Text || right == TypeAnn::Text {
                TypeAnn::Text
            } else {
                TypeAnn::WholeNumber
            }
        }
        Lt | Le | Gt | Ge | Eq | StrictEq | StrictNe | And | Or => TypeAnn::YesNo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Spanned;

    fn spanned<T>(node: T) -> Spanned<T> {
        Spanned::new(node, Span::synthetic())
    }

    #[test]
    fn for_each_desugars_to_counted_while() {
        let program = Program {
            statements: vec![spanned(Statement::ForEach {
                var: spanned("item".to_string()),
                collection: spanned(Expr::Identifier("items".to_string())),
                body: vec![spanned(Statement::Say {
                    value: spanned(Expr::Identifier("item".to_string())),
                })],
            })],
        };
        let (hir, diags) = lower_program(&program);
        assert!(diags.is_empty() || !diags.has_errors());
        assert_eq!(hir.top_level.len(), 3);
        assert!(matches!(hir.top_level[0], HStmt::Set { .. }));
        assert!(matches!(hir.top_level[1], HStmt::Set { .. }));
        assert!(matches!(hir.top_level[2], HStmt::While { .. }));
    }

    #[test]
    fn literal_list_materializes_as_new_list_then_appends() {
        let program = Program {
            statements: vec![spanned(Statement::Set {
                target: spanned("xs".to_string()),
                value: spanned(Expr::ListLit(vec![
                    spanned(Expr::IntegerLit(1)),
                    spanned(Expr::IntegerLit(2)),
                ])),
            })],
        };
        let (hir, _) = lower_program(&program);
        assert_eq!(hir.top_level.len(), 4);
        assert!(matches!(hir.top_level[0], HStmt::Set { .. }));
        assert!(matches!(hir.top_level[1], HStmt::ListAppend { .. }));
        assert!(matches!(hir.top_level[2], HStmt::ListAppend { .. }));
        assert!(matches!(hir.top_level[3], HStmt::Set { .. }));
    }

    #[test]
    fn duplicate_parameter_is_flagged() {
        let def = ast::UtilityDef {
            name: spanned("Greet".to_string()),
            params: vec![
                ast::Param {
                    name: spanned("name".to_string()),
                    ty: None,
                    default: None,
                },
                ast::Param {
                    name: spanned("name".to_string()),
                    ty: None,
                    default: None,
                },
            ],
            output_ty: None,
            body: vec![],
            span: Span::synthetic(),
        };
        let program = Program {
            statements: vec![spanned(Statement::UtilityDef(def))],
        };
        let (_, diags) = lower_program(&program);
        assert!(diags.has_errors());
    }

    #[test]
    fn statement_after_give_back_is_unreachable() {
        let program = Program {
            statements: vec![
                spanned(Statement::GiveBack {
                    value: Some(spanned(Expr::IntegerLit(1))),
                }),
                spanned(Statement::Say {
                    value: spanned(Expr::IntegerLit(2)),
                }),
            ],
        };
        let (_, diags) = lower_program(&program);
        assert!(!diags.has_errors());
        assert_eq!(diags.0.len(), 1);
    }
}
