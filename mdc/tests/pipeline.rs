//! End-to-end pipeline tests: AST -> HIR -> MIR -> bytecode -> VM.
//!
//! There is no in-process surface parser (§1 Scope), so every program here
//! is built directly as an `ast::Program` the way the external collaborator
//! is expected to hand one in. Each test mirrors one of the concrete
//! scenarios in §8 of the spec.

use mdc::ast::{
    Arg, CallExpr, Expr, InfixOp, Param, PrefixOp, Program, Span, Spanned, Statement, TypeAnn,
    UtilityDef,
};
use mdc::error::RuntimeErrorKind;
use mdc::value::Value;
use mdc::{bytecode, mir, vm};

fn sp<T>(node: T) -> Spanned<T> {
    Spanned::new(node, Span::synthetic())
}

fn int(n: i64) -> Spanned<Expr> {
    sp(Expr::IntegerLit(n))
}

fn name(s: &str) -> Spanned<Expr> {
    sp(Expr::Identifier(s.to_string()))
}

fn infix(left: Spanned<Expr>, op: InfixOp, right: Spanned<Expr>) -> Spanned<Expr> {
    sp(Expr::Infix {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}

fn give_back(value: Spanned<Expr>) -> Spanned<Statement> {
    sp(Statement::GiveBack { value: Some(value) })
}

fn run(program: &Program) -> Value {
    let output = mdc::compile(program, "test", mir::OptLevel::None).expect("should compile");
    let mut machine = vm::Vm::from_module(output.module);
    machine.execute()
}

/// Runs the program through the full pipeline *and* a serialize/deserialize
/// round-trip of the assembled module, so every scenario also exercises I2
/// ("load(serialize(M)) = M up to structural equality") via its observable
/// behavior rather than asserting on `Module`'s private layout.
fn run_roundtripped(program: &Program) -> Value {
    let output = mdc::compile(program, "test", mir::OptLevel::Basic).expect("should compile");
    let bytes = bytecode::encode(&output.module);
    let module = bytecode::decode(&bytes).expect("a just-encoded module must decode");
    let mut machine = vm::Vm::from_module(module);
    machine.execute()
}

fn program(statements: Vec<Spanned<Statement>>) -> Program {
    Program { statements }
}

/// Scenario 1: `Give back _5_ + _3_.` -> Integer 8.
#[test]
fn adds_two_integers() {
    let p = program(vec![give_back(infix(int(5), InfixOp::Add, int(3)))]);
    assert!(matches!(run(&p), Value::Integer(8)));
    assert!(matches!(run_roundtripped(&p), Value::Integer(8)));
}

/// Scenario 2: `Give back _15_ / _3_.` -> Float 5.0 (division always yields
/// Float, §4.6).
#[test]
fn division_always_yields_float() {
    let p = program(vec![give_back(infix(int(15), InfixOp::Div, int(3)))]);
    match run(&p) {
        Value::Float(f) => assert_eq!(f, 5.0),
        other => panic!("expected Float(5.0), got {other:?}"),
    }
}

/// Scenario 3: `5 is strictly equal to 5.0` -> false; `5 equals 5.0` -> true.
#[test]
fn strict_equality_is_tag_sensitive_but_equals_is_numeric() {
    let strict = program(vec![give_back(infix(
        int(5),
        InfixOp::StrictEq,
        sp(Expr::FloatLit(5.0)),
    ))]);
    assert!(matches!(run(&strict), Value::Boolean(false)));

    let loose = program(vec![give_back(infix(
        int(5),
        InfixOp::Eq,
        sp(Expr::FloatLit(5.0)),
    ))]);
    assert!(matches!(run(&loose), Value::Boolean(true)));
}

/// Scenario 4: `Set x to 10. Set x to 20. Give back x.` -> Integer 20.
#[test]
fn reassignment_keeps_the_latest_value() {
    let p = program(vec![
        sp(Statement::Set {
            target: sp("x".to_string()),
            value: int(10),
        }),
        sp(Statement::Set {
            target: sp("x".to_string()),
            value: int(20),
        }),
        give_back(name("x")),
    ]);
    assert!(matches!(run(&p), Value::Integer(20)));
}

/// Scenario 5: factorial of 5, called recursively, -> Integer 120.
#[test]
fn recursive_factorial() {
    let base_case = sp(Statement::If {
        cond: infix(name("n"), InfixOp::Le, int(1)),
        then_branch: vec![give_back(int(1))],
        else_branch: Some(vec![give_back(infix(
            name("n"),
            InfixOp::Mul,
            sp(Expr::Call(CallExpr {
                callee: sp("factorial".to_string()),
                args: vec![Arg::Positional(infix(name("n"), InfixOp::Sub, int(1)))],
            })),
        ))]),
    });

    let factorial = UtilityDef {
        name: sp("factorial".to_string()),
        params: vec![Param {
            name: sp("n".to_string()),
            ty: Some(sp(TypeAnn::WholeNumber)),
            default: None,
        }],
        output_ty: Some(sp(TypeAnn::WholeNumber)),
        body: vec![base_case],
        span: Span::synthetic(),
    };

    let p = program(vec![
        sp(Statement::UtilityDef(factorial)),
        give_back(sp(Expr::Call(CallExpr {
            callee: sp("factorial".to_string()),
            args: vec![Arg::Positional(int(5))],
        }))),
    ]);
    assert!(matches!(run(&p), Value::Integer(120)));
    assert!(matches!(run_roundtripped(&p), Value::Integer(120)));
}

/// Scenario 6: nested conditionals pick the innermost matching branch.
#[test]
fn nested_conditionals() {
    let inner = sp(Statement::If {
        cond: infix(name("x"), InfixOp::Gt, int(8)),
        then_branch: vec![give_back(int(100))],
        else_branch: Some(vec![give_back(int(50))]),
    });
    let outer = sp(Statement::If {
        cond: infix(name("x"), InfixOp::Gt, int(5)),
        then_branch: vec![inner],
        else_branch: Some(vec![give_back(int(0))]),
    });
    let p = program(vec![
        sp(Statement::Set {
            target: sp("x".to_string()),
            value: int(10),
        }),
        outer,
    ]);
    assert!(matches!(run(&p), Value::Integer(100)));
}

/// Scenario 7: a utility's `Set x to ...` never leaks into the caller's
/// environment, even when the caller already has a binding of that name
/// (§3.3, §8 I6).
#[test]
fn utility_scope_is_isolated_from_the_caller() {
    let modify_x = UtilityDef {
        name: sp("modify_x".to_string()),
        params: vec![],
        output_ty: None,
        body: vec![
            sp(Statement::Set {
                target: sp("x".to_string()),
                value: int(42),
            }),
            give_back(name("x")),
        ],
        span: Span::synthetic(),
    };

    let p = program(vec![
        sp(Statement::Set {
            target: sp("x".to_string()),
            value: int(100),
        }),
        sp(Statement::UtilityDef(modify_x)),
        sp(Statement::SetUsing {
            target: sp("r".to_string()),
            call: CallExpr {
                callee: sp("modify_x".to_string()),
                args: vec![],
            },
        }),
        give_back(name("x")),
    ]);
    assert!(matches!(run(&p), Value::Integer(100)));
}

/// Scenario 8: calling a two-parameter utility with only one argument
/// raises MissingRequiredParameter naming the unbound parameter.
#[test]
fn missing_required_parameter_names_the_parameter() {
    let add = UtilityDef {
        name: sp("add".to_string()),
        params: vec![
            Param {
                name: sp("a".to_string()),
                ty: Some(sp(TypeAnn::WholeNumber)),
                default: None,
            },
            Param {
                name: sp("b".to_string()),
                ty: Some(sp(TypeAnn::WholeNumber)),
                default: None,
            },
        ],
        output_ty: Some(sp(TypeAnn::WholeNumber)),
        body: vec![give_back(infix(name("a"), InfixOp::Add, name("b")))],
        span: Span::synthetic(),
    };

    let p = program(vec![
        sp(Statement::UtilityDef(add)),
        give_back(sp(Expr::Call(CallExpr {
            callee: sp("add".to_string()),
            args: vec![Arg::Positional(int(1))],
        }))),
    ]);

    match run(&p) {
        Value::Error(err) => match &err.kind {
            RuntimeErrorKind::MissingRequiredParameter(param) => assert_eq!(param, "b"),
            other => panic!("expected MissingRequiredParameter, got {other:?}"),
        },
        other => panic!("expected an Error value, got {other:?}"),
    }
}

/// `not` is an involution (§8 Laws): `not (not true) == true`.
#[test]
fn not_is_an_involution() {
    let p = program(vec![give_back(sp(Expr::Prefix {
        op: PrefixOp::Not,
        expr: Box::new(sp(Expr::Prefix {
            op: PrefixOp::Not,
            expr: Box::new(sp(Expr::BooleanLit(true))),
        })),
    }))]);
    assert!(matches!(run(&p), Value::Boolean(true)));
}

/// Division followed by multiplication by the same integer recovers a
/// Float close to the original within double precision (§8 Laws).
#[test]
fn division_then_multiplication_round_trips_within_float_precision() {
    let p = program(vec![give_back(infix(
        infix(int(7), InfixOp::Div, int(2)),
        InfixOp::Mul,
        int(2),
    ))]);
    match run(&p) {
        Value::Float(f) => assert!((f - 7.0).abs() < 1e-9),
        other => panic!("expected a Float close to 7.0, got {other:?}"),
    }
}

/// Cross-type ordering raises TypeMismatch rather than returning a silent
/// `false` (OQ3).
#[test]
fn cross_type_ordering_is_a_type_mismatch() {
    let p = program(vec![give_back(infix(
        sp(Expr::StringLit("a".to_string())),
        InfixOp::Lt,
        int(1),
    ))]);
    match run(&p) {
        Value::Error(err) => {
            assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch(_)));
        }
        other => panic!("expected a TypeMismatch error, got {other:?}"),
    }
}

/// While loops observe mutation through the loop condition (a minimal
/// smoke test for `§4.1`'s While lowering, since For-Each is desugared to
/// this same construct).
#[test]
fn while_loop_counts_up() {
    let p = program(vec![
        sp(Statement::Set {
            target: sp("i".to_string()),
            value: int(0),
        }),
        sp(Statement::While {
            cond: infix(name("i"), InfixOp::Lt, int(5)),
            body: vec![sp(Statement::Set {
                target: sp("i".to_string()),
                value: infix(name("i"), InfixOp::Add, int(1)),
            })],
        }),
        give_back(name("i")),
    ]);
    assert!(matches!(run(&p), Value::Integer(5)));
}
