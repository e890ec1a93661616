//! Machine Dialect execution core: HIR desugaring, MIR/SSA construction
//! and optimization, register allocation, bytecode assembly, and the
//! register VM that runs the result (§1 Scope).
//!
//! [`compile`] is the single pipeline entry point: it always returns
//! either an assembled [`bytecode::Module`] or a non-empty
//! [`error::Diagnostics`] (invariant I1). The surface parser that
//! produces an [`ast::Program`] in the first place is an external
//! collaborator, not part of this crate.

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod hir;
pub mod mir;
pub mod regalloc;
pub mod value;
pub mod vm;

use error::{DiagnosticKind, Diagnostics};

/// Everything one successful [`compile`] call produces: the assembled
/// module ready for [`vm::Vm::from_module`], the optimizer's before/after
/// report, and any non-error diagnostics collected along the way (e.g.
/// `UnreachableCode`).
#[derive(Debug)]
pub struct CompileOutput {
    pub module: bytecode::Module,
    pub report: mir::OptimizationReporter,
    pub diagnostics: Diagnostics,
}

/// Run the full pipeline (§4): lower `program` to HIR, build MIR, run the
/// optimizer for `opt_level`, then allocate registers and assemble a
/// bytecode module named `module_name`.
///
/// Lowering diagnostics of [`error::Severity::Error`] abort the pipeline
/// before MIR is even built; a register-allocation overflow in any one
/// function aborts it after optimization, turned into a
/// [`DiagnosticKind::RegisterOverflow`] rather than a panic (§7).
pub fn compile(
    program: &ast::Program,
    module_name: &str,
    opt_level: mir::OptLevel,
) -> Result<CompileOutput, Diagnostics> {
    let (hir_program, diagnostics) = hir::lower_program(program);
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let mut mir_program = mir::build_program(&hir_program);
    let mut report = mir::OptimizationReporter::new();
    mir::OptimizationPipeline::for_level(opt_level).run(&mut mir_program, &mut report);

    match regalloc::assemble_module(&mir_program, module_name) {
        Ok(module) => Ok(CompileOutput {
            module,
            report,
            diagnostics,
        }),
        Err(regalloc::RegAllocError::Overflow(function)) => {
            let mut diagnostics = diagnostics;
            diagnostics.push(
                DiagnosticKind::RegisterOverflow { function },
                ast::Span::synthetic(),
            );
            Err(diagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{Expr, Program, Span, Spanned, Statement};

    fn say(value: i64) -> Program {
        Program {
            statements: vec![Spanned::new(
                Statement::Say {
                    value: Spanned::new(Expr::IntegerLit(value), Span::synthetic()),
                },
                Span::synthetic(),
            )],
        }
    }

    #[test]
    fn compiles_a_trivial_program_to_a_module() {
        let program = say(7);
        let output = compile(&program, "demo", mir::OptLevel::None).expect("should compile");
        assert_eq!(output.module.name, "demo");
        assert!(!output.module.code.is_empty());
    }

    #[test]
    fn optimizing_constant_say_records_a_pass_report() {
        let program = say(7);
        let output = compile(&program, "demo", mir::OptLevel::Basic).expect("should compile");
        assert!(!output.report.reports().is_empty());
    }
}
