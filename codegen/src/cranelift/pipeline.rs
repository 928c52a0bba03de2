//! Optimization pipelines run on specialized functions.
//!
//! Cranelift's egraph pass (GVN, constant folding, algebraic simplification, LICM) runs
//! during compilation whenever the ISA's `opt_level` is not `none`; the passes here are
//! the IR-level cleanups that precede it.

use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::ir::Function;
use cranelift_codegen::{CodegenResult, Context};
use tracing::trace;

use crate::backend::OptimizationLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Pass {
    UnreachableCode,
    ConstantPhis,
    RedundantLoads,
    DeadCode,
}

const LIGHT: &[Pass] = &[Pass::UnreachableCode, Pass::ConstantPhis, Pass::DeadCode];

const AGGRESSIVE: &[Pass] =
    &[Pass::UnreachableCode, Pass::ConstantPhis, Pass::RedundantLoads, Pass::DeadCode, Pass::UnreachableCode];

/// Passes applied at `level`, in order.
pub fn passes(level: OptimizationLevel) -> &'static [Pass] {
    match level {
        OptimizationLevel::None => &[],
        OptimizationLevel::Basic => LIGHT,
        OptimizationLevel::Aggressive | OptimizationLevel::Space | OptimizationLevel::Full => AGGRESSIVE,
    }
}

/// `opt_level` setting of the ISA that compiles functions optimized at `level`.
pub fn isa_opt_level(level: OptimizationLevel) -> &'static str {
    match level {
        OptimizationLevel::None => "none",
        OptimizationLevel::Space => "speed_and_size",
        OptimizationLevel::Basic | OptimizationLevel::Aggressive | OptimizationLevel::Full => "speed",
    }
}

pub fn run(func: Function, level: OptimizationLevel, isa: &dyn TargetIsa) -> CodegenResult<Function> {
    let mut ctx = Context::for_function(func);
    for &pass in passes(level) {
        ctx.flowgraph();
        match pass {
            Pass::UnreachableCode => ctx.eliminate_unreachable_code(isa)?,
            Pass::ConstantPhis => ctx.remove_constant_phis(isa)?,
            Pass::RedundantLoads => ctx.replace_redundant_loads()?,
            Pass::DeadCode => ctx.dce(isa)?,
        }
        trace!(%pass, "pass applied");
    }
    Ok(ctx.func)
}
