//! JIT compilation of specialized functions.

use std::collections::HashMap;
use std::sync::Arc;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::instructions::BlockArg;
use cranelift_codegen::ir::{AbiParam, Function, InstBuilder, UserFuncName, types};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module, default_libcall_names};
use snafu::OptionExt;
use tracing::debug;

use warpjit_device::DeviceAddress;

use super::CraneliftFunction;
use super::pipeline::isa_opt_level;
use crate::abi::{LaunchContext, NativeEntry};
use crate::backend::OptimizationLevel;
use crate::error::{Error, Result, UnlinkedSymbolSnafu};

/// Owner of finalized JIT code.
pub struct JitCode {
    /// Must be kept alive for entry pointers into it to remain valid.
    #[allow(dead_code)]
    module: JITModule,
}

// SAFETY: the module is never touched again after finalization; only its code is shared.
unsafe impl Send for JitCode {}
unsafe impl Sync for JitCode {}

/// Host ISA configured for `level`.
pub fn native_isa(level: OptimizationLevel) -> Result<OwnedTargetIsa> {
    let mut flag_builder = settings::builder();
    for (flag, value) in [("use_colocated_libcalls", "false"), ("is_pic", "false"), ("opt_level", isa_opt_level(level))] {
        flag_builder
            .set(flag, value)
            .map_err(|e| Error::IsaUnavailable { reason: format!("failed to set cranelift flag {flag}: {e}") })?;
    }

    let isa_builder = cranelift_native::builder()
        .map_err(|e| Error::IsaUnavailable { reason: format!("failed to create native ISA builder: {e}") })?;
    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| Error::IsaUnavailable { reason: format!("failed to finish ISA: {e}") })
}

/// Compile `function` together with a lane-loop entry point for `warp_width` lanes.
pub fn compile(
    bindings: &HashMap<String, DeviceAddress>,
    function: &CraneliftFunction,
    warp_width: u32,
) -> Result<(NativeEntry, Arc<JitCode>)> {
    let name = function.name.as_str();
    let isa = native_isa(function.level)?;

    let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
    for symbol in &function.symbols {
        let address = bindings.get(symbol).context(UnlinkedSymbolSnafu { function: name, symbol: symbol.as_str() })?;
        builder.symbol(symbol.as_str(), address.as_ptr());
    }
    let mut module = JITModule::new(builder);

    // Declaration order assigns DataId(i) to the i-th imported symbol.
    for symbol in &function.symbols {
        module.declare_data(symbol, Linkage::Import, true, false).map_err(|e| jit_error(name, "declare data", e))?;
    }

    let impl_id = module
        .declare_function(name, Linkage::Local, &function.func.signature)
        .map_err(|e| jit_error(name, "declare function", e))?;
    let mut ctx = module.make_context();
    ctx.func = function.func.clone();
    module.define_function(impl_id, &mut ctx).map_err(|e| jit_error(name, "define function", e))?;

    let entry_name = format!("{name}_entry");
    let entry_id = build_lane_loop(&mut module, &entry_name, impl_id, warp_width)?;

    module.finalize_definitions().map_err(|e| jit_error(name, "finalize", e))?;
    let ptr = module.get_finalized_function(entry_id);

    debug!(function = name, warp_width, "specialization compiled");

    let code = Arc::new(JitCode { module });
    // SAFETY: `ptr` is the finalized lane loop, whose code lives as long as `code`.
    let entry = unsafe { NativeEntry::from_raw(ptr, entry_name, warp_width, code.clone()) };
    Ok((entry, code))
}

/// Build the entry point that runs the translated function once per lane.
///
/// The entry signature is:
///   fn entry(contexts: i64) -> ()
///
/// It performs:
///   for lane in 0..warp_width { call impl(contexts + lane * stride) }
fn build_lane_loop(module: &mut JITModule, name: &str, impl_id: FuncId, warp_width: u32) -> Result<FuncId> {
    let mut signature = module.make_signature();
    signature.params.push(AbiParam::new(types::I64));

    let entry_id =
        module.declare_function(name, Linkage::Local, &signature).map_err(|e| jit_error(name, "declare entry", e))?;

    let mut func = Function::with_name_signature(UserFuncName::testcase(name), signature);
    let mut func_ctx = FunctionBuilderContext::new();
    {
        let mut builder = FunctionBuilder::new(&mut func, &mut func_ctx);
        let entry_block = builder.create_block();
        let header = builder.create_block();
        let body = builder.create_block();
        let exit = builder.create_block();
        let no_args: &[BlockArg] = &[];

        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        let contexts = builder.block_params(entry_block)[0];
        let impl_ref = module.declare_func_in_func(impl_id, builder.func);
        let lane = builder.declare_var(types::I64);
        let zero = builder.ins().iconst(types::I64, 0);
        builder.def_var(lane, zero);
        builder.ins().jump(header, no_args);

        builder.switch_to_block(header);
        let current = builder.use_var(lane);
        let more = builder.ins().icmp_imm(IntCC::UnsignedLessThan, current, i64::from(warp_width));
        builder.ins().brif(more, body, no_args, exit, no_args);

        builder.switch_to_block(body);
        let current = builder.use_var(lane);
        let displacement = builder.ins().imul_imm(current, LaunchContext::STRIDE);
        let context = builder.ins().iadd(contexts, displacement);
        builder.ins().call(impl_ref, &[context]);
        let next = builder.ins().iadd_imm(current, 1);
        builder.def_var(lane, next);
        builder.ins().jump(header, no_args);

        builder.switch_to_block(exit);
        builder.ins().return_(&[]);

        builder.seal_all_blocks();
        builder.finalize();
    }

    let mut ctx = module.make_context();
    ctx.func = func;
    module.define_function(entry_id, &mut ctx).map_err(|e| jit_error(name, "define entry", e))?;

    Ok(entry_id)
}

fn jit_error(function: &str, stage: &str, error: impl std::fmt::Display) -> Error {
    Error::JitCompilation { function: function.to_string(), reason: format!("failed to {stage}: {error}") }
}
