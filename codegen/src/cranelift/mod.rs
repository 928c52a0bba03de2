//! Cranelift backend.
//!
//! Subkernels are lowered to Cranelift IR once per kernel module, cloned and optimized
//! per warp width, and JIT-compiled behind a lane loop that calls the specialized
//! function once for each [`LaunchContext`](crate::LaunchContext).

mod jit;
mod lower;
pub mod pipeline;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use cranelift_codegen::ir::{Function, UserFuncName};
use cranelift_codegen::isa::OwnedTargetIsa;
use snafu::OptionExt;
use tracing::{debug, instrument};

use warpjit_device::{Device, DeviceAddress};
use warpjit_ir::{Module, Subkernel};

pub use jit::{JitCode, native_isa};

use crate::abi::{ExitSlots, NativeEntry};
use crate::backend::{Backend, OptimizationLevel};
use crate::error::{Error, MissingAllocationSnafu, Result, UnknownFunctionSnafu};

/// Per-kernel backend state: translated functions, symbol bindings and compiled code.
pub struct CraneliftModule {
    name: String,
    functions: HashMap<String, CraneliftFunction>,
    bindings: HashMap<String, DeviceAddress>,
    compiled: Vec<Arc<JitCode>>,
}

impl CraneliftModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device address bound to a global symbol by `link`.
    pub fn binding(&self, symbol: &str) -> Option<DeviceAddress> {
        self.bindings.get(symbol).copied()
    }

    pub fn function(&self, name: &str) -> Option<&CraneliftFunction> {
        self.functions.get(name)
    }

    /// Number of specializations compiled from this module.
    pub fn compiled(&self) -> usize {
        self.compiled.len()
    }
}

/// A translated or specialized function.
#[derive(Debug, Clone)]
pub struct CraneliftFunction {
    pub(crate) name: String,
    pub(crate) func: Function,
    /// Imported data symbols in import-index order.
    pub(crate) symbols: Vec<String>,
    pub(crate) level: OptimizationLevel,
}

impl CraneliftFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

/// Backend JIT-compiling subkernels for the host through Cranelift.
pub struct CraneliftBackend {
    /// Unoptimizing host ISA used for lowering and verification.
    isa: OwnedTargetIsa,
}

impl CraneliftBackend {
    pub fn new() -> Result<Self> {
        Ok(Self { isa: native_isa(OptimizationLevel::None)? })
    }

    /// Name given to the unoptimized translation of a subkernel.
    pub fn base_name(subkernel: &Subkernel) -> String {
        format!("translated_{}", subkernel.name)
    }

    fn verify_func(&self, name: &str, func: &Function) -> Result<()> {
        cranelift_codegen::verify_function(func, &*self.isa)
            .map_err(|errors| Error::Verification { function: name.to_string(), diagnostic: errors.to_string() })
    }
}

impl Backend for CraneliftBackend {
    type Module = CraneliftModule;
    type Function = CraneliftFunction;

    fn create_module(&self, name: &str) -> Result<CraneliftModule> {
        Ok(CraneliftModule {
            name: name.to_string(),
            functions: HashMap::new(),
            bindings: HashMap::new(),
            compiled: Vec::new(),
        })
    }

    #[instrument(skip_all, fields(module = %module.name, subkernel = %subkernel.name))]
    fn translate(
        &self,
        module: &mut CraneliftModule,
        subkernel: &Subkernel,
        exits: ExitSlots,
        level: OptimizationLevel,
    ) -> Result<CraneliftFunction> {
        let name = Self::base_name(subkernel);
        let lowered = lower::lower_subkernel(subkernel, &name, self.isa.default_call_conv(), exits)?;
        let function = CraneliftFunction { name, func: lowered.func, symbols: lowered.symbols, level };
        module.functions.insert(function.name.clone(), function.clone());

        debug!(function = %function.name, instructions = function.func.dfg.num_insts(), "subkernel translated");
        Ok(function)
    }

    #[instrument(skip_all, fields(module = %module.name, subkernel = %subkernel.name))]
    fn link(&self, module: &mut CraneliftModule, subkernel: &Subkernel, ir: &Module, device: &dyn Device) -> Result<()> {
        let name = Self::base_name(subkernel);
        let symbols = module
            .functions
            .get(&name)
            .context(UnknownFunctionSnafu { module: module.name.as_str(), function: name.as_str() })?
            .symbols
            .clone();

        for symbol in symbols {
            if module.bindings.contains_key(&symbol) {
                continue;
            }
            let address = device
                .global_allocation(&ir.path, &symbol)
                .context(MissingAllocationSnafu { module: ir.path.as_str(), symbol: symbol.as_str() })?;
            debug!(%symbol, %address, "global bound");
            module.bindings.insert(symbol, address);
        }
        Ok(())
    }

    fn verify(&self, module: &CraneliftModule) -> Result<()> {
        for function in module.functions.values() {
            self.verify_func(&function.name, &function.func)?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(function = %base.name, %level, warp_width = warp_width))]
    fn optimize(
        &self,
        module: &mut CraneliftModule,
        base: &CraneliftFunction,
        level: OptimizationLevel,
        warp_width: u32,
    ) -> Result<CraneliftFunction> {
        let name = format!("{}_opt{}_ws{}", base.name, level.rank(), warp_width);

        let mut func = base.func.clone();
        func.name = UserFuncName::testcase(&name);
        let func = pipeline::run(func, level, &*self.isa)
            .map_err(|e| Error::Optimization { function: name.clone(), reason: e.to_string() })?;

        let function = CraneliftFunction { name, func, symbols: base.symbols.clone(), level };
        module.functions.insert(function.name.clone(), function.clone());
        Ok(function)
    }

    fn verify_function(&self, function: &CraneliftFunction) -> Result<()> {
        self.verify_func(&function.name, &function.func)
    }

    fn jit(&self, module: &mut CraneliftModule, function: &CraneliftFunction, warp_width: u32) -> Result<NativeEntry> {
        let (entry, code) = jit::compile(&module.bindings, function, warp_width)?;
        module.compiled.push(code);
        Ok(entry)
    }
}
