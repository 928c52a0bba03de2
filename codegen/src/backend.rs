//! The contract between the translation cache and a code-generation backend.

use warpjit_device::Device;
use warpjit_ir::{Module, Subkernel};

use crate::abi::{ExitSlots, NativeEntry};
use crate::error::Result;

/// Optimization level applied when specializing a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(strum::Display, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OptimizationLevel {
    None,
    /// Combine, value numbering and CFG cleanup.
    #[default]
    Basic,
    /// Adds loop and redundancy passes.
    Aggressive,
    /// As aggressive, favouring code size.
    Space,
    /// As aggressive, with unrolling-class passes enabled.
    Full,
}

impl OptimizationLevel {
    /// Numeric level used in specialized function names (`_opt<rank>`).
    pub const fn rank(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Basic => 1,
            Self::Aggressive | Self::Space => 2,
            Self::Full => 3,
        }
    }
}

/// A code-generation backend.
///
/// One [`Backend::Module`] exists per registered kernel and is shared by every
/// specialization of that kernel's subkernels; callers serialize mutating calls on it.
/// Any error leaves the module usable for a later attempt.
pub trait Backend: Send + Sync + 'static {
    /// Per-kernel backend state.
    type Module: Send + 'static;
    /// A translated, not yet compiled, function.
    type Function: Send + Sync + 'static;

    fn create_module(&self, name: &str) -> Result<Self::Module>;

    /// Lower a layout-resolved subkernel into an unoptimized function.
    fn translate(
        &self,
        module: &mut Self::Module,
        subkernel: &Subkernel,
        exits: ExitSlots,
        level: OptimizationLevel,
    ) -> Result<Self::Function>;

    /// Bind every global the subkernel's translation references to its device allocation.
    fn link(&self, module: &mut Self::Module, subkernel: &Subkernel, ir: &Module, device: &dyn Device) -> Result<()>;

    /// Structural well-formedness check of every function translated into `module`.
    fn verify(&self, module: &Self::Module) -> Result<()>;

    /// Clone `base` under a warp-specialized name and run the pipeline selected by `level`.
    fn optimize(
        &self,
        module: &mut Self::Module,
        base: &Self::Function,
        level: OptimizationLevel,
        warp_width: u32,
    ) -> Result<Self::Function>;

    /// Well-formedness check of a single (specialized) function.
    fn verify_function(&self, function: &Self::Function) -> Result<()>;

    /// Compile `function` to a native entry point emulating `warp_width` lanes.
    fn jit(&self, module: &mut Self::Module, function: &Self::Function, warp_width: u32) -> Result<NativeEntry>;
}
