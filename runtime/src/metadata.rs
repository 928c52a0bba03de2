//! Per-subkernel layout metadata.

use warpjit_codegen::{ExitSlots, OptimizationLevel};
use warpjit_device::TextureHandle;
use warpjit_ir::SubkernelId;

/// A texture symbol bound to a slot of the launch context's texture table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub symbol: String,
    pub slot: u32,
    pub handle: TextureHandle,
}

/// Offsets of the compiler-reserved local slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReservedSlots {
    pub barrier_resume: Option<u32>,
    pub resume_status: u32,
    pub resume_point: u32,
    pub spill_area: Option<u32>,
}

/// Region sizes and bindings an executive needs to launch a subkernel.
///
/// Immutable once built; shared by every specialization of the subkernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub kernel: String,
    pub subkernel: SubkernelId,
    pub level: OptimizationLevel,
    /// Warp width the layout was computed for.
    pub warp_size: u32,
    pub argument_size: u32,
    pub parameter_size: u32,
    pub shared_size: u32,
    pub constant_size: u32,
    pub local_size: u32,
    /// Ordered by slot.
    pub textures: Vec<TextureBinding>,
    pub reserved: ReservedSlots,
}

impl Metadata {
    pub fn exit_slots(&self) -> ExitSlots {
        ExitSlots { resume_status: self.reserved.resume_status, resume_point: self.reserved.resume_point }
    }
}

/// Collects the outputs of the layout passes.
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    kernel: String,
    subkernel: SubkernelId,
    level: OptimizationLevel,
    warp_size: u32,
    pub(crate) argument_size: u32,
    pub(crate) parameter_size: u32,
    pub(crate) shared_size: u32,
    pub(crate) constant_size: u32,
    pub(crate) local_size: u32,
    pub(crate) textures: Vec<TextureBinding>,
    pub(crate) reserved: ReservedSlots,
}

impl MetadataBuilder {
    pub fn new(kernel: impl Into<String>, subkernel: SubkernelId, level: OptimizationLevel, warp_size: u32) -> Self {
        Self {
            kernel: kernel.into(),
            subkernel,
            level,
            warp_size,
            argument_size: 0,
            parameter_size: 0,
            shared_size: 0,
            constant_size: 0,
            local_size: 0,
            textures: Vec::new(),
            reserved: ReservedSlots::default(),
        }
    }

    pub fn build(self) -> Metadata {
        Metadata {
            kernel: self.kernel,
            subkernel: self.subkernel,
            level: self.level,
            warp_size: self.warp_size,
            argument_size: self.argument_size,
            parameter_size: self.parameter_size,
            shared_size: self.shared_size,
            constant_size: self.constant_size,
            local_size: self.local_size,
            textures: self.textures,
            reserved: self.reserved,
        }
    }
}
