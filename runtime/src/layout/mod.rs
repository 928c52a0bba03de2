//! Layout analysis.
//!
//! Each pass assigns byte offsets to the named storage locations of one region and
//! rewrites the memory operands of a subkernel to carry the resolved offset and region.
//! Passes run in a fixed order over a private copy of the subkernel:
//!
//! 1. [`global`]: tag references to module globals
//! 2. [`argument`]: kernel parameters
//! 3. [`parameter`]: call-argument passing frame
//! 4. [`shared`]
//! 5. [`constant`]
//! 6. [`local`]: reserved control slots, locals, spill area
//! 7. [`texture`]: binding slots
//!
//! An operand is rewritten at most once: the first pass that claims its identifier sets
//! its region, and later passes skip operands that already have one.

pub mod argument;
pub mod constant;
pub mod global;
pub mod local;
pub mod parameter;
pub mod shared;
pub mod texture;

use std::collections::HashMap;

use tracing::{debug, trace};
use warpjit_device::Device;
use warpjit_dtype::AddressSpace;
use warpjit_ir::{ControlFlowGraph, Declaration, Kernel, Module, Opcode, Operand, Region, Subkernel};

use crate::error::Result;
use crate::metadata::MetadataBuilder;

/// Opcodes whose operands the layout passes inspect.
pub(crate) const MEMORY_OPCODES: &[Opcode] = &[Opcode::Mov, Opcode::Ld, Opcode::St];

/// Padding needed to bring `size` up to a multiple of `alignment`.
///
/// An alignment of zero is treated as one.
pub fn pad(size: u32, alignment: u32) -> u32 {
    let alignment = alignment.max(1);
    let padding = alignment - size % alignment;
    if padding == alignment { 0 } else { padding }
}

/// Run every layout pass over `subkernel`, in order.
pub fn analyze(
    module: &Module,
    kernel: &Kernel,
    subkernel: &mut Subkernel,
    device: &dyn Device,
    metadata: &mut MetadataBuilder,
) -> Result<()> {
    global::tag_globals(module, subkernel);
    argument::layout_arguments(kernel, subkernel, metadata);
    parameter::layout_parameters(module, kernel, subkernel, metadata)?;
    shared::layout_shared(module, kernel, subkernel, metadata)?;
    constant::layout_constants(module, subkernel, metadata);
    local::layout_locals(subkernel, metadata);
    texture::layout_textures(module, kernel, subkernel, device, metadata)?;

    debug!(
        subkernel = %subkernel.name,
        argument = metadata.argument_size,
        parameter = metadata.parameter_size,
        shared = metadata.shared_size,
        constant = metadata.constant_size,
        local = metadata.local_size,
        textures = metadata.textures.len(),
        "layout complete"
    );
    Ok(())
}

/// Sequential packing of declarations, each padded to its own alignment.
#[derive(Debug, Default)]
pub(crate) struct Packer {
    pub size: u32,
    pub offsets: HashMap<String, u32>,
}

impl Packer {
    /// Place `bytes` at the next multiple of `alignment` and return the offset.
    pub fn place(&mut self, name: &str, bytes: u32, alignment: u32) -> u32 {
        self.size += pad(self.size, alignment);
        let offset = self.size;
        self.offsets.insert(name.to_string(), offset);
        self.size += bytes;
        trace!(symbol = name, offset, bytes, "placed");
        offset
    }

    pub fn place_declaration(&mut self, declaration: &Declaration) -> u32 {
        self.place(&declaration.name, declaration.size(), declaration.alignment())
    }
}

/// Rewrite unresolved memory operands named in `offsets` to `region`.
///
/// Instructions with a rewritten operand are moved to `space` when one is given.
/// Returns the number of rewritten operands.
pub(crate) fn rewrite_operands(
    cfg: &mut ControlFlowGraph,
    opcodes: &[Opcode],
    offsets: &HashMap<String, u32>,
    region: Region,
    space: Option<AddressSpace>,
) -> usize {
    if offsets.is_empty() {
        return 0;
    }

    let mut rewritten = 0;
    for inst in cfg.instructions_mut() {
        if !opcodes.contains(&inst.opcode) {
            continue;
        }

        let mut touched = false;
        for operand in inst.operands_mut() {
            if !claimable(operand) {
                continue;
            }
            let Some(&offset) = offsets.get(&operand.identifier) else {
                continue;
            };
            operand.offset += i64::from(offset);
            operand.region = Some(region);
            touched = true;
            rewritten += 1;
            trace!(symbol = %operand.identifier, ?region, offset = operand.offset, "operand rewritten");
        }

        if touched && let Some(space) = space {
            inst.space = space;
        }
    }
    rewritten
}

fn claimable(operand: &Operand) -> bool {
    operand.is_memory_reference() && operand.region.is_none()
}
