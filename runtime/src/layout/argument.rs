//! Kernel argument layout.

use tracing::debug;
use warpjit_ir::{Kernel, Region, Subkernel};

use super::{MEMORY_OPCODES, Packer, rewrite_operands};
use crate::metadata::MetadataBuilder;

/// Pack the kernel's declared parameters and rewrite references to them.
///
/// Each parameter is padded to its own alignment. References keep their original
/// displacement, so `[arg+4]` becomes `declared_offset(arg) + 4`.
pub fn layout_arguments(kernel: &Kernel, subkernel: &mut Subkernel, metadata: &mut MetadataBuilder) {
    let mut packer = Packer::default();
    for parameter in &kernel.parameters {
        packer.place(&parameter.name, parameter.size(), parameter.alignment());
    }

    rewrite_operands(&mut subkernel.cfg, MEMORY_OPCODES, &packer.offsets, Region::Argument, None);

    debug!(subkernel = %subkernel.name, size = packer.size, "argument layout");
    metadata.argument_size = packer.size;
}
