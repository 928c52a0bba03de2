//! Constant bank layout.

use tracing::debug;
use warpjit_dtype::AddressSpace;
use warpjit_ir::{Module, Region, Subkernel};

use super::{MEMORY_OPCODES, Packer, rewrite_operands};
use crate::metadata::MetadataBuilder;

pub fn layout_constants(module: &Module, subkernel: &mut Subkernel, metadata: &mut MetadataBuilder) {
    let mut packer = Packer::default();
    for declaration in module.globals.iter().filter(|declaration| declaration.space == AddressSpace::Const) {
        packer.place_declaration(declaration);
    }

    rewrite_operands(&mut subkernel.cfg, MEMORY_OPCODES, &packer.offsets, Region::Constant, Some(AddressSpace::Const));

    debug!(subkernel = %subkernel.name, size = packer.size, "constant layout");
    metadata.constant_size = packer.size;
}
