//! Shared memory layout.
//!
//! Sized declarations are packed first. Extern declarations have no compile-time size:
//! they all start at the same offset at the tail of the region, after it has been padded
//! to the largest extern alignment, and are sized by the executive at launch.

use std::collections::HashSet;

use snafu::ensure;
use tracing::{debug, trace};
use warpjit_dtype::AddressSpace;
use warpjit_ir::{Kernel, Module, Opcode, Region, Subkernel};

use super::{Packer, pad, rewrite_operands};
use crate::error::{DuplicateExternSharedSnafu, Result};
use crate::metadata::MetadataBuilder;

const SHARED_OPCODES: &[Opcode] = &[Opcode::Mov, Opcode::Ld, Opcode::St, Opcode::Cvta];

pub fn layout_shared(
    module: &Module,
    kernel: &Kernel,
    subkernel: &mut Subkernel,
    metadata: &mut MetadataBuilder,
) -> Result<()> {
    let mut packer = Packer::default();
    let mut externs: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let mut extern_alignment = 1;

    let declarations = module.globals.iter().chain(subkernel.locals.iter());
    for declaration in declarations.filter(|declaration| declaration.space == AddressSpace::Shared) {
        if declaration.is_extern() {
            ensure!(
                seen.insert(declaration.name.as_str()),
                DuplicateExternSharedSnafu {
                    kernel: kernel.name.as_str(),
                    subkernel: subkernel.name.as_str(),
                    symbol: declaration.name.as_str(),
                }
            );
            extern_alignment = extern_alignment.max(declaration.alignment()).max(declaration.ty.bytes());
            externs.push(declaration.name.clone());
        } else {
            packer.place_declaration(declaration);
        }
    }

    if !externs.is_empty() {
        packer.size += pad(packer.size, extern_alignment);
        for name in externs {
            trace!(symbol = %name, offset = packer.size, "extern shared placed");
            packer.offsets.insert(name, packer.size);
        }
    }

    rewrite_operands(&mut subkernel.cfg, SHARED_OPCODES, &packer.offsets, Region::Shared, Some(AddressSpace::Shared));

    debug!(subkernel = %subkernel.name, size = packer.size, extern_alignment, "shared layout");
    metadata.shared_size = packer.size;
    Ok(())
}
