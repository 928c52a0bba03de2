//! Tagging of references to module globals.

use std::collections::HashMap;

use tracing::debug;
use warpjit_dtype::AddressSpace;
use warpjit_ir::{Module, Opcode, Region, Subkernel};

use super::rewrite_operands;

const GLOBAL_OPCODES: &[Opcode] = &[Opcode::Mov, Opcode::Ld, Opcode::St, Opcode::Cvta];

/// Tag every direct reference to a global-space module variable with the global region.
///
/// Globals live at device addresses bound at link time, so their offset stays zero.
pub fn tag_globals(module: &Module, subkernel: &mut Subkernel) -> usize {
    let globals: HashMap<String, u32> = module
        .globals
        .iter()
        .filter(|declaration| declaration.space == AddressSpace::Global)
        .map(|declaration| (declaration.name.clone(), 0))
        .collect();

    let tagged =
        rewrite_operands(&mut subkernel.cfg, GLOBAL_OPCODES, &globals, Region::Global, Some(AddressSpace::Global));
    debug!(subkernel = %subkernel.name, tagged, "globals tagged");
    tagged
}
