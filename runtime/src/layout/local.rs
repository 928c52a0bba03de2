//! Local memory layout.
//!
//! The reserved control slots come first, in a fixed order, so the executive can find
//! them at the same offsets in every subkernel of a kernel:
//!
//! | slot | name | present |
//! |---|---|---|
//! | barrier resume | [`BARRIER_NEXT_SUBKERNEL`] | when declared by the partitioner |
//! | resume status | [`RESUME_STATUS`] | always, 32-bit |
//! | resume point | [`RESUME_POINT`] | always, 32-bit |
//!
//! Ordinary locals follow, and the register spill area ([`SPILL_AREA`]) is placed last.

use tracing::debug;
use warpjit_dtype::{AddressSpace, ScalarType};
use warpjit_ir::{Declaration, Region, Subkernel};

use super::{MEMORY_OPCODES, Packer, rewrite_operands};
use crate::metadata::{MetadataBuilder, ReservedSlots};

pub const BARRIER_NEXT_SUBKERNEL: &str = "__barrier_next_subkernel";
pub const RESUME_STATUS: &str = "__resume_status";
pub const RESUME_POINT: &str = "__resume_point";
pub const SPILL_AREA: &str = "__spill_area";

/// Names laid out explicitly and skipped by the general scan.
const EXCLUDED: &[&str] = &[BARRIER_NEXT_SUBKERNEL, RESUME_STATUS, RESUME_POINT, SPILL_AREA];

pub fn layout_locals(subkernel: &mut Subkernel, metadata: &mut MetadataBuilder) -> ReservedSlots {
    let mut packer = Packer::default();
    let word = ScalarType::U32.bytes();

    let barrier_resume = reserved_local(subkernel, BARRIER_NEXT_SUBKERNEL).map(|slot| packer.place_declaration(slot));
    let resume_status = packer.place(RESUME_STATUS, word, word);
    let resume_point = packer.place(RESUME_POINT, word, word);

    for declaration in subkernel.locals.iter().filter(|declaration| is_ordinary_local(declaration)) {
        packer.place_declaration(declaration);
    }

    let spill_area = reserved_local(subkernel, SPILL_AREA).map(|spill| packer.place_declaration(spill));

    rewrite_operands(&mut subkernel.cfg, MEMORY_OPCODES, &packer.offsets, Region::Local, Some(AddressSpace::Local));

    let reserved = ReservedSlots { barrier_resume, resume_status, resume_point, spill_area };
    debug!(subkernel = %subkernel.name, size = packer.size, ?reserved, "local layout");
    metadata.local_size = packer.size;
    metadata.reserved = reserved;
    reserved
}

/// Reserved names only count when declared in the local space.
fn reserved_local<'a>(subkernel: &'a Subkernel, name: &str) -> Option<&'a Declaration> {
    subkernel.local(name).filter(|declaration| declaration.space == AddressSpace::Local)
}

fn is_ordinary_local(declaration: &Declaration) -> bool {
    matches!(declaration.space, AddressSpace::Local | AddressSpace::Generic)
        && !EXCLUDED.contains(&declaration.name.as_str())
}
