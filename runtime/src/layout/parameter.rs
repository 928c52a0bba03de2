//! Call-parameter frame layout.
//!
//! The parameter region carries arguments and return values across subkernel calls.
//! Its size must cover every call site of the subkernel and every function of the
//! module, so a tail call can reuse the caller's frame without growing it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use snafu::ensure;
use tracing::{debug, trace};
use warpjit_ir::{AddressMode, DIVERGENCE_MARKER, Instruction, Kernel, Module, Opcode, Region, Subkernel};

use super::{MEMORY_OPCODES, pad, rewrite_operands};
use crate::error::{ConflictingParameterSnafu, Result};
use crate::metadata::MetadataBuilder;

/// Lay out the parameter frame and rewrite references to call arguments.
///
/// Returns the region size.
pub fn layout_parameters(
    module: &Module,
    kernel: &Kernel,
    subkernel: &mut Subkernel,
    metadata: &mut MetadataBuilder,
) -> Result<u32> {
    let mut offsets: HashMap<String, u32> = HashMap::new();
    let mut size = 0;

    for inst in subkernel.cfg.instructions().filter(|inst| is_parameter_call(inst)) {
        let site = pack_call_site(kernel, subkernel, inst, &mut offsets)?;
        trace!(callee = %inst.a.identifier, site, "call site packed");
        size = size.max(site);
    }

    // Module-wide: any function may be the target of a tail call from here.
    for kernel in &module.kernels {
        let mut declared = 0;
        for parameter in &kernel.parameters {
            declared += pad(declared, parameter.size());
            declared += parameter.size();
        }
        size = size.max(declared);
    }

    rewrite_operands(&mut subkernel.cfg, MEMORY_OPCODES, &offsets, Region::Parameter, None);

    debug!(subkernel = %subkernel.name, size, "parameter layout");
    metadata.parameter_size = size;
    Ok(size)
}

fn is_parameter_call(inst: &Instruction) -> bool {
    inst.opcode == Opcode::Call && inst.a.identifier != DIVERGENCE_MARKER
}

/// Pack return values then inputs, each padded to the width of its type.
///
/// Every element takes a slot; only symbolic elements get an offset to rewrite.
/// A symbol must land at the same offset at every call site that names it.
fn pack_call_site(
    kernel: &Kernel,
    subkernel: &Subkernel,
    inst: &Instruction,
    offsets: &mut HashMap<String, u32>,
) -> Result<u32> {
    let mut site = 0;
    for operand in inst.d.array.iter().chain(inst.b.array.iter()) {
        let bytes = operand.ty.bytes();
        site += pad(site, bytes);
        if operand.mode == AddressMode::Address {
            match offsets.entry(operand.identifier.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(site);
                }
                Entry::Occupied(slot) => ensure!(
                    *slot.get() == site,
                    ConflictingParameterSnafu {
                        kernel: kernel.name.as_str(),
                        subkernel: subkernel.name.as_str(),
                        symbol: operand.identifier.as_str(),
                        first: *slot.get(),
                        second: site,
                    }
                ),
            }
        }
        site += bytes;
    }
    Ok(site)
}
