//! Call-target resolution.

use tracing::trace;
use warpjit_ir::{DIVERGENCE_MARKER, Kernel, Subkernel};

use crate::error::{Result, UnsupportedCallSnafu};

/// Point every call and function-address `mov` at the subkernel it names.
///
/// Tail calls already carry the target chosen by the partitioner and the divergence
/// marker is an intrinsic; both are left alone. Anything else must name a subkernel of
/// the same kernel. Returns the number of resolved references.
pub fn resolve_calls(kernel: &Kernel, subkernel: &mut Subkernel) -> Result<usize> {
    let mut resolved = 0;
    for inst in subkernel.cfg.instructions_mut() {
        if !inst.references_function() || inst.tail_call || inst.a.identifier == DIVERGENCE_MARKER {
            continue;
        }

        let Some(target) = kernel.subkernel_by_name(&inst.a.identifier) else {
            return UnsupportedCallSnafu {
                kernel: kernel.name.as_str(),
                subkernel: subkernel.name.as_str(),
                callee: inst.a.identifier.as_str(),
            }
            .fail();
        };

        trace!(callee = %inst.a.identifier, target = %target.id, "call resolved");
        inst.target = Some(target.id);
        resolved += 1;
    }
    Ok(resolved)
}
