//! Texture binding slots.

use std::collections::HashMap;

use snafu::OptionExt;
use tracing::{debug, trace};
use warpjit_device::Device;
use warpjit_ir::{Kernel, Module, Opcode, Region, Subkernel};

use crate::error::{MissingTextureSnafu, Result};
use crate::metadata::{MetadataBuilder, TextureBinding};

/// Assign binding slots to sampled textures in first-occurrence order.
///
/// The texture operand of every `tex` carries its slot in `reg` afterwards.
pub fn layout_textures(
    module: &Module,
    kernel: &Kernel,
    subkernel: &mut Subkernel,
    device: &dyn Device,
    metadata: &mut MetadataBuilder,
) -> Result<()> {
    let mut slots: HashMap<String, u32> = HashMap::new();
    let mut bindings: Vec<TextureBinding> = Vec::new();
    let subkernel_name = subkernel.name.clone();

    for inst in subkernel.cfg.instructions_mut().filter(|inst| inst.opcode == Opcode::Tex) {
        let symbol = &inst.a.identifier;
        let slot = match slots.get(symbol) {
            Some(&slot) => slot,
            None => {
                let handle = device.texture_reference(&module.path, symbol).context(MissingTextureSnafu {
                    kernel: kernel.name.as_str(),
                    subkernel: subkernel_name.as_str(),
                    symbol: symbol.as_str(),
                })?;
                let slot = bindings.len() as u32;
                trace!(%symbol, slot, "texture bound");
                bindings.push(TextureBinding { symbol: symbol.clone(), slot, handle });
                slots.insert(symbol.clone(), slot);
                slot
            }
        };
        inst.a.reg = slot;
        inst.a.region = Some(Region::Texture);
    }

    debug!(subkernel = %subkernel_name, textures = bindings.len(), "texture layout");
    metadata.textures = bindings;
    Ok(())
}
