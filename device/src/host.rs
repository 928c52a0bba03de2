//! Host-memory device.
//!
//! Globals are backed by zeroed, 16-byte aligned heap blocks that never move for the
//! lifetime of the device, so their addresses can be baked into translated code.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;

use parking_lot::RwLock;
use snafu::{OptionExt, ensure};
use warpjit_dtype::ScalarType;

use crate::device::{Device, DeviceAddress, TextureHandle};
use crate::error::{
    AllocationFailedSnafu, AlreadyAllocatedSnafu, AlreadyRegisteredSnafu, Result, SizeMismatchSnafu, UnknownGlobalSnafu,
};

const ALLOCATION_ALIGN: usize = 16;

/// Heap block backing one global variable.
#[derive(Debug)]
struct Allocation {
    ptr: NonNull<u8>,
    layout: Layout,
    bytes: usize,
}

// SAFETY: the block is exclusively owned by the allocation; concurrent access through the
// published address is governed by the kernels that use it, as on a real device.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    fn new(module: &str, symbol: &str, bytes: usize) -> Result<Self> {
        let layout = Layout::from_size_align(bytes.max(1), ALLOCATION_ALIGN)
            .ok()
            .context(AllocationFailedSnafu { module, symbol, bytes })?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).context(AllocationFailedSnafu { module, symbol, bytes })?;
        Ok(Self { ptr, layout, bytes })
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        // SAFETY: allocated in `Allocation::new` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Linear, point-sampled texture data.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub ty: ScalarType,
    pub data: Vec<u8>,
}

impl Texture {
    pub fn new(ty: ScalarType, data: Vec<u8>) -> Self {
        Self { ty, data }
    }

    pub fn from_f32(values: &[f32]) -> Self {
        Self { ty: ScalarType::F32, data: values.iter().flat_map(|v| v.to_ne_bytes()).collect() }
    }
}

type SymbolKey = (String, String);

/// [`Device`] over process memory.
#[derive(Debug)]
pub struct HostDevice {
    name: String,
    globals: RwLock<HashMap<SymbolKey, Allocation>>,
    texture_refs: RwLock<HashMap<SymbolKey, TextureHandle>>,
    textures: RwLock<Vec<Texture>>,
}

impl HostDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: RwLock::new(HashMap::new()),
            texture_refs: RwLock::new(HashMap::new()),
            textures: RwLock::new(Vec::new()),
        }
    }

    /// Allocate zeroed storage for global `symbol` of the module loaded from `module_path`.
    pub fn allocate_global(&self, module_path: &str, symbol: &str, bytes: usize) -> Result<DeviceAddress> {
        let mut globals = self.globals.write();
        let key = (module_path.to_string(), symbol.to_string());
        ensure!(!globals.contains_key(&key), AlreadyAllocatedSnafu { module: module_path, symbol });

        let allocation = Allocation::new(module_path, symbol, bytes)?;
        let address = DeviceAddress::from_ptr(allocation.ptr.as_ptr());
        tracing::debug!(module = module_path, symbol, bytes, %address, "allocated global");
        globals.insert(key, allocation);
        Ok(address)
    }

    /// Copy `data` into the start of a global's storage.
    pub fn write_global(&self, module_path: &str, symbol: &str, data: &[u8]) -> Result<()> {
        let globals = self.globals.read();
        let allocation = globals
            .get(&(module_path.to_string(), symbol.to_string()))
            .context(UnknownGlobalSnafu { module: module_path, symbol })?;
        ensure!(data.len() <= allocation.bytes, SizeMismatchSnafu { expected: allocation.bytes, actual: data.len() });
        // SAFETY: bounds checked above; the allocation outlives the read guard.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), allocation.ptr.as_ptr(), data.len()) };
        Ok(())
    }

    /// Snapshot of a global's storage.
    pub fn read_global(&self, module_path: &str, symbol: &str) -> Result<Vec<u8>> {
        let globals = self.globals.read();
        let allocation = globals
            .get(&(module_path.to_string(), symbol.to_string()))
            .context(UnknownGlobalSnafu { module: module_path, symbol })?;
        // SAFETY: the block holds `bytes` initialized bytes.
        let bytes = unsafe { std::slice::from_raw_parts(allocation.ptr.as_ptr(), allocation.bytes) };
        Ok(bytes.to_vec())
    }

    /// Bind `texture` to `symbol` of the module loaded from `module_path`.
    pub fn register_texture(&self, module_path: &str, symbol: &str, texture: Texture) -> Result<TextureHandle> {
        let mut refs = self.texture_refs.write();
        let key = (module_path.to_string(), symbol.to_string());
        ensure!(!refs.contains_key(&key), AlreadyRegisteredSnafu { module: module_path, symbol });

        let mut textures = self.textures.write();
        let handle = TextureHandle(textures.len() as u64);
        textures.push(texture);
        refs.insert(key, handle);
        Ok(handle)
    }

    /// Base address of a texture's data, as placed in a launch context's texture table.
    pub fn texture_data(&self, handle: TextureHandle) -> Option<*const u8> {
        self.textures.read().get(handle.0 as usize).map(|texture| texture.data.as_ptr())
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new("host")
    }
}

impl Device for HostDevice {
    fn texture_reference(&self, module_path: &str, symbol: &str) -> Option<TextureHandle> {
        self.texture_refs.read().get(&(module_path.to_string(), symbol.to_string())).copied()
    }

    fn global_allocation(&self, module_path: &str, symbol: &str) -> Option<DeviceAddress> {
        self.globals
            .read()
            .get(&(module_path.to_string(), symbol.to_string()))
            .map(|allocation| DeviceAddress::from_ptr(allocation.ptr.as_ptr()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
