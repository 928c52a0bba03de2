//! The capability interface between the translation cache and the executive.

use std::fmt;

/// Concrete address of a device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(pub u64);

impl DeviceAddress {
    pub fn from_ptr(ptr: *const u8) -> Self {
        Self(ptr as u64)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.0 as *const u8
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque handle to a texture reference owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// What the translation cache needs from the device it translates for.
///
/// Both lookups are keyed by the module's load path and the symbol name as written in the
/// module. Implementations must be shareable across launching threads.
pub trait Device: Send + Sync {
    /// Texture reference bound to `symbol`, queried once per distinct texture symbol during layout.
    fn texture_reference(&self, module_path: &str, symbol: &str) -> Option<TextureHandle>;

    /// Address of the allocation backing global variable `symbol`, queried while linking.
    fn global_allocation(&self, module_path: &str, symbol: &str) -> Option<DeviceAddress>;

    /// Device name for diagnostics.
    fn name(&self) -> &str;
}
