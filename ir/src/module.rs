//! Compilation units.

use std::sync::Arc;

use crate::declaration::Declaration;
use crate::kernel::Kernel;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub name: String,
    /// Path the module was loaded from; the device keys allocations and textures by it.
    pub path: String,
    pub globals: Vec<Declaration>,
    pub kernels: Vec<Arc<Kernel>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { path: name.clone(), name, globals: Vec::new(), kernels: Vec::new() }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_global(mut self, global: Declaration) -> Self {
        self.globals.push(global);
        self
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernels.push(Arc::new(kernel));
        self
    }

    pub fn global(&self, name: &str) -> Option<&Declaration> {
        self.globals.iter().find(|global| global.name == name)
    }

    pub fn kernel(&self, name: &str) -> Option<&Arc<Kernel>> {
        self.kernels.iter().find(|kernel| kernel.name == name)
    }
}
