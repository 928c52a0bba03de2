//! Warp-specialized translations.

use std::sync::Arc;

use snafu::ResultExt;
use warpjit_codegen::{LaunchContext, NativeEntry};
use warpjit_ir::SubkernelId;

use crate::error::{BackendSnafu, Result};
use crate::metadata::Metadata;

/// Specialization flags requested with a translation.
///
/// Recorded on the translation; the cache key is `(subkernel, warp width)` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Specialization(pub u32);

/// A JIT-compiled subkernel emulating `warp_width` lanes per invocation.
///
/// Immutable; may be executed concurrently with distinct launch contexts.
#[derive(Debug)]
pub struct Translation {
    kernel: String,
    subkernel: SubkernelId,
    warp_width: u32,
    specialization: Specialization,
    metadata: Arc<Metadata>,
    entry: NativeEntry,
}

impl Translation {
    pub(crate) fn new(
        kernel: String,
        subkernel: SubkernelId,
        warp_width: u32,
        specialization: Specialization,
        metadata: Arc<Metadata>,
        entry: NativeEntry,
    ) -> Self {
        Self { kernel, subkernel, warp_width, specialization, metadata, entry }
    }

    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    pub fn subkernel(&self) -> SubkernelId {
        self.subkernel
    }

    pub fn warp_width(&self) -> u32 {
        self.warp_width
    }

    pub fn specialization(&self) -> Specialization {
        self.specialization
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn entry(&self) -> &NativeEntry {
        &self.entry
    }

    /// Run one invocation over `warp_width` lanes.
    ///
    /// # Safety
    ///
    /// Each context's region pointers must be valid for the sizes in [`Self::metadata`],
    /// and its texture table must hold one pointer per texture binding.
    pub unsafe fn execute(&self, contexts: &mut [LaunchContext]) -> Result<()> {
        unsafe { self.entry.call(contexts) }
            .context(BackendSnafu { kernel: self.kernel.as_str(), subkernel: self.subkernel.to_string() })
    }
}
