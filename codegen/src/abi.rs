//! Native calling convention of translated subkernels.
//!
//! A translated entry point has the signature `extern "C" fn(*mut LaunchContext)` and is
//! invoked with a pointer to `warp_width` consecutive contexts, one per emulated lane.
//! Every context carries the base pointers of the memory regions whose sizes the
//! translation's metadata reports; the executive allocates them before the call.

use std::any::Any;
use std::mem::offset_of;
use std::sync::Arc;

use snafu::ensure;

use crate::error::{Result, WarpWidthMismatchSnafu};

/// Per-lane execution state passed to translated code.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext {
    pub argument: *mut u8,
    pub parameter: *mut u8,
    pub shared: *mut u8,
    pub constant: *mut u8,
    pub local: *mut u8,
    /// Texture base pointers, indexed by binding slot.
    pub textures: *const *const u8,
    pub thread_id: [u32; 3],
    pub block_dim: [u32; 3],
    pub block_id: [u32; 3],
    pub grid_dim: [u32; 3],
}

impl Default for LaunchContext {
    fn default() -> Self {
        Self {
            argument: std::ptr::null_mut(),
            parameter: std::ptr::null_mut(),
            shared: std::ptr::null_mut(),
            constant: std::ptr::null_mut(),
            local: std::ptr::null_mut(),
            textures: std::ptr::null(),
            thread_id: [0; 3],
            block_dim: [1; 3],
            block_id: [0; 3],
            grid_dim: [1; 3],
        }
    }
}

impl LaunchContext {
    pub(crate) const ARGUMENT: i32 = offset_of!(LaunchContext, argument) as i32;
    pub(crate) const PARAMETER: i32 = offset_of!(LaunchContext, parameter) as i32;
    pub(crate) const SHARED: i32 = offset_of!(LaunchContext, shared) as i32;
    pub(crate) const CONSTANT: i32 = offset_of!(LaunchContext, constant) as i32;
    pub(crate) const LOCAL: i32 = offset_of!(LaunchContext, local) as i32;
    pub(crate) const TEXTURES: i32 = offset_of!(LaunchContext, textures) as i32;
    pub(crate) const THREAD_ID: i32 = offset_of!(LaunchContext, thread_id) as i32;
    pub(crate) const BLOCK_DIM: i32 = offset_of!(LaunchContext, block_dim) as i32;
    pub(crate) const BLOCK_ID: i32 = offset_of!(LaunchContext, block_id) as i32;
    pub(crate) const GRID_DIM: i32 = offset_of!(LaunchContext, grid_dim) as i32;
    pub(crate) const STRIDE: i64 = std::mem::size_of::<LaunchContext>() as i64;
}

/// Why a subkernel invocation returned, as written to its resume-status slot.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeStatus {
    Exit = 0,
    Barrier = 1,
    /// Continue at the subkernel whose id was written to the resume-point slot.
    Call = 2,
    /// As `Call`, reusing the current parameter frame.
    TailCall = 3,
}

impl ResumeStatus {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Exit),
            1 => Some(Self::Barrier),
            2 => Some(Self::Call),
            3 => Some(Self::TailCall),
            _ => None,
        }
    }
}

/// Offsets, within the local region, of the words translated code writes on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExitSlots {
    pub resume_status: u32,
    pub resume_point: u32,
}

/// Signature of a translated entry point.
pub type EntryFn = unsafe extern "C" fn(*mut LaunchContext);

/// A callable native entry point together with whatever owns its code.
pub struct NativeEntry {
    ptr: *const u8,
    name: String,
    warp_width: u32,
    _owner: Arc<dyn Any + Send + Sync>,
}

// SAFETY: `ptr` points into immutable, finalized code kept alive by `_owner`.
unsafe impl Send for NativeEntry {}
unsafe impl Sync for NativeEntry {}

impl NativeEntry {
    /// # Safety
    ///
    /// `ptr` must be an [`EntryFn`] that stays valid while `owner` is alive and that reads
    /// exactly `warp_width` contexts.
    pub unsafe fn from_raw(
        ptr: *const u8,
        name: impl Into<String>,
        warp_width: u32,
        owner: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self { ptr, name: name.into(), warp_width, _owner: owner }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn warp_width(&self) -> u32 {
        self.warp_width
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Run one invocation over `contexts`, one per lane.
    ///
    /// # Safety
    ///
    /// Every region pointer in every context must be valid for the sizes reported by the
    /// translation's metadata, and no other thread may use the same contexts concurrently.
    pub unsafe fn call(&self, contexts: &mut [LaunchContext]) -> Result<()> {
        ensure!(
            contexts.len() == self.warp_width as usize,
            WarpWidthMismatchSnafu { expected: self.warp_width, actual: contexts.len() }
        );
        // SAFETY: `ptr` is an `EntryFn` per the constructor contract.
        let entry: EntryFn = unsafe { std::mem::transmute::<*const u8, EntryFn>(self.ptr) };
        unsafe { entry(contexts.as_mut_ptr()) };
        Ok(())
    }
}

impl std::fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEntry").field("name", &self.name).field("warp_width", &self.warp_width).finish()
    }
}
