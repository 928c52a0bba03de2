//! Code generation adapter.
//!
//! The translation cache drives code generation through the [`Backend`] contract:
//! `translate` lowers a layout-resolved subkernel into an unoptimized backend function,
//! `link` binds global symbols to device addresses, `verify` checks well-formedness,
//! `optimize` derives a warp-specialized clone, and `jit` turns that clone into a
//! [`NativeEntry`] callable over an array of [`LaunchContext`]s.
//!
//! # Backends
//!
//! - [`cranelift`]: JIT compilation for the host through Cranelift.

pub mod abi;
pub mod backend;
pub mod cranelift;
pub mod error;


pub use abi::{EntryFn, ExitSlots, LaunchContext, NativeEntry, ResumeStatus};
pub use backend::{Backend, OptimizationLevel};
pub use error::*;
