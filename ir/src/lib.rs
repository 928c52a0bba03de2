//! Intermediate representation of virtual-ISA kernels.
//!
//! A [`Module`] owns global declarations and [`Kernel`]s; each kernel is partitioned into
//! [`Subkernel`]s, the unit of translation. A subkernel body is a [`ControlFlowGraph`] of
//! [`Instruction`]s whose [`Operand`]s are rewritten in place by the layout passes of the
//! runtime crate.
//!
//! # Module Organization
//!
//! - [`operand`] - operands, address modes and the region tag assigned during layout
//! - [`instruction`] - opcodes and instructions
//! - [`cfg`] - basic blocks and the control-flow graph
//! - [`declaration`] - global/local variable declarations and kernel parameters
//! - [`kernel`] - kernels and subkernels
//! - [`module`] - compilation units

pub mod cfg;
pub mod declaration;
pub mod instruction;
pub mod kernel;
pub mod module;
pub mod operand;


pub use cfg::{BasicBlock, BlockId, ControlFlowGraph};
pub use declaration::{Attribute, Declaration, Parameter};
pub use instruction::{CompareOp, Guard, Instruction, Opcode};
pub use kernel::{Kernel, Subkernel, SubkernelId};
pub use module::Module;
pub use operand::{AddressMode, Dim, Immediate, Operand, Region, SpecialRegister};

pub use warpjit_dtype::{AddressSpace, ScalarType};

/// Name of the intrinsic pseudo-call marking warp divergence.
///
/// Calls to it are lowered by the backend and never resolved to a subkernel.
pub const DIVERGENCE_MARKER: &str = "__warp_divergent";
