//! Error types for code generation.

use snafu::Snafu;
use warpjit_dtype::ScalarType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by a backend while translating, linking, verifying or compiling.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The host ISA could not be configured.
    #[snafu(display("native backend unavailable: {reason}"))]
    IsaUnavailable { reason: String },

    #[snafu(display("cannot lower `{instruction}` in {subkernel}"))]
    UnsupportedInstruction { subkernel: String, instruction: String },

    #[snafu(display("type .{ty} is not supported by this backend"))]
    UnsupportedType { ty: ScalarType },

    /// A memory operand was never assigned a region by layout.
    #[snafu(display("symbol '{symbol}' referenced by `{instruction}` in {subkernel} has no resolved location"))]
    UnresolvedSymbol { subkernel: String, symbol: String, instruction: String },

    #[snafu(display("call to '{callee}' in {subkernel} has no resolved target"))]
    UnresolvedCall { subkernel: String, callee: String },

    /// A load or store displacement does not fit the 32-bit immediate field.
    #[snafu(display("displacement {offset} in {subkernel} is out of range"))]
    OffsetOutOfRange { subkernel: String, offset: u64 },

    #[snafu(display("branch to unknown label '{label}' in {subkernel}"))]
    UnknownLabel { subkernel: String, label: String },

    /// The device has no allocation for a global the generated code references.
    #[snafu(display("global '{symbol}' of module {module} has no device allocation"))]
    MissingAllocation { module: String, symbol: String },

    #[snafu(display("no translation of {function} in backend module {module}"))]
    UnknownFunction { module: String, function: String },

    #[snafu(display("symbol '{symbol}' used by {function} was never linked"))]
    UnlinkedSymbol { function: String, symbol: String },

    #[snafu(display("verification failed for {function}: {diagnostic}"))]
    Verification { function: String, diagnostic: String },

    #[snafu(display("optimization of {function} failed: {reason}"))]
    Optimization { function: String, reason: String },

    #[snafu(display("JIT compilation of {function} failed: {reason}"))]
    JitCompilation { function: String, reason: String },

    #[snafu(display("entry point expects {expected} launch contexts, got {actual}"))]
    WarpWidthMismatch { expected: u32, actual: usize },
}
