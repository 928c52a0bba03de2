//! Error types of the translation cache.

use snafu::Snafu;
use warpjit_ir::SubkernelId;

/// Result type for translation cache operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by module loading, kernel registration and specialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    // ========================================================================
    // Configuration errors
    // ========================================================================
    /// Kernel registered against a module that was never loaded.
    #[snafu(display("kernel {kernel} belongs to unknown module '{module}'"))]
    UnknownModule { module: String, kernel: String },

    /// Call to a symbol that is neither an intrinsic nor a subkernel.
    #[snafu(display("{kernel}/{subkernel}: call to '{callee}' is not supported"))]
    UnsupportedCall { kernel: String, subkernel: String, callee: String },

    #[snafu(display("{kernel}/{subkernel}: extern shared '{symbol}' declared more than once"))]
    DuplicateExternShared { kernel: String, subkernel: String, symbol: String },

    /// Subkernel id already owned by another registered kernel.
    #[snafu(display("subkernel {subkernel} of {kernel} is already owned by {owner}"))]
    SubkernelConflict { kernel: String, subkernel: SubkernelId, owner: String },

    #[snafu(display("subkernel {subkernel} is not registered"))]
    UnknownSubkernel { subkernel: SubkernelId },

    #[snafu(display("warp width must be at least 1"))]
    InvalidWarpWidth,

    #[snafu(display("code generation backend unavailable: {source}"))]
    BackendUnavailable { source: warpjit_codegen::Error },

    // ========================================================================
    // Layout errors
    // ========================================================================
    /// Device has no texture reference for a symbol sampled by `tex`.
    #[snafu(display("{kernel}/{subkernel}: device has no texture reference '{symbol}'"))]
    MissingTexture { kernel: String, subkernel: String, symbol: String },

    /// Call-list symbol placed at different frame offsets by two call sites.
    #[snafu(display("{kernel}/{subkernel}: parameter '{symbol}' is at offset {first} and {second}"))]
    ConflictingParameter { kernel: String, subkernel: String, symbol: String, first: u32, second: u32 },

    // ========================================================================
    // Backend errors
    // ========================================================================
    #[snafu(display("{kernel}/{subkernel}: {source}"))]
    Backend { kernel: String, subkernel: String, source: warpjit_codegen::Error },

    /// Backend failure affecting a whole kernel module.
    #[snafu(display("{kernel}: {source}"))]
    KernelBackend { kernel: String, source: warpjit_codegen::Error },
}
