use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The host allocator returned null.
    #[snafu(display("failed to allocate {bytes} bytes for {module}::{symbol}"))]
    AllocationFailed { module: String, symbol: String, bytes: usize },

    /// A global was allocated twice.
    #[snafu(display("global {module}::{symbol} is already allocated"))]
    AlreadyAllocated { module: String, symbol: String },

    /// A texture symbol was registered twice.
    #[snafu(display("texture {module}::{symbol} is already registered"))]
    AlreadyRegistered { module: String, symbol: String },

    #[snafu(display("no allocation for global {module}::{symbol}"))]
    UnknownGlobal { module: String, symbol: String },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },
}
