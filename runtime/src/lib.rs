//! Dynamic translation cache for virtual-ISA kernels.
//!
//! Kernels arrive partitioned into subkernels. On registration every subkernel is laid
//! out ([`layout`]), its calls are resolved ([`resolver`]) and it is translated and linked
//! by a code generation [`Backend`](warpjit_codegen::Backend). On launch,
//! [`TranslationCache::get_or_insert_translation`] serves a JIT-compiled [`Translation`]
//! specialized for the requested warp width, building it at most once.
//!
//! # Module Organization
//!
//! - [`layout`] - region offset assignment and operand rewriting
//! - [`resolver`] - call-target resolution
//! - [`metadata`] - per-subkernel region sizes and bindings
//! - [`translation`] - executable specializations
//! - [`cache`] - the translation cache
//! - [`config`] - cache configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod resolver;
pub mod translation;


pub use cache::{TranslatedKernel, TranslatedSubkernel, TranslationCache};
pub use config::CacheConfig;
pub use error::*;
pub use layout::pad;
pub use metadata::{Metadata, MetadataBuilder, ReservedSlots, TextureBinding};
pub use resolver::resolve_calls;
pub use translation::{Specialization, Translation};
