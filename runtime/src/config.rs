//! Translation cache configuration.
//!
//! Provides typed configuration with a bon builder and environment variable fallbacks.

use std::str::FromStr;

use bon::Builder;
use warpjit_codegen::OptimizationLevel;

#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct CacheConfig {
    /// Level used to translate and specialize every subkernel.
    #[builder(default)]
    pub optimization_level: OptimizationLevel,

    /// Re-verify each specialized function before compiling it.
    #[builder(default = true)]
    pub verify_specializations: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { optimization_level: OptimizationLevel::default(), verify_specializations: true }
    }
}

impl CacheConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `WARPJIT_OPT_LEVEL` - `none`, `basic`, `aggressive`, `space` or `full` (default: basic)
    /// * `WARPJIT_VERIFY_SPECIALIZATIONS` - `0`/`false` disables verification of specializations
    pub fn from_env() -> Self {
        let optimization_level = std::env::var("WARPJIT_OPT_LEVEL")
            .ok()
            .and_then(|s| OptimizationLevel::from_str(s.trim()).ok())
            .unwrap_or_default();
        let verify_specializations = std::env::var("WARPJIT_VERIFY_SPECIALIZATIONS")
            .map(|s| !matches!(s.trim(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        Self { optimization_level, verify_specializations }
    }
}
