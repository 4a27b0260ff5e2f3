//! Configuration surface for the routine-call subsystem.
//! The embedding connection layer owns how these settings are sourced (URL
//! properties, config file, defaults); this module only defines the shape.

use serde::Deserialize;

pub const DEFAULT_SIGNATURE_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Skip the parameter catalog entirely and resolve signatures from the
    /// routine's creation DDL. For deployments where catalog tables are not
    /// readable by the connecting account.
    pub restricted_catalog_access: bool,
    /// Permit a fabricated all-IN signature when neither catalog nor DDL
    /// metadata is obtainable for text that looks like a genuine routine call.
    pub relaxed_synthetic_params: bool,
    /// Bounded capacity of the shared signature cache. Zero disables caching.
    pub signature_cache_capacity: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            restricted_catalog_access: false,
            relaxed_synthetic_params: false,
            signature_cache_capacity: DEFAULT_SIGNATURE_CACHE_CAPACITY,
        }
    }
}
