#![forbid(unsafe_code)]

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectraRegistryConfig {
    /// Drop every pending row of a record once it is revealed. Replays of a collected
    /// request then fail as unknown instead of already-revealed.
    pub gc_pending_on_reveal: bool,
    pub audit_enabled: bool,
}

impl SpectraRegistryConfig {
    pub fn mvp_v1() -> Self {
        Self {
            gc_pending_on_reveal: false,
            audit_enabled: true,
        }
    }

    /// `mvp_v1` with `SPECTRA_GC_PENDING_ON_REVEAL` / `SPECTRA_AUDIT_ENABLED` overrides.
    pub fn from_env() -> Self {
        let base = Self::mvp_v1();
        Self {
            gc_pending_on_reveal: env_flag("SPECTRA_GC_PENDING_ON_REVEAL")
                .unwrap_or(base.gc_pending_on_reveal),
            audit_enabled: env_flag("SPECTRA_AUDIT_ENABLED").unwrap_or(base.audit_enabled),
        }
    }
}

impl Default for SpectraRegistryConfig {
    fn default() -> Self {
        Self::mvp_v1()
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|v| parse_flag(&v))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
