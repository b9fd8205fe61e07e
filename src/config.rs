//! Deployment-level configuration (§9 "Configuration knobs").
//!
//! Deserializable from the environment-derived config file a deployment supplies, in the
//! manner `apollo-router`'s own `Configuration` is loaded: one struct, `serde`-derived, with
//! `#[serde(default)]` covering every field so a near-empty config file is valid.

use serde::{Deserialize, Serialize};

fn default_identity_fields() -> Vec<String> {
    vec![
        "subject".to_string(),
        "predicate".to_string(),
        "object".to_string(),
        "api_name".to_string(),
    ]
}

fn default_cache_ttl_seconds() -> u64 {
    600
}

/// Runtime configuration for one deployment of the engine (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Field names read off a [`crate::record::Record`] to compute its identity hash, in order
    /// (§4.5 "Key" / Invariant 3). Changing this list across a deployment changes every record's
    /// hash, which invalidates any previously cached entries still addressed by the old hash.
    pub identity_fields: Vec<String>,

    /// Source identifiers allowed to be promoted to a curated `supporting_data_source` /
    /// `primary_knowledge_source` pair rather than the generic aggregator/primary fallback
    /// (§4.7 "Attribute shaping").
    pub curated_sources: Vec<String>,

    /// Source identifiers whose upstream API is itself TRAPI-native, i.e. the records it returns
    /// already carry TRAPI-shaped attributes rather than this engine's own ad hoc field names
    /// (§4.7 "Attribute shaping"). Checked before `curated_sources` so a source named in both
    /// lists is treated as TRAPI-native.
    pub trapi_native_sources: Vec<String>,

    /// Default TTL, in seconds, for cache entries written by [`crate::cache::CacheHandler`]
    /// (§4.5). Overridable per-deployment via `REDIS_KEY_EXPIRE_TIME` ([`EngineConfig::from_env`]).
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Master toggle for result caching (§4.5, §9). When `false`, [`crate::cache::CacheHandler`]
    /// is never constructed and every edge executes against the live batch handler.
    pub result_caching_enabled: bool,

    /// Redis connection target. Presence (both host and port set) is what actually enables
    /// caching in a live deployment; `result_caching_enabled` is the operator's explicit choice
    /// on top of that (§9).
    pub redis_host: Option<String>,
    pub redis_port: Option<u16>,

    /// Optional filesystem path to dump every record ever stored, for offline debugging
    /// (§9 "Design Notes" misc. knobs). `dump_records_reverse` controls whether dumped
    /// reverse-direction edges get their subject/object swapped back to the original QEdge
    /// orientation before writing.
    pub dump_records_path: Option<String>,
    pub dump_records_reverse: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            identity_fields: default_identity_fields(),
            curated_sources: Vec::new(),
            trapi_native_sources: Vec::new(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            result_caching_enabled: false,
            redis_host: None,
            redis_port: None,
            dump_records_path: None,
            dump_records_reverse: false,
        }
    }
}

impl EngineConfig {
    /// Caching is only actually active when both the operator's toggle is on and a Redis
    /// endpoint has been configured (§9).
    pub fn caching_active(&self) -> bool {
        self.result_caching_enabled && self.redis_host.is_some() && self.redis_port.is_some()
    }

    /// Overlays the process environment onto `base` (§6, §9: "Environment flags ... are read
    /// once into `EngineConfig`, not scattered `std::env::var` calls"). A variable that's unset
    /// leaves `base`'s field untouched; one that's set but fails to parse is logged and ignored
    /// rather than treated as fatal, so a deployment's config file still takes effect.
    pub fn from_env(base: EngineConfig) -> EngineConfig {
        let mut config = base;

        if let Some(flag) = read_bool_env("RESULT_CACHING") {
            config.result_caching_enabled = flag;
        }
        if let Some(ttl) = read_parsed_env::<u64>("REDIS_KEY_EXPIRE_TIME") {
            config.cache_ttl_seconds = ttl;
        }
        if let Ok(host) = std::env::var("REDIS_HOST") {
            config.redis_host = Some(host);
        }
        if let Some(port) = read_parsed_env::<u16>("REDIS_PORT") {
            config.redis_port = Some(port);
        }
        if let Ok(path) = std::env::var("DUMP_RECORDS_PATH") {
            config.dump_records_path = Some(path);
        }

        config
    }
}

fn read_bool_env(name: &str) -> Option<bool> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => {
                tracing::warn!(name, value = raw, "ignoring unrecognized boolean environment flag");
                None
            }
        },
        Err(_) => None,
    }
}

fn read_parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(name, value = raw, "ignoring unparseable environment flag");
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_caching() {
        let cfg = EngineConfig::default();
        assert!(!cfg.caching_active());
        assert_eq!(cfg.cache_ttl_seconds, 600);
    }

    #[test]
    fn caching_requires_host_and_toggle() {
        let mut cfg = EngineConfig {
            result_caching_enabled: true,
            ..EngineConfig::default()
        };
        assert!(!cfg.caching_active());
        cfg.redis_host = Some("localhost".to_string());
        cfg.redis_port = Some(6379);
        assert!(cfg.caching_active());
    }

    // Environment variable tests run serially within this process (the crate has no other test
    // that touches these names), since `std::env::set_var` affects the whole process.
    #[test]
    fn from_env_overlays_recognized_flags() {
        std::env::set_var("RESULT_CACHING", "true");
        std::env::set_var("REDIS_KEY_EXPIRE_TIME", "120");
        std::env::set_var("REDIS_HOST", "cache.internal");
        std::env::set_var("REDIS_PORT", "6380");
        std::env::set_var("DUMP_RECORDS_PATH", "/tmp/records.jsonl");

        let cfg = EngineConfig::from_env(EngineConfig::default());
        assert!(cfg.result_caching_enabled);
        assert_eq!(cfg.cache_ttl_seconds, 120);
        assert_eq!(cfg.redis_host.as_deref(), Some("cache.internal"));
        assert_eq!(cfg.redis_port, Some(6380));
        assert_eq!(cfg.dump_records_path.as_deref(), Some("/tmp/records.jsonl"));

        for name in [
            "RESULT_CACHING",
            "REDIS_KEY_EXPIRE_TIME",
            "REDIS_HOST",
            "REDIS_PORT",
            "DUMP_RECORDS_PATH",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn from_env_ignores_unparseable_values_and_keeps_base() {
        std::env::set_var("REDIS_KEY_EXPIRE_TIME", "not-a-number");

        let base = EngineConfig {
            cache_ttl_seconds: 42,
            ..EngineConfig::default()
        };
        let cfg = EngineConfig::from_env(base);
        assert_eq!(cfg.cache_ttl_seconds, 42);

        std::env::remove_var("REDIS_KEY_EXPIRE_TIME");
    }
}
