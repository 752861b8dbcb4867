//! CLI-local configuration, loaded through the teacher's `ConfigBuilder`
//! convention. Not used by the pure scheduler itself — only by this
//! binary's dry-run loop (`dataflow run`).

use tooling::config::{build_env_key, get_env_bool, get_env_parse_or, ConfigBuilder};
use tooling::Result;

/// Poll interval and concurrency knobs for the CLI's dry-run scheduler loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Milliseconds to sleep between `find_next_work` polls once a run goes
    /// to `NoWork` (the pure scheduler has no notion of a clock; this is
    /// entirely a CLI-loop concern).
    pub poll_interval_ms: u64,
    pub max_concurrent_nodes: usize,
    pub enable_input_concurrency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 100, max_concurrent_nodes: 10, enable_input_concurrency: true }
    }
}

impl ConfigBuilder for EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent_nodes == 0 {
            return Err(tooling::ToolingError::General("max_concurrent_nodes must be non-zero".to_string()));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            poll_interval_ms: get_env_parse_or(
                &build_env_key(prefix, "POLL_INTERVAL_MS"),
                defaults.poll_interval_ms,
            )?,
            max_concurrent_nodes: get_env_parse_or(
                &build_env_key(prefix, "MAX_CONCURRENT_NODES"),
                defaults.max_concurrent_nodes,
            )?,
            enable_input_concurrency: get_env_bool(&build_env_key(prefix, "ENABLE_INPUT_CONCURRENCY"))?
                .unwrap_or(defaults.enable_input_concurrency),
        })
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        self.poll_interval_ms = other.poll_interval_ms;
        self.max_concurrent_nodes = other.max_concurrent_nodes;
        self.enable_input_concurrency = other.enable_input_concurrency;
        self
    }
}

impl From<&EngineConfig> for dataflow_core::SchedulerConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            max_concurrent_nodes: cfg.max_concurrent_nodes,
            enable_input_concurrency: cfg.enable_input_concurrency,
            enable_yield_concurrency: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let cfg = EngineConfig { max_concurrent_nodes: 0, ..EngineConfig::default() };
        assert!(cfg.validate().is_err());
    }
}
