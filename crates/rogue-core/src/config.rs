//! Configuration using Figment.
//!
//! Settings are layered:
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. environment variables prefixed with `ROGUE_`, `__` separating levels
//!    (`ROGUE_POOL__HARD_CAP=16`, `ROGUE_MEMORY__TIMEOUT=250ms`)
//!
//! Nothing is read until the application calls [`RogueConfig::load`] or
//! [`RogueConfig::from_file`]; the core itself never consults files or the
//! environment.
//!
//! # Example
//! ```no_run
//! use rogue_core::config::RogueConfig;
//!
//! let config = RogueConfig::from_file("rogue.toml")?;
//! config.validate()?;
//! println!("pool slot size: {}", config.pool.fixed_size);
//! # Ok::<(), rogue_core::RogueError>(())
//! ```

use crate::error::{Result, RogueError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rogue_pool::{CapPolicy, PoolConfig, DEFAULT_SOFT_CAP};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ROGUE_";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RogueConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Frame pool settings
    pub pool: PoolSettings,
    /// Memory transaction settings
    pub memory: MemorySettings,
    /// Fifo defaults
    pub fifo: FifoSettings,
}

impl Default for RogueConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            pool: PoolSettings::default(),
            memory: MemorySettings::default(),
            fifo: FifoSettings::default(),
        }
    }
}

/// Cap policy as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySetting {
    /// Wait for a free region
    #[default]
    Block,
    /// Fail immediately
    Fail,
    /// Wait up to `pool.timeout`
    BlockTimeout,
}

/// Pool construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Slot size in bytes (0 = variable)
    pub fixed_size: usize,
    /// Outstanding region limit (0 = unbounded)
    pub hard_cap: usize,
    /// Free list length, clamped to `hard_cap` when that is bounded
    pub soft_cap: usize,
    /// Behaviour at the hard cap
    pub policy: PolicySetting,
    /// Wait bound for `block_timeout`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Mark regions as DMA-mapped
    pub zero_copy: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            fixed_size: 0,
            hard_cap: 0,
            soft_cap: DEFAULT_SOFT_CAP,
            policy: PolicySetting::Block,
            timeout: Duration::from_secs(1),
            zero_copy: false,
        }
    }
}

impl PoolSettings {
    /// Free list length after clamping to the hard cap.
    #[must_use]
    pub fn effective_soft_cap(&self) -> usize {
        if self.hard_cap > 0 {
            self.soft_cap.min(self.hard_cap)
        } else {
            self.soft_cap
        }
    }

    /// Build a pool configuration named `name`.
    #[must_use]
    pub fn to_pool_config(&self, name: impl Into<String>) -> PoolConfig {
        let policy = match self.policy {
            PolicySetting::Block => CapPolicy::Block,
            PolicySetting::Fail => CapPolicy::Fail,
            PolicySetting::BlockTimeout => CapPolicy::BlockTimeout(self.timeout),
        };

        PoolConfig::fixed(self.fixed_size)
            .with_name(name)
            .with_cap(self.hard_cap, self.effective_soft_cap())
            .with_policy(policy)
            .with_zero_copy(self.zero_copy)
    }
}

/// Memory transaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Per-transaction timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Minimum access size in bytes
    pub min_access: u32,
    /// Maximum access size in bytes
    pub max_access: u32,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            min_access: 4,
            max_access: 4,
        }
    }
}

/// Fifo construction settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FifoSettings {
    /// Queue depth before dropping (0 = unbounded)
    pub max_depth: usize,
    /// Bytes kept per copied frame (0 = all)
    pub trim_size: usize,
    /// Forward frames without copying
    pub no_copy: bool,
}

impl RogueConfig {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(RogueConfig::default()))
    }

    /// Load defaults overridden by the environment.
    pub fn load() -> Result<Self> {
        Ok(Self::figment()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Load defaults, then `path`, then the environment.
    ///
    /// A missing file is not an error; the defaults apply.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::figment()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Semantic checks that deserialization cannot express.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(RogueError::Config(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.pool.policy == PolicySetting::BlockTimeout && self.pool.timeout.is_zero() {
            return Err(RogueError::Config(
                "pool.timeout must be non-zero for block_timeout".to_string(),
            ));
        }

        if self.memory.timeout.is_zero() {
            return Err(RogueError::Config(
                "memory.timeout must be non-zero".to_string(),
            ));
        }

        if self.memory.min_access == 0 || self.memory.min_access > self.memory.max_access {
            return Err(RogueError::Config(format!(
                "memory.min_access ({}) must be non-zero and at most memory.max_access ({})",
                self.memory.min_access, self.memory.max_access
            )));
        }

        Ok(())
    }
}
