//! Tuning and policy configuration.
//!
//! A [`ProtectConfig`] carries global defaults plus per-world overrides,
//! mirroring how server operators configure one baseline and special-case a
//! few dimensions. Loading/saving the config is the host's job; these
//! structs only need to deserialize from whatever it uses.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::claim::ActorId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How claiming interacts with wilderness building in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ClaimsMode {
    /// Anyone may modify wilderness; claims only protect claimed land.
    #[default]
    OpenSurvival,
    /// Wilderness is read-only; all building happens inside claims.
    Creative,
    /// Survival rules, but building still requires a claim.
    SurvivalRequiringClaims,
}

/// Per-world policy knobs consulted by the trust resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldRules {
    pub mode: ClaimsMode,
    /// When set, players may claim freely and the starter-placement
    /// wilderness exception is disabled (it exists to bootstrap a first
    /// claim, which unrestricted claiming makes unnecessary).
    pub unrestricted_claiming: bool,
    /// Server-level accounts that bypass every claim check (mod-created
    /// service actors, for example).
    pub always_bypass: Vec<ActorId>,
}

impl Default for WorldRules {
    fn default() -> Self {
        Self {
            mode: ClaimsMode::OpenSurvival,
            unrestricted_claiming: false,
            always_bypass: Vec::new(),
        }
    }
}

impl WorldRules {
    pub fn bypasses(&self, actor: ActorId) -> bool {
        self.always_bypass.contains(&actor)
    }
}

/// Global configuration with per-world overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectConfig {
    pub default_rules: WorldRules,
    pub world_rules: AHashMap<u32, WorldRules>,
    /// Claims larger than this footprint are never auto-restored on
    /// abandon; restoring them is too expensive.
    pub max_restore_area: u64,
    /// Restoration scans each column starting this far below sea level.
    pub restore_depth_below_sea: i32,
    pub sea_level: i32,
    /// World build ceiling used when sizing restoration snapshots.
    pub world_height: i32,
}

impl Default for ProtectConfig {
    fn default() -> Self {
        Self {
            default_rules: WorldRules::default(),
            world_rules: AHashMap::new(),
            max_restore_area: 10_000,
            restore_depth_below_sea: 15,
            sea_level: 63,
            world_height: 256,
        }
    }
}

impl ProtectConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Rules for a world: the override when present, the default otherwise.
    pub fn rules_for(&self, world: u32) -> &WorldRules {
        self.world_rules.get(&world).unwrap_or(&self.default_rules)
    }

    /// Lowest y a restoration pass will touch.
    pub fn restore_min_height(&self) -> i32 {
        self.sea_level - self.restore_depth_below_sea
    }
}
