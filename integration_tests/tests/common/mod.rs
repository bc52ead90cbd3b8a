// Not every test binary uses every helper.
#![allow(dead_code)]

use core_protect::{
    ActorId, BlockPos, ClaimError, ClaimId, ClaimRegistry, ClaimsMode, CreateOptions,
    ProtectConfig, WorldId, WorldRules,
};

pub const WORLD: WorldId = WorldId(0);

pub fn registry() -> ClaimRegistry {
    ClaimRegistry::new(ProtectConfig::default())
}

/// Registry whose default world runs in survival-requiring-claims mode.
pub fn claims_required_registry(unrestricted: bool) -> ClaimRegistry {
    let mut config = ProtectConfig::default();
    config.default_rules = WorldRules {
        mode: ClaimsMode::SurvivalRequiringClaims,
        unrestricted_claiming: unrestricted,
        always_bypass: Vec::new(),
    };
    ClaimRegistry::new(config)
}

/// Create a full-height claim over the given horizontal rectangle.
pub fn claim(
    registry: &ClaimRegistry,
    owner: u128,
    (x1, z1): (i32, i32),
    (x2, z2): (i32, i32),
) -> Result<ClaimId, ClaimError> {
    registry.create_claim(
        WORLD,
        BlockPos::new(x1, 0, z1),
        BlockPos::new(x2, 255, z2),
        Some(ActorId(owner)),
        None,
        CreateOptions::default(),
    )
}

/// Create a subdivision of `parent` over the given rectangle.
pub fn subdivide(
    registry: &ClaimRegistry,
    parent: ClaimId,
    owner: u128,
    (x1, z1): (i32, i32),
    (x2, z2): (i32, i32),
) -> Result<ClaimId, ClaimError> {
    registry.create_claim(
        WORLD,
        BlockPos::new(x1, 0, z1),
        BlockPos::new(x2, 255, z2),
        Some(ActorId(owner)),
        Some(parent),
        CreateOptions::default(),
    )
}
