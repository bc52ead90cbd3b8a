//! Core claim-protection engine for the Wardstone prototype.
//!
//! Answers "may this actor do this action at this location" for a shared
//! block world: axis-aligned claims with nested subdivisions, layered trust
//! tiers, a cell-bucket spatial index for point lookup, and chunk-scale
//! terrain restoration for abandoned claims. Reads are lock-free against
//! atomically published per-world state; mutations are serialized and
//! publish complete successor states.

mod claim;
mod config;
mod geometry;
mod index;
mod registry;
pub mod restore;
mod trust;

pub use claim::{
    ActorId, ClaimArena, ClaimError, ClaimId, ClaimRecord, Grantee, TrustTier, WorldId,
};
pub use config::{ClaimsMode, ConfigError, ProtectConfig, WorldRules};
pub use geometry::{BlockPos, ClaimBox, CELL_SIZE};
pub use index::ClaimIndex;
pub use registry::{AbandonOutcome, ClaimRegistry, CreateOptions, LookupSession};
pub use restore::{
    apply_diff, apply_diff_filtered, classify, restore_region, BlockKind, ChunkSnapshot,
    RegionDiff, RestoreOptions, RestorePipeline, RestoreRegion,
};
pub use trust::{
    resolve, resolve_chain, ActionKind, ActorFlags, ActorSnapshot, Decision, DenialReason,
};
