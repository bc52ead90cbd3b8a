//! Persistence and interchange contracts for Wardstone claim data.
//!
//! These types are the boundary between the in-memory claim engine and
//! whatever durable store the host embeds it in. They carry no engine
//! logic: `core_protect` converts its records to and from these structs
//! at world load/export time.

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::hash::{BuildHasher, Hasher};

/// Flattened trust-list entry. `kind` discriminates actor / group / the
/// public sentinel so stores that only understand strings can round-trip it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GranteeState {
    pub kind: GranteeKind,
    /// Actor uuid (as u128) for `Actor`, group name for `Group`, empty for `Public`.
    pub actor: u128,
    pub group: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum GranteeKind {
    Actor = 0,
    Group = 1,
    Public = 2,
}

/// One claim record, flattened for storage.
///
/// Corner invariant (`lesser <= greater` componentwise) is re-validated by
/// the engine on load; a store that hands back inverted corners is rejected
/// rather than silently normalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimState {
    pub id: u64,
    pub world: u32,
    pub lesser: [i32; 3],
    pub greater: [i32; 3],
    /// Zero means an administrative claim (no owner).
    pub owner: u128,
    pub has_owner: bool,
    /// Zero means top-level.
    pub parent: u64,
    pub children: Vec<u64>,
    pub access_trust: Vec<GranteeState>,
    pub container_trust: Vec<GranteeState>,
    pub build_trust: Vec<GranteeState>,
    pub manage_trust: Vec<GranteeState>,
}

/// Complete claim set for one world, as loaded at process start and
/// exported at shutdown.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldClaimSet {
    pub world: u32,
    /// Next id the registry may assign; must exceed every id in `claims`.
    pub next_claim_id: u64,
    pub claims: Vec<ClaimState>,
    /// Deterministic content hash over the encoded set with this field zeroed.
    pub hash: u64,
}

/// One cell of a restoration diff: position plus the block kind to write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockChange {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub block: u16,
}

impl WorldClaimSet {
    pub fn finalize(mut self) -> Self {
        self.hash = 0;
        self.hash = hash_claim_set(&self);
        self
    }
}

pub fn hash_claim_set(set: &WorldClaimSet) -> u64 {
    let mut clone = set.clone();
    clone.hash = 0;
    let encoded = bincode::serialize(&clone).expect("claim set serialization for hashing");
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    hasher.finish()
}

pub fn encode_claim_set(set: &WorldClaimSet) -> bincode::Result<Vec<u8>> {
    bincode::serialize(set)
}

pub fn decode_claim_set(data: &[u8]) -> bincode::Result<WorldClaimSet> {
    bincode::deserialize(data)
}

pub fn encode_claim_set_json(set: &WorldClaimSet) -> serde_json::Result<String> {
    serde_json::to_string(set)
}

pub fn decode_claim_set_json(data: &str) -> serde_json::Result<WorldClaimSet> {
    serde_json::from_str(data)
}
