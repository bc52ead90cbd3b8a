//! Claim records: the protected-region entity, its trust lists, and its
//! hierarchy links.
//!
//! Records refer to each other by id only; the registry owns the arena and
//! supplies parent/child boxes where an operation needs them. That keeps a
//! record copyable in O(its own size) for snapshot reads.

use ahash::AHashSet;
use std::fmt;
use std::sync::Arc;

use claim_schema::{ClaimState, GranteeKind, GranteeState};

use crate::geometry::{BlockPos, ClaimBox};

/// Arena of published claim records, keyed by stable id. Parent/child links
/// are ids into this map, never direct references, so snapshot reads copy a
/// record rather than a graph.
pub type ClaimArena = ahash::AHashMap<ClaimId, Arc<ClaimRecord>>;

/// Identifier for a claim. Assigned monotonically by the registry, so a
/// larger id always means a more recently created claim.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ClaimId(pub u64);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a world/dimension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct WorldId(pub u32);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a player or other acting entity (uuid bits).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ActorId(pub u128);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A member of a trust list: a single actor, a named group, or everyone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grantee {
    Actor(ActorId),
    Group(String),
    Public,
}

/// Trust tiers in ascending order of capability. Each tier is an
/// independent set on the record; the resolver computes the effective
/// maximum, so a grantee listed only in `Build` still gets everything
/// `Access` would allow.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum TrustTier {
    Access,
    Container,
    Build,
    Manage,
}

impl TrustTier {
    pub const ALL: [TrustTier; 4] = [
        TrustTier::Access,
        TrustTier::Container,
        TrustTier::Build,
        TrustTier::Manage,
    ];
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrustTier::Access => "access",
            TrustTier::Container => "container",
            TrustTier::Build => "build",
            TrustTier::Manage => "manage",
        };
        f.write_str(name)
    }
}

/// Error kinds for claim mutations. Permission denials are not errors;
/// see [`crate::trust::Decision`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("box corners are inverted or malformed")]
    GeometryInvalid,
    #[error("box overlaps sibling claim {0}")]
    Overlap(ClaimId),
    #[error("subdivision is not contained in its parent claim")]
    ParentViolation,
    #[error("child subdivision {0} would no longer be contained")]
    ChildViolation(ClaimId),
    #[error("claim has subdivisions; delete with cascade or remove them first")]
    HasChildren,
    #[error("unknown claim {0}")]
    NotFound(ClaimId),
}

/// A protected region: an axis-aligned box, an optional owner, optional
/// hierarchy links, and one grantee set per trust tier.
#[derive(Debug, Clone)]
pub struct ClaimRecord {
    id: ClaimId,
    world: WorldId,
    bounds: ClaimBox,
    /// `None` marks an administrative claim: no owner, exempt from economy
    /// rules, never auto-restored on abandon.
    owner: Option<ActorId>,
    parent: Option<ClaimId>,
    children: Vec<ClaimId>,
    access_trust: AHashSet<Grantee>,
    container_trust: AHashSet<Grantee>,
    build_trust: AHashSet<Grantee>,
    manage_trust: AHashSet<Grantee>,
    in_siege: bool,
    siege_started_at: Option<u64>,
    /// Cached horizontal footprint; recomputed on every resize.
    area: u64,
}

impl ClaimRecord {
    pub fn new(
        id: ClaimId,
        world: WorldId,
        bounds: ClaimBox,
        owner: Option<ActorId>,
        parent: Option<ClaimId>,
    ) -> Self {
        Self {
            id,
            world,
            bounds,
            owner,
            parent,
            children: Vec::new(),
            access_trust: AHashSet::new(),
            container_trust: AHashSet::new(),
            build_trust: AHashSet::new(),
            manage_trust: AHashSet::new(),
            in_siege: false,
            siege_started_at: None,
            area: bounds.area(),
        }
    }

    pub fn id(&self) -> ClaimId {
        self.id
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn bounds(&self) -> ClaimBox {
        self.bounds
    }

    pub fn owner(&self) -> Option<ActorId> {
        self.owner
    }

    pub fn is_admin(&self) -> bool {
        self.owner.is_none()
    }

    pub fn parent(&self) -> Option<ClaimId> {
        self.parent
    }

    pub fn is_subdivision(&self) -> bool {
        self.parent.is_some()
    }

    pub fn children(&self) -> &[ClaimId] {
        &self.children
    }

    pub fn area(&self) -> u64 {
        self.area
    }

    pub fn in_siege(&self) -> bool {
        self.in_siege
    }

    pub fn siege_started_at(&self) -> Option<u64> {
        self.siege_started_at
    }

    pub(crate) fn push_child(&mut self, child: ClaimId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: ClaimId) {
        self.children.retain(|c| *c != child);
    }

    /// Replace the owner transactionally. Used by ownership transfer; the
    /// registry publishes the updated record as one atomic swap, so readers
    /// never observe a half-transferred claim.
    pub(crate) fn set_owner(&mut self, owner: Option<ActorId>) {
        self.owner = owner;
    }

    pub(crate) fn begin_siege(&mut self, now_epoch_secs: u64) {
        self.in_siege = true;
        self.siege_started_at = Some(now_epoch_secs);
    }

    pub(crate) fn end_siege(&mut self) {
        self.in_siege = false;
        self.siege_started_at = None;
    }

    /// Validate and apply a resize, returning the old box so the caller can
    /// update the spatial index transactionally. The record never touches
    /// the index itself.
    ///
    /// `parent_bounds` must be supplied when the claim is a subdivision;
    /// `child_bounds` lists each child's (id, box).
    pub fn resize(
        &mut self,
        new_lesser: BlockPos,
        new_greater: BlockPos,
        parent_bounds: Option<&ClaimBox>,
        child_bounds: &[(ClaimId, ClaimBox)],
    ) -> Result<ClaimBox, ClaimError> {
        let new_bounds =
            ClaimBox::try_new(new_lesser, new_greater).ok_or(ClaimError::GeometryInvalid)?;
        if let Some(parent) = parent_bounds {
            if !parent.contains(&new_bounds) {
                return Err(ClaimError::ParentViolation);
            }
        }
        for (child, bounds) in child_bounds {
            if !new_bounds.contains(bounds) {
                return Err(ClaimError::ChildViolation(*child));
            }
        }
        let old = self.bounds;
        self.bounds = new_bounds;
        self.area = new_bounds.area();
        Ok(old)
    }

    fn tier_set(&self, tier: TrustTier) -> &AHashSet<Grantee> {
        match tier {
            TrustTier::Access => &self.access_trust,
            TrustTier::Container => &self.container_trust,
            TrustTier::Build => &self.build_trust,
            TrustTier::Manage => &self.manage_trust,
        }
    }

    fn tier_set_mut(&mut self, tier: TrustTier) -> &mut AHashSet<Grantee> {
        match tier {
            TrustTier::Access => &mut self.access_trust,
            TrustTier::Container => &mut self.container_trust,
            TrustTier::Build => &mut self.build_trust,
            TrustTier::Manage => &mut self.manage_trust,
        }
    }

    /// Idempotent: granting an existing member is a no-op success.
    pub fn grant_trust(&mut self, tier: TrustTier, grantee: Grantee) {
        self.tier_set_mut(tier).insert(grantee);
    }

    /// Idempotent: revoking a non-member is a no-op success.
    pub fn revoke_trust(&mut self, tier: TrustTier, grantee: &Grantee) {
        self.tier_set_mut(tier).remove(grantee);
    }

    pub fn trusted(&self, tier: TrustTier, grantee: &Grantee) -> bool {
        self.tier_set(tier).contains(grantee)
    }

    /// The highest tier the actor qualifies for via direct grant, group
    /// membership, or the public sentinel. Ownership short-circuits to
    /// `Manage` regardless of trust lists.
    pub fn effective_tier(&self, actor: ActorId, groups: &[String]) -> Option<TrustTier> {
        if self.owner == Some(actor) {
            return Some(TrustTier::Manage);
        }
        let direct = Grantee::Actor(actor);
        for tier in TrustTier::ALL.iter().rev() {
            let set = self.tier_set(*tier);
            if set.contains(&direct) || set.contains(&Grantee::Public) {
                return Some(*tier);
            }
            if groups.iter().any(|g| set.contains(&Grantee::Group(g.clone()))) {
                return Some(*tier);
            }
        }
        None
    }

    /// Flatten for the persistence boundary. Trust lists are emitted in a
    /// sorted order so the exported set hashes deterministically.
    pub fn to_state(&self) -> ClaimState {
        ClaimState {
            id: self.id.0,
            world: self.world.0,
            lesser: {
                let l = self.bounds.lesser();
                [l.x, l.y, l.z]
            },
            greater: {
                let g = self.bounds.greater();
                [g.x, g.y, g.z]
            },
            owner: self.owner.map(|a| a.0).unwrap_or(0),
            has_owner: self.owner.is_some(),
            parent: self.parent.map(|p| p.0).unwrap_or(0),
            children: self.children.iter().map(|c| c.0).collect(),
            access_trust: grantees_to_state(&self.access_trust),
            container_trust: grantees_to_state(&self.container_trust),
            build_trust: grantees_to_state(&self.build_trust),
            manage_trust: grantees_to_state(&self.manage_trust),
        }
    }

    /// Rebuild from storage. Rejects inverted corners rather than
    /// normalizing: a store handing back malformed boxes is a bug upstream.
    pub fn from_state(state: &ClaimState) -> Result<Self, ClaimError> {
        let lesser = BlockPos::new(state.lesser[0], state.lesser[1], state.lesser[2]);
        let greater = BlockPos::new(state.greater[0], state.greater[1], state.greater[2]);
        let bounds = ClaimBox::try_new(lesser, greater).ok_or(ClaimError::GeometryInvalid)?;
        let mut record = ClaimRecord::new(
            ClaimId(state.id),
            WorldId(state.world),
            bounds,
            state.has_owner.then_some(ActorId(state.owner)),
            (state.parent != 0).then_some(ClaimId(state.parent)),
        );
        record.children = state.children.iter().map(|c| ClaimId(*c)).collect();
        record.access_trust = grantees_from_state(&state.access_trust);
        record.container_trust = grantees_from_state(&state.container_trust);
        record.build_trust = grantees_from_state(&state.build_trust);
        record.manage_trust = grantees_from_state(&state.manage_trust);
        Ok(record)
    }
}

fn grantees_to_state(set: &AHashSet<Grantee>) -> Vec<GranteeState> {
    let mut out: Vec<GranteeState> = set
        .iter()
        .map(|grantee| match grantee {
            Grantee::Actor(actor) => GranteeState {
                kind: GranteeKind::Actor,
                actor: actor.0,
                group: String::new(),
            },
            Grantee::Group(group) => GranteeState {
                kind: GranteeKind::Group,
                actor: 0,
                group: group.clone(),
            },
            Grantee::Public => GranteeState {
                kind: GranteeKind::Public,
                actor: 0,
                group: String::new(),
            },
        })
        .collect();
    out.sort_by(|a, b| (a.kind as u8, a.actor, &a.group).cmp(&(b.kind as u8, b.actor, &b.group)));
    out
}

fn grantees_from_state(list: &[GranteeState]) -> AHashSet<Grantee> {
    list.iter()
        .map(|state| match state.kind {
            GranteeKind::Actor => Grantee::Actor(ActorId(state.actor)),
            GranteeKind::Group => Grantee::Group(state.group.clone()),
            GranteeKind::Public => Grantee::Public,
        })
        .collect()
}
