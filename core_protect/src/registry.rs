//! The claim registry: one facade owning per-world claim state.
//!
//! Readers (point lookups, permission checks) run lock-free against an
//! atomically published snapshot of each world's arena and index. Mutators
//! serialize on a writer mutex, build the complete successor state off to
//! the side, and publish it with a single atomic store: a reader sees the
//! fully-old or fully-new world, never a half-applied mutation. Worlds are
//! independent; a write in one world never blocks reads in another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use arc_swap::ArcSwap;
use tracing::{debug, info, trace};

use claim_schema::WorldClaimSet;

use crate::claim::{ActorId, ClaimArena, ClaimError, ClaimId, ClaimRecord, Grantee, TrustTier, WorldId};
use crate::config::ProtectConfig;
use crate::geometry::{BlockPos, ClaimBox};
use crate::index::ClaimIndex;
use crate::trust::{self, ActionKind, ActorSnapshot, Decision};

/// Published per-world state. Immutable once stored; mutation replaces the
/// whole value.
#[derive(Debug, Clone)]
struct WorldClaims {
    arena: ClaimArena,
    index: ClaimIndex,
}

impl WorldClaims {
    fn new() -> Self {
        Self {
            arena: ClaimArena::new(),
            index: ClaimIndex::new(),
        }
    }
}

type WorldTable = AHashMap<WorldId, Arc<WorldClaims>>;

/// Options applied at claim creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Permit the new subdivision to overlap sibling subdivisions. Applies
    /// at creation only; resize never bypasses the overlap check.
    pub allow_sibling_overlap: bool,
}

/// Result of an abandon operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbandonOutcome {
    /// Claims removed, the abandoned claim included.
    pub removed: usize,
    /// Whether the abandoned area is eligible for automatic terrain
    /// restoration: administrative claims and oversized claims are not.
    pub restorable: bool,
}

/// Per-actor lookup hint: the last claim a point query resolved to, per
/// world. Consecutive queries from one actor are usually spatially close,
/// so the hint short-circuits the index most of the time. It is only a
/// hint, always revalidated by containment before use; wrong hints just
/// fall through to the index.
#[derive(Debug, Clone, Default)]
pub struct LookupSession {
    last: AHashMap<WorldId, ClaimId>,
}

impl LookupSession {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct ClaimRegistry {
    worlds: ArcSwap<WorldTable>,
    /// Serializes all mutations; readers never touch it.
    write_guard: Mutex<()>,
    next_id: AtomicU64,
    config: ProtectConfig,
}

impl ClaimRegistry {
    pub fn new(config: ProtectConfig) -> Self {
        Self {
            worlds: ArcSwap::from_pointee(WorldTable::new()),
            write_guard: Mutex::new(()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &ProtectConfig {
        &self.config
    }

    // ---- mutation plumbing ------------------------------------------------

    /// Run one mutation against a private copy of `world`'s state and
    /// publish the result atomically. Errors leave the published state
    /// untouched.
    fn mutate<T>(
        &self,
        world: WorldId,
        op: impl FnOnce(&mut WorldClaims) -> Result<T, ClaimError>,
    ) -> Result<T, ClaimError> {
        let _guard = self.write_guard.lock().expect("claim writer mutex poisoned");
        let current = self.worlds.load_full();
        let mut state = current
            .get(&world)
            .map(|state| (**state).clone())
            .unwrap_or_else(WorldClaims::new);
        let out = op(&mut state)?;
        let mut table = (*current).clone();
        table.insert(world, Arc::new(state));
        self.worlds.store(Arc::new(table));
        Ok(out)
    }

    /// World holding `id`, or `NotFound`. Claims never move between worlds,
    /// so the answer can only go stale if the claim is deleted concurrently,
    /// which the subsequent arena lookup reports as `NotFound`.
    fn locate(&self, id: ClaimId) -> Result<WorldId, ClaimError> {
        let table = self.worlds.load();
        table
            .iter()
            .find(|(_, state)| state.arena.contains_key(&id))
            .map(|(world, _)| *world)
            .ok_or(ClaimError::NotFound(id))
    }

    // ---- claim lifecycle --------------------------------------------------

    /// Create a claim (or subdivision when `parent` is set) after geometry,
    /// containment, and overlap validation.
    pub fn create_claim(
        &self,
        world: WorldId,
        lesser: BlockPos,
        greater: BlockPos,
        owner: Option<ActorId>,
        parent: Option<ClaimId>,
        options: CreateOptions,
    ) -> Result<ClaimId, ClaimError> {
        let bounds = ClaimBox::try_new(lesser, greater).ok_or(ClaimError::GeometryInvalid)?;
        let id = ClaimId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.mutate(world, |state| {
            if let Some(parent_id) = parent {
                let parent_record = state
                    .arena
                    .get(&parent_id)
                    .ok_or(ClaimError::NotFound(parent_id))?;
                if !parent_record.bounds().contains(&bounds) {
                    return Err(ClaimError::ParentViolation);
                }
            }
            if options.allow_sibling_overlap {
                state.index.insert_unchecked(id, bounds);
            } else {
                state.index.insert(id, bounds, parent, &state.arena)?;
            }
            let record = ClaimRecord::new(id, world, bounds, owner, parent);
            state.arena.insert(id, Arc::new(record));
            if let Some(parent_id) = parent {
                record_mut(&mut state.arena, parent_id)?.push_child(id);
            }
            Ok(())
        })?;
        info!(claim = id.0, world = world.0, subdivision = parent.is_some(), "claim created");
        Ok(id)
    }

    /// Resize a claim, revalidating parent containment, child containment,
    /// and sibling overlap. The spatial index footprint moves in the same
    /// atomic publish.
    pub fn resize_claim(
        &self,
        id: ClaimId,
        new_lesser: BlockPos,
        new_greater: BlockPos,
    ) -> Result<(), ClaimError> {
        let world = self.locate(id)?;
        self.mutate(world, |state| {
            let record = state.arena.get(&id).ok_or(ClaimError::NotFound(id))?;
            let parent = record.parent();
            let parent_bounds = match parent {
                Some(parent_id) => Some(
                    state
                        .arena
                        .get(&parent_id)
                        .ok_or(ClaimError::NotFound(parent_id))?
                        .bounds(),
                ),
                None => None,
            };
            let child_bounds: Vec<(ClaimId, ClaimBox)> = record
                .children()
                .iter()
                .map(|child| {
                    state
                        .arena
                        .get(child)
                        .map(|c| (*child, c.bounds()))
                        .ok_or(ClaimError::NotFound(*child))
                })
                .collect::<Result<_, _>>()?;

            let new_bounds =
                ClaimBox::try_new(new_lesser, new_greater).ok_or(ClaimError::GeometryInvalid)?;
            if let Some(other) = state
                .index
                .find_overlapping(new_bounds, Some(id), &state.arena)
                .find(|other| state.arena[other].parent() == parent)
            {
                return Err(ClaimError::Overlap(other));
            }

            let record = record_mut(&mut state.arena, id)?;
            let old = record.resize(new_lesser, new_greater, parent_bounds.as_ref(), &child_bounds)?;
            state.index.remove(id, old);
            state.index.insert_unchecked(id, new_bounds);
            Ok(())
        })?;
        debug!(claim = id.0, "claim resized");
        Ok(())
    }

    /// Delete a claim. With `cascade`, subdivisions go with it; without,
    /// a claim that still has children is refused.
    pub fn delete_claim(&self, id: ClaimId, cascade: bool) -> Result<(), ClaimError> {
        let world = self.locate(id)?;
        let removed = self.mutate(world, |state| remove_tree(state, id, cascade))?;
        info!(claim = id.0, world = world.0, removed, "claim deleted");
        Ok(())
    }

    /// Abandon a claim and report whether its terrain is eligible for
    /// automatic restoration. `top_level` removes all descendants (the
    /// abandon-top-level command); otherwise the claim must be childless.
    pub fn abandon_claim(&self, id: ClaimId, top_level: bool) -> Result<AbandonOutcome, ClaimError> {
        let world = self.locate(id)?;
        let max_area = self.config.max_restore_area;
        let outcome = self.mutate(world, |state| {
            let record = state.arena.get(&id).ok_or(ClaimError::NotFound(id))?;
            // Admin claims are never auto-restored; huge claims cost too
            // much to restore.
            let restorable = !record.is_admin() && record.area() <= max_area;
            let removed = remove_tree(state, id, top_level)?;
            Ok(AbandonOutcome { removed, restorable })
        })?;
        info!(
            claim = id.0,
            world = world.0,
            removed = outcome.removed,
            restorable = outcome.restorable,
            "claim abandoned"
        );
        Ok(outcome)
    }

    /// Replace the claim's owner transactionally. Passing `None` converts
    /// the claim to an administrative claim; passing `Some` converts an
    /// administrative claim to a private one.
    pub fn transfer_claim(&self, id: ClaimId, new_owner: Option<ActorId>) -> Result<(), ClaimError> {
        let world = self.locate(id)?;
        self.mutate(world, |state| {
            record_mut(&mut state.arena, id)?.set_owner(new_owner);
            Ok(())
        })?;
        info!(claim = id.0, admin = new_owner.is_none(), "claim ownership transferred");
        Ok(())
    }

    // ---- trust and siege --------------------------------------------------

    pub fn grant_trust(&self, id: ClaimId, tier: TrustTier, grantee: Grantee) -> Result<(), ClaimError> {
        let world = self.locate(id)?;
        self.mutate(world, |state| {
            record_mut(&mut state.arena, id)?.grant_trust(tier, grantee);
            Ok(())
        })?;
        debug!(claim = id.0, tier = %tier, "trust granted");
        Ok(())
    }

    pub fn revoke_trust(&self, id: ClaimId, tier: TrustTier, grantee: &Grantee) -> Result<(), ClaimError> {
        let world = self.locate(id)?;
        self.mutate(world, |state| {
            record_mut(&mut state.arena, id)?.revoke_trust(tier, grantee);
            Ok(())
        })?;
        debug!(claim = id.0, tier = %tier, "trust revoked");
        Ok(())
    }

    /// Mark a claim contested. `now_epoch_secs` comes from the host's clock
    /// (the engine keeps no time source of its own).
    pub fn begin_siege(&self, id: ClaimId, now_epoch_secs: u64) -> Result<(), ClaimError> {
        let world = self.locate(id)?;
        self.mutate(world, |state| {
            record_mut(&mut state.arena, id)?.begin_siege(now_epoch_secs);
            Ok(())
        })
    }

    pub fn end_siege(&self, id: ClaimId) -> Result<(), ClaimError> {
        let world = self.locate(id)?;
        self.mutate(world, |state| {
            record_mut(&mut state.arena, id)?.end_siege();
            Ok(())
        })
    }

    // ---- read path --------------------------------------------------------

    /// The claim containing `point`, resolved to the innermost subdivision.
    pub fn find_claim(&self, world: WorldId, point: BlockPos) -> Option<ClaimId> {
        let table = self.worlds.load();
        let state = table.get(&world)?;
        state.index.find_at(point, &state.arena)
    }

    /// Whether any claim's horizontal footprint covers column (x, z),
    /// regardless of y. Restoration uses this to leave claimed columns
    /// untouched whatever their height range.
    pub fn column_claimed(&self, world: WorldId, x: i32, z: i32) -> bool {
        let table = self.worlds.load();
        let Some(state) = table.get(&world) else {
            return false;
        };
        // A full-height one-block column; overlap with it is exactly
        // horizontal footprint coverage.
        let column = ClaimBox::new(
            BlockPos::new(x, i32::MIN, z),
            BlockPos::new(x, i32::MAX, z),
        );
        let claimed = state
            .index
            .find_overlapping(column, None, &state.arena)
            .next()
            .is_some();
        claimed
    }

    /// Snapshot copy of a claim record.
    pub fn get_claim(&self, id: ClaimId) -> Option<ClaimRecord> {
        let table = self.worlds.load();
        table
            .values()
            .find_map(|state| state.arena.get(&id))
            .map(|record| (**record).clone())
    }

    /// Claims `owner` owns in `world` (feeds the starter-placement gate).
    pub fn owned_claim_count(&self, world: WorldId, owner: ActorId) -> u32 {
        let table = self.worlds.load();
        table
            .get(&world)
            .map(|state| {
                state
                    .arena
                    .values()
                    .filter(|record| record.owner() == Some(owner))
                    .count() as u32
            })
            .unwrap_or(0)
    }

    /// Answer "may this actor do this action at this point". The session
    /// hint is revalidated by containment, then consulted before the index;
    /// either way it is updated with the claim this query resolved to.
    pub fn check_permission(
        &self,
        actor: &ActorSnapshot,
        world: WorldId,
        point: BlockPos,
        action: ActionKind,
        session: &mut LookupSession,
    ) -> Decision {
        let table = self.worlds.load();
        let state = table.get(&world);

        let claim = state.and_then(|state| {
            let hinted = session.last.get(&world).and_then(|hint| {
                state
                    .arena
                    .get(hint)
                    .filter(|record| record.bounds().contains_point(point))
                    // The hint may name a parent whose subdivision has since
                    // been created; descend so lookup stays deterministic.
                    .map(|_| descend_to_innermost(state, *hint, point))
            });
            hinted
                .or_else(|| state.index.find_at(point, &state.arena))
                .map(|id| (id, &state.arena[&id]))
        });

        match claim {
            Some((id, _)) => {
                session.last.insert(world, id);
            }
            None => {
                session.last.remove(&world);
            }
        }

        let rules = self.config.rules_for(world.0);
        let decision = match (state, claim) {
            (Some(state), Some((id, _))) => {
                // Innermost claim first, then its ancestors: trust grants on
                // a parent apply inside its subdivisions.
                let mut chain: Vec<&ClaimRecord> = Vec::new();
                let mut cursor = Some(id);
                while let Some(current) = cursor {
                    let record = &state.arena[&current];
                    chain.push(record.as_ref());
                    cursor = record.parent();
                }
                trust::resolve_chain(actor, &chain, action, rules)
            }
            _ => trust::resolve_chain(actor, &[], action, rules),
        };
        if let Decision::Deny(reason) = decision {
            trace!(actor = %actor.id, world = world.0, ?action, ?reason, "permission denied");
        }
        decision
    }

    /// Walk from `point` out of any enclosing claims and return a nearby
    /// wilderness position (used to eject trapped players). Keeps the
    /// original y. Bounded: gives up after a generous number of hops and
    /// returns the last candidate, which callers treat as best-effort.
    pub fn nearest_unclaimed(&self, world: WorldId, point: BlockPos) -> BlockPos {
        let mut candidate = point;
        for _ in 0..256 {
            match self.find_claim(world, candidate).and_then(|id| self.get_claim(id)) {
                None => return candidate,
                Some(record) => {
                    let lesser = record.bounds().lesser();
                    candidate = BlockPos::new(lesser.x - 1, candidate.y, lesser.z - 1);
                }
            }
        }
        candidate
    }

    // ---- persistence boundary ---------------------------------------------

    /// Install a world's claims from storage, replacing any published state
    /// for that world. Box geometry is re-validated (inverted corners are
    /// rejected); sibling overlap is not, because overlap-permitted
    /// subdivisions are legal data and storage is trusted for the rest.
    pub fn load_world(&self, set: &WorldClaimSet) -> Result<(), ClaimError> {
        let world = WorldId(set.world);
        self.mutate(world, |state| {
            let mut fresh = WorldClaims::new();
            for claim_state in &set.claims {
                let record = ClaimRecord::from_state(claim_state)?;
                fresh.index.insert_unchecked(record.id(), record.bounds());
                fresh.arena.insert(record.id(), Arc::new(record));
            }
            *state = fresh;
            Ok(())
        })?;
        self.next_id.fetch_max(set.next_claim_id.max(1), Ordering::Relaxed);
        info!(world = set.world, claims = set.claims.len(), "world claims loaded");
        Ok(())
    }

    /// Export a world's claims for storage, sorted by id with a
    /// deterministic content hash.
    pub fn export_world(&self, world: WorldId) -> WorldClaimSet {
        let table = self.worlds.load();
        let mut claims: Vec<_> = table
            .get(&world)
            .map(|state| state.arena.values().map(|record| record.to_state()).collect())
            .unwrap_or_default();
        claims.sort_by_key(|state| state.id);
        WorldClaimSet {
            world: world.0,
            next_claim_id: self.next_id.load(Ordering::Relaxed),
            claims,
            hash: 0,
        }
        .finalize()
    }
}

/// Follow children from `id` to the innermost claim containing `point`.
fn descend_to_innermost(state: &WorldClaims, id: ClaimId, point: BlockPos) -> ClaimId {
    let mut current = id;
    'descend: loop {
        for child in state.arena[&current].children() {
            if state.arena[child].bounds().contains_point(point) {
                current = *child;
                continue 'descend;
            }
        }
        return current;
    }
}

/// Copy-on-write access to one record in a cloned arena.
fn record_mut(arena: &mut ClaimArena, id: ClaimId) -> Result<&mut ClaimRecord, ClaimError> {
    let arc = arena.get_mut(&id).ok_or(ClaimError::NotFound(id))?;
    Ok(Arc::make_mut(arc))
}

/// Remove `id` (and, with `cascade`, its whole subtree) from arena and
/// index, unlinking it from its parent. Returns the number of removed
/// claims.
fn remove_tree(state: &mut WorldClaims, id: ClaimId, cascade: bool) -> Result<usize, ClaimError> {
    let record = state.arena.get(&id).ok_or(ClaimError::NotFound(id))?;
    if !cascade && !record.children().is_empty() {
        return Err(ClaimError::HasChildren);
    }
    let parent = record.parent();

    let mut stack = vec![id];
    let mut removed = 0usize;
    while let Some(current) = stack.pop() {
        let record = state
            .arena
            .remove(&current)
            .unwrap_or_else(|| panic!("claim {} vanished during cascade delete", current));
        state.index.remove(current, record.bounds());
        stack.extend(record.children().iter().copied());
        removed += 1;
    }

    if let Some(parent_id) = parent {
        record_mut(&mut state.arena, parent_id)?.remove_child(id);
    }
    Ok(removed)
}
