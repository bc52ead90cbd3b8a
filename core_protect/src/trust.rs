//! The trust-precedence resolver.
//!
//! One pure function turns (actor snapshot, containing claim, requested
//! action, world rules) into an allow/deny decision. Instead of one
//! handler per action, a table maps each action kind to a minimum trust
//! tier, plus a short list of special-cased gates that run before the
//! table: server bypass, wilderness mode rules, siege restrictions, and
//! administrative-claim management.
//!
//! The resolver caches nothing and formats nothing; denials carry a reason
//! code for the caller to localize.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::claim::{ActorId, ClaimRecord, TrustTier};
use crate::config::{ClaimsMode, WorldRules};

bitflags! {
    /// Server-granted capabilities resolved by the host's permission system
    /// and handed in with the actor snapshot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ActorFlags: u8 {
        /// Ignore-claims mode: the actor bypasses every claim check.
        const ADMIN_BYPASS = 1 << 0;
        /// May build in and manage administrative claims.
        const ADMIN_CLAIMS = 1 << 1;
    }
}

/// Everything the resolver needs to know about the acting entity, captured
/// at the call boundary. Group membership and flags come pre-resolved from
/// the host; the resolver never calls back out.
#[derive(Debug, Clone)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub groups: Vec<String>,
    pub flags: ActorFlags,
    /// Claims this actor owns in the world being checked; feeds the
    /// starter-placement wilderness exception.
    pub claims_in_world: u32,
}

impl ActorSnapshot {
    pub fn new(id: ActorId) -> Self {
        Self {
            id,
            groups: Vec::new(),
            flags: ActorFlags::empty(),
            claims_in_world: 0,
        }
    }
}

/// The action classes the engine distinguishes. Hosts map their concrete
/// events (bucket use, door open, block punch, ...) onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Enter the claim, use beds, press buttons.
    Access,
    /// Open chests and other inventories.
    UseContainer,
    PlaceBlock,
    BreakBlock,
    /// The single designated first-claim placement (e.g. placing a chest in
    /// claims-required worlds); eligible for the wilderness exception.
    StarterPlacement,
    EditTrust,
    Resize,
    Delete,
    Transfer,
}

impl ActionKind {
    /// Minimum trust tier required inside a claim.
    pub fn required_tier(self) -> TrustTier {
        match self {
            ActionKind::Access => TrustTier::Access,
            ActionKind::UseContainer => TrustTier::Container,
            ActionKind::PlaceBlock | ActionKind::BreakBlock | ActionKind::StarterPlacement => {
                TrustTier::Build
            }
            ActionKind::EditTrust
            | ActionKind::Resize
            | ActionKind::Delete
            | ActionKind::Transfer => TrustTier::Manage,
        }
    }

    /// Whether the action changes the world (and is therefore restricted in
    /// wilderness under claims-required modes).
    pub fn modifies_world(self) -> bool {
        matches!(
            self,
            ActionKind::PlaceBlock | ActionKind::BreakBlock | ActionKind::StarterPlacement
        )
    }

    pub fn is_management(self) -> bool {
        self.required_tier() == TrustTier::Manage
    }
}

/// Reason codes for denials. Callers own presentation; these never carry
/// user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    InsufficientTrust { required: TrustTier },
    NoBuildOutsideClaims,
    SiegeRestriction,
}

/// Terminal outcome of a permission check. Denials are ordinary values,
/// never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenialReason),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Resolve one permission question for a claim chain, innermost claim
/// first, ancestors following. Pure: same inputs, same answer.
///
/// Evaluation order:
/// 1. server bypass (admin flag or always-bypass list)
/// 2. wilderness rules when the chain is empty
/// 3. siege short-circuit, then administrative-claim gate, then owner
///    shortcut (all judged on the innermost claim), then the tier table
///
/// Trust grants inherit inward: a grant on the parent applies inside its
/// subdivisions, and a subdivision's own lists can only add to that. The
/// effective tier is therefore the maximum across the chain.
pub fn resolve_chain(
    actor: &ActorSnapshot,
    chain: &[&ClaimRecord],
    action: ActionKind,
    rules: &WorldRules,
) -> Decision {
    if actor.flags.contains(ActorFlags::ADMIN_BYPASS) || rules.bypasses(actor.id) {
        return Decision::Allow;
    }

    let Some(claim) = chain.first() else {
        return resolve_wilderness(actor, action, rules);
    };

    // A siege on any enclosing claim restricts its subdivisions too.
    if let Some(contested) = chain.iter().find(|claim| claim.in_siege()) {
        if let Some(denied) = siege_restriction(actor, contested, action) {
            return Decision::Deny(denied);
        }
    }

    if claim.is_admin() {
        // Administrative claims answer to the admin permission, not to the
        // nominal trust lists, for anything management-shaped.
        if actor.flags.contains(ActorFlags::ADMIN_CLAIMS) {
            return Decision::Allow;
        }
        if action.is_management() {
            return Decision::Deny(DenialReason::InsufficientTrust {
                required: TrustTier::Manage,
            });
        }
    } else if claim.owner() == Some(actor.id) {
        return Decision::Allow;
    }

    let required = action.required_tier();
    let effective = chain
        .iter()
        .filter_map(|claim| claim.effective_tier(actor.id, &actor.groups))
        .max();
    match effective {
        Some(effective) if effective >= required => Decision::Allow,
        _ => Decision::Deny(DenialReason::InsufficientTrust { required }),
    }
}

/// [`resolve_chain`] for the common single-claim (or wilderness) case.
pub fn resolve(
    actor: &ActorSnapshot,
    claim: Option<&ClaimRecord>,
    action: ActionKind,
    rules: &WorldRules,
) -> Decision {
    match claim {
        Some(claim) => resolve_chain(actor, &[claim], action, rules),
        None => resolve_chain(actor, &[], action, rules),
    }
}

fn resolve_wilderness(actor: &ActorSnapshot, action: ActionKind, rules: &WorldRules) -> Decision {
    if !action.modifies_world() {
        return Decision::Allow;
    }
    match rules.mode {
        ClaimsMode::OpenSurvival => Decision::Allow,
        ClaimsMode::Creative | ClaimsMode::SurvivalRequiringClaims => {
            // Onboarding exception: a player with no claim yet may perform
            // the one designated starter placement, unless claiming is
            // unrestricted (then there is nothing to bootstrap).
            let starter_eligible = action == ActionKind::StarterPlacement
                && actor.claims_in_world == 0
                && !rules.unrestricted_claiming;
            if starter_eligible {
                Decision::Allow
            } else {
                Decision::Deny(DenialReason::NoBuildOutsideClaims)
            }
        }
    }
}

/// Siege rules run before any tier check. Container access is locked for
/// everyone while the claim is contested; the defender additionally loses
/// build, break, and management actions.
fn siege_restriction(
    actor: &ActorSnapshot,
    claim: &ClaimRecord,
    action: ActionKind,
) -> Option<DenialReason> {
    if action == ActionKind::UseContainer {
        return Some(DenialReason::SiegeRestriction);
    }
    let is_defender = claim.owner() == Some(actor.id);
    if is_defender && (action.modifies_world() || action.is_management()) {
        return Some(DenialReason::SiegeRestriction);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{ClaimId, ClaimRecord, Grantee, WorldId};
    use crate::geometry::{BlockPos, ClaimBox};

    fn claim_owned_by(owner: Option<ActorId>) -> ClaimRecord {
        ClaimRecord::new(
            ClaimId(1),
            WorldId(0),
            ClaimBox::new(BlockPos::new(0, 0, 0), BlockPos::new(31, 255, 31)),
            owner,
            None,
        )
    }

    fn rules(mode: ClaimsMode) -> WorldRules {
        WorldRules {
            mode,
            ..WorldRules::default()
        }
    }

    #[test]
    fn admin_bypass_short_circuits_everything() {
        let mut actor = ActorSnapshot::new(ActorId(9));
        actor.flags |= ActorFlags::ADMIN_BYPASS;
        let claim = claim_owned_by(Some(ActorId(1)));
        let decision = resolve(&actor, Some(&claim), ActionKind::Delete, &rules(ClaimsMode::Creative));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn always_bypass_list_short_circuits() {
        let actor = ActorSnapshot::new(ActorId(9));
        let mut world_rules = rules(ClaimsMode::Creative);
        world_rules.always_bypass.push(ActorId(9));
        let decision = resolve(&actor, None, ActionKind::PlaceBlock, &world_rules);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn open_survival_wilderness_allows_building() {
        let actor = ActorSnapshot::new(ActorId(9));
        let decision = resolve(&actor, None, ActionKind::PlaceBlock, &rules(ClaimsMode::OpenSurvival));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn claims_required_wilderness_denies_building() {
        let actor = ActorSnapshot::new(ActorId(9));
        for mode in [ClaimsMode::Creative, ClaimsMode::SurvivalRequiringClaims] {
            let decision = resolve(&actor, None, ActionKind::PlaceBlock, &rules(mode));
            assert_eq!(decision, Decision::Deny(DenialReason::NoBuildOutsideClaims));
        }
    }

    #[test]
    fn wilderness_access_is_always_allowed() {
        let actor = ActorSnapshot::new(ActorId(9));
        let decision = resolve(&actor, None, ActionKind::Access, &rules(ClaimsMode::Creative));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn starter_placement_truth_table() {
        let mut actor = ActorSnapshot::new(ActorId(9));
        let base = rules(ClaimsMode::SurvivalRequiringClaims);

        // Zero claims, restricted claiming, starter action: allowed.
        assert_eq!(
            resolve(&actor, None, ActionKind::StarterPlacement, &base),
            Decision::Allow
        );
        // Same actor, non-starter placement: denied.
        assert_eq!(
            resolve(&actor, None, ActionKind::PlaceBlock, &base),
            Decision::Deny(DenialReason::NoBuildOutsideClaims)
        );
        // Already owns a claim: denied.
        actor.claims_in_world = 1;
        assert_eq!(
            resolve(&actor, None, ActionKind::StarterPlacement, &base),
            Decision::Deny(DenialReason::NoBuildOutsideClaims)
        );
        // Unrestricted claiming disables the exception.
        actor.claims_in_world = 0;
        let mut unrestricted = rules(ClaimsMode::SurvivalRequiringClaims);
        unrestricted.unrestricted_claiming = true;
        assert_eq!(
            resolve(&actor, None, ActionKind::StarterPlacement, &unrestricted),
            Decision::Deny(DenialReason::NoBuildOutsideClaims)
        );
    }

    #[test]
    fn owner_builds_regardless_of_trust_lists() {
        let owner = ActorId(1);
        let claim = claim_owned_by(Some(owner));
        let actor = ActorSnapshot::new(owner);
        for action in [ActionKind::PlaceBlock, ActionKind::BreakBlock, ActionKind::EditTrust] {
            assert_eq!(
                resolve(&actor, Some(&claim), action, &rules(ClaimsMode::OpenSurvival)),
                Decision::Allow
            );
        }
    }

    #[test]
    fn tier_table_gates_strangers() {
        let mut claim = claim_owned_by(Some(ActorId(1)));
        claim.grant_trust(TrustTier::Container, Grantee::Actor(ActorId(9)));
        let actor = ActorSnapshot::new(ActorId(9));
        let world_rules = rules(ClaimsMode::OpenSurvival);

        assert!(resolve(&actor, Some(&claim), ActionKind::Access, &world_rules).is_allow());
        assert!(resolve(&actor, Some(&claim), ActionKind::UseContainer, &world_rules).is_allow());
        assert_eq!(
            resolve(&actor, Some(&claim), ActionKind::PlaceBlock, &world_rules),
            Decision::Deny(DenialReason::InsufficientTrust {
                required: TrustTier::Build
            })
        );
    }

    #[test]
    fn group_trust_feeds_tier_table() {
        let mut claim = claim_owned_by(Some(ActorId(1)));
        claim.grant_trust(TrustTier::Build, Grantee::Group("builders".into()));
        let mut actor = ActorSnapshot::new(ActorId(9));
        actor.groups.push("builders".into());
        assert!(resolve(
            &actor,
            Some(&claim),
            ActionKind::PlaceBlock,
            &rules(ClaimsMode::OpenSurvival)
        )
        .is_allow());
    }

    #[test]
    fn admin_claim_management_needs_admin_flag() {
        let claim = claim_owned_by(None);
        let mut actor = ActorSnapshot::new(ActorId(9));
        let world_rules = rules(ClaimsMode::OpenSurvival);

        assert_eq!(
            resolve(&actor, Some(&claim), ActionKind::EditTrust, &world_rules),
            Decision::Deny(DenialReason::InsufficientTrust {
                required: TrustTier::Manage
            })
        );
        actor.flags |= ActorFlags::ADMIN_CLAIMS;
        assert!(resolve(&actor, Some(&claim), ActionKind::EditTrust, &world_rules).is_allow());
    }

    #[test]
    fn siege_locks_containers_for_everyone_and_building_for_defender() {
        let owner = ActorId(1);
        let mut claim = claim_owned_by(Some(owner));
        claim.grant_trust(TrustTier::Build, Grantee::Actor(ActorId(9)));
        // Siege flag set directly; the registry drives this in production.
        let mut contested = claim.clone();
        contested.begin_siege(0);

        let world_rules = rules(ClaimsMode::OpenSurvival);
        let defender = ActorSnapshot::new(owner);
        let visitor = ActorSnapshot::new(ActorId(9));

        assert_eq!(
            resolve(&defender, Some(&contested), ActionKind::PlaceBlock, &world_rules),
            Decision::Deny(DenialReason::SiegeRestriction)
        );
        assert_eq!(
            resolve(&visitor, Some(&contested), ActionKind::UseContainer, &world_rules),
            Decision::Deny(DenialReason::SiegeRestriction)
        );
        // A build-trusted visitor may still build during the siege.
        assert!(resolve(&visitor, Some(&contested), ActionKind::PlaceBlock, &world_rules).is_allow());
        // Without the siege the defender builds freely.
        assert!(resolve(&defender, Some(&claim), ActionKind::PlaceBlock, &world_rules).is_allow());
    }

    #[test]
    fn chain_takes_maximum_tier_across_ancestors() {
        let mut parent = claim_owned_by(Some(ActorId(1)));
        parent.grant_trust(TrustTier::Build, Grantee::Actor(ActorId(9)));
        let mut sub = ClaimRecord::new(
            ClaimId(2),
            WorldId(0),
            ClaimBox::new(BlockPos::new(4, 0, 4), BlockPos::new(12, 255, 12)),
            Some(ActorId(1)),
            Some(ClaimId(1)),
        );
        sub.grant_trust(TrustTier::Access, Grantee::Actor(ActorId(9)));

        let actor = ActorSnapshot::new(ActorId(9));
        let world_rules = rules(ClaimsMode::OpenSurvival);
        // Innermost claim grants access only; the parent's build grant
        // still applies inside it.
        let decision = resolve_chain(&actor, &[&sub, &parent], ActionKind::PlaceBlock, &world_rules);
        assert_eq!(decision, Decision::Allow);
        // The subdivision alone would not allow building.
        let decision = resolve_chain(&actor, &[&sub], ActionKind::PlaceBlock, &world_rules);
        assert_eq!(
            decision,
            Decision::Deny(DenialReason::InsufficientTrust {
                required: TrustTier::Build
            })
        );
    }
}
