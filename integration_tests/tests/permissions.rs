//! End-to-end permission scenarios through the registry facade.

mod common;

use core_protect::{
    ActionKind, ActorId, ActorSnapshot, BlockPos, Decision, DenialReason, Grantee, LookupSession,
    TrustTier,
};

use common::WORLD;

fn actor(id: u128) -> ActorSnapshot {
    ActorSnapshot::new(ActorId(id))
}

fn check(
    registry: &core_protect::ClaimRegistry,
    snapshot: &ActorSnapshot,
    point: BlockPos,
    action: ActionKind,
) -> Decision {
    let mut session = LookupSession::new();
    registry.check_permission(snapshot, WORLD, point, action, &mut session)
}

#[test]
fn owner_may_build_regardless_of_trust_lists() {
    let registry = common::registry();
    let id = common::claim(&registry, 1, (0, 0), (31, 31)).unwrap();
    // An empty trust list does not matter for the owner.
    let owner = actor(1);
    let inside = BlockPos::new(10, 64, 10);
    assert!(check(&registry, &owner, inside, ActionKind::PlaceBlock).is_allow());
    assert!(check(&registry, &owner, inside, ActionKind::BreakBlock).is_allow());
    assert!(registry.get_claim(id).is_some());
}

#[test]
fn trust_precedence_takes_the_maximum_grant() {
    let registry = common::registry();
    let id = common::claim(&registry, 1, (0, 0), (31, 31)).unwrap();
    registry
        .grant_trust(id, TrustTier::Build, Grantee::Actor(ActorId(9)))
        .unwrap();
    registry
        .grant_trust(id, TrustTier::Access, Grantee::Group("crew".into()))
        .unwrap();

    let mut visitor = actor(9);
    visitor.groups.push("crew".into());
    let inside = BlockPos::new(10, 64, 10);

    // Build via the direct grant, even though the group only has access.
    assert!(check(&registry, &visitor, inside, ActionKind::PlaceBlock).is_allow());
    // Manage is still out of reach.
    assert_eq!(
        check(&registry, &visitor, inside, ActionKind::EditTrust),
        Decision::Deny(DenialReason::InsufficientTrust {
            required: TrustTier::Manage
        })
    );
}

#[test]
fn revoked_trust_stops_applying() {
    let registry = common::registry();
    let id = common::claim(&registry, 1, (0, 0), (31, 31)).unwrap();
    let grantee = Grantee::Actor(ActorId(9));
    registry.grant_trust(id, TrustTier::Build, grantee.clone()).unwrap();
    let inside = BlockPos::new(5, 64, 5);
    assert!(check(&registry, &actor(9), inside, ActionKind::PlaceBlock).is_allow());

    registry.revoke_trust(id, TrustTier::Build, &grantee).unwrap();
    assert_eq!(
        check(&registry, &actor(9), inside, ActionKind::PlaceBlock),
        Decision::Deny(DenialReason::InsufficientTrust {
            required: TrustTier::Build
        })
    );
}

#[test]
fn parent_trust_inherits_into_subdivisions_not_outward() {
    let registry = common::registry();
    let parent = common::claim(&registry, 1, (0, 0), (63, 63)).unwrap();
    let sub = common::subdivide(&registry, parent, 1, (8, 8), (23, 23)).unwrap();
    // Build trust on the parent, container trust on the subdivision only.
    registry
        .grant_trust(parent, TrustTier::Build, Grantee::Actor(ActorId(9)))
        .unwrap();
    registry
        .grant_trust(sub, TrustTier::Container, Grantee::Actor(ActorId(7)))
        .unwrap();

    let in_sub = BlockPos::new(10, 64, 10);
    let in_parent_only = BlockPos::new(40, 64, 40);
    assert_eq!(registry.find_claim(WORLD, in_sub), Some(sub));

    // The parent grant applies inside the subdivision too.
    assert!(check(&registry, &actor(9), in_sub, ActionKind::PlaceBlock).is_allow());
    assert!(check(&registry, &actor(9), in_parent_only, ActionKind::PlaceBlock).is_allow());

    // The subdivision-only grant stays inside the subdivision.
    assert!(check(&registry, &actor(7), in_sub, ActionKind::UseContainer).is_allow());
    assert_eq!(
        check(&registry, &actor(7), in_parent_only, ActionKind::UseContainer),
        Decision::Deny(DenialReason::InsufficientTrust {
            required: TrustTier::Container
        })
    );
}

#[test]
fn starter_placement_scenario() {
    let registry = common::claims_required_registry(false);
    let wilderness = BlockPos::new(100, 64, 100);

    // Zero claims, restricted claiming: the starter placement is allowed...
    let newcomer = actor(5);
    assert!(check(&registry, &newcomer, wilderness, ActionKind::StarterPlacement).is_allow());
    // ...but an ordinary placement at the same spot is not.
    assert_eq!(
        check(&registry, &newcomer, wilderness, ActionKind::PlaceBlock),
        Decision::Deny(DenialReason::NoBuildOutsideClaims)
    );

    // Once the player owns a claim the exception is gone.
    common::claim(&registry, 5, (0, 0), (15, 15)).unwrap();
    let mut veteran = actor(5);
    veteran.claims_in_world = registry.owned_claim_count(WORLD, ActorId(5));
    assert_eq!(
        check(&registry, &veteran, wilderness, ActionKind::StarterPlacement),
        Decision::Deny(DenialReason::NoBuildOutsideClaims)
    );
}

#[test]
fn unrestricted_claiming_disables_the_starter_exception() {
    let registry = common::claims_required_registry(true);
    let wilderness = BlockPos::new(100, 64, 100);
    assert_eq!(
        check(&registry, &actor(5), wilderness, ActionKind::StarterPlacement),
        Decision::Deny(DenialReason::NoBuildOutsideClaims)
    );
}

#[test]
fn siege_restricts_defender_until_lifted() {
    let registry = common::registry();
    let id = common::claim(&registry, 1, (0, 0), (31, 31)).unwrap();
    let inside = BlockPos::new(10, 64, 10);
    let defender = actor(1);

    registry.begin_siege(id, 1_700_000_000).unwrap();
    assert_eq!(
        check(&registry, &defender, inside, ActionKind::PlaceBlock),
        Decision::Deny(DenialReason::SiegeRestriction)
    );
    assert_eq!(
        check(&registry, &defender, inside, ActionKind::UseContainer),
        Decision::Deny(DenialReason::SiegeRestriction)
    );

    registry.end_siege(id).unwrap();
    assert!(check(&registry, &defender, inside, ActionKind::PlaceBlock).is_allow());
}

#[test]
fn session_hint_accelerates_repeated_checks_correctly() {
    let registry = common::registry();
    let parent = common::claim(&registry, 1, (0, 0), (63, 63)).unwrap();

    let visitor = actor(9);
    let mut session = LookupSession::new();
    let in_parent = BlockPos::new(40, 64, 40);

    // Prime the hint with the parent claim.
    registry.check_permission(&visitor, WORLD, in_parent, ActionKind::Access, &mut session);

    // A subdivision appears where the next query lands; the stale hint must
    // not shadow it.
    let sub = common::subdivide(&registry, parent, 1, (8, 8), (23, 23)).unwrap();
    registry
        .grant_trust(sub, TrustTier::Build, Grantee::Actor(ActorId(9)))
        .unwrap();
    let in_sub = BlockPos::new(10, 64, 10);
    let decision =
        registry.check_permission(&visitor, WORLD, in_sub, ActionKind::PlaceBlock, &mut session);
    assert!(decision.is_allow(), "subdivision trust must apply, got {:?}", decision);
}

#[test]
fn admin_bypass_list_comes_from_world_rules() {
    let mut config = core_protect::ProtectConfig::default();
    config.default_rules.always_bypass.push(ActorId(42));
    let registry = core_protect::ClaimRegistry::new(config);
    common::claim(&registry, 1, (0, 0), (31, 31)).unwrap();

    let service_account = actor(42);
    let inside = BlockPos::new(5, 64, 5);
    assert!(check(&registry, &service_account, inside, ActionKind::BreakBlock).is_allow());
    assert!(check(&registry, &service_account, inside, ActionKind::Delete).is_allow());
}
