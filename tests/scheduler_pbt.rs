//! Property-Based Tests for the scheduling core
//!
//! Tests the following invariants:
//! - Monotonic ordering: physical rank follows logical order
//! - Compression: idempotent, order preserving, dense afterwards
//! - Moves: units are never lost or duplicated; failed moves change nothing
//! - Skip sequence: perfect scores saturate at 1000, anything else resets to 4
//! - Rotation: period 3 for every starting bijection

use chrono::Utc;
use proptest::prelude::*;

use tube_scheduler::{
    calculate_skip_number, LogicalPosition, MoveOp, PositionMap, PositionStore, RepetitionScheduler,
    RoleState, SessionScore, SkipNumber, StitchId, TubeId, SKIP_SEQUENCE,
};

const MAX: LogicalPosition = 10_000;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_sparse_store() -> impl Strategy<Value = PositionStore> {
    prop::collection::btree_set(1u32..=MAX, 0..60).prop_map(|positions| {
        let map: PositionMap = positions
            .into_iter()
            .enumerate()
            .map(|(i, p)| (p, StitchId::new(format!("U{i:03}"))))
            .collect();
        PositionStore::from_map("learner-pbt", TubeId::Tube1, MAX, map).unwrap()
    })
}

fn arb_non_empty_store() -> impl Strategy<Value = PositionStore> {
    arb_sparse_store().prop_filter("needs at least one stitch", |store| !store.is_empty())
}

fn arb_skip_value() -> impl Strategy<Value = u32> {
    prop::sample::select(SKIP_SEQUENCE.to_vec())
}

fn arb_imperfect_score() -> impl Strategy<Value = SessionScore> {
    (1u32..=40).prop_flat_map(|total| (0..total).prop_map(move |correct| SessionScore::new(correct, total)))
}

fn arb_role_state() -> impl Strategy<Value = RoleState> {
    prop::sample::select(vec![
        [TubeId::Tube1, TubeId::Tube2, TubeId::Tube3],
        [TubeId::Tube1, TubeId::Tube3, TubeId::Tube2],
        [TubeId::Tube2, TubeId::Tube1, TubeId::Tube3],
        [TubeId::Tube2, TubeId::Tube3, TubeId::Tube1],
        [TubeId::Tube3, TubeId::Tube1, TubeId::Tube2],
        [TubeId::Tube3, TubeId::Tube2, TubeId::Tube1],
    ])
    .prop_map(|[live, ready, preparing]| RoleState::try_new(live, ready, preparing).unwrap())
}

fn units(store: &PositionStore) -> Vec<StitchId> {
    store.units_in_order().cloned().collect()
}

// ============================================================================
// Ordering and Compression
// ============================================================================

proptest! {
    #[test]
    fn prop_physical_rank_is_monotonic(store in arb_sparse_store()) {
        let keys: Vec<LogicalPosition> = store.get_map().keys().copied().collect();
        for (index, &key) in keys.iter().enumerate() {
            prop_assert_eq!(store.physical_of(key).unwrap(), index + 1);
        }
        for pair in keys.windows(2) {
            prop_assert!(store.physical_of(pair[0]).unwrap() < store.physical_of(pair[1]).unwrap());
        }
    }

    #[test]
    fn prop_compression_idempotent_and_order_preserving(store in arb_sparse_store()) {
        let original_order = units(&store);

        let mut once = store.clone();
        let first = once.compress(false).unwrap();
        let mut twice = once.clone();
        let second = twice.compress(false).unwrap();

        prop_assert_eq!(once.get_map(), twice.get_map());
        prop_assert_eq!(second.positions_changed, 0);
        prop_assert_eq!(units(&once), original_order);
        prop_assert_eq!(once.gap_count(), 0);
        prop_assert_eq!(first.map, once.get_map().clone());
    }

    #[test]
    fn prop_dry_run_matches_real_compression(store in arb_sparse_store()) {
        let mut preview_store = store.clone();
        let preview = preview_store.compress(true).unwrap();
        prop_assert_eq!(&preview_store, &store);

        let mut real = store.clone();
        let applied = real.compress(false).unwrap();
        prop_assert_eq!(preview.map, applied.map);
        prop_assert_eq!(preview.positions_changed, applied.positions_changed);
    }
}

// ============================================================================
// Moves
// ============================================================================

proptest! {
    #[test]
    fn prop_move_never_loses_units(
        store in arb_non_empty_store(),
        pick in any::<prop::sample::Index>(),
        to in 1u32..=MAX,
        shift_others in any::<bool>(),
    ) {
        let keys: Vec<LogicalPosition> = store.get_map().keys().copied().collect();
        let from = keys[pick.index(keys.len())];
        let unit_id = store.get_map()[&from].clone();

        let mut moved = store.clone();
        let result = moved.move_unit(&MoveOp { unit_id: unit_id.clone(), from, to, shift_others });

        match result {
            Ok(_) => {
                let mut before = units(&store);
                let mut after = units(&moved);
                before.sort();
                after.sort();
                prop_assert_eq!(before, after);
                prop_assert_eq!(moved.position_of(&unit_id), Some(to));
                prop_assert!(moved.verify_consistency().is_ok());
            }
            Err(_) => prop_assert_eq!(&moved, &store),
        }
    }

    #[test]
    fn prop_perfect_placement_keeps_others_in_order(
        store in arb_non_empty_store(),
        skip in prop::sample::select(SkipNumber::ALL[..5].to_vec()),
    ) {
        let scheduler = RepetitionScheduler::default();
        let (active, _) = store.active_unit().unwrap();
        let others_before: Vec<StitchId> =
            units(&store).into_iter().filter(|id| *id != active).collect();

        let mut placed = store.clone();
        let result = scheduler
            .reposition(&mut placed, &active, skip, &SessionScore::perfect(20))
            .unwrap();

        let others_after: Vec<StitchId> =
            units(&placed).into_iter().filter(|id| *id != active).collect();
        prop_assert_eq!(others_before, others_after);
        prop_assert!(result.moved);
        prop_assert_eq!(placed.len(), store.len());
    }
}

// ============================================================================
// Skip Sequence and Rotation
// ============================================================================

proptest! {
    #[test]
    fn prop_perfect_scores_saturate_at_retired(start in arb_skip_value(), extra in 0usize..10) {
        let mut current = start;
        let mut consecutive = 0;
        for _ in 0..(SKIP_SEQUENCE.len() + extra) {
            let result = calculate_skip_number(current, consecutive, &SessionScore::perfect(20)).unwrap();
            prop_assert!(result.next.value() >= current);
            current = result.next.value();
            consecutive = result.consecutive_perfect;
        }
        prop_assert_eq!(current, SkipNumber::Retired.value());
        prop_assert_eq!(consecutive as usize, SKIP_SEQUENCE.len() + extra);
    }

    #[test]
    fn prop_imperfect_always_resets(
        start in arb_skip_value(),
        consecutive in 0u32..50,
        score in arb_imperfect_score(),
    ) {
        let result = calculate_skip_number(start, consecutive, &score).unwrap();
        prop_assert_eq!(result.next, SkipNumber::Four);
        prop_assert_eq!(result.consecutive_perfect, 0);
    }

    #[test]
    fn prop_rotation_has_period_three(state in arb_role_state()) {
        let now = Utc::now();
        let back = state.rotated(now).rotated(now).rotated(now);
        prop_assert_eq!(back.assignment(), state.assignment());
        prop_assert_eq!(back.rotation_count(), state.rotation_count() + 3);

        let once = state.rotated(now);
        prop_assert_eq!(once.live(), state.ready());
        prop_assert_eq!(once.ready(), state.preparing());
        prop_assert_eq!(once.preparing(), state.live());
    }
}
