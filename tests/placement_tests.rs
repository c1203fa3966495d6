//! Integration tests for placement and compression through the public API.
//!
//! Covers the worked examples: skip-4 placement, sparse compression and the
//! imperfect-score retry.

use tube_scheduler::{
    calculate_skip_number, DefaultLayout, LogicalPosition, PositionError, PositionMap,
    PositionStore, ProgressRecord, RepetitionError, RepetitionScheduler, SessionScore,
    SkipNumber, StitchId, TubeId,
};

fn tube(entries: &[(LogicalPosition, &str)]) -> PositionStore {
    let map: PositionMap = entries
        .iter()
        .map(|&(p, id)| (p, StitchId::from(id)))
        .collect();
    PositionStore::from_map("learner-1", TubeId::Tube1, 10_000, map).unwrap()
}

fn snapshot(store: &PositionStore) -> Vec<(LogicalPosition, String)> {
    store
        .get_map()
        .iter()
        .map(|(&p, id)| (p, id.to_string()))
        .collect()
}

fn expected(entries: &[(LogicalPosition, &str)]) -> Vec<(LogicalPosition, String)> {
    entries.iter().map(|&(p, id)| (p, id.to_string())).collect()
}

#[test]
fn perfect_completion_moves_active_stitch_back_by_skip() {
    let scheduler = RepetitionScheduler::default();
    let mut store = tube(&[(1, "A"), (2, "B"), (3, "C"), (4, "D"), (5, "E"), (6, "F")]);

    let outcome = scheduler
        .complete_unit(&mut store, &ProgressRecord::new("A"), &SessionScore::perfect(20))
        .unwrap();

    assert_eq!(
        snapshot(&store),
        expected(&[(1, "B"), (2, "C"), (3, "D"), (4, "A"), (5, "E"), (6, "F")])
    );
    assert_eq!(store.active_unit(), Some((StitchId::from("B"), 1)));
    assert_eq!(outcome.placement.placed_with, SkipNumber::Four);
    assert_eq!(outcome.record.skip_number, SkipNumber::Eight);
}

#[test]
fn sparse_map_compresses_in_order() {
    let mut store = tube(&[(1, "X"), (100, "Y"), (1000, "Z")]);

    let result = store.compress(false).unwrap();

    assert_eq!(result.positions_changed, 2);
    assert!(result.order_preserved);
    assert_eq!(snapshot(&store), expected(&[(1, "X"), (2, "Y"), (3, "Z")]));
    assert!(store.physical_of(1).unwrap() < store.physical_of(2).unwrap());
    assert!(store.physical_of(2).unwrap() < store.physical_of(3).unwrap());
}

#[test]
fn imperfect_completion_keeps_stitch_active_and_resets_skip() {
    let scheduler = RepetitionScheduler::default();
    let mut store = tube(&[(1, "A"), (4, "B")]);
    let record = ProgressRecord {
        skip_number: SkipNumber::Fifteen,
        consecutive_perfect: 2,
        ..ProgressRecord::new("A")
    };

    let outcome = scheduler
        .complete_unit(&mut store, &record, &SessionScore::new(18, 20))
        .unwrap();

    assert_eq!(snapshot(&store), expected(&[(1, "A"), (4, "B")]));
    assert_eq!(store.active_unit(), Some((StitchId::from("A"), 1)));
    assert!(outcome.placement.reset_skip);
    assert_eq!(outcome.record.skip_number, SkipNumber::Four);
    assert_eq!(outcome.record.consecutive_perfect, 0);
}

#[test]
fn repeated_perfect_sessions_spread_a_stitch_out() {
    let scheduler = RepetitionScheduler::default();
    let ids: Vec<String> = (1..=40).map(|n| format!("S{n:02}")).collect();
    let mut store = PositionStore::new("learner-1", TubeId::Tube1, 10_000);
    store
        .initialize_defaults(&DefaultLayout::sequential(ids.iter().map(String::as_str)))
        .unwrap();

    let mut record = ProgressRecord::new("S01");
    let mut landed = Vec::new();
    for _ in 0..3 {
        // Fillers go to the far back so every one pulls S01 one slot forward.
        while store.active_unit().map(|(id, _)| id) != Some(StitchId::from("S01")) {
            let (active, _) = store.active_unit().unwrap();
            let filler = ProgressRecord {
                skip_number: SkipNumber::Hundred,
                ..ProgressRecord::new(active)
            };
            scheduler
                .complete_unit(&mut store, &filler, &SessionScore::perfect(20))
                .unwrap();
        }
        let outcome = scheduler
            .complete_unit(&mut store, &record, &SessionScore::perfect(20))
            .unwrap();
        landed.push(outcome.placement.new_position);
        record = outcome.record;
    }

    assert_eq!(landed, vec![4, 8, 15]);
    assert_eq!(record.skip_number, SkipNumber::Thirty);
    assert_eq!(record.consecutive_perfect, 3);
}

#[test]
fn retired_stitch_is_refused_and_tube_untouched() {
    let scheduler = RepetitionScheduler::default();
    let mut store = tube(&[(1, "A"), (2, "B")]);
    let before = store.clone();
    let record = ProgressRecord {
        skip_number: SkipNumber::Retired,
        ..ProgressRecord::new("A")
    };

    let err = scheduler
        .complete_unit(&mut store, &record, &SessionScore::perfect(20))
        .unwrap_err();

    assert!(matches!(err, RepetitionError::StitchAlreadyRetired { .. }));
    assert_eq!(store, before);
}

#[test]
fn occupied_target_without_shift_is_rejected() {
    let mut store = tube(&[(1, "A"), (3, "B")]);
    let err = store
        .move_unit(&tube_scheduler::MoveOp {
            unit_id: StitchId::from("A"),
            from: 1,
            to: 3,
            shift_others: false,
        })
        .unwrap_err();
    assert!(matches!(err, PositionError::PositionOccupied { position: 3, .. }));
}

#[test]
fn invalid_skip_number_is_rejected() {
    assert_eq!(
        calculate_skip_number(16, 0, &SessionScore::perfect(20)),
        Err(RepetitionError::InvalidSkipNumber { value: 16 })
    );
}
