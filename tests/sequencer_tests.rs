//! Timestamp Sequencer across namespaces, restarts and legacy artifacts

mod support;

use assert_matches::assert_matches;
use ggen_reconcile::sequencer::{
    ExistingArtifacts, FixedClock, JsonFileStore, KeyOrigin, MemorySequencerStore,
};
use ggen_reconcile::{SequenceKey, TimestampSequencer};
use support::{TestWorkspace, at};

// =============================================================================
// Monotonicity
// =============================================================================

#[test]
fn test_keys_strictly_increase_under_a_frozen_clock() {
    // Arrange
    let clock = FixedClock::new(at(2024, 3, 9, 7, 5, 59));
    let sequencer = TimestampSequencer::with_clock(MemorySequencerStore::new(), clock);

    // Act
    let keys: Vec<SequenceKey> = (0..25)
        .map(|n| sequencer.next_key(&format!("table_{}", n), None).unwrap().key)
        .collect();

    // Assert
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(keys[0].to_string(), "2024_03_09_070559");
    assert_eq!(keys[1].to_string(), "2024_03_09_070600");
}

#[test]
fn test_clock_moving_backwards_never_reuses_a_key() {
    let clock = FixedClock::new(at(2024, 3, 9, 12, 0, 0));
    let sequencer = TimestampSequencer::with_clock(MemorySequencerStore::new(), clock.clone());
    let first = sequencer.next_key("posts", None).unwrap().key;

    clock.set(at(2024, 3, 9, 11, 0, 0));
    let second = sequencer.next_key("comments", None).unwrap().key;

    assert!(second > first);
}

#[test]
fn test_restart_continues_above_persisted_keys() {
    // Arrange
    let ws = TestWorkspace::new();
    let state = ws.path(".ggen/sequencer.json");
    let clock = FixedClock::new(at(2024, 3, 9, 7, 5, 59));
    let first = {
        let sequencer = TimestampSequencer::with_clock(JsonFileStore::new(&state), clock.clone());
        sequencer.next_key("posts", None).unwrap().key
    };

    // Act: a fresh process with the same frozen clock
    let sequencer = TimestampSequencer::with_clock(JsonFileStore::new(&state), clock);
    let second = sequencer.next_key("comments", None).unwrap().key;

    // Assert
    assert!(second > first);
    assert!(ws.read(".ggen/sequencer.json").contains("\"posts\""));
    assert_eq!(sequencer.last_issued("comments").unwrap(), Some(second));
}

#[test]
fn test_one_namespace_keeps_increasing_across_a_restart() {
    // Arrange
    let ws = TestWorkspace::new();
    let state = ws.path(".ggen/sequencer.json");
    let clock = FixedClock::new(at(2024, 3, 9, 23, 59, 58));
    let mut keys: Vec<SequenceKey> = {
        let sequencer = TimestampSequencer::with_clock(JsonFileStore::new(&state), clock.clone());
        (0..5)
            .map(|_| sequencer.next_key("posts", None).unwrap().key)
            .collect()
    };

    // Act: a fresh process, same namespace, same frozen clock
    let sequencer = TimestampSequencer::with_clock(JsonFileStore::new(&state), clock);
    keys.push(sequencer.next_key("posts", None).unwrap().key);

    // Assert
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(keys[0].to_string(), "2024_03_09_235958");
    assert_eq!(keys[2].to_string(), "2024_03_10_000000");
    assert_eq!(keys[5].to_string(), "2024_03_10_000003");
    assert_eq!(sequencer.last_issued("posts").unwrap(), Some(keys[5]));
}

#[test]
fn test_preview_does_not_persist() {
    let clock = FixedClock::new(at(2024, 3, 9, 7, 5, 59));
    let store = MemorySequencerStore::new();
    let sequencer = TimestampSequencer::with_clock(store.clone(), clock);

    let previewed = sequencer.preview_key("posts", None).unwrap().key;
    let issued = sequencer.next_key("posts", None).unwrap().key;

    assert_eq!(previewed, issued);
    assert_eq!(store.snapshot().len(), 1);
}

// =============================================================================
// Existing artifacts
// =============================================================================

#[test]
fn test_existing_canonical_artifact_is_reused() {
    // Arrange
    let ws = TestWorkspace::new();
    ws.write(
        "database/migrations/2023_01_02_030405_create_posts_table.php",
        "<?php\n",
    );
    let existing = ExistingArtifacts::new(ws.path("database/migrations"), "create_posts_table.php");
    let clock = FixedClock::new(at(2024, 3, 9, 7, 5, 59));
    let sequencer = TimestampSequencer::with_clock(MemorySequencerStore::new(), clock);

    // Act
    let issued = sequencer.next_key("posts", Some(&existing)).unwrap();

    // Assert
    assert_eq!(issued.key.to_string(), "2023_01_02_030405");
    assert_matches!(issued.origin, KeyOrigin::Reused { .. });
}

#[test]
fn test_legacy_artifact_is_renamed_to_returned_key() {
    // Arrange
    let ws = TestWorkspace::new();
    ws.write(
        "database/migrations/20230102030405_create_posts_table.php",
        "legacy body",
    );
    let existing = ExistingArtifacts::new(ws.path("database/migrations"), "create_posts_table.php");
    let clock = FixedClock::new(at(2024, 3, 9, 7, 5, 59));
    let sequencer = TimestampSequencer::with_clock(MemorySequencerStore::new(), clock);

    // Act
    let issued = sequencer.next_key("posts", Some(&existing)).unwrap();

    // Assert
    let files = ws.list("database/migrations");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0], format!("{}_create_posts_table.php", issued.key));
    assert_matches!(issued.origin, KeyOrigin::Reconciled { .. });
    assert_eq!(
        ws.read(&format!("database/migrations/{}", files[0])),
        "legacy body"
    );

    // A second call reuses the renamed file
    let again = sequencer.next_key("posts", Some(&existing)).unwrap();
    assert_eq!(again.key, issued.key);
    assert_matches!(again.origin, KeyOrigin::Reused { .. });
}

#[test]
fn test_legacy_preview_leaves_file_in_place() {
    let ws = TestWorkspace::new();
    ws.write("migrations/20230102030405_create_tags_table.php", "x");
    let existing = ExistingArtifacts::new(ws.path("migrations"), "create_tags_table.php");
    let clock = FixedClock::new(at(2024, 3, 9, 7, 5, 59));
    let sequencer = TimestampSequencer::with_clock(MemorySequencerStore::new(), clock);

    let issued = sequencer.preview_key("tags", Some(&existing)).unwrap();

    assert_matches!(issued.origin, KeyOrigin::Reconciled { .. });
    assert_eq!(
        ws.list("migrations"),
        vec!["20230102030405_create_tags_table.php".to_string()]
    );
}
