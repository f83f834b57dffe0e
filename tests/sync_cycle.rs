//! Delta-sync integration tests: change-feed application, replay safety,
//! delete convergence, and sync/build mutual exclusion.

use std::sync::Arc;
use std::time::Duration;

use deltasearch::embedding::{EmbeddingOracle, HashingOracle};
use deltasearch::{
    Config, DeltaSearch, Embedding, IndexSpec, OracleConfig, PollPolicy, Record, RecordId, Result,
    SearchMode, TableSpec, TriggerMode,
};
use proptest::prelude::*;
use tempfile::tempdir;

fn fast_poll() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(5), 2000)
}

fn test_config() -> Config {
    Config {
        oracle: OracleConfig::Hashing { dimension: 64 },
        poll: fast_poll(),
        ..Default::default()
    }
}

fn index_spec(mode: TriggerMode) -> IndexSpec {
    IndexSpec {
        name: "notes_index".to_string(),
        endpoint: "shared-demo-endpoint".to_string(),
        source_table: "notes".to_string(),
        primary_key: "index".to_string(),
        embedding_source_column: "text".to_string(),
        trigger_mode: mode,
    }
}

fn open_with_index(path: &std::path::Path, initial: &[Record]) -> (DeltaSearch, Arc<deltasearch::DeltaSyncIndex>) {
    let db = DeltaSearch::open(path, test_config()).unwrap();
    db.create_table(&TableSpec::new("notes", "index", "text"), initial)
        .unwrap();
    db.enable_change_tracking("notes").unwrap();
    db.create_endpoint("shared-demo-endpoint").unwrap();
    let index = db.create_index(index_spec(TriggerMode::Triggered)).unwrap();
    index.wait_until_online(&fast_poll()).unwrap();
    (db, index)
}

#[test]
fn test_sync_applies_insert() {
    let dir = tempdir().unwrap();
    let (db, index) = open_with_index(&dir.path().join("delta.db"), &[]);

    db.upsert_record("notes", &Record::new(1, "the grocery list")).unwrap();
    db.upsert_record("notes", &Record::new(2, "meeting agenda for tuesday")).unwrap();

    let applied = index.sync().unwrap();
    assert_eq!(applied, 2);
    assert_eq!(index.len(), 2);

    let hits = index.search("grocery list", 1, SearchMode::Ann).unwrap();
    assert_eq!(hits[0].key, RecordId::new(1));
    db.close().unwrap();
}

#[test]
fn test_sync_applies_update() {
    let dir = tempdir().unwrap();
    let (db, index) = open_with_index(
        &dir.path().join("delta.db"),
        &[Record::new(1, "quarterly revenue report")],
    );

    db.upsert_record("notes", &Record::new(1, "weekend hiking trail ideas")).unwrap();
    index.sync().unwrap();

    assert_eq!(index.len(), 1);
    let hits = index.search("hiking trail", 1, SearchMode::Ann).unwrap();
    assert_eq!(hits[0].key, RecordId::new(1));
    assert!(hits[0].text.contains("hiking"));
    db.close().unwrap();
}

#[test]
fn test_sync_applies_delete_without_resurrection() {
    let dir = tempdir().unwrap();
    let (db, index) = open_with_index(
        &dir.path().join("delta.db"),
        &[
            Record::new(1, "first note about apples"),
            Record::new(2, "second note about oranges"),
        ],
    );

    // Update then delete the same key before any sync: the feed holds both
    // events and the delete must win.
    db.upsert_record("notes", &Record::new(1, "first note revised")).unwrap();
    db.delete_record("notes", RecordId::new(1)).unwrap();

    let applied = index.sync().unwrap();
    assert_eq!(applied, 2);
    assert_eq!(index.len(), 1);

    let hits = index.search("first note about apples", 5, SearchMode::Ann).unwrap();
    assert!(hits.iter().all(|h| h.key != RecordId::new(1)));
    db.close().unwrap();
}

#[test]
fn test_sync_with_no_changes_is_noop() {
    let dir = tempdir().unwrap();
    let (db, index) = open_with_index(
        &dir.path().join("delta.db"),
        &[Record::new(1, "a single note")],
    );

    assert_eq!(index.sync().unwrap(), 0);
    assert_eq!(index.sync().unwrap(), 0);
    assert_eq!(index.len(), 1);
    db.close().unwrap();
}

#[test]
fn test_sync_is_incremental() {
    let dir = tempdir().unwrap();
    let (db, index) = open_with_index(&dir.path().join("delta.db"), &[]);

    db.upsert_record("notes", &Record::new(1, "one")).unwrap();
    assert_eq!(index.sync().unwrap(), 1);

    db.upsert_record("notes", &Record::new(2, "two")).unwrap();
    db.upsert_record("notes", &Record::new(3, "three")).unwrap();
    // Only the two new events are applied, not a replay of the whole feed
    assert_eq!(index.sync().unwrap(), 2);
    db.close().unwrap();
}

#[test]
fn test_sync_converges_after_table_overwrite() {
    let dir = tempdir().unwrap();
    let (db, index) = open_with_index(
        &dir.path().join("delta.db"),
        &[
            Record::new(1, "first draft"),
            Record::new(2, "second draft"),
            Record::new(3, "third draft"),
        ],
    );

    // Re-creating the table replaces its contents entirely; the index
    // checkpoint predates the overwrite and must still see it.
    db.create_table(
        &TableSpec::new("notes", "index", "text"),
        &[Record::new(9, "fresh start"), Record::new(10, "second wind")],
    )
    .unwrap();
    db.upsert_record("notes", &Record::new(11, "and one more")).unwrap();

    // 3 deletes + 2 overwrite inserts + 1 upsert
    assert_eq!(index.sync().unwrap(), 6);
    assert_eq!(
        index.entry_keys(),
        vec![RecordId::new(9), RecordId::new(10), RecordId::new(11)]
    );

    let hits = index.search("fresh start", 1, SearchMode::Ann).unwrap();
    assert_eq!(hits[0].key, RecordId::new(9));
    db.close().unwrap();
}

#[test]
fn test_delete_of_missing_key_produces_no_event() {
    let dir = tempdir().unwrap();
    let (db, index) = open_with_index(&dir.path().join("delta.db"), &[]);

    assert!(db.delete_record("notes", RecordId::new(42)).unwrap().is_none());
    assert_eq!(index.sync().unwrap(), 0);
    db.close().unwrap();
}

/// Oracle that stalls long enough for a build to be observably in flight.
struct SlowOracle {
    inner: HashingOracle,
    delay: Duration,
}

impl EmbeddingOracle for SlowOracle {
    fn embed(&self, text: &str) -> Result<Embedding> {
        std::thread::sleep(self.delay);
        self.inner.embed(text)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[test]
fn test_sync_during_build_is_a_retryable_conflict() {
    let dir = tempdir().unwrap();
    let oracle = Arc::new(SlowOracle {
        inner: HashingOracle::new(64),
        delay: Duration::from_millis(200),
    });
    let db =
        DeltaSearch::open_with_oracle(dir.path().join("delta.db"), test_config(), oracle).unwrap();
    db.create_table(
        &TableSpec::new("notes", "index", "text"),
        &[
            Record::new(1, "slow one"),
            Record::new(2, "slow two"),
            Record::new(3, "slow three"),
        ],
    )
    .unwrap();
    db.enable_change_tracking("notes").unwrap();
    db.create_endpoint("shared-demo-endpoint").unwrap();

    let index = db.create_index(index_spec(TriggerMode::Triggered)).unwrap();

    // The build thread holds the sync lock for its whole run
    std::thread::sleep(Duration::from_millis(50));
    let err = index.sync().unwrap_err();
    assert!(err.is_retryable());

    index.wait_until_online(&fast_poll()).unwrap();
    // Once the build releases the lock, sync goes through
    assert_eq!(index.sync().unwrap(), 0);
    db.close().unwrap();
}

#[test]
fn test_continuous_mode_syncs_without_explicit_calls() {
    let dir = tempdir().unwrap();
    let config = Config {
        oracle: OracleConfig::Hashing { dimension: 64 },
        poll: PollPolicy::new(Duration::from_millis(20), 2000),
        ..Default::default()
    };
    let db = DeltaSearch::open(dir.path().join("delta.db"), config).unwrap();
    db.create_table(&TableSpec::new("notes", "index", "text"), &[])
        .unwrap();
    db.enable_change_tracking("notes").unwrap();
    db.create_endpoint("shared-demo-endpoint").unwrap();

    let index = db.create_index(index_spec(TriggerMode::Continuous)).unwrap();
    index
        .wait_until_online(&PollPolicy::new(Duration::from_millis(5), 2000))
        .unwrap();

    db.upsert_record("notes", &Record::new(7, "picked up by the background worker")).unwrap();

    // The worker drains the feed on its cadence; poll until it has
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if index.len() == 1 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "continuous worker never applied the change"
        );
        std::thread::sleep(Duration::from_millis(20));
    }

    let hits = index
        .search("picked up by the background worker", 1, SearchMode::Ann)
        .unwrap();
    assert_eq!(hits[0].key, RecordId::new(7));
    db.close().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// After any interleaving of upserts and deletes followed by a sync,
    /// the index entry set equals the live rows of the source table.
    #[test]
    fn prop_index_converges_to_table(ops in proptest::collection::vec((0i64..6, any::<bool>(), "[a-z ]{1,20}"), 1..25)) {
        let dir = tempdir().unwrap();
        let (db, index) = open_with_index(&dir.path().join("delta.db"), &[]);

        for (key, is_delete, text) in ops {
            if is_delete {
                db.delete_record("notes", RecordId::new(key)).unwrap();
            } else {
                db.upsert_record("notes", &Record::new(key, text)).unwrap();
            }
        }

        index.sync().unwrap();
        // Replay safety: a second sync changes nothing
        prop_assert_eq!(index.sync().unwrap(), 0);

        let live: Vec<RecordId> = db.scan_records("notes").unwrap().into_iter().map(|r| r.key).collect();
        prop_assert_eq!(index.entry_keys(), live);
        db.close().unwrap();
    }
}
