// tests/cache_tests.rs
//
// Generation swap semantics seen from an independent reader, and parity
// between the in-memory and SQLite stores.

use tempfile::tempdir;

use crowdshield::config::Config;
use crowdshield::logging::NoopSink;
use crowdshield::{CacheError, CacheStore, MemoryCacheStore, Pipeline, SqliteCacheStore};

#[test]
fn reader_sees_old_generation_until_publish() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cache.db");

    let pipeline = Pipeline::offline(Config::default());
    let writer = SqliteCacheStore::open(&db).unwrap();
    let first = pipeline.run_all(&writer, &mut NoopSink).unwrap();

    let reader = SqliteCacheStore::open(&db).unwrap();
    let before = reader.load_scenario("scenario_c_blowout_q3").unwrap();
    assert_eq!(before.predictions.len(), 1440);

    // Stage a replacement that only carries one scenario.
    let rows = pipeline.run_scenario("scenario_a_normal_exit", &mut NoopSink).unwrap();
    let g = writer.stage().unwrap();
    writer.write_scenario(g, "scenario_a_normal_exit", &rows).unwrap();

    assert_eq!(reader.active_generation().unwrap(), Some(first.generation));
    assert_eq!(reader.load_scenario("scenario_c_blowout_q3").unwrap(), before);

    writer.publish(g).unwrap();
    assert_eq!(reader.active_generation().unwrap(), Some(g));
    assert!(reader.load_scenario("scenario_c_blowout_q3").unwrap().is_empty());
    assert_eq!(reader.scenario_ids().unwrap(), vec!["scenario_a_normal_exit".to_string()]);
}

#[test]
fn sqlite_and_memory_stores_agree() {
    let pipeline = Pipeline::offline(Config::default());

    let memory = MemoryCacheStore::new();
    let sqlite = SqliteCacheStore::open_in_memory().unwrap();
    let a = pipeline.run_all(&memory, &mut NoopSink).unwrap();
    let b = pipeline.run_all(&sqlite, &mut NoopSink).unwrap();
    assert_eq!(a.scenarios, b.scenarios);

    for s in &a.scenarios {
        let m = memory.load_scenario(&s.scenario_id).unwrap();
        let q = sqlite.load_scenario(&s.scenario_id).unwrap();
        assert_eq!(m, q, "{}", s.scenario_id);
        assert_eq!(q.checksum().unwrap(), s.checksum);
    }
}

#[test]
fn published_generation_cannot_be_reused() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    let g = store.stage().unwrap();
    store.publish(g).unwrap();
    assert!(matches!(store.publish(g), Err(CacheError::UnknownGeneration(_))));
    assert!(matches!(store.discard(g), Err(CacheError::UnknownGeneration(_))));
    assert_eq!(store.active_generation().unwrap(), Some(g));
}

#[test]
fn interrupted_run_leaves_no_rows_behind() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cache.db");
    let pipeline = Pipeline::offline(Config::default());

    // A run that stages and writes, then dies before publishing.
    {
        let store = SqliteCacheStore::open(&db).unwrap();
        let rows = pipeline.run_scenario("scenario_a_normal_exit", &mut NoopSink).unwrap();
        let g = store.stage().unwrap();
        store.write_scenario(g, "scenario_a_normal_exit", &rows).unwrap();
    }

    let store = SqliteCacheStore::open(&db).unwrap();
    pipeline.run_all(&store, &mut NoopSink).unwrap();
    let last = pipeline.run_all(&store, &mut NoopSink).unwrap();
    drop(store);

    let conn = rusqlite::Connection::open(&db).unwrap();
    let generations: i64 = conn
        .query_row("SELECT COUNT(*) FROM generations", [], |row| row.get(0))
        .unwrap();
    let stale: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM transit_cache WHERE generation != ?1",
            [last.generation as i64],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(generations, 1);
    assert_eq!(stale, 0);
}
