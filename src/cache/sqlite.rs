// src/cache/sqlite.rs
//
// SQLite-backed scenario cache.
//
// Every row carries the generation it was written under. The `generations`
// table records each generation's state (staged | active | retired) and
// publishing flips states inside one transaction, then drops retired rows
// together with any other staged generation left behind by an interrupted run.
// Reads run inside a transaction so they see one consistent generation.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::CacheError;
use crate::types::{CorridorLoadRecord, PredictionRecord, RoutingDecisionRecord, Severity};

use super::{CacheStore, GenerationId, ScenarioRows};

#[derive(Debug)]
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

fn gen_param(generation: GenerationId) -> i64 {
    i64::try_from(generation).unwrap_or(i64::MAX)
}

impl SqliteCacheStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T, CacheError>) -> Result<T, CacheError> {
        let mut guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&mut guard)
    }
}

fn migrate(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS generations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            state TEXT NOT NULL CHECK (state IN ('staged', 'active', 'retired')),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS transit_cache (
            generation INTEGER NOT NULL REFERENCES generations(id) ON DELETE CASCADE,
            scenario_id TEXT NOT NULL,
            minute INTEGER NOT NULL CHECK (minute >= 0 AND minute < 1440),
            location_id TEXT NOT NULL,
            transit_load INTEGER NOT NULL CHECK (transit_load >= 1),
            pedestrian_volume INTEGER NOT NULL CHECK (pedestrian_volume >= 1),
            PRIMARY KEY (generation, scenario_id, minute, location_id)
        );

        CREATE TABLE IF NOT EXISTS predictions (
            generation INTEGER NOT NULL REFERENCES generations(id) ON DELETE CASCADE,
            scenario_id TEXT NOT NULL,
            minute INTEGER NOT NULL CHECK (minute >= 0 AND minute < 1440),
            egress_threat_score REAL NOT NULL CHECK (egress_threat_score >= 0 AND egress_threat_score <= 1),
            estimated_crowd_volume INTEGER NOT NULL CHECK (estimated_crowd_volume >= 0),
            game_state_json TEXT NOT NULL,
            PRIMARY KEY (generation, scenario_id, minute)
        );

        CREATE TABLE IF NOT EXISTS routing_decisions (
            generation INTEGER NOT NULL REFERENCES generations(id) ON DELETE CASCADE,
            scenario_id TEXT NOT NULL,
            minute INTEGER NOT NULL CHECK (minute >= 0 AND minute < 1440),
            danger_routes_json TEXT NOT NULL,
            safe_routes_json TEXT NOT NULL,
            alert_message TEXT NOT NULL,
            severity INTEGER NOT NULL CHECK (severity BETWEEN 1 AND 5),
            PRIMARY KEY (generation, scenario_id, minute)
        );
        ",
    )?;
    Ok(())
}

fn require_state(tx: &Transaction<'_>, generation: GenerationId, state: &str) -> Result<(), CacheError> {
    let found: Option<String> = tx
        .query_row(
            "SELECT state FROM generations WHERE id = ?1",
            params![gen_param(generation)],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(s) if s == state => Ok(()),
        _ => Err(CacheError::UnknownGeneration(generation)),
    }
}

fn active_in(tx: &Transaction<'_>) -> Result<Option<i64>, CacheError> {
    Ok(tx
        .query_row("SELECT id FROM generations WHERE state = 'active'", [], |row| row.get(0))
        .optional()?)
}

impl CacheStore for SqliteCacheStore {
    fn stage(&self) -> Result<GenerationId, CacheError> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO generations (state) VALUES ('staged')", [])?;
            Ok(u64::try_from(conn.last_insert_rowid()).unwrap_or(0))
        })
    }

    fn write_scenario(&self, generation: GenerationId, scenario_id: &str, rows: &ScenarioRows) -> Result<(), CacheError> {
        rows.check_keys(scenario_id)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            require_state(&tx, generation, "staged")?;
            let g = gen_param(generation);

            for table in ["transit_cache", "predictions", "routing_decisions"] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE generation = ?1 AND scenario_id = ?2"),
                    params![g, scenario_id],
                )?;
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO transit_cache
                        (generation, scenario_id, minute, location_id, transit_load, pedestrian_volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for r in &rows.corridor_loads {
                    stmt.execute(params![
                        g,
                        r.scenario_id,
                        r.minute,
                        r.corridor_id,
                        r.transit_load,
                        r.pedestrian_volume
                    ])?;
                }

                let mut stmt = tx.prepare(
                    "INSERT INTO predictions
                        (generation, scenario_id, minute, egress_threat_score, estimated_crowd_volume, game_state_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for r in &rows.predictions {
                    stmt.execute(params![
                        g,
                        r.scenario_id,
                        r.minute,
                        r.threat_score,
                        r.crowd_volume,
                        serde_json::to_string(&r.game_state)?
                    ])?;
                }

                let mut stmt = tx.prepare(
                    "INSERT INTO routing_decisions
                        (generation, scenario_id, minute, danger_routes_json, safe_routes_json, alert_message, severity)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for r in &rows.routing_decisions {
                    stmt.execute(params![
                        g,
                        r.scenario_id,
                        r.minute,
                        serde_json::to_string(&r.danger_routes)?,
                        serde_json::to_string(&r.safe_routes)?,
                        r.alert_message,
                        r.severity.level()
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    fn publish(&self, generation: GenerationId) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            require_state(&tx, generation, "staged")?;
            tx.execute("UPDATE generations SET state = 'retired' WHERE state = 'active'", [])?;
            tx.execute(
                "UPDATE generations SET state = 'active' WHERE id = ?1",
                params![gen_param(generation)],
            )?;
            tx.execute(
                "DELETE FROM generations WHERE state IN ('retired', 'staged') AND id != ?1",
                params![gen_param(generation)],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn discard(&self, generation: GenerationId) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            require_state(&tx, generation, "staged")?;
            tx.execute("DELETE FROM generations WHERE id = ?1", params![gen_param(generation)])?;
            tx.commit()?;
            Ok(())
        })
    }

    fn active_generation(&self) -> Result<Option<GenerationId>, CacheError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let active = active_in(&tx)?;
            tx.commit()?;
            Ok(active.map(|id| u64::try_from(id).unwrap_or(0)))
        })
    }

    fn load_scenario(&self, scenario_id: &str) -> Result<ScenarioRows, CacheError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let Some(g) = active_in(&tx)? else {
                return Ok(ScenarioRows::default());
            };

            let mut out = ScenarioRows::default();
            {
                let mut stmt = tx.prepare(
                    "SELECT scenario_id, minute, location_id, transit_load, pedestrian_volume
                     FROM transit_cache WHERE generation = ?1 AND scenario_id = ?2
                     ORDER BY minute, location_id",
                )?;
                let rows = stmt.query_map(params![g, scenario_id], |row| {
                    Ok(CorridorLoadRecord {
                        scenario_id: row.get(0)?,
                        minute: row.get(1)?,
                        corridor_id: row.get(2)?,
                        transit_load: row.get(3)?,
                        pedestrian_volume: row.get(4)?,
                    })
                })?;
                for r in rows {
                    out.corridor_loads.push(r?);
                }

                let mut stmt = tx.prepare(
                    "SELECT scenario_id, minute, egress_threat_score, estimated_crowd_volume, game_state_json
                     FROM predictions WHERE generation = ?1 AND scenario_id = ?2 ORDER BY minute",
                )?;
                let rows = stmt.query_map(params![g, scenario_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?;
                for r in rows {
                    let (scenario_id, minute, threat_score, crowd_volume, game_json) = r?;
                    out.predictions.push(PredictionRecord {
                        scenario_id,
                        minute,
                        threat_score,
                        crowd_volume,
                        game_state: serde_json::from_str(&game_json)?,
                    });
                }

                let mut stmt = tx.prepare(
                    "SELECT scenario_id, minute, danger_routes_json, safe_routes_json, alert_message, severity
                     FROM routing_decisions WHERE generation = ?1 AND scenario_id = ?2 ORDER BY minute",
                )?;
                let rows = stmt.query_map(params![g, scenario_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, u8>(5)?,
                    ))
                })?;
                for r in rows {
                    let (scenario_id, minute, danger, safe, alert_message, severity) = r?;
                    let severity = Severity::new(severity).ok_or_else(|| {
                        CacheError::Corrupt(format!("routing_decisions({scenario_id}, {minute}).severity = {severity}"))
                    })?;
                    out.routing_decisions.push(RoutingDecisionRecord {
                        scenario_id,
                        minute,
                        danger_routes: serde_json::from_str(&danger)?,
                        safe_routes: serde_json::from_str(&safe)?,
                        alert_message,
                        severity,
                    });
                }
            }
            tx.commit()?;
            Ok(out)
        })
    }

    fn scenario_ids(&self) -> Result<Vec<String>, CacheError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let Some(g) = active_in(&tx)? else {
                return Ok(Vec::new());
            };
            let mut ids = Vec::new();
            {
                let mut stmt = tx.prepare(
                    "SELECT scenario_id FROM predictions WHERE generation = ?1
                     UNION SELECT scenario_id FROM transit_cache WHERE generation = ?1
                     UNION SELECT scenario_id FROM routing_decisions WHERE generation = ?1
                     ORDER BY 1",
                )?;
                let rows = stmt.query_map(params![g], |row| row.get::<_, String>(0))?;
                for r in rows {
                    ids.push(r?);
                }
            }
            tx.commit()?;
            Ok(ids)
        })
    }
}
