// Reachability closure over Call relationships
//
// Stores (from, to, min_distance) rows computed by iterative frontier
// expansion, capped at a maximum distance. The closure powers dead-code
// detection, hot-spot ranking, and search graph expansion.

use std::collections::{HashMap, HashSet};

use rusqlite::params;
use serde::Serialize;
use tracing::{debug, info};

use super::symbols::{symbol_from_row, SYMBOL_COLUMNS};
use super::{StoreResult, SymbolDatabase};
use crate::extractors::{Symbol, SymbolKind};

/// Distance cap bounding closure cost.
pub const MAX_CLOSURE_DISTANCE: u32 = 10;

const STALE_KEY: &str = "reachability_stale";

/// A highly-referenced symbol with its usage counts.
#[derive(Debug, Clone, Serialize)]
pub struct HotSpot {
    pub symbol: Symbol,
    pub reference_count: i64,
    pub referencing_file_count: i64,
    pub inbound_call_count: i64,
}

/// Filtering knobs for dead-code detection.
#[derive(Debug, Clone)]
pub struct DeadCodeOptions {
    pub limit: usize,
}

impl Default for DeadCodeOptions {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

/// Path segments that exempt a file from dead-code analysis.
fn is_test_path(path: &str) -> bool {
    path.split('/')
        .any(|segment| matches!(segment, "tests" | "test" | "__tests__" | "spec"))
        || path
            .rsplit('/')
            .next()
            .is_some_and(|name| name.starts_with("test_") || name.ends_with("_test.py"))
}

/// Names exempt from dead-code analysis: private (`_x`), test-prefixed, and
/// conventional entry points.
fn is_exempt_name(name: &str) -> bool {
    name.starts_with('_')
        || name.starts_with("test_")
        || name.starts_with("Test")
        || matches!(name, "main" | "__init__" | "init" | "new")
}

impl SymbolDatabase {
    /// Mark the closure stale; the next consumer refreshes before reading.
    pub fn mark_reachability_stale(&self) -> StoreResult<()> {
        self.set_meta(STALE_KEY, "1")
    }

    pub fn is_reachability_stale(&self) -> StoreResult<bool> {
        Ok(self.get_meta(STALE_KEY)?.as_deref() == Some("1"))
    }

    /// Recompute the closure from scratch when stale. No-op otherwise.
    pub fn refresh_reachability_if_stale(&mut self) -> StoreResult<()> {
        if self.is_reachability_stale()? {
            self.refresh_reachability()?;
        }
        Ok(())
    }

    /// Rebuild the `(from, to, min_distance)` closure over Call edges with
    /// iterative frontier expansion. Terminates when an iteration adds no new
    /// pairs or the distance cap is reached.
    pub fn refresh_reachability(&mut self) -> StoreResult<usize> {
        let start_time = std::time::Instant::now();
        let edges = self.call_edges()?;

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for (from, to) in &edges {
            adjacency.entry(from.as_str()).or_default().push(to.as_str());
        }

        // BFS per source; visited-set bounds each expansion.
        let mut closure: Vec<(&str, &str, u32)> = Vec::new();
        for source in adjacency.keys().copied() {
            // The source is not pre-seeded so a cycle back to it still
            // produces a closure row at its true distance.
            let mut seen: HashSet<&str> = HashSet::new();
            let mut frontier: Vec<&str> = vec![source];
            let mut distance = 0u32;

            while !frontier.is_empty() && distance < MAX_CLOSURE_DISTANCE {
                distance += 1;
                let mut next_frontier = Vec::new();
                for node in frontier {
                    if let Some(targets) = adjacency.get(node) {
                        for &target in targets {
                            if seen.insert(target) {
                                closure.push((source, target, distance));
                                next_frontier.push(target);
                            }
                        }
                    }
                }
                frontier = next_frontier;
            }
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM reachability", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO reachability (from_symbol_id, to_symbol_id, min_distance) \
                 VALUES (?1, ?2, ?3)",
            )?;
            for (from, to, distance) in &closure {
                stmt.execute(params![from, to, distance])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, '0')",
            params![STALE_KEY],
        )?;
        tx.commit()?;

        info!(
            "Reachability closure rebuilt: {} rows from {} edges in {:.1}ms",
            closure.len(),
            edges.len(),
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        Ok(closure.len())
    }

    /// Closure rows reachable from a symbol, nearest first.
    pub fn reachable_from(&self, symbol_id: &str, max_distance: u32) -> StoreResult<Vec<(String, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT to_symbol_id, min_distance FROM reachability \
             WHERE from_symbol_id = ?1 AND min_distance <= ?2 ORDER BY min_distance ASC",
        )?;
        let rows = stmt.query_map(params![symbol_id, max_distance], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Closure rows that can reach a symbol, nearest first.
    pub fn reaching(&self, symbol_id: &str, max_distance: u32) -> StoreResult<Vec<(String, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_symbol_id, min_distance FROM reachability \
             WHERE to_symbol_id = ?1 AND min_distance <= ?2 ORDER BY min_distance ASC",
        )?;
        let rows = stmt.query_map(params![symbol_id, max_distance], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn inbound_closure_count(&self, symbol_id: &str) -> StoreResult<i64> {
        Ok(self.conn.query_row(
            "SELECT count(*) FROM reachability WHERE to_symbol_id = ?1",
            params![symbol_id],
            |row| row.get(0),
        )?)
    }

    /// Functions and classes with no inbound edges of any kind.
    ///
    /// Exclusions: test files, private/test-prefixed names, entry points, and
    /// symbols referenced by identifiers from other files (self-references in
    /// the defining file do not count).
    pub fn dead_code_candidates(&mut self, options: &DeadCodeOptions) -> StoreResult<Vec<Symbol>> {
        self.refresh_reachability_if_stale()?;

        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols s \
             WHERE s.kind IN ('function', 'class') \
             AND NOT EXISTS (SELECT 1 FROM relationships r \
                             WHERE r.to_symbol_id = s.id AND r.from_symbol_id != s.id) \
             AND NOT EXISTS (SELECT 1 FROM reachability rc \
                             WHERE rc.to_symbol_id = s.id AND rc.from_symbol_id != s.id) \
             AND NOT EXISTS (SELECT 1 FROM identifiers i \
                             WHERE i.name = s.name AND i.file_path != s.file_path) \
             ORDER BY s.file_path ASC, s.start_line ASC"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], symbol_from_row)?;

        let mut candidates = Vec::new();
        for row in rows {
            let symbol: Symbol = row?;
            if is_test_path(&symbol.file_path) || is_exempt_name(&symbol.name) {
                continue;
            }
            candidates.push(symbol);
            if candidates.len() >= options.limit {
                break;
            }
        }
        debug!("Dead-code scan found {} candidates", candidates.len());
        Ok(candidates)
    }

    /// Symbols ranked by how widely they are referenced: external identifier
    /// references first, then distinct referencing files, then inbound call
    /// closure. Imports are down-weighted out of the ranking.
    pub fn hot_spots(&mut self, limit: usize) -> StoreResult<Vec<HotSpot>> {
        self.refresh_reachability_if_stale()?;

        let sql = format!(
            "SELECT {SYMBOL_COLUMNS}, \
             (SELECT count(*) FROM identifiers i \
              WHERE i.name = s.name AND i.file_path != s.file_path) AS ref_count, \
             (SELECT count(DISTINCT i.file_path) FROM identifiers i \
              WHERE i.name = s.name AND i.file_path != s.file_path) AS ref_files, \
             (SELECT count(*) FROM reachability rc WHERE rc.to_symbol_id = s.id) AS inbound \
             FROM symbols s \
             ORDER BY ref_count DESC, ref_files DESC, inbound DESC \
             LIMIT ?1"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![(limit * 3) as i64], |row| {
            let symbol = symbol_from_row(row)?;
            let reference_count: i64 = row.get(15)?;
            let referencing_file_count: i64 = row.get(16)?;
            let inbound_call_count: i64 = row.get(17)?;
            Ok(HotSpot {
                symbol,
                reference_count,
                referencing_file_count,
                inbound_call_count,
            })
        })?;

        let mut spots = Vec::new();
        for row in rows {
            let spot: HotSpot = row?;
            if spot.symbol.kind == SymbolKind::File {
                continue;
            }
            if spot.reference_count + spot.inbound_call_count == 0 {
                continue;
            }
            // Imports score a fraction of their raw counts so definitions
            // dominate the ranking.
            if spot.symbol.kind == SymbolKind::Import && spot.reference_count < 5 {
                continue;
            }
            spots.push(spot);
            if spots.len() >= limit {
                break;
            }
        }
        Ok(spots)
    }
}
