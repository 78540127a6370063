// Bulk columnar writes: one transaction per flush

use rusqlite::params;
use tracing::{debug, info};

use super::{StoreError, StoreResult, SymbolDatabase};
use crate::extractors::ExtractionBatch;

impl SymbolDatabase {
    /// Apply one ingestion flush atomically.
    ///
    /// Ordering inside the transaction: stale rows for `files_to_clean` are
    /// deleted first (cascading to their symbols, identifiers, and
    /// relationships), then files, symbols, identifiers, and relationships
    /// are inserted column-wise. A delete for a path therefore always
    /// precedes the insert for the same path within the same transaction.
    pub fn apply_flush(
        &mut self,
        files_to_clean: &[String],
        batch: &ExtractionBatch,
    ) -> StoreResult<()> {
        let start_time = std::time::Instant::now();
        let tx = self.conn.transaction().map_err(StoreError::from)?;

        for path in files_to_clean {
            tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        }

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO files
                 (path, language, hash, size, last_modified, last_indexed)
                 VALUES (?1, ?2, ?3, ?4, ?5, strftime('%s','now'))",
            )?;
            let files = &batch.files;
            for i in 0..files.len() {
                stmt.execute(params![
                    files.paths[i],
                    files.languages[i],
                    files.hashes[i],
                    files.sizes[i],
                    files.last_modifieds[i],
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO symbols
                 (id, name, kind, language, file_path, start_line, start_col,
                  end_line, end_col, start_byte, end_byte, signature, doc_comment,
                  visibility, parent_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            let symbols = &batch.symbols;
            for i in 0..symbols.len() {
                stmt.execute(params![
                    symbols.ids[i],
                    symbols.names[i],
                    symbols.kinds[i].to_string(),
                    symbols.languages[i],
                    symbols.file_paths[i],
                    symbols.start_lines[i],
                    symbols.start_columns[i],
                    symbols.end_lines[i],
                    symbols.end_columns[i],
                    symbols.start_bytes[i],
                    symbols.end_bytes[i],
                    symbols.signatures[i],
                    symbols.doc_comments[i],
                    symbols.visibilities[i].map(|v| v.to_string()),
                    symbols.parent_ids[i],
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO identifiers
                 (id, name, kind, language, file_path, start_line, start_col,
                  end_line, end_col, start_byte, end_byte, containing_symbol_id,
                  target_symbol_id, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            let identifiers = &batch.identifiers;
            for i in 0..identifiers.len() {
                stmt.execute(params![
                    identifiers.ids[i],
                    identifiers.names[i],
                    identifiers.kinds[i].to_string(),
                    identifiers.languages[i],
                    identifiers.file_paths[i],
                    identifiers.start_lines[i],
                    identifiers.start_columns[i],
                    identifiers.end_lines[i],
                    identifiers.end_columns[i],
                    identifiers.start_bytes[i],
                    identifiers.end_bytes[i],
                    identifiers.containing_symbol_ids[i],
                    identifiers.target_symbol_ids[i],
                    identifiers.confidences[i],
                ])?;
            }
        }

        let mut skipped = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO relationships
                 (id, from_symbol_id, to_symbol_id, kind, file_path, line_number, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            let relationships = &batch.relationships;
            for i in 0..relationships.len() {
                let result = stmt.execute(params![
                    relationships.ids[i],
                    relationships.from_symbol_ids[i],
                    relationships.to_symbol_ids[i],
                    relationships.kinds[i].to_string(),
                    relationships.file_paths[i],
                    relationships.line_numbers[i],
                    relationships.confidences[i],
                ]);
                match result {
                    Ok(_) => {}
                    // Edges into symbols outside the batch (external crates,
                    // unindexed files) are skipped, not fatal.
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        skipped += 1;
                        debug!(
                            "Skipping relationship {:?} -> {:?} (missing symbol reference)",
                            relationships.from_symbol_ids[i], relationships.to_symbol_ids[i]
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tx.commit()?;

        let duration = start_time.elapsed();
        info!(
            "Flush committed: {} files, {} symbols, {} identifiers, {} relationships ({} skipped) in {:.1}ms",
            batch.files.len(),
            batch.symbols.len(),
            batch.identifiers.len(),
            batch.relationships.len() - skipped,
            skipped,
            duration.as_secs_f64() * 1000.0
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::ExtractionAdapter;

    #[test]
    fn flush_replaces_stale_rows_for_updated_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def old_name():\n    pass\n").unwrap();

        let adapter = ExtractionAdapter::new();
        let mut db = SymbolDatabase::in_memory().unwrap();

        let batch = adapter
            .extract_files(std::slice::from_ref(&file), dir.path())
            .unwrap();
        db.apply_flush(&[], &batch).unwrap();
        assert!(db.get_symbol_by_name("old_name", None).unwrap().is_some());

        std::fs::write(&file, "def new_name():\n    pass\n").unwrap();
        let batch = adapter
            .extract_files(std::slice::from_ref(&file), dir.path())
            .unwrap();
        db.apply_flush(&["a.py".to_string()], &batch).unwrap();

        assert!(db.get_symbol_by_name("old_name", None).unwrap().is_none());
        assert!(db.get_symbol_by_name("new_name", None).unwrap().is_some());
    }

    #[test]
    fn delete_cascades_to_all_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.py");
        std::fs::write(
            &file,
            "def used():\n    pass\n\ndef main():\n    used()\n",
        )
        .unwrap();

        let adapter = ExtractionAdapter::new();
        let mut db = SymbolDatabase::in_memory().unwrap();
        let batch = adapter.extract_files(&[file], dir.path()).unwrap();
        db.apply_flush(&[], &batch).unwrap();

        assert!(db.symbol_count().unwrap() > 0);
        db.delete_file("main.py").unwrap();

        let symbols: i64 = db
            .conn
            .query_row(
                "SELECT count(*) FROM symbols WHERE file_path = 'main.py'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        let identifiers: i64 = db
            .conn
            .query_row(
                "SELECT count(*) FROM identifiers WHERE file_path = 'main.py'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        let relationships: i64 = db
            .conn
            .query_row(
                "SELECT count(*) FROM relationships WHERE file_path = 'main.py'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!((symbols, identifiers, relationships), (0, 0, 0));
    }
}
