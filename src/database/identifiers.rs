// Identifier (reference) queries

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use rusqlite::params;
use serde::Serialize;

use super::{StoreResult, SymbolDatabase};
use crate::extractors::{Identifier, IdentifierKind};

/// Read/write classification of one use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
    Unknown,
}

/// One reference occurrence inside a file.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceHit {
    pub line: u32,
    pub column: u32,
    pub kind: String,
    pub access: AccessKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// References grouped per file, in path order.
#[derive(Debug, Clone, Serialize)]
pub struct FileReferences {
    pub file_path: String,
    pub references: Vec<ReferenceHit>,
}

/// Classify whether a source line reads or writes the symbol. The patterns
/// are line-local: assignment, compound assignment, increment/decrement, and
/// C#-style `out`/`ref` arguments count as writes.
pub fn infer_access(line: &str, symbol_name: &str) -> AccessKind {
    let escaped = regex::escape(symbol_name);

    let assignment = Regex::new(&format!(r"{escaped}\s*=(?:[^=>]|$)")).ok();
    if assignment.is_some_and(|re| re.is_match(line)) {
        return AccessKind::Write;
    }
    let compound = Regex::new(&format!(r"{escaped}\s*[-+*/%&|^]=")).ok();
    if compound.is_some_and(|re| re.is_match(line)) {
        return AccessKind::Write;
    }
    let increment = Regex::new(&format!(
        r"({escaped}\s*(\+\+|--)|(\+\+|--)\s*{escaped})"
    ))
    .ok();
    if increment.is_some_and(|re| re.is_match(line)) {
        return AccessKind::Write;
    }
    let by_ref = Regex::new(&format!(r"\b(out|ref)\s+{escaped}\b")).ok();
    if by_ref.is_some_and(|re| re.is_match(line)) {
        return AccessKind::Write;
    }

    AccessKind::Read
}

impl SymbolDatabase {
    /// All references to a name, grouped per file.
    ///
    /// When `workspace_root` is given, the referenced lines are read back
    /// from the source to classify each hit as read/write; otherwise the
    /// access stays `unknown`.
    pub fn find_references(
        &self,
        name: &str,
        kind_filter: Option<IdentifierKind>,
        limit: usize,
        workspace_root: Option<&Path>,
        include_context: bool,
    ) -> StoreResult<Vec<FileReferences>> {
        let sql = if kind_filter.is_some() {
            "SELECT name, kind, file_path, start_line, start_col FROM identifiers \
             WHERE name = ?1 AND kind = ?2 ORDER BY file_path ASC, start_line ASC LIMIT ?3"
        } else {
            "SELECT name, kind, file_path, start_line, start_col FROM identifiers \
             WHERE name = ?1 ORDER BY file_path ASC, start_line ASC LIMIT ?2"
        };

        let mut stmt = self.conn.prepare(sql)?;
        let kind_str = kind_filter.map(|k| k.to_string());
        let limit = limit as i64;

        let mut grouped: BTreeMap<String, Vec<ReferenceHit>> = BTreeMap::new();
        let mut collect = |row: &rusqlite::Row<'_>| -> rusqlite::Result<()> {
            let kind: String = row.get(1)?;
            let file_path: String = row.get(2)?;
            let line: u32 = row.get(3)?;
            let column: u32 = row.get(4)?;
            grouped.entry(file_path).or_default().push(ReferenceHit {
                line,
                column,
                kind,
                access: AccessKind::Unknown,
                context: None,
            });
            Ok(())
        };

        if let Some(kind) = &kind_str {
            let mut rows = stmt.query(params![name, kind, limit])?;
            while let Some(row) = rows.next()? {
                collect(row)?;
            }
        } else {
            let mut rows = stmt.query(params![name, limit])?;
            while let Some(row) = rows.next()? {
                collect(row)?;
            }
        }

        let mut results: Vec<FileReferences> = grouped
            .into_iter()
            .map(|(file_path, references)| FileReferences {
                file_path,
                references,
            })
            .collect();

        if let Some(root) = workspace_root {
            for file_refs in &mut results {
                let full_path = root.join(&file_refs.file_path);
                let Ok(content) = std::fs::read_to_string(&full_path) else {
                    continue;
                };
                let lines: Vec<&str> = content.lines().collect();
                for hit in &mut file_refs.references {
                    let Some(line) = lines.get(hit.line.saturating_sub(1) as usize) else {
                        continue;
                    };
                    hit.access = infer_access(line, name);
                    if include_context {
                        hit.context = Some(line.trim().to_string());
                    }
                }
            }
        }

        Ok(results)
    }

    /// Count of references to `name` coming from files other than
    /// `defining_file` (self-references do not count as inbound).
    pub fn count_external_references(
        &self,
        name: &str,
        defining_file: &str,
    ) -> StoreResult<(i64, i64)> {
        let total: i64 = self.conn.query_row(
            "SELECT count(*) FROM identifiers WHERE name = ?1 AND file_path != ?2",
            params![name, defining_file],
            |row| row.get(0),
        )?;
        let file_count: i64 = self.conn.query_row(
            "SELECT count(DISTINCT file_path) FROM identifiers WHERE name = ?1 AND file_path != ?2",
            params![name, defining_file],
            |row| row.get(0),
        )?;
        Ok((total, file_count))
    }

    /// Resolve identifiers whose `target_symbol_id` is still null by matching
    /// names against definition symbols, and materialize `Call` relationships
    /// for resolved call sites. Runs after a batch indexing session so edges
    /// cross file-group boundaries.
    ///
    /// Returns the number of identifiers resolved.
    pub fn resolve_pending_identifiers(&mut self) -> StoreResult<usize> {
        use crate::extractors::relationship_id;
        use crate::extractors::RelationshipKind;

        struct Pending {
            id: String,
            name: String,
            kind: String,
            file_path: String,
            start_line: u32,
            containing: Option<String>,
        }

        let pending: Vec<Pending> = {
            let mut stmt = self.conn.prepare(
                "SELECT id, name, kind, file_path, start_line, containing_symbol_id \
                 FROM identifiers WHERE target_symbol_id IS NULL",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Pending {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    kind: row.get(2)?,
                    file_path: row.get(3)?,
                    start_line: row.get(4)?,
                    containing: row.get(5)?,
                })
            })?;
            let mut pending = Vec::new();
            for row in rows {
                pending.push(row?);
            }
            pending
        };

        let mut resolved = 0usize;
        let tx = self.conn.transaction()?;
        {
            let mut find_target = tx.prepare(
                "SELECT id FROM symbols WHERE name = ?1 AND kind NOT IN ('import', 'file') \
                 ORDER BY LENGTH(file_path) ASC, start_line ASC LIMIT 1",
            )?;
            let mut update = tx.prepare(
                "UPDATE identifiers SET target_symbol_id = ?1 WHERE id = ?2",
            )?;
            let mut insert_edge = tx.prepare(
                "INSERT OR REPLACE INTO relationships \
                 (id, from_symbol_id, to_symbol_id, kind, file_path, line_number, confidence) \
                 VALUES (?1, ?2, ?3, 'call', ?4, ?5, 0.8)",
            )?;

            for item in pending {
                let target: Option<String> =
                    match find_target.query_row(params![item.name], |row| row.get(0)) {
                        Ok(id) => Some(id),
                        Err(rusqlite::Error::QueryReturnedNoRows) => None,
                        Err(e) => return Err(e.into()),
                    };
                let Some(target_id) = target else { continue };

                update.execute(params![target_id, item.id])?;
                resolved += 1;

                if item.kind == "call" {
                    if let Some(from_id) = &item.containing {
                        if from_id != &target_id {
                            let edge_id = relationship_id(
                                Some(from_id),
                                Some(&target_id),
                                RelationshipKind::Call,
                                &item.file_path,
                                item.start_line,
                            );
                            insert_edge.execute(params![
                                edge_id,
                                from_id,
                                target_id,
                                item.file_path,
                                item.start_line,
                            ])?;
                        }
                    }
                }
            }
        }
        tx.commit()?;
        Ok(resolved)
    }

    pub fn identifier_count(&self) -> StoreResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM identifiers", [], |row| row.get(0))?)
    }

    /// Identifiers in one file (resolution/debugging helper).
    pub fn get_identifiers_for_file(&self, file_path: &str) -> StoreResult<Vec<Identifier>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, kind, language, file_path, start_line, start_col, end_line, \
             end_col, start_byte, end_byte, containing_symbol_id, target_symbol_id, confidence \
             FROM identifiers WHERE file_path = ?1 ORDER BY start_line ASC",
        )?;
        let rows = stmt.query_map(params![file_path], |row| {
            let kind: String = row.get(2)?;
            Ok(Identifier {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: kind.parse().unwrap_or(IdentifierKind::Reference),
                language: row.get(3)?,
                file_path: row.get(4)?,
                start_line: row.get(5)?,
                start_column: row.get(6)?,
                end_line: row.get(7)?,
                end_column: row.get(8)?,
                start_byte: row.get::<_, Option<u32>>(9)?.unwrap_or(0),
                end_byte: row.get::<_, Option<u32>>(10)?.unwrap_or(0),
                containing_symbol_id: row.get(11)?,
                target_symbol_id: row.get(12)?,
                confidence: row.get(13)?,
            })
        })?;
        let mut identifiers = Vec::new();
        for row in rows {
            identifiers.push(row?);
        }
        Ok(identifiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{ExtractionAdapter, FileInfo};

    #[test]
    fn access_inference_patterns() {
        assert_eq!(infer_access("counter = 5", "counter"), AccessKind::Write);
        assert_eq!(infer_access("counter += 1", "counter"), AccessKind::Write);
        assert_eq!(infer_access("counter++", "counter"), AccessKind::Write);
        assert_eq!(infer_access("Parse(out counter)", "counter"), AccessKind::Write);
        assert_eq!(infer_access("print(counter)", "counter"), AccessKind::Read);
        // Equality comparison is a read, not a write.
        assert_eq!(infer_access("if counter == 5:", "counter"), AccessKind::Read);
        // Arrow functions are not assignments to the symbol.
        assert_eq!(infer_access("counter => counter + 1", "counter"), AccessKind::Read);
    }

    #[test]
    fn references_group_by_file_with_access() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.py");
        std::fs::write(
            &main,
            "def helper():\n    pass\n\ndef run():\n    helper()\n    helper()\n",
        )
        .unwrap();
        let other = dir.path().join("other.py");
        std::fs::write(&other, "def go():\n    helper()\n").unwrap();

        let adapter = ExtractionAdapter::new();
        let mut db = SymbolDatabase::in_memory().unwrap();
        let batch = adapter.extract_files(&[main, other], dir.path()).unwrap();
        db.apply_flush(&[], &batch).unwrap();

        let refs = db
            .find_references("helper", None, 100, Some(dir.path()), true)
            .unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].file_path, "main.py");
        assert_eq!(refs[0].references.len(), 2);
        assert_eq!(refs[1].file_path, "other.py");
        assert_eq!(refs[1].references[0].access, AccessKind::Read);
        assert!(refs[1].references[0]
            .context
            .as_deref()
            .unwrap()
            .contains("helper()"));
    }

    #[test]
    fn external_reference_counts_exclude_defining_file() {
        let db = SymbolDatabase::in_memory().unwrap();
        for path in ["a.py", "b.py"] {
            db.add_file(&FileInfo {
                path: path.to_string(),
                language: "python".into(),
                hash: "h".into(),
                size: 1,
                last_modified: 0,
            })
            .unwrap();
        }
        db.conn
            .execute(
                "INSERT INTO identifiers (id, name, kind, language, file_path, start_line, start_col, end_line, end_col)
                 VALUES ('i1', 'f', 'call', 'python', 'a.py', 1, 0, 1, 0),
                        ('i2', 'f', 'call', 'python', 'b.py', 2, 0, 2, 0),
                        ('i3', 'f', 'call', 'python', 'b.py', 3, 0, 3, 0)",
                [],
            )
            .unwrap();

        let (total, files) = db.count_external_references("f", "a.py").unwrap();
        assert_eq!((total, files), (2, 1));
    }
}
