// Symbol queries

use rusqlite::params;

use super::{StoreResult, SymbolDatabase};
use crate::extractors::{Symbol, SymbolKind, Visibility};

pub(crate) const SYMBOL_COLUMNS: &str = "id, name, kind, language, file_path, start_line, \
     start_col, end_line, end_col, start_byte, end_byte, signature, doc_comment, visibility, \
     parent_id";

pub(crate) fn symbol_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(2)?;
    let visibility: Option<String> = row.get(13)?;
    Ok(Symbol {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind.parse().unwrap_or(SymbolKind::Variable),
        language: row.get(3)?,
        file_path: row.get(4)?,
        start_line: row.get::<_, Option<u32>>(5)?.unwrap_or(0),
        start_column: row.get::<_, Option<u32>>(6)?.unwrap_or(0),
        end_line: row.get::<_, Option<u32>>(7)?.unwrap_or(0),
        end_column: row.get::<_, Option<u32>>(8)?.unwrap_or(0),
        start_byte: row.get::<_, Option<u32>>(9)?.unwrap_or(0),
        end_byte: row.get::<_, Option<u32>>(10)?.unwrap_or(0),
        signature: row.get(11)?,
        doc_comment: row.get(12)?,
        visibility: visibility.and_then(|v| match v.as_str() {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Protected),
            _ => None,
        }),
        parent_id: row.get(14)?,
    })
}

impl SymbolDatabase {
    /// Best single match for a name.
    ///
    /// Tie-break: definitions win over imports, then shorter file paths, then
    /// earlier start lines. An optional context file pins the match to that
    /// file when it contains one.
    pub fn get_symbol_by_name(
        &self,
        name: &str,
        context_file: Option<&str>,
    ) -> StoreResult<Option<Symbol>> {
        if let Some(file) = context_file {
            let sql = format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name = ?1 AND file_path = ?2 \
                 ORDER BY (kind = 'import') ASC, start_line ASC LIMIT 1"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            match stmt.query_row(params![name, file], symbol_from_row) {
                Ok(symbol) => return Ok(Some(symbol)),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name = ?1 \
             ORDER BY (kind = 'import') ASC, LENGTH(file_path) ASC, start_line ASC LIMIT 1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        match stmt.query_row(params![name], symbol_from_row) {
            Ok(symbol) => Ok(Some(symbol)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All symbols with a given name.
    pub fn get_symbols_by_name(&self, name: &str) -> StoreResult<Vec<Symbol>> {
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name = ?1 \
             ORDER BY (kind = 'import') ASC, LENGTH(file_path) ASC, start_line ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![name], symbol_from_row)?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    /// All symbols whose name is in `names` (naming-variant lookups).
    pub fn get_symbols_by_names(&self, names: &[String]) -> StoreResult<Vec<Symbol>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; names.len()].join(",");
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name IN ({placeholders}) \
             ORDER BY name ASC, LENGTH(file_path) ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(names.iter());
        let rows = stmt.query_map(params, symbol_from_row)?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    pub fn get_symbol_by_id(&self, id: &str) -> StoreResult<Option<Symbol>> {
        let sql = format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        match stmt.query_row(params![id], symbol_from_row) {
            Ok(symbol) => Ok(Some(symbol)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Symbols whose name starts with `prefix` (import-validation helper).
    pub fn find_symbols_by_name_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> StoreResult<Vec<Symbol>> {
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name LIKE ?1 ESCAPE '\\' \
             ORDER BY name ASC, LENGTH(file_path) ASC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![format!("{escaped}%"), limit as i64], symbol_from_row)?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    /// Symbols whose signature mentions a type name (type-usage scan for the
    /// explorer; no type inference involved).
    pub fn find_symbols_with_signature_containing(
        &self,
        needle: &str,
        limit: usize,
    ) -> StoreResult<Vec<Symbol>> {
        let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols \
             WHERE signature LIKE ?1 ESCAPE '\\' AND name != ?2 \
             ORDER BY file_path ASC, start_line ASC LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![format!("%{escaped}%"), needle, limit as i64],
            symbol_from_row,
        )?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    /// Publicly visible definitions, optionally restricted to one file.
    /// Imports and file stubs never count as exports.
    pub fn get_exported_symbols(&self, file_path: Option<&str>) -> StoreResult<Vec<Symbol>> {
        let base = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols \
             WHERE kind NOT IN ('import', 'file') \
             AND (visibility IS NULL OR visibility = 'public')"
        );
        let mut symbols = Vec::new();
        if let Some(file) = file_path {
            let sql = format!("{base} AND file_path = ?1 ORDER BY start_line ASC");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params![file], symbol_from_row)?;
            for row in rows {
                symbols.push(row?);
            }
        } else {
            let sql = format!("{base} ORDER BY file_path ASC, start_line ASC");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map([], symbol_from_row)?;
            for row in rows {
                symbols.push(row?);
            }
        }
        Ok(symbols)
    }

    /// All symbols in a file, in declaration order.
    pub fn get_symbols_for_file(&self, file_path: &str) -> StoreResult<Vec<Symbol>> {
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE file_path = ?1 ORDER BY start_line ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![file_path], symbol_from_row)?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    /// Direct children in the containment hierarchy.
    pub fn get_child_symbols(&self, parent_id: &str) -> StoreResult<Vec<Symbol>> {
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE parent_id = ?1 ORDER BY start_line ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![parent_id], symbol_from_row)?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    pub fn symbol_count(&self) -> StoreResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM symbols", [], |row| row.get(0))?)
    }
}
