// File operations

use rusqlite::params;
use tracing::debug;

use super::{StoreResult, SymbolDatabase};
use crate::extractors::FileInfo;

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl SymbolDatabase {
    /// Idempotent upsert of a file row keyed by path.
    pub fn add_file(&self, file: &FileInfo) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO files
             (path, language, hash, size, last_modified, last_indexed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file.path,
                file.language,
                file.hash,
                file.size,
                file.last_modified,
                unix_now(),
            ],
        )?;
        debug!("Stored file info for: {}", file.path);
        Ok(())
    }

    /// Delete a file row; symbols, identifiers, and relationships cascade in
    /// the same statement's transaction.
    pub fn delete_file(&self, path: &str) -> StoreResult<usize> {
        let count = self
            .conn
            .execute("DELETE FROM files WHERE path = ?1", params![path])?;
        debug!("Deleted file record for: {} ({} rows affected)", path, count);
        Ok(count)
    }

    /// Stored content hash for change detection. None when never indexed.
    pub fn get_file_hash(&self, path: &str) -> StoreResult<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT hash FROM files WHERE path = ?1")?;
        match stmt.query_row(params![path], |row| row.get::<_, String>(0)) {
            Ok(hash) => Ok(Some(hash)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_file(&self, path: &str) -> StoreResult<Option<FileInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, language, hash, size, last_modified FROM files WHERE path = ?1",
        )?;
        match stmt.query_row(params![path], |row| {
            Ok(FileInfo {
                path: row.get(0)?,
                language: row.get(1)?,
                hash: row.get(2)?,
                size: row.get(3)?,
                last_modified: row.get(4)?,
            })
        }) {
            Ok(file) => Ok(Some(file)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All stored path -> hash pairs, used to seed the watcher's hash map.
    pub fn get_file_hashes(&self) -> StoreResult<std::collections::HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT path, hash FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut hashes = std::collections::HashMap::new();
        for row in rows {
            let (path, hash) = row?;
            hashes.insert(path, hash);
        }
        debug!("Retrieved {} file hashes from database", hashes.len());
        Ok(hashes)
    }

    pub fn list_files(&self) -> StoreResult<Vec<FileInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, language, hash, size, last_modified FROM files ORDER BY path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FileInfo {
                path: row.get(0)?,
                language: row.get(1)?,
                hash: row.get(2)?,
                size: row.get(3)?,
                last_modified: row.get(4)?,
            })
        })?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    pub fn file_count(&self) -> StoreResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM files", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file(path: &str) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            language: "python".to_string(),
            hash: format!("hash-{path}"),
            size: 42,
            last_modified: 1_700_000_000,
        }
    }

    #[test]
    fn add_file_is_idempotent() {
        let db = SymbolDatabase::in_memory().unwrap();
        let file = sample_file("src/a.py");
        db.add_file(&file).unwrap();
        db.add_file(&file).unwrap();
        assert_eq!(db.file_count().unwrap(), 1);
    }

    #[test]
    fn hash_round_trip_and_delete() {
        let db = SymbolDatabase::in_memory().unwrap();
        db.add_file(&sample_file("src/a.py")).unwrap();

        assert_eq!(
            db.get_file_hash("src/a.py").unwrap().as_deref(),
            Some("hash-src/a.py")
        );
        assert_eq!(db.get_file_hash("missing.py").unwrap(), None);

        db.delete_file("src/a.py").unwrap();
        assert_eq!(db.get_file_hash("src/a.py").unwrap(), None);
    }
}
