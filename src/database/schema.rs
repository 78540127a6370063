// Database schema initialization and table creation

use super::{StoreResult, SymbolDatabase};
use tracing::debug;

impl SymbolDatabase {
    /// Initialize the complete database schema.
    pub(super) fn initialize_schema(&mut self) -> StoreResult<()> {
        debug!("Creating database schema");

        // Create tables in dependency order
        self.create_files_table()?;
        self.create_symbols_table()?;
        self.create_identifiers_table()?;
        self.create_relationships_table()?;
        self.create_reachability_table()?;
        self.create_meta_table()?;

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Create the files table for tracking source files.
    fn create_files_table(&self) -> StoreResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                language TEXT NOT NULL,
                hash TEXT NOT NULL,
                size INTEGER NOT NULL,
                last_modified INTEGER NOT NULL,
                last_indexed INTEGER DEFAULT 0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_files_language ON files(language)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_files_modified ON files(last_modified)",
            [],
        )?;

        debug!("Created files table and indexes");
        Ok(())
    }

    /// Create the symbols table with rich metadata.
    fn create_symbols_table(&self) -> StoreResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS symbols (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                language TEXT NOT NULL,
                file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
                start_line INTEGER,
                start_col INTEGER,
                end_line INTEGER,
                end_col INTEGER,
                start_byte INTEGER,
                end_byte INTEGER,
                signature TEXT,
                doc_comment TEXT,
                visibility TEXT,
                parent_id TEXT REFERENCES symbols(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_parent ON symbols(parent_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind)",
            [],
        )?;

        debug!("Created symbols table and indexes");
        Ok(())
    }

    /// Create the identifiers table for reference tracking.
    fn create_identifiers_table(&self) -> StoreResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS identifiers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                language TEXT NOT NULL,
                file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
                start_line INTEGER NOT NULL,
                start_col INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                end_col INTEGER NOT NULL,
                start_byte INTEGER,
                end_byte INTEGER,
                containing_symbol_id TEXT REFERENCES symbols(id) ON DELETE CASCADE,
                target_symbol_id TEXT REFERENCES symbols(id) ON DELETE SET NULL,
                confidence REAL DEFAULT 1.0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_identifiers_name ON identifiers(name)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_identifiers_file ON identifiers(file_path)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_identifiers_target ON identifiers(target_symbol_id)",
            [],
        )?;

        debug!("Created identifiers table and indexes");
        Ok(())
    }

    /// Create the relationships table for resolved edges.
    ///
    /// Endpoints are nullable: an unresolved import keeps one side open.
    fn create_relationships_table(&self) -> StoreResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS relationships (
                id TEXT PRIMARY KEY,
                from_symbol_id TEXT REFERENCES symbols(id) ON DELETE CASCADE,
                to_symbol_id TEXT REFERENCES symbols(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
                line_number INTEGER NOT NULL DEFAULT 0,
                confidence REAL DEFAULT 1.0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_rel_from ON relationships(from_symbol_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_symbol_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_rel_kind ON relationships(kind)",
            [],
        )?;

        debug!("Created relationships table and indexes");
        Ok(())
    }

    /// Create the reachability closure table.
    fn create_reachability_table(&self) -> StoreResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS reachability (
                from_symbol_id TEXT NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                to_symbol_id TEXT NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                min_distance INTEGER NOT NULL,
                PRIMARY KEY (from_symbol_id, to_symbol_id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reach_from ON reachability(from_symbol_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reach_to ON reachability(to_symbol_id)",
            [],
        )?;

        debug!("Created reachability table and indexes");
        Ok(())
    }

    /// Key/value table for engine state flags.
    fn create_meta_table(&self) -> StoreResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}
