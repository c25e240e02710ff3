//! Embedded database migrations for sunote.
//!
//! Migrations are versioned and run automatically when a store is opened.
//! The schema version is tracked in the `_sunote_meta` table.

/// Current schema version. Increment when adding new migrations.
pub const SCHEMA_VERSION: i64 = 2;

/// A database migration with version number and SQL statements.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

/// All migrations in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        statements: &["CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                due_at INTEGER
            )"],
    },
    Migration {
        version: 2,
        name: "index_due_at",
        statements: &["CREATE INDEX IF NOT EXISTS idx_notes_due_at ON notes(due_at)"],
    },
];

/// Get migrations that need to be applied given the current version.
pub fn get_pending_migrations(current_version: i64) -> Vec<&'static Migration> {
    MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as i64 + 1);
        }
        assert_eq!(MIGRATIONS.last().unwrap().version, SCHEMA_VERSION);
    }

    #[test]
    fn test_pending() {
        assert_eq!(get_pending_migrations(0).len(), MIGRATIONS.len());
        assert_eq!(get_pending_migrations(1)[0].name, "index_due_at");
        assert!(get_pending_migrations(SCHEMA_VERSION).is_empty());
    }
}
