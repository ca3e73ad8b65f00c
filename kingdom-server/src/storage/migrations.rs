//! Database Migrations - PostgreSQL schema for the kingdom server
//!
//! Applied in order by `PostgresStore::run_migrations`, each exactly once.

/// Characters, realm tiles and friendships
pub const MIGRATION_V1: &str = r#"
-- ============================================================================
-- 1. Characters (experience ledger + gold balance)
-- ============================================================================

CREATE TABLE IF NOT EXISTS characters (
    user_id         TEXT PRIMARY KEY,
    experience      BIGINT NOT NULL DEFAULT 0 CHECK (experience >= 0),
    level           INTEGER NOT NULL DEFAULT 1,  -- cached, derived from experience
    gold            BIGINT NOT NULL DEFAULT 0 CHECK (gold >= 0),
    updated_at      TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);

-- ============================================================================
-- 2. Realm tiles (sparse: a missing row is an empty cell)
-- ============================================================================

CREATE TABLE IF NOT EXISTS realm_tiles (
    user_id         TEXT NOT NULL,
    x               INTEGER NOT NULL CHECK (x >= 0),
    y               INTEGER NOT NULL CHECK (y >= 0),
    tile_type       SMALLINT NOT NULL CHECK (tile_type >= 0),
    event_type      TEXT,
    meta            JSONB,
    updated_at      TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),

    PRIMARY KEY (user_id, x, y)
);

-- ============================================================================
-- 3. Friendships (0 = pending, 1 = accepted)
-- ============================================================================

CREATE TABLE IF NOT EXISTS friendships (
    user_id         TEXT NOT NULL,
    friend_id       TEXT NOT NULL,
    status          SMALLINT NOT NULL DEFAULT 0,
    created_at      TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),

    PRIMARY KEY (user_id, friend_id),
    CONSTRAINT no_self_friendship CHECK (user_id <> friend_id)
);

CREATE INDEX IF NOT EXISTS idx_friendships_friend ON friendships(friend_id);
"#;

/// Get all migration SQL statements in order
pub fn get_migrations() -> Vec<(&'static str, &'static str)> {
    vec![("v1_kingdom_schema", MIGRATION_V1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_names_unique() {
        let migrations = get_migrations();
        let mut names: Vec<_> = migrations.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), migrations.len());
    }

    #[test]
    fn test_realm_tiles_keyed_by_user_and_cell() {
        assert!(MIGRATION_V1.contains("PRIMARY KEY (user_id, x, y)"));
    }
}
