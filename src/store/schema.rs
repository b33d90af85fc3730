/// Version stored in `PRAGMA user_version`. Bump it when the tables change.
pub const SCHEMA_VERSION: i32 = 1;

pub const SCHEMA: &str = r#"
-- Writes awaiting replay
CREATE TABLE IF NOT EXISTS pending (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pending_timestamp ON pending(timestamp);
CREATE INDEX IF NOT EXISTS idx_pending_kind ON pending(kind);

-- Memoized values with absolute expiry
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    expires INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_timestamp ON cache(timestamp);

-- Captures recorded while offline
CREATE TABLE IF NOT EXISTS extractions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    file_data TEXT NOT NULL,
    file_type TEXT NOT NULL,
    result TEXT,
    timestamp INTEGER NOT NULL,
    status TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_extractions_timestamp ON extractions(timestamp);
CREATE INDEX IF NOT EXISTS idx_extractions_status ON extractions(status);
"#;
