//! SQL schema for the Sightline SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Devices are created once and never mutated.
CREATE TABLE IF NOT EXISTS devices (
    token       TEXT PRIMARY KEY CHECK (length(token) = 36),
    user_id     INTEGER,
    user_agent  TEXT,
    created_at  TEXT NOT NULL          -- RFC 3339 UTC, microseconds
);

-- One row per request: an observation log, not a mapping.
CREATE TABLE IF NOT EXISTS device_ips (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    device_token  TEXT NOT NULL REFERENCES devices(token) ON DELETE CASCADE,
    ip            TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

-- hostname IS NULL means the tracked site itself.
CREATE TABLE IF NOT EXISTS links (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    scheme    TEXT NOT NULL,
    hostname  TEXT,
    path      TEXT NOT NULL,
    query     TEXT,
    fragment  TEXT,
    name      TEXT NOT NULL
);

-- Query and fragment are stored as written, so no sentinel value is safe.
-- Each nullable column contributes a NULL flag plus its text, which keeps
-- NULL distinct from every stored value, the empty string included.
CREATE UNIQUE INDEX IF NOT EXISTS links_natural_key_idx ON links (
    scheme,
    hostname IS NULL, IFNULL(hostname, ''),
    path,
    query IS NULL,    IFNULL(query, ''),
    fragment IS NULL, IFNULL(fragment, ''),
    name
);

-- Visits are insert-only; only the retention sweep deletes them.
CREATE TABLE IF NOT EXISTS visits (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    link_id       INTEGER NOT NULL REFERENCES links(id) ON DELETE RESTRICT,
    device_ip_id  INTEGER NOT NULL REFERENCES device_ips(id) ON DELETE RESTRICT,
    height        INTEGER NOT NULL CHECK (height >= 0),
    width         INTEGER NOT NULL CHECK (width >= 0),
    position_xy   TEXT NOT NULL,       -- 'x,y' with six decimals
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS device_ips_device_idx ON device_ips(device_token);
CREATE INDEX IF NOT EXISTS visits_link_idx       ON visits(link_id);
CREATE INDEX IF NOT EXISTS visits_device_ip_idx  ON visits(device_ip_id);
CREATE INDEX IF NOT EXISTS visits_created_idx    ON visits(created_at);

PRAGMA user_version = 1;
";
