//! SQL schema for the Strata SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Cached object types from the external type registry.
CREATE TABLE IF NOT EXISTS object_types (
    uuid           TEXT PRIMARY KEY,
    service_url    TEXT NOT NULL,
    name           TEXT NOT NULL,
    name_plural    TEXT NOT NULL,
    allow_geometry INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL,
    modified_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS objects (
    uuid        TEXT PRIMARY KEY,
    object_type TEXT NOT NULL REFERENCES object_types(uuid),
    created_at  TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

-- Records are append-only. The only UPDATEs ever issued are the end-dating
-- of a superseded open record and the detachment of a correction link.
CREATE TABLE IF NOT EXISTS records (
    object_uuid     TEXT NOT NULL REFERENCES objects(uuid) ON DELETE CASCADE,
    idx             INTEGER NOT NULL,  -- 1-based, unique per object, never reused
    version         INTEGER NOT NULL,  -- object type schema version
    data            TEXT NOT NULL,     -- JSON payload
    start_at        TEXT NOT NULL,     -- material interval, ISO date
    end_at          TEXT,              -- NULL while this is the open record
    registration_at TEXT NOT NULL,     -- formal axis, ISO date
    correct_idx     INTEGER,           -- index of the record this one corrects
    geometry        TEXT,              -- GeoJSON or NULL
    created_at      TEXT NOT NULL,
    PRIMARY KEY (object_uuid, idx),
    UNIQUE (object_uuid, correct_idx)  -- at most one corrector per record
);

CREATE TABLE IF NOT EXISTS tokens (
    token          TEXT PRIMARY KEY,
    contact_person TEXT NOT NULL,
    email          TEXT NOT NULL,
    organization   TEXT NOT NULL DEFAULT '',
    application    TEXT NOT NULL DEFAULT '',
    administration TEXT NOT NULL DEFAULT '',
    is_superuser   INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS permissions (
    token       TEXT NOT NULL REFERENCES tokens(token) ON DELETE CASCADE,
    object_type TEXT NOT NULL REFERENCES object_types(uuid) ON DELETE CASCADE,
    mode        TEXT NOT NULL,            -- 'read_only' | 'read_and_write'
    use_fields  INTEGER NOT NULL DEFAULT 0,
    fields      TEXT NOT NULL DEFAULT '{}',  -- allow-lists keyed by version
    UNIQUE (token, object_type)
);

CREATE INDEX IF NOT EXISTS objects_type_idx       ON objects(object_type);
CREATE INDEX IF NOT EXISTS records_registered_idx ON records(registration_at);
CREATE INDEX IF NOT EXISTS records_interval_idx   ON records(object_uuid, start_at, end_at);

PRAGMA user_version = 1;
";
