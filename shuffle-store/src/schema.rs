//! Schema for the durable store. Extends the minimal schema named in
//! the interface spec with `queued_until_index` and a `skipped_tracks`
//! table, both required by the data model but absent from the
//! original distillation's schema.

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    spotify_user_id TEXT NOT NULL UNIQUE,
    display_name    TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
    user_id       INTEGER NOT NULL UNIQUE REFERENCES users(id),
    access_token  TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    expires_at    TEXT NOT NULL,
    scopes        TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS runs (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id            INTEGER NOT NULL REFERENCES users(id),
    playlist_id        TEXT NOT NULL,
    mode               TEXT NOT NULL CHECK (mode IN ('utility', 'controller')),
    shuffled_order      TEXT NOT NULL DEFAULT '[]',
    cursor             INTEGER NOT NULL DEFAULT 0,
    queued_until_index INTEGER NOT NULL DEFAULT 0,
    status             TEXT NOT NULL CHECK (status IN ('active', 'completed', 'cancelled')),
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_runs_active_unique
    ON runs(user_id, playlist_id, mode)
    WHERE status = 'active';

CREATE INDEX IF NOT EXISTS idx_runs_user_playlist_mode
    ON runs(user_id, playlist_id, mode);

CREATE TABLE IF NOT EXISTS skipped_tracks (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id     INTEGER NOT NULL REFERENCES runs(id),
    uri        TEXT NOT NULL,
    reason     TEXT NOT NULL CHECK (reason IN ('local', 'episode', 'unavailable', 'duplicate')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_skipped_tracks_run ON skipped_tracks(run_id);
";
