pub const SCHEMA: &str = r#"
-- One row per reviewed photo. Unreviewed photos have no row.
CREATE TABLE IF NOT EXISTS decisions (
    photo_id TEXT PRIMARY KEY,
    state TEXT NOT NULL,       -- 'archived' or 'trashed'
    decided_at TEXT            -- RFC 3339, NULL for imported legacy records
);
"#;

/// Applied after SCHEMA on every open. Failures (already applied) are ignored.
pub const MIGRATIONS: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_decisions_state ON decisions(state)",
];
