pub const SCHEMA: &str = r#"
-- Content-shaped records, shared by every sibling. workspace: 0 = offline, 1 = online
CREATE TABLE IF NOT EXISTS resources (
    workspace INTEGER NOT NULL,
    resource_id TEXT NOT NULL,
    resource_type INTEGER NOT NULL,
    flags INTEGER NOT NULL DEFAULT 0,
    project_last_modified INTEGER,  -- NULL = not owned by any project
    date_created TEXT NOT NULL,
    created_by TEXT NOT NULL,
    date_last_modified TEXT NOT NULL,
    last_modified_by TEXT NOT NULL,
    length INTEGER NOT NULL DEFAULT 0,
    content_id TEXT,
    sibling_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (workspace, resource_id)
);

-- Path-shaped records; N structures may reference one resource
CREATE TABLE IF NOT EXISTS structures (
    workspace INTEGER NOT NULL,
    structure_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    parent_id TEXT,
    resource_path TEXT NOT NULL,
    state INTEGER NOT NULL DEFAULT 0,
    date_released TEXT,
    date_expired TEXT,
    PRIMARY KEY (workspace, structure_id),
    UNIQUE (workspace, resource_path)
);

CREATE INDEX IF NOT EXISTS idx_structures_resource ON structures(workspace, resource_id);
CREATE INDEX IF NOT EXISTS idx_structures_parent ON structures(workspace, parent_id);
CREATE INDEX IF NOT EXISTS idx_structures_state ON structures(workspace, state);

CREATE TABLE IF NOT EXISTS contents (
    workspace INTEGER NOT NULL,
    resource_id TEXT NOT NULL,
    content_id TEXT NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (workspace, resource_id)
);

CREATE TABLE IF NOT EXISTS property_definitions (
    name TEXT PRIMARY KEY,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS properties (
    workspace INTEGER NOT NULL,
    structure_id TEXT NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (workspace, structure_id, name)
);

-- Keyed by resource id, so entries are shared by all siblings
CREATE TABLE IF NOT EXISTS access_control_entries (
    workspace INTEGER NOT NULL,
    resource_id TEXT NOT NULL,
    principal_id TEXT NOT NULL,
    allowed INTEGER NOT NULL DEFAULT 0,
    denied INTEGER NOT NULL DEFAULT 0,
    flags INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (workspace, resource_id, principal_id)
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    password_hash TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    parent_id TEXT REFERENCES groups(id) ON DELETE SET NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, user_id)
);

CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,
    token_lookup TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,
    last_used_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    owner_id TEXT,
    user_group_id TEXT,
    manager_group_id TEXT,
    project_type INTEGER NOT NULL DEFAULT 0,
    locked INTEGER NOT NULL DEFAULT 0,
    hidden INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS project_resources (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    resource_path TEXT NOT NULL,
    PRIMARY KEY (project_id, resource_path)
);

-- The online project always has id 1
INSERT OR IGNORE INTO projects (id, name, description) VALUES (1, 'Online', 'The online project');

CREATE TABLE IF NOT EXISTS backup_projects (
    tag INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    project_name TEXT NOT NULL,
    published_by TEXT NOT NULL,
    published_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS backup_resources (
    tag INTEGER NOT NULL REFERENCES backup_projects(tag) ON DELETE CASCADE,
    structure_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    resource_path TEXT NOT NULL,
    resource_type INTEGER NOT NULL,
    state INTEGER NOT NULL,
    length INTEGER NOT NULL DEFAULT 0,
    data BLOB,
    properties TEXT NOT NULL DEFAULT '{}',
    published_at TEXT NOT NULL,
    PRIMARY KEY (tag, structure_id)
);

CREATE INDEX IF NOT EXISTS idx_backup_resources_structure ON backup_resources(structure_id);

CREATE TABLE IF NOT EXISTS publish_history (
    history_id TEXT NOT NULL,
    tag INTEGER NOT NULL,
    structure_id TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    resource_path TEXT NOT NULL,
    state INTEGER NOT NULL,
    PRIMARY KEY (history_id, structure_id)
);
"#;
