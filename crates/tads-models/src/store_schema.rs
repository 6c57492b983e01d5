/// Schema of the session history database.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS sessions (
///     id          INTEGER PRIMARY KEY AUTOINCREMENT,
///     symbol      TEXT NOT NULL,
///     trade_date  TEXT NOT NULL,
///     prompt      TEXT NOT NULL,
///     status      TEXT NOT NULL,
///     created_at  TEXT NOT NULL,
///     updated_at  TEXT NOT NULL
/// );
///
/// CREATE TABLE IF NOT EXISTS messages (
///     id            INTEGER PRIMARY KEY AUTOINCREMENT,
///     session_id    INTEGER NOT NULL REFERENCES sessions(id),
///     role          TEXT NOT NULL,
///     agent         TEXT NOT NULL,
///     content       TEXT NOT NULL,
///     status        TEXT NOT NULL,
///     finish_reason TEXT,
///     seq           INTEGER NOT NULL,
///     created_at    TEXT NOT NULL,
///     updated_at    TEXT NOT NULL,
///     UNIQUE (session_id, seq)
/// );
/// ```
///
/// `AUTOINCREMENT` keeps ids monotonic even after deletes, which the
/// pagination cursor relies on.
pub const HISTORY_DDL: &str = "\
CREATE TABLE IF NOT EXISTS sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol      TEXT NOT NULL,
    trade_date  TEXT NOT NULL,
    prompt      TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id    INTEGER NOT NULL REFERENCES sessions(id),
    role          TEXT NOT NULL,
    agent         TEXT NOT NULL,
    content       TEXT NOT NULL,
    status        TEXT NOT NULL,
    finish_reason TEXT,
    seq           INTEGER NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (session_id, seq)
);
CREATE INDEX IF NOT EXISTS idx_sessions_symbol ON sessions(symbol);
CREATE INDEX IF NOT EXISTS idx_messages_session_seq ON messages(session_id, seq);
";

/// Column lists shared by every query, in row-mapping order.
pub const SESSION_COLUMNS: &str = "id, symbol, trade_date, prompt, status, created_at, updated_at";

pub const MESSAGE_COLUMNS: &str =
    "id, session_id, role, agent, content, status, finish_reason, seq, created_at, updated_at";
