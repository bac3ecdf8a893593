//! Database schema definitions
//!
//! Star schema: seven dimension tables, each with a surrogate `id` and a
//! UNIQUE natural key, plus the `log_entries` fact table referencing them.

pub const CREATE_DIM_IP: &str = r#"
CREATE TABLE IF NOT EXISTS dim_ip (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip_address TEXT UNIQUE NOT NULL
)
"#;

pub const CREATE_DIM_USER_AGENT: &str = r#"
CREATE TABLE IF NOT EXISTS dim_user_agent (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_agent TEXT UNIQUE NOT NULL,
    browser TEXT,
    os TEXT,
    device_type TEXT
)
"#;

// timestamp_utc is epoch seconds; the calendar fields are precomputed at
// write time so export/dashboard queries never re-derive them.
pub const CREATE_DIM_TIME: &str = r#"
CREATE TABLE IF NOT EXISTS dim_time (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_utc BIGINT UNIQUE NOT NULL,
    year INTEGER,
    month INTEGER,
    day INTEGER,
    hour INTEGER,
    minute INTEGER,
    second INTEGER,
    weekday INTEGER
)
"#;

pub const CREATE_DIM_REQUEST_TYPE: &str = r#"
CREATE TABLE IF NOT EXISTS dim_request_type (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_type TEXT UNIQUE NOT NULL
)
"#;

pub const CREATE_DIM_API_PATH: &str = r#"
CREATE TABLE IF NOT EXISTS dim_api_path (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    api_path TEXT UNIQUE NOT NULL
)
"#;

pub const CREATE_DIM_PROTOCOL: &str = r#"
CREATE TABLE IF NOT EXISTS dim_protocol (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    protocol TEXT UNIQUE NOT NULL
)
"#;

pub const CREATE_DIM_REFERRER: &str = r#"
CREATE TABLE IF NOT EXISTS dim_referrer (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    referrer_url TEXT UNIQUE NOT NULL
)
"#;

pub const CREATE_LOG_ENTRIES: &str = r#"
CREATE TABLE IF NOT EXISTS log_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip_id INTEGER NOT NULL REFERENCES dim_ip(id),
    user_agent_id INTEGER NOT NULL REFERENCES dim_user_agent(id),
    time_id INTEGER NOT NULL REFERENCES dim_time(id),
    request_type_id INTEGER NOT NULL REFERENCES dim_request_type(id),
    api_path_id INTEGER NOT NULL REFERENCES dim_api_path(id),
    protocol_id INTEGER NOT NULL REFERENCES dim_protocol(id),
    status_code INTEGER,
    bytes_sent BIGINT,
    referrer_id INTEGER REFERENCES dim_referrer(id),
    response_time INTEGER
)
"#;

// === FACT INDEXES (export/dashboard query patterns) ===

pub const CREATE_INDEX_TIME: &str =
    "CREATE INDEX IF NOT EXISTS idx_log_entries_time_id ON log_entries(time_id)";

pub const CREATE_INDEX_API_PATH: &str =
    "CREATE INDEX IF NOT EXISTS idx_log_entries_api_path_id ON log_entries(api_path_id)";

pub const CREATE_INDEX_STATUS_CODE: &str =
    "CREATE INDEX IF NOT EXISTS idx_log_entries_status_code ON log_entries(status_code)";

pub const CREATE_INDEX_IP: &str =
    "CREATE INDEX IF NOT EXISTS idx_log_entries_ip_id ON log_entries(ip_id)";
