//! Access-log line parsing
//!
//! Two line grammars are supported and tried in a fixed order: the alternate
//! format (`2023-10-10 13:55:36 +0000`, with a literal ` - - ` after the
//! client IP) first, then the common-log/NGINX format
//! (`10/Oct/2023:13:55:36 +0000`). The first grammar whose structure matches
//! owns the line: a value that fails to convert under it is a parse failure,
//! not a fallback to the other grammar.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

const NGINX_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";
const ALT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

fn nginx_re() -> &'static Regex {
    static NGINX_RE: OnceLock<Regex> = OnceLock::new();
    NGINX_RE.get_or_init(|| {
        Regex::new(
            r#"^(\S+) \S+ \S+ \[(\d{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4})\] "(\S+) (\S+) (\S+)" (\d{3}) (\d+|-) "([^"]*)" "([^"]*)" (\d+|-)"#,
        )
        .expect("valid nginx log regex")
    })
}

fn alt_re() -> &'static Regex {
    static ALT_RE: OnceLock<Regex> = OnceLock::new();
    ALT_RE.get_or_init(|| {
        Regex::new(
            r#"^(\S+) - - \[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} [+-]\d{4})\] "(\S+) (\S+) (\S+)" (\d{3}) (\d+|-) "([^"]*)" "([^"]*)" (\d+|-)"#,
        )
        .expect("valid alternate log regex")
    })
}

/// One access-log line, normalized: timestamp in UTC, `-` counters as 0,
/// absent referrer as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub ip_client: String,
    pub timestamp_utc: DateTime<Utc>,
    pub request_type: String,
    pub api_path: String,
    pub protocol: String,
    pub status_code: i64,
    pub bytes_sent: i64,
    pub referrer: Option<String>,
    pub user_agent: String,
    pub response_time: i64,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line matches no supported log grammar")]
    GrammarMismatch,

    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("invalid {field} value {value:?}")]
    Number { field: &'static str, value: String },
}

fn int_or_dash(field: &'static str, value: &str) -> Result<i64, ParseError> {
    if value == "-" {
        return Ok(0);
    }
    value.parse().map_err(|_| ParseError::Number {
        field,
        value: value.to_string(),
    })
}

/// Parse one trimmed log line into a [`ParsedLine`].
pub fn parse_log_line(line: &str) -> Result<ParsedLine, ParseError> {
    let (caps, time_format) = if let Some(caps) = alt_re().captures(line) {
        (caps, ALT_TIME_FORMAT)
    } else if let Some(caps) = nginx_re().captures(line) {
        (caps, NGINX_TIME_FORMAT)
    } else {
        return Err(ParseError::GrammarMismatch);
    };

    let timestamp_utc = DateTime::parse_from_str(&caps[2], time_format)
        .map_err(|source| ParseError::Timestamp {
            value: caps[2].to_string(),
            source,
        })?
        .with_timezone(&Utc);

    let referrer = match &caps[8] {
        "" | "-" => None,
        other => Some(other.to_string()),
    };

    Ok(ParsedLine {
        ip_client: caps[1].to_string(),
        timestamp_utc,
        request_type: caps[3].to_string(),
        api_path: caps[4].to_string(),
        protocol: caps[5].to_string(),
        status_code: int_or_dash("status_code", &caps[6])?,
        bytes_sent: int_or_dash("bytes_sent", &caps[7])?,
        referrer,
        user_agent: caps[9].to_string(),
        response_time: int_or_dash("response_time", &caps[10])?,
    })
}
