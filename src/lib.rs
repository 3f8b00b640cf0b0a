pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod grader;
pub mod models;
pub mod queue;
pub mod routes;
pub mod web_server;
pub mod worker;

use regex::Regex;

lazy_static::lazy_static! {
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^\w\s-]").unwrap();
    static ref SLUG_SEPARATORS: Regex = Regex::new(r"[\s_-]+").unwrap();
}

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// URL-safe identifier derived from a title. Accented letters are kept.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let cleaned = NON_SLUG_CHARS.replace_all(&lowered, "");
    let joined = SLUG_SEPARATORS.replace_all(&cleaned, "-");
    joined.trim_matches('-').to_string()
}
