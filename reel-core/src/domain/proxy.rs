//! Proxy domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A network egress address, owned by at most one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    pub address: String,

    /// Profile this proxy is bound to, if any
    pub profile_name: Option<String>,

    pub added_at: DateTime<Utc>,
}

/// Parses a proxy list, one address per line.
///
/// Blank lines and lines starting with `#` are skipped, duplicates keep their
/// first position.
pub fn parse_proxy_list(contents: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}
