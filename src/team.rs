//! Team registry records and patches
//!
//! Team info arrives in pieces from different call sites (cookie parse vs.
//! scrape result), so a registry record is never replaced wholesale: patches
//! merge onto the existing record, field by field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// School name used until a caller supplies the real one.
pub const UNKNOWN_SCHOOL: &str = "Unknown School";

/// One row per known team in the master registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    /// Primary key, derived from the session cookie.
    pub team_id: String,
    pub school_name: String,
    pub school_long: Option<String>,
    pub school_short: Option<String>,
    pub division: Option<String>,
    pub world: Option<String>,
    pub conference: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl TeamRecord {
    /// Fresh record with unknown fields defaulted and both timestamps set.
    pub fn new(team_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            team_id: team_id.into(),
            school_name: UNKNOWN_SCHOOL.to_string(),
            school_long: None,
            school_short: None,
            division: None,
            world: None,
            conference: None,
            first_seen: now,
            last_accessed: now,
        }
    }

    /// Merge a partial patch onto this record: every provided field
    /// overwrites, every unset field is preserved.
    pub fn apply(&mut self, info: &TeamInfo) {
        if let Some(name) = &info.school_name {
            self.school_name = name.clone();
        }
        if let Some(long) = &info.school_long {
            self.school_long = Some(long.clone());
        }
        if let Some(short) = &info.school_short {
            self.school_short = Some(short.clone());
        }
        if let Some(division) = &info.division {
            self.division = Some(division.clone());
        }
        if let Some(world) = &info.world {
            self.world = Some(world.clone());
        }
        if let Some(conference) = &info.conference {
            self.conference = Some(conference.clone());
        }
    }
}

/// Partial team info supplied at registration or update time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub school_name: Option<String>,
    pub school_long: Option<String>,
    pub school_short: Option<String>,
    pub division: Option<String>,
    pub world: Option<String>,
    pub conference: Option<String>,
}

impl TeamInfo {
    pub fn with_school_name(name: impl Into<String>) -> Self {
        Self {
            school_name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Read-only composite of the registry record, team metadata and live
/// recruit counts, assembled by the router for diagnostics and UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamStats {
    pub record: TeamRecord,
    pub current_season: Option<serde_json::Value>,
    pub last_updated: Option<serde_json::Value>,
    pub recruit_count: u64,
    pub watchlist_count: u64,
}
