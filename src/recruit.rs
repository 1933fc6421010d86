//! Recruit document model
//!
//! One `Recruit` is one row scraped from a recruiting listing. Scraped input
//! is untrusted: ids can be missing or zero and required fields can be empty.
//! Rather than rejecting malformed rows, [`Recruit::normalized`] repairs them
//! (documented recovery behavior, logged at WARN) so a scrape of hundreds of
//! rows never fails on one bad cell.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::Key;

/// Position code substituted when the scraped position is empty.
pub const UNKNOWN_POSITION: &str = "UNK";

/// A prospective player record, stored whole as a JSON document keyed by `id`.
///
/// Upserts are last-writer-wins: saving a recruit with an existing id
/// overwrites the stored document completely, never merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recruit {
    /// Primary key within one team's store. Positive; repaired when invalid.
    pub id: i64,
    pub name: String,
    /// Position code (QB, RB, ...).
    pub pos: String,

    // Skill attributes as scraped from the listing.
    pub ath: u32,
    pub spd: u32,
    pub dur: u32,
    pub we: u32,
    pub sta: u32,
    pub str: u32,
    pub blk: u32,
    pub tkl: u32,
    pub han: u32,
    pub gi: u32,
    pub elu: u32,
    pub tec: u32,

    /// Ordinal potential category as displayed by the site (e.g. "VH").
    pub potential: String,
    pub rank: u32,
    pub rating: f64,
    pub hometown: String,
    pub division: String,
    pub miles: f64,
    pub gpa: f64,
    pub watched: bool,
    /// 0-5 priority assigned by the user.
    pub priority: u8,
    pub signed: bool,
    /// Free text of schools the recruit is considering, or "undecided".
    pub considering: String,

    // Derived role ratings, written back by the rating calculator.
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub r4: f64,
    pub r5: f64,
    pub r6: f64,
}

impl Default for Recruit {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            pos: String::new(),
            ath: 0,
            spd: 0,
            dur: 0,
            we: 0,
            sta: 0,
            str: 0,
            blk: 0,
            tkl: 0,
            han: 0,
            gi: 0,
            elu: 0,
            tec: 0,
            potential: String::new(),
            rank: 0,
            rating: 0.0,
            hometown: String::new(),
            division: String::new(),
            miles: 0.0,
            gpa: 0.0,
            watched: false,
            priority: 0,
            signed: false,
            considering: "undecided".to_string(),
            r1: 0.0,
            r2: 0.0,
            r3: 0.0,
            r4: 0.0,
            r5: 0.0,
            r6: 0.0,
        }
    }
}

impl Recruit {
    /// Storage key for this recruit.
    pub fn key(&self) -> Key {
        Key::Int(self.id)
    }

    /// Whether the id satisfies the identity invariant (positive integer).
    pub fn has_valid_id(&self) -> bool {
        self.id > 0
    }

    /// Repair the recruit so it always satisfies the store invariants:
    ///
    /// 1. An invalid id (zero, negative, missing) is regenerated from the
    ///    current time plus a random offset.
    /// 2. Empty `name`/`pos` get deterministic placeholders derived from the
    ///    id.
    ///
    /// Corrections are logged at WARN and never rejected.
    pub fn normalized(mut self) -> Self {
        if !self.has_valid_id() {
            let original = self.id;
            self.id = fallback_id();
            tracing::warn!(
                original_id = original,
                generated_id = self.id,
                "recruit had an invalid id; generated a fallback id"
            );
        }
        if self.name.is_empty() {
            self.name = format!("Unknown Recruit {}", self.id);
            tracing::warn!(id = self.id, "recruit had no name; substituted placeholder");
        }
        if self.pos.is_empty() {
            self.pos = UNKNOWN_POSITION.to_string();
            tracing::warn!(id = self.id, "recruit had no position; substituted placeholder");
        }
        self
    }
}

/// Fallback identity: current time in milliseconds plus a random 0..999
/// offset, so two repairs within the same millisecond still diverge.
fn fallback_id() -> i64 {
    Utc::now().timestamp_millis() + rand::thread_rng().gen_range(0..1_000)
}
