//! League tables.

use serde::{Deserialize, Serialize};

/// A single row in a league table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Rank
    pub place: u32,
    /// Team name
    pub team: String,
    /// Team logo URL
    pub img: String,
    /// Games played
    pub games: u32,
    /// Wins
    pub won: u32,
    /// Draws
    pub draw: u32,
    /// Losses
    pub lost: u32,
    /// Goal ratio, e.g. "50:25"
    pub goal: String,
    /// Goal difference
    pub goal_difference: i32,
    /// Points
    pub points: i32,
    /// Promotion spot
    #[serde(default)]
    pub is_promotion: bool,
    /// Relegation spot
    #[serde(default)]
    pub is_relegation: bool,
}

/// A league table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Rows in table order
    pub entries: Vec<TableEntry>,
}

impl Table {
    /// Returns the row of the named team, if present.
    pub fn entry_for(&self, team: &str) -> Option<&TableEntry> {
        self.entries.iter().find(|e| e.team.eq_ignore_ascii_case(team))
    }
}
