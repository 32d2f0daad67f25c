//! Fixtures and results.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::Table;

/// A single game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Game id on fussball.de, when the listing links to the game page
    #[serde(default)]
    pub id: Option<String>,
    /// Kick-off in local German time, as published upstream
    #[serde(default)]
    pub kickoff_local: Option<NaiveDateTime>,
    /// Competition or league
    #[serde(default)]
    pub competition: Option<String>,
    /// Age group, e.g. "Herren"
    #[serde(default)]
    pub age_group: Option<String>,
    /// Home team name
    pub home_team: String,
    /// Home team logo URL
    #[serde(default)]
    pub home_logo: String,
    /// Away team name
    pub away_team: String,
    /// Away team logo URL
    #[serde(default)]
    pub away_logo: String,
    /// Status text such as "Abgesagt" or "Verlegt"
    #[serde(default)]
    pub status: Option<String>,
    /// Venue
    #[serde(default)]
    pub location: Option<String>,
    /// Map link for the venue
    #[serde(default)]
    pub location_url: Option<String>,
    /// Timeline events, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_events: Option<Vec<MatchEvent>>,
}

/// A single event in a match timeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    /// Minute, e.g. "43" or "90+1"
    pub time: String,
    /// Event type, e.g. "goal" or "yellow-card"
    #[serde(rename = "type")]
    pub kind: String,
    /// "home" or "away"
    pub team: String,
    /// Optional human readable description
    #[serde(default)]
    pub description: Option<String>,
}

/// A team's table together with its games.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    /// League table, if any
    pub table: Option<Table>,
    /// Past games
    pub prev_games: Vec<Game>,
    /// Upcoming games
    pub next_games: Vec<Game>,
}
