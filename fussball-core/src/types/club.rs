//! Club and team identities plus composite club views.

use serde::{Deserialize, Serialize};

use crate::types::{Game, Table};

/// A single club in the search results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClubSearchResult {
    /// Club id on fussball.de
    pub id: String,
    /// Club name
    pub name: String,
    /// Logo URL (absolute)
    pub logo_url: String,
    /// Postal code and city
    pub city: String,
}

/// A team of a club.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team id on fussball.de
    pub id: String,
    /// Team name
    pub name: String,
    /// Team page on fussball.de
    pub fussball_de_url: String,
}

/// Teams of a club together with club-wide games.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClubInfo {
    /// All teams of the club
    pub teams: Vec<Team>,
    /// Club-wide upcoming games
    pub next_games: Vec<Game>,
    /// Club-wide past games
    pub prev_games: Vec<Game>,
}

/// A team together with its table and games.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamWithDetails {
    /// The team itself
    #[serde(flatten)]
    pub team: Team,
    /// League table, if the team plays in a league
    #[serde(default)]
    pub table: Option<Table>,
    /// Upcoming games
    #[serde(default)]
    pub next_games: Vec<Game>,
    /// Past games
    #[serde(default)]
    pub prev_games: Vec<Game>,
}

/// Everything known about a club in one document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullClubInfo {
    /// Club-wide past games
    pub club_prev_games: Vec<Game>,
    /// Club-wide upcoming games
    pub club_next_games: Vec<Game>,
    /// Teams with their details
    pub teams: Vec<TeamWithDetails>,
}
