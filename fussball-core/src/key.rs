//! Resource identity: what the cache is keyed by.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::FussballError;

/// An immutable cached document.
///
/// The cache never looks inside a payload; fetchers produce it and the HTTP
/// layer renders it. Cloning only bumps a reference count.
pub type Payload = Arc<serde_json::Value>;

/// Category of a cacheable upstream resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Club search by free text
    Search,
    /// Club overview: teams plus club-wide next/previous games
    ClubInfo,
    /// Teams of a club
    ClubTeams,
    /// Upcoming games across a club
    ClubNextGames,
    /// Past games across a club
    ClubPrevGames,
    /// Team overview: table plus next/previous games
    TeamInfo,
    /// League table of a team
    TeamTable,
    /// Upcoming games of a team
    TeamNextGames,
    /// Past games of a team
    TeamPrevGames,
    /// A single game
    GameDetails,
}

/// What a [`ResourceKind`]'s identifier refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    /// Free-text search query
    Query,
    /// Club id
    Club,
    /// Team id
    Team,
    /// Game id
    Game,
}

impl ResourceKind {
    /// Every kind, in declaration order.
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Search,
        ResourceKind::ClubInfo,
        ResourceKind::ClubTeams,
        ResourceKind::ClubNextGames,
        ResourceKind::ClubPrevGames,
        ResourceKind::TeamInfo,
        ResourceKind::TeamTable,
        ResourceKind::TeamNextGames,
        ResourceKind::TeamPrevGames,
        ResourceKind::GameDetails,
    ];

    /// Kebab-case name, as used in snapshots and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Search => "search",
            ResourceKind::ClubInfo => "club-info",
            ResourceKind::ClubTeams => "club-teams",
            ResourceKind::ClubNextGames => "club-next-games",
            ResourceKind::ClubPrevGames => "club-prev-games",
            ResourceKind::TeamInfo => "team-info",
            ResourceKind::TeamTable => "team-table",
            ResourceKind::TeamNextGames => "team-next-games",
            ResourceKind::TeamPrevGames => "team-prev-games",
            ResourceKind::GameDetails => "game-details",
        }
    }

    /// The entity the identifier of this kind names.
    pub fn id_kind(&self) -> IdKind {
        match self {
            ResourceKind::Search => IdKind::Query,
            ResourceKind::ClubInfo
            | ResourceKind::ClubTeams
            | ResourceKind::ClubNextGames
            | ResourceKind::ClubPrevGames => IdKind::Club,
            ResourceKind::TeamInfo
            | ResourceKind::TeamTable
            | ResourceKind::TeamNextGames
            | ResourceKind::TeamPrevGames => IdKind::Team,
            ResourceKind::GameDetails => IdKind::Game,
        }
    }

    /// Composite kinds are assembled from other cached kinds rather than
    /// fetched from a single upstream page.
    pub fn is_composite(&self) -> bool {
        matches!(self, ResourceKind::ClubInfo | ResourceKind::TeamInfo)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = FussballError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| FussballError::InvalidKey(format!("unknown resource kind '{}'", s)))
    }
}

/// Identity of a cached resource: a kind plus the natural id of its target.
///
/// Keys order by kind first, then id, which gives snapshots a stable layout.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource category
    pub kind: ResourceKind,
    /// Club, team or game id, or a normalized search query
    pub id: String,
}

impl ResourceKey {
    /// Creates a key, normalizing the identifier.
    ///
    /// Ids are trimmed. Search queries are also lower-cased with whitespace
    /// runs collapsed so equivalent searches share one entry.
    pub fn new(kind: ResourceKind, id: impl AsRef<str>) -> Self {
        let id = id.as_ref().trim();
        let id = match kind.id_kind() {
            IdKind::Query => id
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            _ => id.to_string(),
        };
        Self { kind, id }
    }

    /// Club search.
    pub fn search(query: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::Search, query)
    }

    /// Club overview.
    pub fn club_info(club_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::ClubInfo, club_id)
    }

    /// Teams of a club.
    pub fn club_teams(club_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::ClubTeams, club_id)
    }

    /// Upcoming club games.
    pub fn club_next_games(club_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::ClubNextGames, club_id)
    }

    /// Past club games.
    pub fn club_prev_games(club_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::ClubPrevGames, club_id)
    }

    /// Team overview.
    pub fn team_info(team_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::TeamInfo, team_id)
    }

    /// League table of a team.
    pub fn team_table(team_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::TeamTable, team_id)
    }

    /// Upcoming team games.
    pub fn team_next_games(team_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::TeamNextGames, team_id)
    }

    /// Past team games.
    pub fn team_prev_games(team_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::TeamPrevGames, team_id)
    }

    /// A single game.
    pub fn game_details(game_id: impl AsRef<str>) -> Self {
        Self::new(ResourceKind::GameDetails, game_id)
    }

    /// Rejects empty identifiers and ids that cannot be embedded in an upstream path.
    pub fn validate(&self) -> crate::Result<()> {
        if self.id.is_empty() {
            return Err(FussballError::InvalidKey(format!("{} requires an id", self.kind)));
        }
        if self.kind.id_kind() != IdKind::Query
            && !self.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FussballError::InvalidKey(format!(
                "invalid {} id '{}'",
                self.kind, self.id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("search", ResourceKind::Search)]
    #[test_case("club-info", ResourceKind::ClubInfo)]
    #[test_case("club_teams", ResourceKind::ClubTeams)]
    #[test_case("TEAM-TABLE", ResourceKind::TeamTable)]
    #[test_case(" game-details ", ResourceKind::GameDetails)]
    fn test_kind_from_str(input: &str, expected: ResourceKind) {
        assert_eq!(input.parse::<ResourceKind>().unwrap(), expected);
    }

    #[test]
    fn test_kind_from_str_unknown() {
        assert!("club-fonts".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_kind_serde_is_kebab_case() {
        let json = serde_json::to_string(&ResourceKind::TeamNextGames).unwrap();
        assert_eq!(json, "\"team-next-games\"");
        for kind in ResourceKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.as_str());
        }
    }

    #[test]
    fn test_equal_kind_and_id_are_equal_keys() {
        assert_eq!(ResourceKey::club_teams("ABC"), ResourceKey::club_teams(" ABC "));
        assert_ne!(ResourceKey::club_teams("ABC"), ResourceKey::club_info("ABC"));
    }

    #[test]
    fn test_search_query_normalized() {
        assert_eq!(ResourceKey::search("  FC   Test "), ResourceKey::search("fc test"));
        assert_eq!(ResourceKey::search("FC Test").id, "fc test");
    }

    #[test]
    fn test_entity_ids_keep_case() {
        assert_eq!(ResourceKey::team_table("00ES8GN").id, "00ES8GN");
    }

    #[test]
    fn test_key_ordering_groups_by_kind() {
        let mut keys = vec![
            ResourceKey::team_table("B"),
            ResourceKey::club_teams("Z"),
            ResourceKey::team_table("A"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ResourceKey::club_teams("Z"),
                ResourceKey::team_table("A"),
                ResourceKey::team_table("B"),
            ]
        );
    }

    #[test]
    fn test_validate() {
        assert!(ResourceKey::club_teams("00ES8GN").validate().is_ok());
        assert!(ResourceKey::club_teams("").validate().is_err());
        assert!(ResourceKey::club_teams("../etc").validate().is_err());
        assert!(ResourceKey::search("Borussia / 09").validate().is_ok());
    }

    #[test]
    fn test_composite_kinds() {
        let composites: Vec<_> = ResourceKind::ALL.into_iter().filter(|k| k.is_composite()).collect();
        assert_eq!(composites, vec![ResourceKind::ClubInfo, ResourceKind::TeamInfo]);
    }
}
