//! Extraction of domain data from fussball.de pages.

use chrono::NaiveDateTime;
use tracing::debug;

use fussball_core::{ClubSearchResult, Game, MatchEvent, Table, TableEntry, Team};

use crate::html::{self, Element};

/// Teams listed on a club's team page.
pub fn club_teams(page: &str) -> Vec<Team> {
    html::elements(page, "h4")
        .into_iter()
        .filter_map(|heading| {
            let link = html::elements(heading.inner, "a").into_iter().next()?;
            let href = link.attr("href")?;
            Some(Team {
                id: html::last_segment(href)?.to_string(),
                name: link.text(),
                fussball_de_url: href.to_string(),
            })
        })
        .collect()
}

/// League table of a team; `None` when the page carries none.
pub fn team_table(page: &str) -> Option<Table> {
    let entries: Vec<_> = html::elements(page, "tr")
        .into_iter()
        .filter(|row| !row.has_class("thead"))
        .filter_map(|row| table_entry(&row))
        .collect();

    if entries.is_empty() {
        None
    } else {
        Some(Table { entries })
    }
}

fn table_entry(row: &Element<'_>) -> Option<TableEntry> {
    let cols = html::elements(row.inner, "td");
    if cols.len() < 10 {
        return None;
    }

    let number = |i: usize| cols[i].text().parse::<i32>().ok();
    let count = |i: usize| cols[i].text().parse::<u32>().ok();

    let logo = html::open_tags(cols[2].inner, "img")
        .into_iter()
        .find_map(|img| html::attr(img, "src"))
        .unwrap_or_default();

    let entry = TableEntry {
        place: cols[1].text().replace('.', "").parse().ok()?,
        team: html::find_by_class(cols[2].inner, "club-name")?.text(),
        img: html::normalize_logo_url(logo),
        games: count(3)?,
        won: count(4)?,
        draw: count(5)?,
        lost: count(6)?,
        goal: cols[7].text(),
        goal_difference: number(8)?,
        points: number(9)?,
        is_promotion: row.has_class("promotion"),
        is_relegation: row.has_class("relegation"),
    };
    Some(entry)
}

/// Clubs in a search result page.
pub fn search_results(page: &str) -> Vec<ClubSearchResult> {
    let Some(list) = html::from_id(page, "clublist") else {
        debug!("No club list in search page");
        return Vec::new();
    };

    html::elements(list, "li")
        .into_iter()
        .filter_map(|item| {
            let link = html::elements(item.inner, "a").into_iter().next()?;
            let id = html::last_segment(link.attr("href")?)?.to_string();
            let logo = html::open_tags(link.inner, "img")
                .into_iter()
                .find_map(|img| html::attr(img, "src"))
                .unwrap_or_default();

            Some(ClubSearchResult {
                id,
                name: html::find_by_class(link.inner, "name")
                    .map(|p| p.text())
                    .unwrap_or_else(|| "Unknown Club".to_string()),
                logo_url: html::normalize_logo_url(logo),
                city: html::find_by_class(link.inner, "sub")
                    .map(|p| p.text())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Date, age group and competition from a games list heading row.
#[derive(Clone, Debug, PartialEq)]
struct Fixture {
    kickoff: NaiveDateTime,
    age_group: Option<String>,
    competition: Option<String>,
}

/// Parses `"Sa, 25.05.2024 - 15:30 Uhr | Herren | Kreisliga A"`.
fn fixture_heading(text: &str) -> Option<Fixture> {
    let (day, rest) = text.split_once(" - ")?;
    let date = day.split(", ").nth(1)?.trim();
    let parts: Vec<_> = rest.split(" | ").map(str::trim).collect();
    let time = parts.first()?.trim_end_matches("Uhr").trim();

    let kickoff = NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%d.%m.%Y %H:%M").ok()?;
    let (age_group, competition) = match parts.as_slice() {
        [_, age_group, competition, ..] => (Some(age_group.to_string()), Some(competition.to_string())),
        [_, competition] => (None, Some(competition.to_string())),
        _ => (None, None),
    };

    Some(Fixture {
        kickoff,
        age_group,
        competition,
    })
}

/// Games in a club or team games list.
///
/// Kick-off times are local German time as printed on the page. Games
/// without a preceding heading row are skipped.
pub fn games(page: &str) -> Vec<Game> {
    let mut games = Vec::new();
    let mut fixture: Option<Fixture> = None;

    for row in html::elements(page, "tr") {
        if row.has_class("visible-small") {
            let heading = html::elements(row.inner, "td").into_iter().next().map(|td| td.text());
            fixture = heading.as_deref().and_then(fixture_heading);
            if fixture.is_none() {
                debug!(heading = ?heading, "Unparsable fixture heading");
            }
            continue;
        }

        let Some(current) = &fixture else { continue };
        if let Some(game) = game_row(&row, current) {
            games.push(game);
        }
    }

    games
}

fn game_row(row: &Element<'_>, fixture: &Fixture) -> Option<Game> {
    let cells = html::elements(row.inner, "td");
    let score = cells.iter().find(|c| c.has_class("column-score"))?;

    let left = cells.iter().find(|c| c.has_class("column-club-left"));
    let right = cells.iter().find(|c| c.has_class("column-club-right"));
    let (home, away) = match (left, right) {
        (Some(home), Some(away)) => (*home, *away),
        _ => {
            let clubs: Vec<_> = cells.iter().filter(|c| c.has_class("column-club")).collect();
            match clubs.as_slice() {
                [home, away] => (**home, **away),
                _ => return None,
            }
        }
    };

    let game_id = html::open_tags(score.inner, "a")
        .into_iter()
        .find_map(|a| html::attr(a, "href"))
        .and_then(html::last_segment)
        .map(str::to_string);

    Some(Game {
        id: game_id,
        kickoff_local: Some(fixture.kickoff),
        competition: fixture.competition.clone(),
        age_group: fixture.age_group.clone(),
        home_team: html::find_by_class(home.inner, "club-name")?.text(),
        home_logo: responsive_logo(home.inner),
        away_team: html::find_by_class(away.inner, "club-name")?.text(),
        away_logo: responsive_logo(away.inner),
        status: html::find_by_class(score.inner, "info-text")
            .map(|s| s.text())
            .filter(|s| !s.is_empty()),
        location: None,
        location_url: None,
        match_events: None,
    })
}

fn responsive_logo(fragment: &str) -> String {
    let from_span = html::open_tags(fragment, "span")
        .into_iter()
        .find_map(|span| html::attr(span, "data-responsive-image"));
    let from_img = || {
        html::open_tags(fragment, "img")
            .into_iter()
            .find_map(|img| html::attr(img, "src"))
    };
    html::normalize_logo_url(from_span.or_else(from_img).unwrap_or_default())
}

/// A single game's detail page; `None` when the page has no game stage.
pub fn game_details(page: &str, game_id: &str) -> Option<Game> {
    let stage = html::from_id(page, "stage")?;
    let stage = stage.find("</section").map_or(stage, |end| &stage[..end]);

    let location = html::elements(stage, "a")
        .into_iter()
        .find(|a| a.has_class("location"));

    let home = html::find_by_class(stage, "team-left").or_else(|| html::find_by_class(stage, "team-home"));
    let away = html::find_by_class(stage, "team-right").or_else(|| html::find_by_class(stage, "team-away"));
    Some(Game {
        id: Some(game_id.to_string()),
        kickoff_local: None,
        competition: None,
        age_group: None,
        home_team: team_name(home),
        home_logo: home.map(|t| responsive_logo(t.inner)).unwrap_or_default(),
        away_team: team_name(away),
        away_logo: away.map(|t| responsive_logo(t.inner)).unwrap_or_default(),
        status: html::find_by_class(stage, "info-text")
            .map(|s| s.text())
            .filter(|s| !s.is_empty()),
        location: location.map(|a| a.text().replace("Rasenplatz, ", "")),
        location_url: location.and_then(|a| a.attr("href")).map(str::to_string),
        match_events: match_events(page),
    })
}

fn team_name(team: Option<Element<'_>>) -> String {
    team.map(|t| {
        html::find_by_class(t.inner, "team-name")
            .map(|n| n.text())
            .unwrap_or_else(|| t.text())
    })
    .unwrap_or_default()
}

/// Events from the `data-match-events` attribute of the game's timeline.
fn match_events(page: &str) -> Option<Vec<MatchEvent>> {
    let container = html::from_id(page, "rangescontainer")?;
    let attrs = html::open_tags(container, "div").into_iter().next()?;
    let raw = html::attr(attrs, "data-match-events")?;

    let json = raw.replace("&quot;", "\"").replace('\'', "\"");
    let doc: serde_json::Value = match serde_json::from_str(&json) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "Unparsable match events");
            return None;
        }
    };

    let as_text = |v: Option<&serde_json::Value>| match v {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let mut sections: Vec<_> = doc
        .as_object()?
        .values()
        .filter_map(|section| {
            let start = section.get("start").and_then(|s| s.as_i64()).unwrap_or(0);
            let events = section.get("events")?.as_array()?;
            Some((start, events))
        })
        .collect();
    sections.sort_by_key(|(start, _)| *start);

    let events = sections
        .into_iter()
        .flat_map(|(_, events)| events.iter())
        .map(|event| MatchEvent {
            time: as_text(event.get("time")),
            kind: as_text(event.get("type")),
            team: as_text(event.get("team")),
            description: event.get("description").and_then(|d| d.as_str()).map(str::to_string),
        })
        .collect();
    Some(events)
}
