//! Structured line grammar
//!
//! Primary parser for canonical event lines. Every line starts with the
//! marker and a timestamp:
//!
//! ```text
//! L 08/19/2025 - 19:03:31: <event body>
//! ```
//!
//! Bodies are matched against a fixed set of patterns and produce a typed
//! [`LogEvent`]. A line that carries the canonical prefix but matches no
//! body pattern parses to [`LogEvent::Unknown`]; a line without the prefix
//! is rejected with [`GrammarError`] and left to the heuristic rules.
//!
//! Player tokens have the shape `"name<slot><id><team>"`, where the team
//! segment is absent on some connection events.

use chrono::NaiveDateTime;
use regex::{Captures, Regex};
use serde::Serialize;
use thiserror::Error;

/// Error returned when a line cannot be parsed by the grammar at all.
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("line does not match the canonical event format")]
    NotCanonical,
}

/// A player reference as it appears in event lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub name: String,
    pub slot: u32,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

/// A successfully parsed line: the event plus its embedded timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub event: LogEvent,
}

/// Typed events produced by the grammar.
///
/// Every variant is a struct variant so the untagged serialization yields a
/// flat key/value payload.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LogEvent {
    Kill {
        attacker: Player,
        attacker_position: String,
        victim: Player,
        victim_position: String,
        weapon: String,
        headshot: bool,
    },
    KillAssist {
        assister: Player,
        victim: Player,
    },
    Attack {
        attacker: Player,
        victim: Player,
        weapon: String,
        damage: u32,
        damage_armor: u32,
        health: u32,
        armor: u32,
        hitgroup: String,
    },
    Say {
        player: Player,
        text: String,
        team_chat: bool,
    },
    Connected {
        player: Player,
        address: String,
    },
    Disconnected {
        player: Player,
        reason: String,
    },
    Entered {
        player: Player,
    },
    Validated {
        player: Player,
    },
    SwitchedTeam {
        player: Player,
        from: String,
        to: String,
    },
    PlayerTriggered {
        player: Player,
        event: String,
    },
    Purchase {
        player: Player,
        item: String,
    },
    MoneyChange {
        player: Player,
        change: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        purchase: Option<String>,
    },
    LeftBuyzone {
        player: Player,
        inventory: String,
    },
    ThrewGrenade {
        player: Player,
        grenade: String,
        position: String,
    },
    Blinded {
        victim: Player,
        duration: f64,
        attacker: Player,
    },
    PickedUp {
        player: Player,
        item: String,
    },
    Dropped {
        player: Player,
        item: String,
    },
    Accolade {
        is_final: bool,
        kind: String,
        player_name: String,
        value: f64,
        position: u32,
        score: f64,
    },
    TeamTriggered {
        team: String,
        event: String,
        score_ct: u32,
        score_t: u32,
    },
    TeamScored {
        team: String,
        score: u32,
        player_count: u32,
    },
    TeamPlaying {
        team: String,
        name: String,
    },
    WorldTriggered {
        event: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        map: Option<String>,
    },
    GameOver {
        mode: String,
        map: String,
        score: String,
        duration_minutes: u32,
    },
    FreezePeriodStarted {},
    MatchStatusScore {
        score_ct: u32,
        score_t: u32,
        map: String,
        rounds_played: i32,
    },
    MatchStatusTeams {
        team: String,
        name: String,
    },
    MatchPause {
        action: String,
    },
    ServerCvar {
        name: String,
        value: String,
    },
    RconCommand {
        address: String,
        command: String,
    },
    LoadingMap {
        map: String,
    },
    StartedMap {
        map: String,
    },
    LogFile {
        action: String,
    },
    Unknown {
        body: String,
    },
}

/// Regex fragment for a quoted player token; four capture groups
/// (name, slot, id, team).
const PLAYER: &str = r#""(.+?)<(\d+)><([^>]*)>(?:<([^>]*)>)?""#;

/// Compiled grammar. Build once and reuse; compilation is not free.
pub struct LineGrammar {
    prefix: Regex,
    kill: Regex,
    kill_assist: Regex,
    attack: Regex,
    say: Regex,
    connected: Regex,
    disconnected: Regex,
    entered: Regex,
    validated: Regex,
    switched: Regex,
    player_triggered: Regex,
    purchase: Regex,
    money_change: Regex,
    left_buyzone: Regex,
    threw: Regex,
    blinded: Regex,
    picked_up: Regex,
    dropped: Regex,
    accolade: Regex,
    team_triggered: Regex,
    team_scored: Regex,
    team_playing: Regex,
    world_triggered: Regex,
    game_over: Regex,
    freeze_period: Regex,
    match_status_score: Regex,
    match_status_teams: Regex,
    match_pause: Regex,
    server_cvar: Regex,
    rcon: Regex,
    loading_map: Regex,
    started_map: Regex,
    log_file: Regex,
}

impl Default for LineGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl LineGrammar {
    pub fn new() -> Self {
        let p = PLAYER;
        Self {
            prefix: compile(r"^L (\d{2}/\d{2}/\d{4}) - (\d{2}:\d{2}:\d{2}):\s?(.*)$"),
            kill: compile(&format!(
                r#"^{p} \[(-?\d+ -?\d+ -?\d+)\] killed {p} \[(-?\d+ -?\d+ -?\d+)\] with "([^"]*)"( \(headshot\))?"#
            )),
            kill_assist: compile(&format!(r"^{p} assisted killing {p}$")),
            attack: compile(&format!(
                r#"^{p} \[-?\d+ -?\d+ -?\d+\] attacked {p} \[-?\d+ -?\d+ -?\d+\] with "([^"]*)" \(damage "(\d+)"\) \(damage_armor "(\d+)"\) \(health "(\d+)"\) \(armor "(\d+)"\) \(hitgroup "([^"]*)"\)"#
            )),
            say: compile(&format!(r#"^{p} (say|say_team) "(.*)"$"#)),
            connected: compile(&format!(r#"^{p} connected, address "([^"]*)"$"#)),
            disconnected: compile(&format!(r#"^{p} disconnected(?: \(reason "([^"]*)"\))?$"#)),
            entered: compile(&format!(r"^{p} entered the game$")),
            validated: compile(&format!(r"^{p} STEAM USERID validated$")),
            switched: compile(&format!(r"^{p} switched from team <([^>]*)> to <([^>]*)>$")),
            player_triggered: compile(&format!(r#"^{p} triggered "([^"]+)""#)),
            purchase: compile(&format!(r#"^{p} purchased "([^"]*)"$"#)),
            money_change: compile(&format!(
                r#"^{p} money change ([-\d+ =\$]+) \(tracked\)(?: \(purchase: ([^)]*)\))?$"#
            )),
            left_buyzone: compile(&format!(r"^{p} left buyzone with \[ (.*) \]$")),
            threw: compile(&format!(
                r"^{p} threw (\w+) \[(-?\d+(?:\.\d+)? -?\d+(?:\.\d+)? -?\d+(?:\.\d+)?)\]"
            )),
            blinded: compile(&format!(
                r"^{p} blinded for (\d+\.?\d*) by {p} from flashbang entindex \d+ ?$"
            )),
            picked_up: compile(&format!(r#"^{p} picked up "([^"]*)"$"#)),
            dropped: compile(&format!(r#"^{p} dropped "([^"]*)"$"#)),
            accolade: compile(
                r"^ACCOLADE, (FINAL|ROUND): \{(\w+)\},\s+(.+?)<\d+>,\s+VALUE: (\d+\.?\d*),\s+POS: (\d+),\s+SCORE: (\d+\.?\d*)$",
            ),
            team_triggered: compile(
                r#"^Team "([^"]*)" triggered "([^"]+)" \(CT "(\d+)"\) \(T "(\d+)"\)$"#,
            ),
            team_scored: compile(r#"^Team "([^"]*)" scored "(\d+)" with "(\d+)" players$"#),
            team_playing: compile(r#"^Team playing "([^"]*)": (.*)$"#),
            world_triggered: compile(r#"^World triggered "([^"]+)"(?: on "([^"]*)")?$"#),
            game_over: compile(
                r"^Game Over: (\w+) +\S+ (\S+) score (\d+:\d+) after (\d+) min$",
            ),
            freeze_period: compile(r"^Starting Freeze period$"),
            match_status_score: compile(
                r#"^MatchStatus: Score: (\d+):(\d+) on map "([^"]*)" RoundsPlayed: (-?\d+)$"#,
            ),
            match_status_teams: compile(r#"^MatchStatus: Team playing "([^"]*)": (.*)$"#),
            match_pause: compile(r"^Match pause is (enabled|disabled) - (.*)$"),
            server_cvar: compile(r#"^server_cvar: "([^"]*)" "([^"]*)"$"#),
            rcon: compile(r#"^rcon from "([^"]*)": command "(.*)"$"#),
            loading_map: compile(r#"^Loading map "([^"]*)"$"#),
            started_map: compile(r#"^Started map "([^"]*)""#),
            log_file: compile(r"^Log file (started|closed)"),
        }
    }

    /// Parse a canonical event line.
    ///
    /// Returns `Err` only when the line carries no canonical prefix at all;
    /// an unrecognized body yields `Ok` with [`LogEvent::Unknown`].
    pub fn parse(&self, line: &str) -> Result<ParsedLine, GrammarError> {
        let caps = self.prefix.captures(line).ok_or(GrammarError::NotCanonical)?;

        let event_time = NaiveDateTime::parse_from_str(
            &format!("{} {}", &caps[1], &caps[2]),
            "%m/%d/%Y %H:%M:%S",
        )
        .ok();

        let body = caps[3].to_string();
        let event = self.parse_body(&body);

        Ok(ParsedLine { event_time, event })
    }

    fn parse_body(&self, body: &str) -> LogEvent {
        if let Some(c) = self.kill.captures(body) {
            return LogEvent::Kill {
                attacker: player_at(&c, 1),
                attacker_position: c[5].to_string(),
                victim: player_at(&c, 6),
                victim_position: c[10].to_string(),
                weapon: c[11].to_string(),
                headshot: c.get(12).is_some(),
            };
        }
        if let Some(c) = self.kill_assist.captures(body) {
            return LogEvent::KillAssist {
                assister: player_at(&c, 1),
                victim: player_at(&c, 5),
            };
        }
        if let Some(c) = self.attack.captures(body) {
            return LogEvent::Attack {
                attacker: player_at(&c, 1),
                victim: player_at(&c, 5),
                weapon: c[9].to_string(),
                damage: num(&c, 10),
                damage_armor: num(&c, 11),
                health: num(&c, 12),
                armor: num(&c, 13),
                hitgroup: c[14].to_string(),
            };
        }
        if let Some(c) = self.say.captures(body) {
            return LogEvent::Say {
                player: player_at(&c, 1),
                team_chat: &c[5] == "say_team",
                text: c[6].to_string(),
            };
        }
        if let Some(c) = self.connected.captures(body) {
            return LogEvent::Connected {
                player: player_at(&c, 1),
                address: c[5].to_string(),
            };
        }
        if let Some(c) = self.disconnected.captures(body) {
            return LogEvent::Disconnected {
                player: player_at(&c, 1),
                reason: c.get(5).map(|m| m.as_str()).unwrap_or_default().to_string(),
            };
        }
        if let Some(c) = self.entered.captures(body) {
            return LogEvent::Entered { player: player_at(&c, 1) };
        }
        if let Some(c) = self.validated.captures(body) {
            return LogEvent::Validated { player: player_at(&c, 1) };
        }
        if let Some(c) = self.switched.captures(body) {
            return LogEvent::SwitchedTeam {
                player: player_at(&c, 1),
                from: c[5].to_string(),
                to: c[6].to_string(),
            };
        }
        if let Some(c) = self.purchase.captures(body) {
            return LogEvent::Purchase {
                player: player_at(&c, 1),
                item: c[5].to_string(),
            };
        }
        if let Some(c) = self.money_change.captures(body) {
            return LogEvent::MoneyChange {
                player: player_at(&c, 1),
                change: c[5].trim().to_string(),
                purchase: c.get(6).map(|m| m.as_str().to_string()),
            };
        }
        if let Some(c) = self.left_buyzone.captures(body) {
            return LogEvent::LeftBuyzone {
                player: player_at(&c, 1),
                inventory: c[5].to_string(),
            };
        }
        if let Some(c) = self.threw.captures(body) {
            return LogEvent::ThrewGrenade {
                player: player_at(&c, 1),
                grenade: c[5].to_string(),
                position: c[6].to_string(),
            };
        }
        if let Some(c) = self.blinded.captures(body) {
            return LogEvent::Blinded {
                victim: player_at(&c, 1),
                duration: c[5].parse().unwrap_or(0.0),
                attacker: player_at(&c, 6),
            };
        }
        if let Some(c) = self.picked_up.captures(body) {
            return LogEvent::PickedUp {
                player: player_at(&c, 1),
                item: c[5].to_string(),
            };
        }
        if let Some(c) = self.dropped.captures(body) {
            return LogEvent::Dropped {
                player: player_at(&c, 1),
                item: c[5].to_string(),
            };
        }
        // Player triggered comes after the more specific player patterns
        if let Some(c) = self.player_triggered.captures(body) {
            return LogEvent::PlayerTriggered {
                player: player_at(&c, 1),
                event: c[5].to_string(),
            };
        }
        if let Some(c) = self.accolade.captures(body) {
            return LogEvent::Accolade {
                is_final: &c[1] == "FINAL",
                kind: c[2].to_string(),
                player_name: c[3].to_string(),
                value: c[4].parse().unwrap_or(0.0),
                position: num(&c, 5),
                score: c[6].parse().unwrap_or(0.0),
            };
        }
        if let Some(c) = self.team_triggered.captures(body) {
            return LogEvent::TeamTriggered {
                team: c[1].to_string(),
                event: c[2].to_string(),
                score_ct: num(&c, 3),
                score_t: num(&c, 4),
            };
        }
        if let Some(c) = self.team_scored.captures(body) {
            return LogEvent::TeamScored {
                team: c[1].to_string(),
                score: num(&c, 2),
                player_count: num(&c, 3),
            };
        }
        if let Some(c) = self.match_status_teams.captures(body) {
            return LogEvent::MatchStatusTeams {
                team: c[1].to_string(),
                name: c[2].to_string(),
            };
        }
        if let Some(c) = self.team_playing.captures(body) {
            return LogEvent::TeamPlaying {
                team: c[1].to_string(),
                name: c[2].to_string(),
            };
        }
        if let Some(c) = self.world_triggered.captures(body) {
            return LogEvent::WorldTriggered {
                event: c[1].to_string(),
                map: c.get(2).map(|m| m.as_str().to_string()),
            };
        }
        if let Some(c) = self.game_over.captures(body) {
            return LogEvent::GameOver {
                mode: c[1].to_string(),
                map: c[2].to_string(),
                score: c[3].to_string(),
                duration_minutes: num(&c, 4),
            };
        }
        if self.freeze_period.is_match(body) {
            return LogEvent::FreezePeriodStarted {};
        }
        if let Some(c) = self.match_status_score.captures(body) {
            return LogEvent::MatchStatusScore {
                score_ct: num(&c, 1),
                score_t: num(&c, 2),
                map: c[3].to_string(),
                rounds_played: c[4].parse().unwrap_or(0),
            };
        }
        if let Some(c) = self.match_pause.captures(body) {
            return LogEvent::MatchPause { action: c[1].to_string() };
        }
        if let Some(c) = self.server_cvar.captures(body) {
            return LogEvent::ServerCvar {
                name: c[1].to_string(),
                value: c[2].to_string(),
            };
        }
        if let Some(c) = self.rcon.captures(body) {
            return LogEvent::RconCommand {
                address: c[1].to_string(),
                command: c[2].to_string(),
            };
        }
        if let Some(c) = self.loading_map.captures(body) {
            return LogEvent::LoadingMap { map: c[1].to_string() };
        }
        if let Some(c) = self.started_map.captures(body) {
            return LogEvent::StartedMap { map: c[1].to_string() };
        }
        if let Some(c) = self.log_file.captures(body) {
            return LogEvent::LogFile { action: c[1].to_string() };
        }

        LogEvent::Unknown { body: body.to_string() }
    }
}

// Patterns are fixed at compile time; a bad one is a programming error.
#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid grammar pattern")
}

fn player_at(caps: &Captures<'_>, base: usize) -> Player {
    Player {
        name: caps[base].to_string(),
        slot: caps[base + 1].parse().unwrap_or(0),
        id: caps[base + 2].to_string(),
        team: caps
            .get(base + 3)
            .map(|m| m.as_str().to_string())
            .filter(|t| !t.is_empty()),
    }
}

fn num(caps: &Captures<'_>, idx: usize) -> u32 {
    caps[idx].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> LogEvent {
        LineGrammar::new().parse(line).unwrap().event
    }

    #[test]
    fn test_parse_kill() {
        let event = parse(
            r#"L 08/19/2025 - 19:03:31: "Alice<3><[U:1:111]><CT>" [100 -200 60] killed "Bob<4><[U:1:222]><TERRORIST>" [-50 75 60] with "ak47" (headshot)"#,
        );
        match event {
            LogEvent::Kill { attacker, victim, weapon, headshot, .. } => {
                assert_eq!(attacker.name, "Alice");
                assert_eq!(attacker.team.as_deref(), Some("CT"));
                assert_eq!(victim.id, "[U:1:222]");
                assert_eq!(weapon, "ak47");
                assert!(headshot);
            },
            other => panic!("expected Kill, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_say() {
        let event = parse(r#"L 08/19/2025 - 19:03:31: "P<1><[U:1:1]><CT>" say "gg wp""#);
        match event {
            LogEvent::Say { player, text, team_chat } => {
                assert_eq!(player.slot, 1);
                assert_eq!(text, "gg wp");
                assert!(!team_chat);
            },
            other => panic!("expected Say, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_world_triggered_with_map() {
        let event =
            parse(r#"L 08/19/2025 - 19:03:31: World triggered "Match_Start" on "de_dust2""#);
        match event {
            LogEvent::WorldTriggered { event, map } => {
                assert_eq!(event, "Match_Start");
                assert_eq!(map.as_deref(), Some("de_dust2"));
            },
            other => panic!("expected WorldTriggered, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_server_cvar() {
        let event = parse(r#"L 08/19/2025 - 19:03:31: server_cvar: "mp_maxrounds" "24""#);
        match event {
            LogEvent::ServerCvar { name, value } => {
                assert_eq!(name, "mp_maxrounds");
                assert_eq!(value, "24");
            },
            other => panic!("expected ServerCvar, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_body_is_ok() {
        let event = parse("L 08/19/2025 - 19:03:31: something the grammar has never seen");
        assert!(matches!(event, LogEvent::Unknown { .. }));
    }

    #[test]
    fn test_uncanonical_line_is_rejected() {
        let grammar = LineGrammar::new();
        assert!(grammar.parse("not a log line at all").is_err());
    }

    #[test]
    fn test_event_time_parsed() {
        let parsed = LineGrammar::new()
            .parse(r#"L 08/19/2025 - 19:03:31: Starting Freeze period"#)
            .unwrap();
        let ts = parsed.event_time.unwrap();
        assert_eq!(ts.format("%m/%d/%Y %H:%M:%S").to_string(), "08/19/2025 19:03:31");
    }
}
