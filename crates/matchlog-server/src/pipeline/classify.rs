//! Event classification
//!
//! Produces an `(event_kind, payload)` pair for a canonical event string.
//! The structured grammar runs first; lines it cannot type fall through to
//! an ordered table of heuristic rules. Rules are evaluated top to bottom
//! and the first match wins, so more specific patterns (`rcon from`) must
//! sit above more general ones (`"mp_`). Classification is a pure function
//! of the input text.
//!
//! Two terminal outcomes exist and they are distinct:
//!
//! - `"unclassified"`: the line carried the canonical prefix but neither the
//!   grammar nor any rule could name it; stored as a parsed event.
//! - [`ParseFailure`]: the grammar rejected the line outright and no rule
//!   matched; the caller records a failed parse.

use serde_json::{json, Value};
use thiserror::Error;

use super::grammar::{LineGrammar, LogEvent};

/// Raised when the grammar rejected a line and no heuristic rule matched.
#[derive(Error, Debug)]
#[error("unparseable line: {reason}")]
pub struct ParseFailure {
    pub reason: String,
}

/// A classified line: the kind label plus a structured payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: String,
    pub payload: Value,
}

impl Classification {
    fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { kind: kind.into(), payload }
    }
}

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;
type Extractor = Box<dyn Fn(&str) -> Classification + Send + Sync>;

/// One entry in the heuristic rule table.
struct HeuristicRule {
    /// Rule name, used in trace logging only.
    name: &'static str,
    matches: Predicate,
    classify: Extractor,
}

/// Grammar-first classifier with heuristic fallback.
pub struct Classifier {
    grammar: LineGrammar,
    rules: Vec<HeuristicRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            grammar: LineGrammar::new(),
            rules: rule_table(),
        }
    }

    /// Classify a canonical event string.
    pub fn classify(&self, text: &str) -> Result<Classification, ParseFailure> {
        match self.grammar.parse(text) {
            Ok(parsed) => {
                if let LogEvent::Unknown { .. } = parsed.event {
                    // Known prefix, unknown body: heuristics, then the
                    // terminal bucket.
                    Ok(self
                        .apply_rules(text)
                        .unwrap_or_else(|| Classification::new("unclassified", raw_payload(text))))
                } else {
                    let kind = grammar_kind(&parsed.event);
                    let payload =
                        serde_json::to_value(&parsed).unwrap_or_else(|_| raw_payload(text));
                    Ok(Classification::new(kind, payload))
                }
            },
            Err(e) => match self.apply_rules(text) {
                Some(classification) => Ok(classification),
                None => Err(ParseFailure { reason: e.to_string() }),
            },
        }
    }

    fn apply_rules(&self, text: &str) -> Option<Classification> {
        for rule in &self.rules {
            if (rule.matches)(text) {
                tracing::trace!(rule = rule.name, "Heuristic rule matched");
                return Some((rule.classify)(text));
            }
        }
        None
    }
}

fn raw_payload(text: &str) -> Value {
    json!({ "raw": text })
}

// ============================================================================
// Grammar kind mapping
// ============================================================================

/// Map a typed grammar event to its kind label.
fn grammar_kind(event: &LogEvent) -> String {
    match event {
        LogEvent::Kill { .. } => "kill".to_string(),
        LogEvent::KillAssist { .. } => "kill-assist".to_string(),
        LogEvent::Attack { .. } => "attack".to_string(),
        LogEvent::Say { text, .. } => chat_kind(text),
        LogEvent::Connected { .. } => "player-connect".to_string(),
        LogEvent::Disconnected { .. } => "player-disconnect".to_string(),
        LogEvent::Entered { .. } => "player-entered".to_string(),
        LogEvent::Validated { .. } => "userid-validated".to_string(),
        LogEvent::SwitchedTeam { .. } => "team-switch".to_string(),
        LogEvent::PlayerTriggered { event, .. } => player_trigger_kind(event),
        LogEvent::Purchase { .. } => "purchase".to_string(),
        LogEvent::MoneyChange { .. } => "money-change".to_string(),
        LogEvent::LeftBuyzone { .. } => "left-buyzone".to_string(),
        LogEvent::ThrewGrenade { .. } => "grenade-thrown".to_string(),
        LogEvent::Blinded { .. } => "player-blinded".to_string(),
        LogEvent::PickedUp { .. } => "picked-up".to_string(),
        LogEvent::Dropped { .. } => "dropped".to_string(),
        LogEvent::Accolade { is_final, kind, .. } => {
            if *is_final {
                format!("accolade-final-{}", kind.to_lowercase())
            } else {
                format!("accolade-round-{}", kind.to_lowercase())
            }
        },
        LogEvent::TeamTriggered { event, .. } => {
            if event.contains("SFUI_Notice") {
                "team-notice".to_string()
            } else {
                format!("trigger-{}", normalize_trigger(event))
            }
        },
        LogEvent::TeamScored { .. } => "team-scored".to_string(),
        LogEvent::TeamPlaying { .. } => "team-playing".to_string(),
        LogEvent::WorldTriggered { event, .. } => world_trigger_kind(event),
        LogEvent::GameOver { .. } => "match-end".to_string(),
        LogEvent::FreezePeriodStarted {} => "freeze-period-start".to_string(),
        LogEvent::MatchStatusScore { .. } => "match-status-score".to_string(),
        LogEvent::MatchStatusTeams { .. } => "match-status-teams".to_string(),
        LogEvent::MatchPause { action } => format!("match-pause-{}", action),
        LogEvent::ServerCvar { name, .. } => cvar_kind(name),
        LogEvent::RconCommand { .. } => "rcon-command".to_string(),
        LogEvent::LoadingMap { .. } => "map-loading".to_string(),
        LogEvent::StartedMap { .. } => "map-started".to_string(),
        LogEvent::LogFile { action } => format!("log-file-{}", action),
        LogEvent::Unknown { .. } => "unclassified".to_string(),
    }
}

/// Chat refinement: dot-prefixed text is a command, `gg`/`gg wp` gets its
/// own bucket, everything else is plain chat.
fn chat_kind(text: &str) -> String {
    let kind = if text.starts_with(".pause") || text.starts_with(".forcepause") {
        "chat-pause-command"
    } else if text.starts_with(".restore") || text.starts_with(".resotre") {
        "chat-restore-command"
    } else if text.starts_with(".ready") || text.starts_with(".rdy") {
        "chat-ready-command"
    } else if text.starts_with(".unpause") {
        "chat-unpause-command"
    } else if text.starts_with(".tech") {
        "chat-tech-command"
    } else if text.starts_with(".tac") {
        "chat-tac-command"
    } else if text.starts_with(".asay") {
        "chat-admin-say"
    } else if text.starts_with('.') {
        "chat-command"
    } else if text == "gg" || text == "gg wp" {
        "chat-gg"
    } else {
        "chat"
    };
    kind.to_string()
}

fn player_trigger_kind(event: &str) -> String {
    match event {
        "Planted_The_Bomb" => "bomb-planted".to_string(),
        "Defused_The_Bomb" => "bomb-defused".to_string(),
        "Begin_Bomb_Defuse_With_Kit" | "Begin_Bomb_Defuse_Without_Kit" => {
            "bomb-begin-defuse".to_string()
        },
        "Got_The_Bomb" => "bomb-got".to_string(),
        "Dropped_The_Bomb" => "bomb-dropped".to_string(),
        other => format!("trigger-{}", normalize_trigger(other)),
    }
}

fn world_trigger_kind(event: &str) -> String {
    match event {
        "Round_Start" => "round-start".to_string(),
        "Round_End" => "round-end".to_string(),
        "Match_Start" => "match-start".to_string(),
        "Game_Commencing" => "game-commencing".to_string(),
        // Freeze time ends, action starts
        "Round_Freeze_End" => "freeze-time-start".to_string(),
        other => format!("trigger-{}", normalize_trigger(other)),
    }
}

fn cvar_kind(name: &str) -> String {
    if name.starts_with("mp_") {
        if name == "mp_maxrounds" {
            "cvar-maxrounds".to_string()
        } else if name.contains("overtime") {
            "cvar-overtime".to_string()
        } else if name == "mp_freezetime" {
            "cvar-freezetime".to_string()
        } else if name == "mp_tournament" {
            "cvar-tournament".to_string()
        } else {
            "cvar-mp-setting".to_string()
        }
    } else {
        "server-cvar".to_string()
    }
}

fn normalize_trigger(event: &str) -> String {
    event.to_lowercase().replace(['_', ' '], "-")
}

// ============================================================================
// Heuristic rule table
// ============================================================================

/// Build the ordered rule table. The order is a contract: specific patterns
/// sit above general ones, and tests pin the pairs that would misclassify
/// if swapped.
fn rule_table() -> Vec<HeuristicRule> {
    vec![
        rule("money-change", |t| t.contains("money change"), |t| {
            Classification::new("money-change", raw_payload(t))
        }),
        rule(
            "attack",
            |t| t.contains("attacked") && t.contains("with"),
            |t| Classification::new("attack", raw_payload(t)),
        ),
        rule(
            "player-blinded",
            |t| t.contains("blinded for") && t.contains("by"),
            |t| Classification::new("player-blinded", raw_payload(t)),
        ),
        rule("grenade-thrown", |t| t.contains("threw flashbang"), |t| {
            Classification::new("grenade-thrown", raw_payload(t))
        }),
        rule("left-buyzone", |t| t.contains("left buyzone"), |t| {
            Classification::new("left-buyzone", raw_payload(t))
        }),
        rule(
            "userid-validated",
            |t| t.contains("STEAM USERID validated"),
            |t| Classification::new("userid-validated", raw_payload(t)),
        ),
        rule("accolade", |t| t.contains("ACCOLADE"), classify_accolade),
        rule("match-status", |t| t.contains("MatchStatus:"), |t| {
            let kind = if t.contains("Score:") {
                "match-status-score"
            } else if t.contains("Team playing") {
                "match-status-teams"
            } else {
                "match-status"
            };
            Classification::new(kind, raw_payload(t))
        }),
        rule("match-pause", |t| t.contains("Match pause"), |t| {
            let kind = if t.contains("enabled") {
                "match-pause-enabled"
            } else if t.contains("disabled") {
                "match-pause-disabled"
            } else {
                "match-pause"
            };
            Classification::new(kind, raw_payload(t))
        }),
        rule("match-unpause", |t| t.contains("Match unpaused"), |t| {
            Classification::new("match-unpause", raw_payload(t))
        }),
        rule("throw-debug", |t| t.contains("sv_throw"), |t| {
            let kind = if t.contains("sv_throw_molotov") {
                "throw-debug-molotov"
            } else if t.contains("sv_throw_smokegrenade") {
                "throw-debug-smoke"
            } else if t.contains("sv_throw_flashgrenade") {
                "throw-debug-flash"
            } else if t.contains("sv_throw_hegrenade") {
                "throw-debug-he"
            } else {
                "throw-debug"
            };
            Classification::new(kind, raw_payload(t))
        }),
        rule("bomb-planted", |t| t.contains("planted the bomb"), |t| {
            Classification::new("bomb-planted", raw_payload(t))
        }),
        rule("bomb-defused", |t| t.contains("defused the bomb"), |t| {
            Classification::new("bomb-defused", raw_payload(t))
        }),
        rule("bomb-dropped", |t| t.contains("dropped the bomb"), |t| {
            Classification::new("bomb-dropped", raw_payload(t))
        }),
        rule("bomb-begin-plant", |t| t.contains("Bomb_Begin_Plant"), |t| {
            Classification::new("bomb-begin-plant", raw_payload(t))
        }),
        rule("bomb-planted-trigger", |t| t.contains("Bomb_Planted"), |t| {
            Classification::new("bomb-planted-trigger", raw_payload(t))
        }),
        rule("bomb-defused-trigger", |t| t.contains("Bomb_Defused"), |t| {
            Classification::new("bomb-defused-trigger", raw_payload(t))
        }),
        // rcon must be checked before the generic mp_ cvar rule
        rule("rcon-command", |t| t.contains("rcon from"), |t| {
            Classification::new("rcon-command", raw_payload(t))
        }),
        rule("server-cvar", |t| t.contains("server_cvar"), |t| {
            Classification::new("server-cvar", raw_payload(t))
        }),
        rule("mp-cvar", |t| t.contains("\"mp_"), |t| {
            let kind = if t.contains("mp_maxrounds") {
                "cvar-maxrounds"
            } else if t.contains("mp_overtime") {
                "cvar-overtime"
            } else if t.contains("mp_freezetime") {
                "cvar-freezetime"
            } else if t.contains("mp_tournament") {
                "cvar-tournament"
            } else {
                "cvar-mp-setting"
            };
            Classification::new(kind, raw_payload(t))
        }),
        rule("log-file", |t| t.contains("Log file"), |t| {
            let kind = if t.contains("started") {
                "log-file-started"
            } else if t.contains("closed") {
                "log-file-closed"
            } else {
                "log-file"
            };
            Classification::new(kind, raw_payload(t))
        }),
        rule("map-loading", |t| t.contains("Loading map"), |t| {
            Classification::new("map-loading", raw_payload(t))
        }),
        rule("map-started", |t| t.contains("Started map"), |t| {
            Classification::new("map-started", raw_payload(t))
        }),
        rule("team-playing", |t| t.contains("Team playing"), |t| {
            Classification::new("team-playing", raw_payload(t))
        }),
        rule(
            "freeze-period-start",
            |t| t.contains("Starting Freeze period"),
            |t| Classification::new("freeze-period-start", raw_payload(t)),
        ),
        rule("game-over", |t| t.contains("Game Over"), |t| {
            let kind = if t.contains("competitive") {
                "game-over-competitive"
            } else if t.contains("casual") {
                "game-over-casual"
            } else {
                "game-over"
            };
            Classification::new(kind, raw_payload(t))
        }),
        // Team notices must be checked before the generic trigger rule
        rule(
            "team-trigger",
            |t| t.contains("Team ") && t.contains("triggered"),
            |t| {
                let kind = if t.contains("SFUI_Notice") {
                    "team-notice"
                } else {
                    "team-triggered"
                };
                Classification::new(kind, raw_payload(t))
            },
        ),
        rule("stats-json-begin", |t| t.contains("JSON_BEGIN{"), |t| {
            Classification::new("stats-json-begin", raw_payload(t))
        }),
        rule("stats-json-end", |t| t.contains("}}JSON_END"), |t| {
            Classification::new("stats-json-end", raw_payload(t))
        }),
        stats_field_rule("stats-player-data", "\"player_"),
        stats_field_rule("stats-json-players", "\"players\""),
        stats_field_rule("stats-json-fields", "\"fields\""),
        stats_field_rule("stats-json-server", "\"server\""),
        stats_field_rule("stats-json-score-ct", "\"score_ct\""),
        stats_field_rule("stats-json-score-t", "\"score_t\""),
        stats_field_rule("stats-json-rounds", "\"rounds_played\""),
        stats_field_rule("stats-json-version", "\"version\""),
        stats_field_rule("stats-json-timestamp", "\"timestamp\""),
        stats_field_rule("stats-json-map", "\"map\""),
        rule("chat", |t| t.contains("\" say \""), classify_chat),
        rule("generic-trigger", |t| t.contains("triggered \""), classify_trigger),
    ]
}

fn rule(
    name: &'static str,
    matches: impl Fn(&str) -> bool + Send + Sync + 'static,
    classify: impl Fn(&str) -> Classification + Send + Sync + 'static,
) -> HeuristicRule {
    HeuristicRule {
        name,
        matches: Box::new(matches),
        classify: Box::new(classify),
    }
}

/// Statistics field lines share the shape `"key" : value`.
fn stats_field_rule(kind: &'static str, needle: &'static str) -> HeuristicRule {
    rule(
        kind,
        move |t| t.contains(needle) && t.contains(':'),
        move |t| Classification::new(kind, raw_payload(t)),
    )
}

/// `ACCOLADE, FINAL: {mvp}, ...` -> `accolade-final-mvp`
fn classify_accolade(text: &str) -> Classification {
    if let Some((_, rest)) = text.split_once(',') {
        let descriptor = rest.split(',').next().unwrap_or_default();
        let cleaned = descriptor
            .trim()
            .to_lowercase()
            .replace(' ', "-")
            .replace([':', '{', '}'], "");
        if !cleaned.is_empty() {
            return Classification::new(
                format!("accolade-{}", cleaned),
                json!({ "raw": text, "descriptor": descriptor.trim() }),
            );
        }
    }
    Classification::new("accolade", raw_payload(text))
}

/// Trailing quoted `say` payload; refines commands and gg messages.
fn classify_chat(text: &str) -> Classification {
    let Some(start) = text.find("\" say \"").map(|i| i + 7) else {
        return Classification::new("chat", raw_payload(text));
    };
    let Some(end) = text[start..].rfind('"').filter(|&e| e > 0) else {
        return Classification::new("chat", raw_payload(text));
    };
    let message = &text[start..start + end];
    Classification::new(chat_kind(message), json!({ "raw": text, "message": message }))
}

/// Generic `triggered "<Event>"` lines.
fn classify_trigger(text: &str) -> Classification {
    let Some(start) = text.find("triggered \"").map(|i| i + 11) else {
        return Classification::new("generic-trigger", raw_payload(text));
    };
    let Some(end) = text[start..].find('"').filter(|&e| e > 0) else {
        return Classification::new("generic-trigger", raw_payload(text));
    };
    let event = &text[start..start + end];
    let kind = if event == "Round_Freeze_End" {
        "freeze-time-start".to_string()
    } else {
        format!("trigger-{}", normalize_trigger(event))
    };
    Classification::new(kind, json!({ "raw": text, "event": event }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_gg_scenario() {
        let classifier = Classifier::new();
        let result = classifier
            .classify(r#"L 08/19/2025 - 19:03:31: "P<1><[U:1:1]><CT>" say "gg wp""#)
            .unwrap();
        assert_eq!(result.kind, "chat-gg");
    }

    #[test]
    fn test_accolade_final_mvp_scenario() {
        let classifier = Classifier::new();
        // No canonical prefix, so only the heuristic path can claim it
        let result = classifier
            .classify("ACCOLADE, FINAL: {mvp}, P<1>, VALUE: 5.0, POS: 1, SCORE: 80.0")
            .unwrap();
        assert_eq!(result.kind, "accolade-final-mvp");
    }

    #[test]
    fn test_rcon_beats_mp_prefix() {
        let classifier = Classifier::new();
        let result = classifier
            .classify(r#"rcon from "1.2.3.4:27015": command "mp_maxrounds 24" something "mp_x""#)
            .unwrap();
        assert_eq!(result.kind, "rcon-command");
    }

    #[test]
    fn test_unclassified_bucket() {
        let classifier = Classifier::new();
        let result = classifier
            .classify("L 08/19/2025 - 19:03:31: complete mystery body")
            .unwrap();
        assert_eq!(result.kind, "unclassified");
    }

    #[test]
    fn test_parse_failure_when_nothing_matches() {
        let classifier = Classifier::new();
        assert!(classifier.classify("total garbage").is_err());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::new();
        let line = r#"L 08/19/2025 - 19:03:31: "P<1><[U:1:1]><CT>" say ".ready""#;
        let a = classifier.classify(line).unwrap();
        let b = classifier.classify(line).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.kind, "chat-ready-command");
    }
}
