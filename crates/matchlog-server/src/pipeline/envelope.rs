//! Envelope extraction
//!
//! Sources wrap the canonical event line in one of several historical
//! transport envelopes before shipping it. This module normalizes every
//! known wrapper into the form the line grammar expects:
//!
//! - `[2025-08-19T15:12:44Z] 18a5c248-...-af0b184937c1: <event>` — bracketed
//!   receive timestamp plus correlation UUID
//! - `18a5c248-...-af0b184937c1: <event>` — bare correlation UUID prefix
//! - `<date> - <time>: <event body>` — marker-less relay output
//! - fractional-seconds timestamps (`HH:MM:SS.mmm`), which the grammar does
//!   not accept
//!
//! Extraction is best-effort and never fails: a line matching no wrapper is
//! returned unchanged.

/// Marker every canonical event line starts with.
pub const CANONICAL_MARKER: &str = "L ";

/// Normalize a transport-wrapped line into the canonical event string.
pub fn canonicalize(line: &str) -> String {
    let mut text = strip_bracketed_prefix(line);
    text = strip_correlation_uuid(text);

    let mut out = if !text.starts_with(CANONICAL_MARKER)
        && text.contains(" - ")
        && text.contains(':')
    {
        format!("{}{}", CANONICAL_MARKER, text)
    } else {
        text.to_string()
    };

    if out.starts_with(CANONICAL_MARKER) {
        out = normalize_timestamp(&out);
    }

    out
}

/// Strip a `[timestamp] correlation: ` prefix, keeping only the payload
/// after the first `": "` past the closing bracket.
fn strip_bracketed_prefix(line: &str) -> &str {
    if !line.starts_with('[') {
        return line;
    }
    let Some(end) = line.find("] ") else {
        return line;
    };
    let remaining = &line[end + 2..];
    match remaining.find(": ") {
        Some(colon) => &remaining[colon + 2..],
        None => line,
    }
}

/// Strip a bare `<uuid>: ` prefix (36 characters, 4 hyphens).
fn strip_correlation_uuid(text: &str) -> &str {
    if text.starts_with(CANONICAL_MARKER) {
        return text;
    }
    let Some(colon) = text.find(": ") else {
        return text;
    };
    let prefix = &text[..colon];
    if prefix.len() == 36 && prefix.matches('-').count() == 4 {
        &text[colon + 2..]
    } else {
        text
    }
}

/// Drop fractional seconds from the time field and ensure it is
/// colon-terminated. The grammar expects `HH:MM:SS:`, not `HH:MM:SS.mmm`.
fn normalize_timestamp(text: &str) -> String {
    let mut parts = text.splitn(3, " - ");
    let (Some(date), Some(time), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        return text.to_string();
    };

    if let Some(dot) = time.find('.') {
        format!("{} - {}: {}", date, &time[..dot], rest)
    } else if !time.ends_with(':') {
        format!("{} - {}: {}", date, time, rest)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INNER: &str = r#"L 08/19/2025 - 19:03:31: "P<1><[U:1:1]><CT>" say "hi""#;

    #[test]
    fn test_bracketed_prefix_stripped() {
        let wrapped = format!(
            "[2025-08-19T15:12:44Z] 18a5c248-c891-42a6-b72e-af0b184937c1: {}",
            INNER
        );
        assert_eq!(canonicalize(&wrapped), INNER);
    }

    #[test]
    fn test_bare_uuid_prefix_stripped() {
        let wrapped = format!("18a5c248-c891-42a6-b72e-af0b184937c1: {}", INNER);
        assert_eq!(canonicalize(&wrapped), INNER);
    }

    #[test]
    fn test_markerless_line_gains_marker() {
        let wrapped = r#"08/19/2025 - 19:03:31: "P<1><[U:1:1]><CT>" say "hi""#;
        assert_eq!(canonicalize(wrapped), INNER);
    }

    #[test]
    fn test_fractional_seconds_truncated() {
        let wrapped = r#"L 08/19/2025 - 19:03:31.735 - World triggered "Round_Start""#;
        assert_eq!(
            canonicalize(wrapped),
            r#"L 08/19/2025 - 19:03:31: World triggered "Round_Start""#
        );
    }

    #[test]
    fn test_unrecognized_line_unchanged() {
        assert_eq!(canonicalize("garbage with no delimiters"), "garbage with no delimiters");
    }

    #[test]
    fn test_canonical_line_unchanged() {
        assert_eq!(canonicalize(INNER), INNER);
    }
}
