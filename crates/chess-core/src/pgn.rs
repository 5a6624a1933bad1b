//! PGN parsing: a lightweight regex-based parser.
//!
//! Headers and SAN tokens are pulled out with regexes; legality is left to
//! shakmaty when the moves are replayed into a [`Game`].

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::game_data::{Game, GameMetadata};
use crate::identity::{IdentityError, PositionIdentity};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).unwrap());
static HEADER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").unwrap());
static VARIATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^()]*\)").unwrap());
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O[+#]?|O-O[+#]?").unwrap()
});
static MOVE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.+").unwrap());

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

#[derive(Debug, Error)]
pub enum PgnError {
    #[error("PGN contains no moves")]
    NoMoves,

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Parse a PGN string into a [`Game`]. A `FEN` header sets the start position.
pub fn parse_pgn(pgn: &str) -> Result<Game, PgnError> {
    let pgn = clean_pgn(pgn);
    let mut metadata = GameMetadata::default();
    let mut fen = None;

    for cap in HEADER_RE.captures_iter(&pgn) {
        let value = Some(cap[2].to_string()).filter(|v| !v.is_empty() && v != "?");
        match &cap[1] {
            "White" => metadata.white = value,
            "Black" => metadata.black = value,
            "Result" => metadata.result = value,
            "Date" => metadata.date = value,
            "Event" => metadata.event = value,
            "Site" => metadata.site = value,
            "Round" => metadata.round = value,
            "ECO" => metadata.eco = value,
            "FEN" => fen = value,
            _ => {}
        }
    }

    let moves = extract_moves(&pgn);
    if moves.is_empty() {
        return Err(PgnError::NoMoves);
    }

    let start = match fen {
        Some(f) => PositionIdentity::parse(&f)?,
        None => PositionIdentity::starting(),
    };

    Ok(Game::from_moves(metadata, start, &moves)?)
}

/// Separate headers pasted on one line and drop blank lines.
pub fn clean_pgn(pgn: &str) -> String {
    let cleaned = pgn.replace("] [", "]\n[");
    let mut result = cleaned
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    // Blank line between headers and movetext
    if result.contains("]\n1.") && !result.contains("]\n\n1.") {
        result = result.replace("]\n1.", "]\n\n1.");
    }

    result
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
fn extract_moves(pgn: &str) -> Vec<String> {
    let no_headers = HEADER_LINE_RE.replace_all(pgn, "");
    let mut text = COMMENT_RE.replace_all(&no_headers, " ").into_owned();

    // Innermost variations first so nested ones disappear too
    while VARIATION_RE.is_match(&text) {
        text = VARIATION_RE.replace_all(&text, " ").into_owned();
    }

    let text = text.replace("0-0-0", "O-O-O").replace("0-0", "O-O");

    MOVE_RE
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Split user-entered movetext ("1. e4 e5 2. Nf3") into move tokens.
///
/// Unlike PGN extraction nothing is silently dropped: an unrecognisable token
/// is kept so replaying it fails loudly.
pub fn split_movetext(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|tok| MOVE_NUMBER_RE.replace(tok, "").into_owned())
        .map(|tok| tok.trim_end_matches(['!', '?']).to_string())
        .filter(|tok| !tok.is_empty() && !RESULTS.contains(&tok.as_str()))
        .collect()
}

/// Every tag pair in the order it appears, values as written.
pub fn headers(pgn: &str) -> Vec<(String, String)> {
    HEADER_RE
        .captures_iter(&clean_pgn(pgn))
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pgn_basic() {
        let pgn = r#"[White "Player1"]
[Black "Player2"]
[Result "1-0"]
[Date "2025.01.15"]

1. e4 e5 2. Nf3 Nc6 1-0"#;

        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.metadata.white.as_deref(), Some("Player1"));
        assert_eq!(game.metadata.black.as_deref(), Some("Player2"));
        assert_eq!(game.metadata.result.as_deref(), Some("1-0"));
        assert_eq!(game.len(), 4);
        assert_eq!(game.plies[0].san, "e4");
        assert_eq!(game.start, PositionIdentity::starting());
    }

    #[test]
    fn test_comments_and_nested_variations_are_skipped() {
        let pgn = "1. e4 {best by test} e5 (1... c5 2. Nf3 (2. c3 d5) d6) 2. Nf3 ; line comment\n2... Nc6 *";
        let game = parse_pgn(pgn).unwrap();
        let sans: Vec<&str> = game.plies.iter().map(|p| p.san.as_str()).collect();
        assert_eq!(sans, vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn test_headers_on_one_line() {
        let pgn = r#"[White "A"] [Black "B"] [Result "*"]
1. d4 d5 *"#;
        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.metadata.black.as_deref(), Some("B"));
        assert_eq!(game.len(), 2);
    }

    #[test]
    fn test_fen_header_sets_start() {
        let pgn = r#"[SetUp "1"]
[FEN "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1"]

1. e4 Kd7 *"#;
        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.start.as_str(), "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        assert_eq!(game.len(), 2);
    }

    #[test]
    fn test_zero_castling_notation() {
        let pgn = "1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. 0-0 Nf6 *";
        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.plies[6].san, "O-O");
    }

    #[test]
    fn test_illegal_move_is_an_error() {
        let err = parse_pgn("1. e4 e5 2. Ke3 *").unwrap_err();
        assert!(matches!(
            err,
            PgnError::Identity(IdentityError::IllegalMove { step: 3, .. })
        ));
    }

    #[test]
    fn test_no_moves() {
        assert!(matches!(parse_pgn(r#"[White "A"]"#), Err(PgnError::NoMoves)));
    }

    #[test]
    fn test_split_movetext() {
        assert_eq!(
            split_movetext("12. Nf3 Nc6 13.Bb5!? a6 1-0"),
            vec!["Nf3", "Nc6", "Bb5", "a6"]
        );
        assert_eq!(split_movetext("1... e5 Zz9"), vec!["e5", "Zz9"]);
    }

    #[test]
    fn test_headers_keep_order_and_values() {
        let pgn = r#"[Event "Casual"] [Site "?"]
[ECO "C60"]

1. e4 *"#;
        assert_eq!(
            headers(pgn),
            vec![
                ("Event".to_string(), "Casual".to_string()),
                ("Site".to_string(), "?".to_string()),
                ("ECO".to_string(), "C60".to_string()),
            ]
        );
        assert!(headers("1. e4 e5 *").is_empty());
    }
}
