use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{Chess, Position};

/// Convert a line of UCI moves ("e2e4 e7e5 ...") played from `pos` into SAN.
///
/// Stops at the first move that does not parse or is illegal, and after
/// `max_moves` moves.
pub fn uci_line_to_san<S: AsRef<str>>(pos: &Chess, uci_moves: &[S], max_moves: usize) -> Vec<String> {
    let mut pos = pos.clone();
    let mut line = Vec::new();

    for uci_str in uci_moves.iter().take(max_moves) {
        let Ok(uci_move) = uci_str.as_ref().parse::<UciMove>() else {
            break;
        };
        let Ok(legal_move) = uci_move.to_move(&pos) else {
            break;
        };
        line.push(San::from_move(&pos, legal_move.clone()).to_string());
        pos.play_unchecked(legal_move);
    }

    line
}
