use crate::game::{Board, ChatMessage, ChatOrigin, GameOutcome, GameSession};

/// Render a board; empty cells show their index so they can be played
pub fn render_board(board: &Board) -> String {
    match board {
        Board::Regular(_) => render_regular(board),
        Board::Ultimate(_) => render_ultimate(board),
    }
}

fn cell_text(board: &Board, index: usize, width: usize) -> String {
    match board.get(index) {
        Some(Some(symbol)) => format!("{:>width$}", symbol.as_str(), width = width),
        _ => format!("{:>width$}", index, width = width),
    }
}

fn render_regular(board: &Board) -> String {
    let rows: Vec<String> = (0..3)
        .map(|row| {
            (0..3)
                .map(|col| format!(" {} ", cell_text(board, row * 3 + col, 1)))
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect();
    rows.join("\n---+---+---\n")
}

fn render_ultimate(board: &Board) -> String {
    let mut lines = Vec::new();
    for big_row in 0..3 {
        if big_row > 0 {
            lines.push("----------+----------+----------".to_string());
        }
        for small_row in 0..3 {
            let segments: Vec<String> = (0..3)
                .map(|big_col| {
                    let outer = big_row * 3 + big_col;
                    (0..3)
                        .map(|small_col| cell_text(board, outer * 9 + small_row * 3 + small_col, 2))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect();
            lines.push(format!(" {} | {} | {}", segments[0], segments[1], segments[2]));
        }
    }
    lines.join("\n")
}

pub fn format_chat_line(message: &ChatMessage) -> String {
    match message.origin {
        ChatOrigin::Local => format!("you: {}", message.text),
        ChatOrigin::Network => format!("opponent: {}", message.text),
        ChatOrigin::System => format!("* {}", message.text),
    }
}

/// One-line summary of where the game stands
pub fn status_line(game: &GameSession) -> String {
    if game.board().is_none() {
        return format!("In the lobby ({} mode)", game.mode());
    }
    let symbol = game.player_symbol();
    match game.game_result() {
        Some(GameOutcome::Win) => format!("You ({}) won", symbol),
        Some(GameOutcome::Lost) => format!("You ({}) lost", symbol),
        Some(GameOutcome::Draw) => "Draw".to_string(),
        None if game.is_turn_to_play() => format!("Your turn ({})", symbol),
        None => format!("Waiting for your opponent ({})", symbol.opposite()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameMode, Symbol};

    #[test]
    fn test_render_regular() {
        let mut board = Board::new(GameMode::Regular);
        board.set(0, Symbol::O).unwrap();
        board.set(4, Symbol::X).unwrap();
        assert_eq!(
            render_board(&board),
            " o | 1 | 2 \n---+---+---\n 3 | x | 5 \n---+---+---\n 6 | 7 | 8 "
        );
    }

    #[test]
    fn test_render_ultimate_layout() {
        let mut board = Board::new(GameMode::Ultimate);
        board.set(80, Symbol::O).unwrap();
        let rendered = render_board(&board);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "  0  1  2 |  9 10 11 | 18 19 20");
        assert!(lines[10].ends_with(" o"));
    }

    #[test]
    fn test_chat_lines() {
        assert_eq!(format_chat_line(&ChatMessage::local("hi")), "you: hi");
        assert_eq!(format_chat_line(&ChatMessage::network("yo")), "opponent: yo");
    }

    #[test]
    fn test_status_line() {
        let mut game = GameSession::new();
        assert_eq!(status_line(&game), "In the lobby (regular mode)");
        game.create_board();
        game.set_player_symbol(Symbol::O);
        assert_eq!(status_line(&game), "Your turn (o)");
        game.play_at(0, Symbol::O).unwrap();
        assert_eq!(status_line(&game), "Waiting for your opponent (x)");
    }
}
