use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::question::ConfidenceRating;

/// What a key press asks the app to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// start, check the answer or move to the next question
    Next,
    Previous,
    /// pick the option at this index (a = 0)
    Option(usize),
    Confidence(ConfidenceRating),
    TogglePause,
    ToggleList,
    Up,
    Down,
    Finish,
    Confirm,
    Decline,
    OpenReport,
    Quit,
}

pub fn action_for(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }
    let action = match key.code {
        KeyCode::Esc => Action::Quit,
        KeyCode::Enter | KeyCode::Right => Action::Next,
        KeyCode::Left => Action::Previous,
        KeyCode::Up => Action::Up,
        KeyCode::Down => Action::Down,
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            c @ 'a'..='e' => Action::Option((c as u8 - b'a') as usize),
            c @ '1'..='5' => Action::Confidence(ConfidenceRating::from_value(c as u8 - b'0')?),
            'p' | ' ' => Action::TogglePause,
            'l' => Action::ToggleList,
            'k' => Action::Up,
            'j' => Action::Down,
            'f' => Action::Finish,
            'y' => Action::Confirm,
            'n' => Action::Decline,
            'o' => Action::OpenReport,
            'q' => Action::Quit,
            _ => return None,
        },
        _ => return None,
    };
    Some(action)
}
