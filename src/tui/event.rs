// Keyboard bindings for the TUI
// Key dispatch lives in mod.rs; this table drives the help overlay

use crossterm::event::KeyCode;

/// Bindings shown in the help overlay, in display order
pub const KEY_BINDINGS: &[(&[KeyCode], &str)] = &[
    (&[KeyCode::Up, KeyCode::Down], "Select device"),
    (&[KeyCode::Char('k'), KeyCode::Char('j')], "Select device"),
    (&[KeyCode::Enter], "Locate selected device"),
    (&[KeyCode::Esc, KeyCode::Backspace], "Stop locating / close popup"),
    (&[KeyCode::Char('?')], "Toggle this help"),
    (&[KeyCode::Char('q')], "Quit application"),
];

/// Convert key code to description for help display
pub fn key_description(key: KeyCode) -> &'static str {
    match key {
        KeyCode::Up => "↑",
        KeyCode::Down => "↓",
        KeyCode::Enter => "Enter",
        KeyCode::Esc => "Esc",
        KeyCode::Backspace => "Backspace",
        KeyCode::Char('q') => "q",
        KeyCode::Char('?') => "?",
        KeyCode::Char('j') => "j",
        KeyCode::Char('k') => "k",
        _ => "Unknown",
    }
}

/// "↑ / ↓" style label for a binding
pub fn binding_label(keys: &[KeyCode]) -> String {
    keys.iter()
        .map(|key| key_description(*key))
        .collect::<Vec<_>>()
        .join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_binding_has_a_description() {
        for (keys, _) in KEY_BINDINGS {
            for key in *keys {
                assert_ne!(key_description(*key), "Unknown", "{key:?}");
            }
        }
    }

    #[test]
    fn test_binding_label() {
        assert_eq!(binding_label(&[KeyCode::Esc, KeyCode::Backspace]), "Esc / Backspace");
        assert_eq!(binding_label(&[KeyCode::Enter]), "Enter");
    }
}
