use crate::app::App;
use crate::message::Message;
use crossterm::event::{KeyCode, KeyModifiers};

/// Converts keyboard input to Message based on current state
pub fn key_to_message(app: &App, key: KeyCode, modifiers: KeyModifiers) -> Option<Message> {
    if modifiers.contains(KeyModifiers::CONTROL) && matches!(key, KeyCode::Char('c' | 'C')) {
        return Some(Message::Quit);
    }

    // Any key dismisses the error overlay
    if !app.error_message.is_empty() {
        return Some(Message::Clear);
    }

    match key {
        KeyCode::Char('q') | KeyCode::Esc | KeyCode::F(10) => Some(Message::Quit),
        KeyCode::Up | KeyCode::Char('k') => Some(Message::QueueNavigateUp),
        KeyCode::Down | KeyCode::Char('j') => Some(Message::QueueNavigateDown),
        KeyCode::Home => Some(Message::QueueNavigateHome),
        KeyCode::End => Some(Message::QueueNavigateEnd),
        KeyCode::Char('r') => Some(Message::RetrySelected),
        KeyCode::Char('R') => Some(Message::RetryAllFailed),
        KeyCode::Char('d') | KeyCode::Delete | KeyCode::F(8) => Some(Message::RemoveSelected),
        KeyCode::Char('c') => Some(Message::ClearCompleted),
        KeyCode::Char('C') => Some(Message::ClearAll),
        KeyCode::F(5) | KeyCode::Char('l') => Some(Message::RefreshListing),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn app() -> App {
        App::new(
            Arc::new(MemoryStore::new()),
            "test",
            Some(std::env::temp_dir()),
        )
    }

    #[test]
    fn queue_keys() {
        let app = app();
        let none = KeyModifiers::NONE;
        assert_eq!(key_to_message(&app, KeyCode::Char('r'), none), Some(Message::RetrySelected));
        assert_eq!(
            key_to_message(&app, KeyCode::Char('R'), KeyModifiers::SHIFT),
            Some(Message::RetryAllFailed)
        );
        assert_eq!(key_to_message(&app, KeyCode::Char('c'), none), Some(Message::ClearCompleted));
        assert_eq!(key_to_message(&app, KeyCode::Char('C'), none), Some(Message::ClearAll));
        assert_eq!(key_to_message(&app, KeyCode::Esc, none), Some(Message::Quit));
        assert_eq!(key_to_message(&app, KeyCode::Char('x'), none), None);
    }

    #[test]
    fn error_overlay_swallows_keys_except_ctrl_c() {
        let mut app = app();
        app.show_error("boom");
        assert_eq!(
            key_to_message(&app, KeyCode::Char('q'), KeyModifiers::NONE),
            Some(Message::Clear)
        );
        assert_eq!(
            key_to_message(&app, KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(Message::Quit)
        );
    }
}
