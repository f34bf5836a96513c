use super::types::AppCommand;
use crate::error::Result;
use crate::view_mode::ViewMode;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use std::io::stdout;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How the terminal reports modified keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// Control bytes only: Ctrl+Shift+C and Ctrl+C both arrive as 0x03
    Legacy,
    /// Keyboard enhancement is on and Shift is reported with Ctrl chords
    Disambiguated,
}

/// Translate a key press into an app command.
///
/// Ctrl (or Cmd) + Shift chords drive sharing and layout; the remaining
/// keys act on the current capture or selection. Under the legacy encoding
/// a Ctrl+letter cannot be told apart from its Shift chord, so it is read
/// as the chord and only `q` quits.
pub fn map_key_event(key: &KeyEvent, encoding: KeyEncoding) -> Option<AppCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    let command_key = key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER);

    if let KeyCode::Char(c) = key.code {
        // Terminals report Shift either as a modifier or as an uppercase char
        let shifted = key.modifiers.contains(KeyModifiers::SHIFT) || c.is_ascii_uppercase();

        if command_key && (shifted || encoding == KeyEncoding::Legacy) {
            return match c.to_ascii_lowercase() {
                's' => Some(AppCommand::ToggleSharing),
                'c' => Some(AppCommand::ToggleCropMode),
                'x' => Some(AppCommand::ToggleSectionMode),
                'd' => Some(AppCommand::SetViewMode(ViewMode::Desktop)),
                'm' => Some(AppCommand::SetViewMode(ViewMode::Mobile)),
                _ => None,
            };
        }

        // Raw mode swallows SIGINT
        if command_key && c == 'c' {
            return Some(AppCommand::Quit);
        }
        if command_key {
            return None;
        }

        return match c {
            ' ' => Some(AppCommand::TogglePause),
            'q' => Some(AppCommand::Quit),
            _ => None,
        };
    }

    match key.code {
        KeyCode::F(11) => Some(AppCommand::ToggleFullscreen),
        KeyCode::Esc => Some(AppCommand::Escape),
        KeyCode::Enter => Some(AppCommand::ConfirmSelection),
        KeyCode::Left => Some(AppCommand::AdjustSelection {
            width_steps: -1,
            height_steps: 0,
        }),
        KeyCode::Right => Some(AppCommand::AdjustSelection {
            width_steps: 1,
            height_steps: 0,
        }),
        KeyCode::Up => Some(AppCommand::AdjustSelection {
            width_steps: 0,
            height_steps: -1,
        }),
        KeyCode::Down => Some(AppCommand::AdjustSelection {
            width_steps: 0,
            height_steps: 1,
        }),
        _ => None,
    }
}

/// Reads key presses from the terminal and forwards them as commands
pub struct KeyboardInputHandler {
    commands: mpsc::Sender<AppCommand>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(commands: mpsc::Sender<AppCommand>) -> Self {
        Self {
            commands,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!(
            "Starting keyboard input - Ctrl+Shift+S share, Ctrl+Shift+C crop, \
             Ctrl+Shift+X section, SPACE pause, q quit"
        );

        let commands = self.commands.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            let encoding = match supports_keyboard_enhancement() {
                Ok(true) => match execute!(
                    stdout(),
                    PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
                ) {
                    Ok(()) => KeyEncoding::Disambiguated,
                    Err(e) => {
                        warn!("Failed to enable keyboard enhancement: {}", e);
                        KeyEncoding::Legacy
                    }
                },
                _ => KeyEncoding::Legacy,
            };
            if encoding == KeyEncoding::Legacy {
                info!("Terminal cannot report Ctrl+Shift; Ctrl+S/C/X/D/M act as the chords, q quits");
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        let Some(command) = map_key_event(&key_event, encoding) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        let quit = command == AppCommand::Quit;
                        debug!("Key {:?} -> {:?}", key_event.code, command);
                        if commands.blocking_send(command).is_err() {
                            debug!("Command receiver closed; keyboard handler exiting");
                            break;
                        }
                        if quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if encoding == KeyEncoding::Disambiguated {
                if let Err(e) = execute!(stdout(), PopKeyboardEnhancementFlags) {
                    warn!("Failed to restore keyboard flags: {}", e);
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the poll loop a moment to notice and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn map(code: KeyCode, modifiers: KeyModifiers) -> Option<AppCommand> {
        map_key_event(&key(code, modifiers), KeyEncoding::Disambiguated)
    }

    #[test]
    fn test_command_chords() {
        let ctrl_shift = KeyModifiers::CONTROL | KeyModifiers::SHIFT;

        assert_eq!(
            map(KeyCode::Char('S'), ctrl_shift),
            Some(AppCommand::ToggleSharing)
        );
        assert_eq!(
            map(KeyCode::Char('C'), KeyModifiers::CONTROL),
            Some(AppCommand::ToggleCropMode)
        );
        assert_eq!(
            map(KeyCode::Char('m'), KeyModifiers::SUPER | KeyModifiers::SHIFT),
            Some(AppCommand::SetViewMode(ViewMode::Mobile))
        );
        assert_eq!(
            map(KeyCode::Char('d'), ctrl_shift),
            Some(AppCommand::SetViewMode(ViewMode::Desktop))
        );
    }

    #[test]
    fn test_plain_keys() {
        assert_eq!(
            map(KeyCode::Char(' '), KeyModifiers::NONE),
            Some(AppCommand::TogglePause)
        );
        assert_eq!(
            map(KeyCode::F(11), KeyModifiers::NONE),
            Some(AppCommand::ToggleFullscreen)
        );
        assert_eq!(
            map(KeyCode::Esc, KeyModifiers::NONE),
            Some(AppCommand::Escape)
        );
        assert_eq!(
            map(KeyCode::Enter, KeyModifiers::NONE),
            Some(AppCommand::ConfirmSelection)
        );
        assert_eq!(
            map(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(AppCommand::Quit)
        );
        assert_eq!(map(KeyCode::Char('s'), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_legacy_ctrl_letters_are_chords() {
        let legacy = |c| map_key_event(&key(KeyCode::Char(c), KeyModifiers::CONTROL), KeyEncoding::Legacy);

        // Ctrl+Shift+C arrives as 0x03, the same byte as Ctrl+C
        assert_eq!(legacy('c'), Some(AppCommand::ToggleCropMode));
        assert_eq!(legacy('s'), Some(AppCommand::ToggleSharing));
        assert_eq!(legacy('x'), Some(AppCommand::ToggleSectionMode));
        assert_eq!(legacy('m'), Some(AppCommand::SetViewMode(ViewMode::Mobile)));
        assert_eq!(legacy('a'), None);
        assert_eq!(
            map_key_event(&key(KeyCode::Char('q'), KeyModifiers::NONE), KeyEncoding::Legacy),
            Some(AppCommand::Quit)
        );
    }

    #[test]
    fn test_release_events_are_ignored() {
        let mut event = key(KeyCode::Char('q'), KeyModifiers::NONE);
        event.kind = KeyEventKind::Release;
        assert_eq!(map_key_event(&event, KeyEncoding::Disambiguated), None);
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let (tx, _rx) = mpsc::channel(8);
        let handler = KeyboardInputHandler::new(tx);

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
