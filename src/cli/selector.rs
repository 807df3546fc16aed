use std::io::{self, IsTerminal, Write};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    style::Print,
    terminal::{self, ClearType},
    ExecutableCommand, QueueableCommand,
};

use crate::core::providers::ProviderKind;

/// RAII guard that restores terminal state on drop (even on panic).
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        io::stdout().execute(cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = io::stdout().execute(cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

/// Returns `Ok(Some(kind))` on confirm, `Ok(None)` if not a TTY, `Err` on cancel/Ctrl-C.
pub fn select_provider() -> anyhow::Result<Option<ProviderKind>> {
    if !io::stdin().is_terminal() {
        return Ok(None);
    }

    let kinds = ProviderKind::all();
    let _guard = RawModeGuard::enable()?;
    let mut cursor_pos: usize = 0;

    draw(kinds, cursor_pos)?;

    loop {
        if let Event::Key(KeyEvent { code, modifiers, .. }) = event::read()? {
            match (code, modifiers) {
                (KeyCode::Char('c'), KeyModifiers::CONTROL)
                | (KeyCode::Esc, _)
                | (KeyCode::Char('q'), KeyModifiers::NONE) => {
                    clear_ui()?;
                    anyhow::bail!("cancelled");
                }
                (KeyCode::Up, _) | (KeyCode::Char('k'), KeyModifiers::NONE) => {
                    if cursor_pos > 0 {
                        cursor_pos -= 1;
                    }
                }
                (KeyCode::Down, _) | (KeyCode::Char('j'), KeyModifiers::NONE) => {
                    if cursor_pos + 1 < kinds.len() {
                        cursor_pos += 1;
                    }
                }
                (KeyCode::Enter, _) => {
                    clear_ui()?;
                    return Ok(Some(kinds[cursor_pos]));
                }
                _ => {}
            }
            draw(kinds, cursor_pos)?;
        }
    }
}

fn draw(kinds: &[ProviderKind], cursor_pos: usize) -> io::Result<()> {
    let mut stdout = io::stdout();

    stdout
        .queue(cursor::MoveToColumn(0))?
        .queue(terminal::Clear(ClearType::FromCursorDown))?;

    stdout
        .queue(Print("Select a provider\r\n"))?
        .queue(Print("\r\n"))?;

    for (i, kind) in kinds.iter().enumerate() {
        let marker = if i == cursor_pos { "> " } else { "  " };
        stdout.queue(Print(format!(
            "{}{:<8} {}\r\n",
            marker,
            kind.display_name(),
            kind.auth_hint()
        )))?;
    }

    stdout.flush()?;
    stdout.execute(cursor::MoveUp(kinds.len() as u16 + 2))?;
    Ok(())
}

fn clear_ui() -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout
        .queue(cursor::MoveToColumn(0))?
        .queue(terminal::Clear(ClearType::FromCursorDown))?;
    stdout.flush()?;
    Ok(())
}
