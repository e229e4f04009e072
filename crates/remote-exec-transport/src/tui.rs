//! Crossterm event encoding for terminal front-ends.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use remote_exec_core::ViewportGeometry;

/// What a crossterm event means for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalIntent {
    /// Bytes to forward as process input.
    Input(Vec<u8>),
    /// The host terminal changed size.
    Resize(ViewportGeometry),
}

/// Convert a crossterm key event to the bytes a terminal would send.
#[must_use]
pub fn key_to_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    let bytes = match key.code {
        KeyCode::Char(c) => {
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                if let Some(ctrl) = control_byte(c) {
                    return Some(vec![ctrl]);
                }
            }
            let mut buf = [0; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::F(n) => function_key(n)?.to_vec(),
        _ => return None,
    };

    // Alt sends an ESC prefix
    if key.modifiers.contains(KeyModifiers::ALT) {
        let mut prefixed = Vec::with_capacity(bytes.len() + 1);
        prefixed.push(0x1b);
        prefixed.extend(bytes);
        return Some(prefixed);
    }
    Some(bytes)
}

fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some((c as u8) - b'a' + 1),
        'A'..='Z' => Some((c as u8) - b'A' + 1),
        '@' | ' ' => Some(0x00),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        _ => None,
    }
}

const fn function_key(n: u8) -> Option<&'static [u8]> {
    let seq: &'static [u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => return None,
    };
    Some(seq)
}

/// Map a crossterm event to a session intent.
///
/// Key releases are ignored so keys are not sent twice on terminals that
/// report them.
#[must_use]
pub fn event_intent(event: &Event) -> Option<TerminalIntent> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => {
            key_to_bytes(key).map(TerminalIntent::Input)
        }
        Event::Paste(text) => Some(TerminalIntent::Input(text.as_bytes().to_vec())),
        Event::Resize(cols, rows) => Some(TerminalIntent::Resize(ViewportGeometry::new(*rows, *cols))),
        _ => None,
    }
}
