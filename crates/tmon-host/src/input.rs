//! Decoding of raw bytes typed into an SSH PTY.
//!
//! The remote terminal sends keys as bytes and escape sequences, and mouse
//! reports in SGR form (`ESC [ < b ; x ; y M`). Each data packet is decoded
//! on its own; sequences the dashboard has no use for are skipped whole.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use tmon_core::Event;

const ESC: u8 = 0x1b;

pub fn decode(bytes: &[u8]) -> Vec<Event> {
    let mut events = Vec::new();
    let mut rest = bytes;
    while let Some(&first) = rest.first() {
        let (event, used) = match first {
            ESC => decode_escape(rest),
            _ => decode_plain(rest),
        };
        events.extend(event);
        rest = &rest[used.max(1)..];
    }
    events
}

fn key(code: KeyCode) -> Option<Event> {
    Some(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)))
}

fn decode_plain(bytes: &[u8]) -> (Option<Event>, usize) {
    let event = match bytes[0] {
        b'\r' | b'\n' => key(KeyCode::Enter),
        b'\t' => key(KeyCode::Tab),
        0x7f | 0x08 => key(KeyCode::Backspace),
        byte @ 0x01..=0x1a => Some(Event::Key(KeyEvent::new(
            KeyCode::Char(char::from(b'a' + byte - 1)),
            KeyModifiers::CONTROL,
        ))),
        0x00..=0x1f => None,
        _ => {
            let width = utf8_width(bytes[0]).min(bytes.len());
            let ch = std::str::from_utf8(&bytes[..width])
                .ok()
                .and_then(|text| text.chars().next());
            return match ch {
                Some(ch) => (key(KeyCode::Char(ch)), width),
                None => (None, 1),
            };
        }
    };
    (event, 1)
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

/// A bare Esc only when ESC ends the packet; `ESC <key>` is that key
/// with Alt held.
fn decode_escape(bytes: &[u8]) -> (Option<Event>, usize) {
    match bytes.get(1) {
        None => (key(KeyCode::Esc), 1),
        Some(b'[') => decode_csi(bytes),
        Some(b'O') => match bytes.get(2) {
            Some(&final_byte) => (ss3_key(final_byte), 3),
            None => (None, 2),
        },
        Some(&ESC) => (None, 2),
        Some(_) => {
            let (event, used) = decode_plain(&bytes[1..]);
            (event.map(with_alt), used + 1)
        }
    }
}

fn with_alt(event: Event) -> Event {
    match event {
        Event::Key(mut key) => {
            key.modifiers |= KeyModifiers::ALT;
            Event::Key(key)
        }
        other => other,
    }
}

fn ss3_key(final_byte: u8) -> Option<Event> {
    match final_byte {
        b'A' => key(KeyCode::Up),
        b'B' => key(KeyCode::Down),
        b'C' => key(KeyCode::Right),
        b'D' => key(KeyCode::Left),
        b'H' => key(KeyCode::Home),
        b'F' => key(KeyCode::End),
        _ => None,
    }
}

fn decode_csi(bytes: &[u8]) -> (Option<Event>, usize) {
    let body = &bytes[2..];
    let Some(end) = body.iter().position(|byte| (0x40..=0x7e).contains(byte)) else {
        return (None, bytes.len());
    };
    let used = end + 3;
    let params = &body[..end];
    let final_byte = body[end];

    if let Some(sgr) = params.strip_prefix(b"<") {
        return (decode_sgr_mouse(sgr, final_byte), used);
    }
    let event = match final_byte {
        b'~' => match params {
            b"1" | b"7" => key(KeyCode::Home),
            b"4" | b"8" => key(KeyCode::End),
            b"3" => key(KeyCode::Delete),
            b"5" => key(KeyCode::PageUp),
            b"6" => key(KeyCode::PageDown),
            _ => None,
        },
        other if params.is_empty() => ss3_key(other),
        _ => None,
    };
    (event, used)
}

fn decode_sgr_mouse(params: &[u8], final_byte: u8) -> Option<Event> {
    let text = std::str::from_utf8(params).ok()?;
    let mut fields = text.split(';').map(|field| field.parse::<u16>().ok());
    let (button, column, row) = (fields.next()??, fields.next()??, fields.next()??);

    let kind = match (button & 0b1100_0011, final_byte) {
        (64, _) => MouseEventKind::ScrollUp,
        (65, _) => MouseEventKind::ScrollDown,
        (0, b'M') => MouseEventKind::Down(MouseButton::Left),
        (1, b'M') => MouseEventKind::Down(MouseButton::Middle),
        (2, b'M') => MouseEventKind::Down(MouseButton::Right),
        (0, b'm') => MouseEventKind::Up(MouseButton::Left),
        (1, b'm') => MouseEventKind::Up(MouseButton::Middle),
        (2, b'm') => MouseEventKind::Up(MouseButton::Right),
        _ => return None,
    };
    Some(Event::Mouse(MouseEvent {
        kind,
        column: column.saturating_sub(1),
        row: row.saturating_sub(1),
        modifiers: KeyModifiers::NONE,
    }))
}
