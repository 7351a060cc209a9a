//! Visible chat lines.
//!
//! Chat travels as raw keystrokes, editing keys included. Each side replays
//! the keystrokes into a [`ChatLine`] to get the text shown on screen.

/// Backspace as sent by most keyboards.
pub const DELETE: u8 = 0x08;
/// Left-arrow style delete sent by older keyboards. Treated like [`DELETE`].
pub const BACKSPACE: u8 = 0x1C;
/// Carriage return. Kept in the text; the renderer breaks the line there.
pub const LINE_BREAK: u8 = 0x0D;

/// The text one player has typed, capped at a fixed number of characters.
/// When the cap is exceeded the oldest characters scroll off the front.
#[derive(Debug, Clone)]
pub struct ChatLine {
    bytes: Vec<u8>,
    limit: usize,
}

impl ChatLine {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(limit + 1),
            limit: limit.max(1),
        }
    }

    /// Replays one keystroke. Zero bytes are ignored.
    pub fn apply(&mut self, byte: u8) {
        match byte {
            0 => {}
            DELETE | BACKSPACE => {
                self.bytes.pop();
            }
            _ => {
                self.bytes.push(byte);
                if self.bytes.len() > self.limit {
                    let excess = self.bytes.len() - self.limit;
                    self.bytes.drain(..excess);
                }
            }
        }
    }

    /// The line decoded as Latin-1.
    pub fn text(&self) -> String {
        self.bytes.iter().map(|&b| char::from(b)).collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
