//! PC keyboard input handling
//!
//! Keys are queued as BIOS key words (scancode in the high byte, ASCII in
//! the low byte), the format INT 16h hands back to programs. Port 0x60
//! exposes the scancode of the key at the head of the queue.

use std::collections::VecDeque;

/// Keys the BIOS type-ahead buffer holds
const BUFFER_SIZE: usize = 15;

/// PC keyboard controller
#[derive(Debug, Clone)]
pub struct Keyboard {
    /// Queue of (scancode << 8 | ascii) words waiting to be read
    key_buffer: VecDeque<u16>,
    /// Maximum buffer size
    max_buffer_size: usize,
}

impl Keyboard {
    /// Create a new keyboard controller
    pub fn new() -> Self {
        Self {
            key_buffer: VecDeque::with_capacity(BUFFER_SIZE),
            max_buffer_size: BUFFER_SIZE,
        }
    }

    /// Queue a key; returns false when the buffer is full
    pub fn push_key(&mut self, scancode: u8, ascii: u8) -> bool {
        if self.key_buffer.len() >= self.max_buffer_size {
            return false;
        }
        self.key_buffer.push_back(((scancode as u16) << 8) | ascii as u16);
        true
    }

    /// Add a key press event for an unshifted key
    pub fn key_press(&mut self, scancode: u8) -> bool {
        self.push_key(scancode, ascii_for_scancode(scancode))
    }

    /// Queue every character of `text` as host-side pasted input.
    ///
    /// Pasted input is not bound by the type-ahead limit; line feeds are
    /// typed as Enter. Returns the number of keys queued.
    pub fn type_text(&mut self, text: &str) -> usize {
        let before = self.key_buffer.len();
        for byte in text.bytes() {
            let byte = if byte == b'\n' { b'\r' } else { byte };
            self.key_buffer
                .push_back(((scancode_for_ascii(byte) as u16) << 8) | byte as u16);
        }
        self.key_buffer.len() - before
    }

    /// Check if there are keys available to read
    pub fn has_key(&self) -> bool {
        !self.key_buffer.is_empty()
    }

    /// Peek at the next key word without consuming it
    pub fn peek_key(&self) -> Option<u16> {
        self.key_buffer.front().copied()
    }

    /// Remove and return the next key word
    pub fn read_key(&mut self) -> Option<u16> {
        self.key_buffer.pop_front()
    }

    /// Scancode latched on port 0x60 (0 when the queue is empty)
    pub fn peek_scancode(&self) -> u8 {
        self.peek_key().map_or(0, |key| (key >> 8) as u8)
    }

    pub fn len(&self) -> usize {
        self.key_buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_buffer.is_empty()
    }

    /// Clear the key buffer
    pub fn clear(&mut self) {
        self.key_buffer.clear();
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

// PC keyboard scan codes (Set 1) for common keys
pub const SCANCODE_ESC: u8 = 0x01;
pub const SCANCODE_1: u8 = 0x02;
pub const SCANCODE_0: u8 = 0x0B;
pub const SCANCODE_MINUS: u8 = 0x0C;
pub const SCANCODE_EQUALS: u8 = 0x0D;
pub const SCANCODE_BACKSPACE: u8 = 0x0E;
pub const SCANCODE_TAB: u8 = 0x0F;
pub const SCANCODE_Q: u8 = 0x10;
pub const SCANCODE_ENTER: u8 = 0x1C;
pub const SCANCODE_A: u8 = 0x1E;
pub const SCANCODE_Z: u8 = 0x2C;
pub const SCANCODE_COMMA: u8 = 0x33;
pub const SCANCODE_PERIOD: u8 = 0x34;
pub const SCANCODE_SLASH: u8 = 0x35;
pub const SCANCODE_SPACE: u8 = 0x39;

/// Unshifted characters of the main key block, indexed by scancode
const UNSHIFTED: [u8; 0x3A] = [
    0, 0x1B, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\r', 0, b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
];

/// Shifted counterparts of [`UNSHIFTED`]
const SHIFTED: [u8; 0x3A] = [
    0, 0x1B, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\r', 0, b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
];

/// ASCII produced by an unshifted key, 0 for keys without one
pub fn ascii_for_scancode(scancode: u8) -> u8 {
    UNSHIFTED.get(scancode as usize).copied().unwrap_or(0)
}

/// Scancode of the key that types `ascii` (shifted or not); 0 if none does
pub fn scancode_for_ascii(ascii: u8) -> u8 {
    if ascii == 0 {
        return 0;
    }
    UNSHIFTED
        .iter()
        .position(|&c| c == ascii)
        .or_else(|| SHIFTED.iter().position(|&c| c == ascii))
        .map_or(0, |index| index as u8)
}
