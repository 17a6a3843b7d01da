//! CGA text-mode screen
//!
//! The screen owns only the cursor and mode; character cells live in the
//! 80x25 text page at B800:0000 as (character, attribute) pairs and are
//! handed in as a slice by the bus.

use serde::{Deserialize, Serialize};

pub const TEXT_COLUMNS: usize = 80;
pub const TEXT_ROWS: usize = 25;
/// Bytes in one text page
pub const TEXT_PAGE_SIZE: usize = TEXT_COLUMNS * TEXT_ROWS * 2;
/// Light grey on black
pub const DEFAULT_ATTRIBUTE: u8 = 0x07;
/// 80x25 colour text
pub const DEFAULT_MODE: u8 = 0x03;
/// Bottom-right cell as (row, col)
const LAST_CELL: (u8, u8) = (TEXT_ROWS as u8 - 1, TEXT_COLUMNS as u8 - 1);

/// Cursor position and video mode of the text screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextScreen {
    pub row: u8,
    pub col: u8,
    pub mode: u8,
}

impl TextScreen {
    pub fn new() -> Self {
        Self {
            row: 0,
            col: 0,
            mode: DEFAULT_MODE,
        }
    }

    /// Switch mode, clearing the page and homing the cursor
    pub fn set_mode(&mut self, vram: &mut [u8], mode: u8) {
        self.mode = mode;
        self.clear(vram);
    }

    /// Blank every cell and home the cursor
    pub fn clear(&mut self, vram: &mut [u8]) {
        scroll_up(vram, 0, (0, 0), LAST_CELL, DEFAULT_ATTRIBUTE);
        self.row = 0;
        self.col = 0;
    }

    /// Move the cursor, clamping to the screen
    pub fn set_cursor(&mut self, row: u8, col: u8) {
        self.row = row.min(LAST_CELL.0);
        self.col = col.min(LAST_CELL.1);
    }

    /// Write `count` copies of `ch` from the cursor on without moving it.
    /// `attribute` of `None` keeps the attributes already on screen.
    pub fn put_char(&self, vram: &mut [u8], ch: u8, attribute: Option<u8>, count: u16) {
        let start = self.row as usize * TEXT_COLUMNS + self.col as usize;
        for cell in start..(start + count as usize).min(TEXT_COLUMNS * TEXT_ROWS) {
            vram[cell * 2] = ch;
            if let Some(attr) = attribute {
                vram[cell * 2 + 1] = attr;
            }
        }
    }

    /// Teletype output: control characters move the cursor, everything else
    /// is written with the default attribute and advances it, scrolling the
    /// page when the cursor leaves the last row.
    pub fn teletype(&mut self, vram: &mut [u8], ch: u8) {
        match ch {
            b'\r' => self.col = 0,
            b'\n' => self.line_feed(vram),
            0x08 => self.col = self.col.saturating_sub(1),
            0x07 => {}
            _ => {
                self.put_char(vram, ch, Some(DEFAULT_ATTRIBUTE), 1);
                self.advance(vram);
            }
        }
    }

    /// Move the cursor one cell right, wrapping to the next line
    pub fn advance(&mut self, vram: &mut [u8]) {
        self.col += 1;
        if self.col as usize >= TEXT_COLUMNS {
            self.col = 0;
            self.line_feed(vram);
        }
    }

    fn line_feed(&mut self, vram: &mut [u8]) {
        if (self.row as usize) < TEXT_ROWS - 1 {
            self.row += 1;
        } else {
            scroll_up(vram, 1, (0, 0), LAST_CELL, DEFAULT_ATTRIBUTE);
        }
    }
}

impl Default for TextScreen {
    fn default() -> Self {
        Self::new()
    }
}

/// Scroll the window `top_left..=bottom_right` (row, col) up by `lines`,
/// filling vacated rows with blanks in `attribute`. Zero lines, or more
/// lines than the window holds, blanks the whole window.
pub fn scroll_up(
    vram: &mut [u8],
    lines: u8,
    top_left: (u8, u8),
    bottom_right: (u8, u8),
    attribute: u8,
) {
    let top = top_left.0 as usize;
    let left = top_left.1 as usize;
    let bottom = (bottom_right.0 as usize).min(TEXT_ROWS - 1);
    let right = (bottom_right.1 as usize).min(TEXT_COLUMNS - 1);
    if top > bottom || left > right {
        return;
    }

    let height = bottom - top + 1;
    let lines = match lines as usize {
        0 => height,
        n => n.min(height),
    };
    let span = (right - left + 1) * 2;

    for row in top..=bottom {
        let dst = (row * TEXT_COLUMNS + left) * 2;
        if row + lines <= bottom {
            let src = ((row + lines) * TEXT_COLUMNS + left) * 2;
            vram.copy_within(src..src + span, dst);
        } else {
            for cell in vram[dst..dst + span].chunks_exact_mut(2) {
                cell[0] = b' ';
                cell[1] = attribute;
            }
        }
    }
}

/// Scroll the window down by `lines`; the mirror image of [`scroll_up`]
pub fn scroll_down(
    vram: &mut [u8],
    lines: u8,
    top_left: (u8, u8),
    bottom_right: (u8, u8),
    attribute: u8,
) {
    let top = top_left.0 as usize;
    let left = top_left.1 as usize;
    let bottom = (bottom_right.0 as usize).min(TEXT_ROWS - 1);
    let right = (bottom_right.1 as usize).min(TEXT_COLUMNS - 1);
    if top > bottom || left > right {
        return;
    }

    let height = bottom - top + 1;
    let lines = match lines as usize {
        0 => height,
        n => n.min(height),
    };
    let span = (right - left + 1) * 2;

    for row in (top..=bottom).rev() {
        let dst = (row * TEXT_COLUMNS + left) * 2;
        if row >= top + lines {
            let src = ((row - lines) * TEXT_COLUMNS + left) * 2;
            vram.copy_within(src..src + span, dst);
        } else {
            for cell in vram[dst..dst + span].chunks_exact_mut(2) {
                cell[0] = b' ';
                cell[1] = attribute;
            }
        }
    }
}

/// Characters of the page, one line per row with trailing blanks removed
pub fn page_text(vram: &[u8]) -> String {
    let mut lines: Vec<String> = vram
        .chunks(TEXT_COLUMNS * 2)
        .take(TEXT_ROWS)
        .map(|row| {
            let line: String = row
                .chunks_exact(2)
                .map(|cell| match cell[0] {
                    0x20..=0x7E => cell[0] as char,
                    _ => ' ',
                })
                .collect();
            line.trim_end().to_string()
        })
        .collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
