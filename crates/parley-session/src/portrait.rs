//! 32×32 player portraits sent as horizontal colour runs.
//!
//! A run is packed into one byte, colour in the high nibble and length in
//! the low one, so a run is at most 15 pixels long and never zero. Runs are
//! read row by row, left to right, and never cross the end of a row.

use crate::SessionError;

/// Width and height of a portrait in pixels.
pub const PORTRAIT_SIZE: usize = 32;

/// Longest run a packed byte can describe.
pub const MAX_RUN_LENGTH: u8 = 15;

/// Pixel value of a portrait that has not been received yet.
pub const BLANK_PIXEL: u8 = 0xff;

/// One horizontal run of a single colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortraitRun {
    /// 4-bit colour index.
    pub color: u8,
    pub length: u8,
}

impl PortraitRun {
    pub fn pack(self) -> u8 {
        ((self.color & 0x0f) << 4) | (self.length & 0x0f)
    }

    pub fn unpack(byte: u8) -> Self {
        Self {
            color: byte >> 4,
            length: byte & 0x0f,
        }
    }
}

/// Read or write position inside a portrait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunCursor {
    pub x: u8,
    pub y: u8,
}

impl RunCursor {
    /// True once every row has been visited.
    pub fn is_complete(self) -> bool {
        usize::from(self.y) >= PORTRAIT_SIZE
    }

    fn advance(&mut self, length: u8) {
        self.x += length;
        if usize::from(self.x) >= PORTRAIT_SIZE {
            self.x = 0;
            self.y += 1;
        }
    }
}

/// A 32×32 grid of colour indices, indexed `[y][x]`.
#[derive(Clone, PartialEq, Eq)]
pub struct Portrait {
    pixels: [[u8; PORTRAIT_SIZE]; PORTRAIT_SIZE],
}

impl std::fmt::Debug for Portrait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portrait").finish_non_exhaustive()
    }
}

impl Default for Portrait {
    fn default() -> Self {
        Self::blank()
    }
}

impl Portrait {
    pub fn blank() -> Self {
        Self {
            pixels: [[BLANK_PIXEL; PORTRAIT_SIZE]; PORTRAIT_SIZE],
        }
    }

    pub fn from_pixels(pixels: [[u8; PORTRAIT_SIZE]; PORTRAIT_SIZE]) -> Self {
        Self { pixels }
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[y][x]
    }

    pub fn rows(&self) -> &[[u8; PORTRAIT_SIZE]; PORTRAIT_SIZE] {
        &self.pixels
    }

    /// Reads the run starting at `cursor` and advances past it.
    ///
    /// The run ends at a colour change, at the end of the row, or after
    /// [`MAX_RUN_LENGTH`] pixels. Returns `None` once the portrait has been
    /// read completely.
    pub fn next_run(&self, cursor: &mut RunCursor) -> Option<PortraitRun> {
        if cursor.is_complete() {
            return None;
        }
        let row = &self.pixels[usize::from(cursor.y)];
        let start = usize::from(cursor.x);
        let color = row[start] & 0x0f;
        let length = row[start..]
            .iter()
            .take(usize::from(MAX_RUN_LENGTH))
            .take_while(|&&p| p & 0x0f == color)
            .count() as u8;

        cursor.advance(length);
        Some(PortraitRun { color, length })
    }

    /// Paints `run` at `cursor` and advances past it.
    ///
    /// # Errors
    /// - [`SessionError::EmptyPortraitRun`] for a zero-length run.
    /// - [`SessionError::PortraitComplete`] when every row is filled.
    /// - [`SessionError::PortraitOverflow`] when the run would cross the end
    ///   of the row. Nothing is painted and the cursor does not move.
    pub fn apply_run(&mut self, cursor: &mut RunCursor, run: PortraitRun) -> Result<(), SessionError> {
        if run.length == 0 {
            return Err(SessionError::EmptyPortraitRun);
        }
        if cursor.is_complete() {
            return Err(SessionError::PortraitComplete);
        }
        let start = usize::from(cursor.x);
        let end = start + usize::from(run.length);
        if end > PORTRAIT_SIZE {
            return Err(SessionError::PortraitOverflow {
                x: cursor.x,
                y: cursor.y,
                length: run.length,
            });
        }

        self.pixels[usize::from(cursor.y)][start..end].fill(run.color);
        cursor.advance(run.length);
        Ok(())
    }
}
