//! Register file of one simulated chip.

/// Number of addressable registers (single-byte register addresses).
pub const REGISTER_COUNT: usize = 256;

/// 256 registers of `width` bytes each, plus an auto-incrementing cursor.
///
/// A write phase's first byte selects the register; the remaining bytes are
/// stored from there on. A read phase returns bytes from the cursor on. With
/// `width = 2` (ADS1115-style 16-bit registers) a register is a `[hi, lo]`
/// word, so a 2-byte read of one register never spills into the next. The
/// cursor wraps from the last byte to the first.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    width: usize,
    bytes: Vec<u8>,
    cursor: usize,
}

impl RegisterFile {
    /// Byte-wide registers, all zero, pointer at 0.
    pub fn new() -> Self {
        Self::with_width(1)
    }

    /// Registers of `width` bytes (at least 1), all zero, pointer at 0.
    pub fn with_width(width: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            bytes: vec![0; REGISTER_COUNT * width],
            cursor: 0,
        }
    }

    /// Bytes per register.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Apply a write phase.
    pub fn write(&mut self, bytes: &[u8]) {
        let Some((&register, data)) = bytes.split_first() else {
            return;
        };
        self.cursor = self.offset(register);
        for &byte in data {
            self.bytes[self.cursor] = byte;
            self.advance();
        }
    }

    /// Apply a read phase.
    pub fn read_into(&mut self, buf: &mut [u8]) {
        for slot in buf.iter_mut() {
            *slot = self.bytes[self.cursor];
            self.advance();
        }
    }

    /// Set registers directly, without moving the pointer.
    pub fn poke(&mut self, register: u8, bytes: &[u8]) {
        let start = self.offset(register);
        for (i, &byte) in bytes.iter().enumerate() {
            let at = (start + i) % self.bytes.len();
            self.bytes[at] = byte;
        }
    }

    /// Inspect registers directly, without moving the pointer.
    pub fn peek(&self, register: u8, len: usize) -> Vec<u8> {
        let start = self.offset(register);
        (0..len)
            .map(|i| self.bytes[(start + i) % self.bytes.len()])
            .collect()
    }

    /// Register the cursor currently points into.
    pub fn pointer(&self) -> u8 {
        // cursor < REGISTER_COUNT * width, so the quotient fits in a byte
        u8::try_from(self.cursor / self.width).unwrap_or(u8::MAX)
    }

    fn offset(&self, register: u8) -> usize {
        usize::from(register) * self.width
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.bytes.len();
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
