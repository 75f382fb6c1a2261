//! Reassembly of newline-delimited text from raw serial chunks.
//!
//! # Why a buffer is needed
//!
//! A serial read returns whatever bytes happen to be in the driver's buffer
//! when the read timeout fires.  There is no guarantee that a single read
//! returns exactly one line:
//!
//! - It may return half a line (`"12.3"` now, `"4 g\n"` on the next read).
//! - It may return several lines at once (`"1.0 g\n2.0 g\n"`).
//!
//! [`LineAssembler`] keeps the unterminated tail of the stream between calls
//! and hands out complete lines only, so chunk boundaries never lose or
//! duplicate data.
//!
//! # Decoding
//!
//! Scales speak plain ASCII.  Any byte outside the ASCII range (line noise,
//! a wrong baud rate) is replaced with U+FFFD instead of being rejected, so a
//! burst of garbage can never halt the relay.

/// Replacement for bytes that are not valid ASCII.
const REPLACEMENT: char = '\u{FFFD}';

/// Accumulates raw serial bytes and yields complete, trimmed text lines.
///
/// # Invariant
///
/// Between calls the internal buffer holds only the characters received after
/// the last `\n`, i.e. a partial line that has not been terminated yet.
///
/// # Examples
///
/// ```rust
/// use scale_core::LineAssembler;
///
/// let mut assembler = LineAssembler::new();
/// assert_eq!(assembler.feed(b"12.3").count(), 0);
/// let lines: Vec<String> = assembler.feed(b"4 g\n").collect();
/// assert_eq!(lines, vec!["12.34 g".to_string()]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct LineAssembler {
    buffer: String,
}

impl LineAssembler {
    /// Creates an assembler with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the buffer and returns an iterator over the complete
    /// lines now available.
    ///
    /// Each line has surrounding whitespace (including the `\r` of a `\r\n`
    /// terminator) removed; lines that are empty after trimming are skipped.
    ///
    /// The iterator is lazy.  Lines it does not get to (because it was dropped
    /// early) stay buffered and are yielded by the next call to `feed`.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.buffer.extend(chunk.iter().map(|&byte| decode_ascii(byte)));
        Lines {
            buffer: &mut self.buffer,
        }
    }

    /// Returns the buffered partial line (text received after the last `\n`).
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Iterator over the complete lines extracted by [`LineAssembler::feed`].
#[derive(Debug)]
pub struct Lines<'a> {
    buffer: &'a mut String,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some(newline) = self.buffer.find('\n') {
            // `\n` is a single byte, so `..=newline` always ends on a char boundary.
            let raw: String = self.buffer.drain(..=newline).collect();
            let line = raw.trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }
}

fn decode_ascii(byte: u8) -> char {
    if byte.is_ascii() {
        char::from(byte)
    } else {
        REPLACEMENT
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
