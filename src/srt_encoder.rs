use std::io::Write;

use crate::cue_encoder::CueEncoder;
use crate::error::{Error, Result};
use crate::merge::Cue;

/// A `CueEncoder` that writes cues in SubRip (SRT) format.
///
/// Design:
/// - We stream output directly to a `Write` implementation.
/// - Cue numbering is 1-based and assigned in write order, which matches the
///   merger's global ordering.
pub struct SrtEncoder<W: Write> {
    /// The underlying writer we stream SRT into.
    w: W,

    /// The number assigned to the next cue.
    next_number: u64,

    /// Whether the encoder has been closed.
    closed: bool,
}

impl<W: Write> SrtEncoder<W> {
    /// Create a new SRT encoder that writes to the provided writer.
    pub fn new(w: W) -> Self {
        Self {
            w,
            next_number: 1,
            closed: false,
        }
    }
}

impl<W: Write> CueEncoder for SrtEncoder<W> {
    /// Write a single numbered SRT cue block.
    fn write_cue(&mut self, cue: &Cue) -> Result<()> {
        if self.closed {
            return Err(Error::msg("cannot write cue: encoder is already closed"));
        }

        // SRT timestamps use `HH:MM:SS,mmm` (comma separator).
        let start = format_timestamp_srt(cue.start_ms);
        let end = format_timestamp_srt(cue.end_ms);

        writeln!(&mut self.w, "{}", self.next_number)?;
        writeln!(&mut self.w, "{start} --> {end}")?;
        writeln!(&mut self.w, "{}", cue.text)?;

        // Blank line separates cue blocks.
        writeln!(&mut self.w)?;

        self.next_number += 1;
        Ok(())
    }

    /// Flush the underlying writer. This is idempotent.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.w.flush()?;
        self.closed = true;

        Ok(())
    }
}

/// Format milliseconds into an SRT timestamp (`HH:MM:SS,mmm`).
fn format_timestamp_srt(total_ms: u64) -> String {
    let ms = total_ms % 1_000;
    let total_s = total_ms / 1_000;

    let s = total_s % 60;
    let total_m = total_s / 60;

    let m = total_m % 60;
    let h = total_m / 60;

    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}
