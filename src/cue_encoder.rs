use crate::error::Result;
use crate::merge::Cue;

/// Streaming serializer for merged cues.
///
/// Encoders receive cues in final (global) order and write them as they
/// arrive; `close` flushes any trailing output. Callers own the encoder
/// lifecycle; an encoder never closes itself.
pub trait CueEncoder {
    fn write_cue(&mut self, cue: &Cue) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}
