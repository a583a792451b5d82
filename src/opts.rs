use crate::output_type::OutputType;

/// Options that control how a subtitle run is performed.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI is responsible for mapping user input into this type so that:
/// - the library remains reusable outside of a CLI context
/// - other frontends (APIs, tests, batch jobs) can construct options programmatically
///
/// The struct is immutable once built and is threaded explicitly through each
/// pipeline stage; no component reads ambient/global configuration.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Optional language hint (e.g. `"en"`, `"ja"`).
    ///
    /// When `None`, the transcription engine auto-detects the spoken language.
    pub language: Option<String>,

    /// Symmetric padding added to each detected speech interval, in milliseconds.
    ///
    /// Padding avoids clipping speech onsets/offsets at slice boundaries.
    pub pad_ms: u64,

    /// Gaps between adjacent speech intervals shorter than this are merged,
    /// in milliseconds. Prevents sparse dialogue from producing many tiny slices.
    pub silence_merge_ms: u64,

    /// Number of transcription workers.
    ///
    /// 1 (the default) dispatches slices sequentially. Values above 1 require an
    /// engine per worker; see [`crate::pipeline::PreparedRun::transcribe_pool`].
    pub workers: usize,

    /// Ignore the cached slice plan and re-run speech detection.
    pub force_redetect: bool,

    /// The desired subtitle output format.
    pub output_type: OutputType,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            language: None,
            pad_ms: 300,
            silence_merge_ms: 2_000,
            workers: 1,
            force_redetect: false,
            output_type: OutputType::Srt,
        }
    }
}
