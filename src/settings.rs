use encoding::all::WINDOWS_1252;
use encoding::EncodingRef;

use crate::chunk::CHUNK_SIZE;

/// Knobs for a decode run.
///
/// ```
/// use evtx_decode::ParseSettings;
///
/// let settings = ParseSettings::new()
///     .max_events(1000)
///     .validate_checksums(true);
/// ```
#[derive(Clone)]
pub struct ParseSettings {
    /// Stop after this many records. Zero means no limit.
    max_events: usize,
    /// Decode only the system metadata of each record, skipping event data,
    /// user data, XML and message synthesis.
    metadata_only: bool,
    /// Capacity of the buffered reader wrapping the input file.
    read_buffer_size: usize,
    /// Verify chunk CRCs. A failed header CRC skips the chunk; a failed
    /// data CRC is reported but the chunk is still scanned, since records
    /// carry their own magic.
    validate_checksums: bool,
    /// Emit a progress report every time this many further events have been
    /// parsed. Zero reports after every chunk.
    progress_interval: usize,
    ansi_codec: EncodingRef,
}

impl Default for ParseSettings {
    fn default() -> Self {
        ParseSettings {
            max_events: 0,
            metadata_only: false,
            read_buffer_size: CHUNK_SIZE,
            validate_checksums: false,
            progress_interval: 1000,
            ansi_codec: WINDOWS_1252,
        }
    }
}

impl std::fmt::Debug for ParseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseSettings")
            .field("max_events", &self.max_events)
            .field("metadata_only", &self.metadata_only)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("validate_checksums", &self.validate_checksums)
            .field("progress_interval", &self.progress_interval)
            .field("ansi_codec", &self.ansi_codec.name())
            .finish()
    }
}

impl PartialEq for ParseSettings {
    fn eq(&self, other: &Self) -> bool {
        self.max_events == other.max_events
            && self.metadata_only == other.metadata_only
            && self.read_buffer_size == other.read_buffer_size
            && self.validate_checksums == other.validate_checksums
            && self.progress_interval == other.progress_interval
            && self.ansi_codec.name() == other.ansi_codec.name()
    }
}

impl ParseSettings {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn metadata_only(mut self, metadata_only: bool) -> Self {
        self.metadata_only = metadata_only;
        self
    }

    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }

    pub fn validate_checksums(mut self, validate_checksums: bool) -> Self {
        self.validate_checksums = validate_checksums;
        self
    }

    pub fn progress_interval(mut self, progress_interval: usize) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    /// Codec used for ANSI string values. Defaults to windows-1252.
    pub fn ansi_codec(mut self, ansi_codec: EncodingRef) -> Self {
        self.ansi_codec = ansi_codec;
        self
    }

    pub fn event_limit(&self) -> Option<usize> {
        if self.max_events == 0 {
            None
        } else {
            Some(self.max_events)
        }
    }

    pub fn is_metadata_only(&self) -> bool {
        self.metadata_only
    }

    pub fn io_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn should_validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    pub fn progress_event_interval(&self) -> usize {
        self.progress_interval
    }

    pub fn get_ansi_codec(&self) -> EncodingRef {
        self.ansi_codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_chains_and_defaults_hold() {
        let settings = ParseSettings::new()
            .max_events(50)
            .metadata_only(true)
            .validate_checksums(true);

        assert_eq!(settings.event_limit(), Some(50));
        assert!(settings.is_metadata_only());
        assert!(settings.should_validate_checksums());
        assert_eq!(settings.io_buffer_size(), CHUNK_SIZE);
        assert_eq!(settings.progress_event_interval(), 1000);
        assert_eq!(settings.get_ansi_codec().name(), "windows-1252");
    }

    #[test]
    fn zero_max_events_means_unlimited() {
        assert_eq!(ParseSettings::new().event_limit(), None);
        assert_eq!(ParseSettings::new().max_events(1).event_limit(), Some(1));
    }
}
