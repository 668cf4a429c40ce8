//! Stream configuration: compressed sibling naming, decompressor, seek chunking
//! and the external video programs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StreamError;

/// Default archive extension for compressed siblings (`<path>.7z`)
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "7z";

/// Default chunk size used to discard bytes on forward pipe seeks (1 MiB)
pub const DEFAULT_SEEK_CHUNK_SIZE: usize = 1024 * 1024;

/// Default program decoding and encoding raw video
pub const DEFAULT_VIDEO_PROGRAM: &str = "ffmpeg";

/// Default program reporting video geometry
pub const DEFAULT_INFO_PROGRAM: &str = "ffprobe";

/// Default log level of the video programs (errors only)
pub const DEFAULT_VIDEO_LOG_LEVEL: u16 = 16;

static PREFER_COMPRESSED: AtomicBool = AtomicBool::new(false);

/// Set the process-wide preference for opening compressed siblings first.
///
/// Streams whose [`StreamConfig::prefer_compressed`] is `None` follow this flag.
pub fn set_prefer_compressed(prefer: bool) {
    PREFER_COMPRESSED.store(prefer, Ordering::Relaxed);
}

/// Current process-wide compressed-first preference
pub fn prefer_compressed() -> bool {
    PREFER_COMPRESSED.load(Ordering::Relaxed)
}

/// How a compressed sibling is turned into a byte stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decompressor {
    /// External program writing the decompressed bytes to stdout.
    ///
    /// The canonical archive path is appended as the last argument.
    Command {
        /// Program to execute
        program: String,
        /// Arguments placed before the archive path
        #[serde(default)]
        args: Vec<String>,
    },
    /// In-process gzip decoding of the archive file
    Gzip,
}

impl Decompressor {
    /// External command decompressor
    pub fn command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Command {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Human-readable name used in logs and errors
    pub fn name(&self) -> &str {
        match self {
            Self::Command { program, .. } => program,
            Self::Gzip => "gzip",
        }
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::command("7z", ["e", "-so"])
    }
}

/// Byte stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Extension appended to a logical path to find its compressed sibling
    pub archive_extension: String,
    /// Decompressor used for compressed siblings
    pub decompressor: Decompressor,
    /// Try the compressed sibling before the plain file.
    ///
    /// `None` follows the process-wide flag set by [`set_prefer_compressed`].
    pub prefer_compressed: Option<bool>,
    /// Size of the per-stream scratch buffer used by forward pipe seeks
    pub seek_chunk_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            decompressor: Decompressor::default(),
            prefer_compressed: None,
            seek_chunk_size: DEFAULT_SEEK_CHUNK_SIZE,
        }
    }
}

impl StreamConfig {
    /// Configuration for gzip siblings decoded in-process (`<path>.gz`)
    pub fn gzip() -> Self {
        Self {
            archive_extension: "gz".to_string(),
            decompressor: Decompressor::Gzip,
            ..Default::default()
        }
    }

    /// Replace the archive extension
    pub fn with_archive_extension(mut self, extension: impl Into<String>) -> Self {
        self.archive_extension = extension.into();
        self
    }

    /// Replace the decompressor
    pub fn with_decompressor(mut self, decompressor: Decompressor) -> Self {
        self.decompressor = decompressor;
        self
    }

    /// Override the process-wide compressed-first preference for this stream
    pub fn with_prefer_compressed(mut self, prefer: bool) -> Self {
        self.prefer_compressed = Some(prefer);
        self
    }

    /// Whether the compressed sibling should be tried first
    pub fn compressed_first(&self) -> bool {
        self.prefer_compressed.unwrap_or_else(prefer_compressed)
    }

    /// Path of the compressed sibling for a logical path
    pub fn archive_path(&self, path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(&self.archive_extension);
        PathBuf::from(name)
    }

    /// Scratch chunk size, never zero
    pub fn effective_chunk_size(&self) -> usize {
        self.seek_chunk_size.max(1)
    }

    /// Parse a configuration from JSON text
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the text is not a valid configuration.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Io`] when the file cannot be read, or an I/O error
    /// of kind `InvalidData` wrapping the JSON error.
    pub fn from_json_file(path: &Path) -> Result<Self, StreamError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| StreamError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }
}

/// External programs used for raw video I/O
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Decoder and encoder program
    pub program: String,
    /// Arguments placed before everything else on the program's command line
    pub program_args: Vec<String>,
    /// Program reporting `width=`, `height=` and `r_frame_rate=` lines
    pub info_program: String,
    /// Arguments placed before everything else on the stream-info command line
    pub info_args: Vec<String>,
    /// Value passed with `-loglevel`
    pub log_level: u16,
    /// Keep the program banner
    pub show_banner: bool,
    /// Keep progress statistics
    pub show_stats: bool,
    /// Extra decoder arguments, placed before `-i <path>`
    pub decoding_args: Vec<String>,
    /// Extra encoder arguments (codec, bitrate), placed after `-i -`
    pub encoding_args: Vec<String>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_VIDEO_PROGRAM.to_string(),
            program_args: Vec::new(),
            info_program: DEFAULT_INFO_PROGRAM.to_string(),
            info_args: Vec::new(),
            log_level: DEFAULT_VIDEO_LOG_LEVEL,
            show_banner: false,
            show_stats: false,
            decoding_args: Vec::new(),
            encoding_args: Vec::new(),
        }
    }
}

impl VideoConfig {
    /// Replace the decoder/encoder program and its leading arguments
    pub fn with_program<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.program_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the stream-info program and its leading arguments
    pub fn with_info_program<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.info_program = program.into();
        self.info_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a configuration from JSON text
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the text is not a valid configuration.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
