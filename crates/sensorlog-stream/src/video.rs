//! Raw `bgr24` video frames through external decoder and encoder processes
//!
//! [`VideoReader`] starts a decoder (ffmpeg by default) that writes raw frames
//! to its stdout and reads them back one frame at a time. [`VideoWriter`]
//! feeds raw frames to an encoder's stdin. [`query_geometry`] asks ffprobe
//! for the width, height and frame rate of a file.
//!
//! Frames are passed through unchanged: no rescaling or pixel conversion
//! happens on this side of the pipe.

use serde::{Deserialize, Serialize};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, warn};

use crate::config::VideoConfig;
use crate::error::StreamError;
use crate::pipe::{PipeSource, reap};
use crate::Result;

/// Bytes per `bgr24` pixel
pub const BYTES_PER_PIXEL: usize = 3;

const RAW_VIDEO_FORMAT: [&str; 6] = ["-f", "rawvideo", "-vcodec", "rawvideo", "-pix_fmt", "bgr24"];

/// Frame dimensions and rate of a video
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoGeometry {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second, `0.0` when unknown
    pub fps: f64,
}

impl VideoGeometry {
    /// Create a geometry
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self { width, height, fps }
    }

    /// Bytes of one `bgr24` frame, `None` for an empty or unaddressable frame
    pub fn frame_size(&self) -> Option<usize> {
        let width = usize::try_from(self.width).ok()?;
        let height = usize::try_from(self.height).ok()?;
        let size = width.checked_mul(height)?.checked_mul(BYTES_PER_PIXEL)?;
        (size > 0).then_some(size)
    }

    fn video_size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    fn checked_frame_size(&self) -> Result<usize> {
        self.frame_size().ok_or_else(|| {
            StreamError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unusable video size {}", self.video_size()),
            ))
        })
    }
}

/// Extract the geometry of the first video stream from `key=value` lines.
///
/// Reads the first `width=`, `height=` and `r_frame_rate=<num>/<den>` entries.
/// Returns `None` unless both dimensions are present; a missing or
/// malformed rate leaves `fps` at `0.0`.
pub fn parse_stream_info(output: &str) -> Option<VideoGeometry> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;

    for line in output.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("width=") {
            width = width.or_else(|| value.parse::<u32>().ok());
        } else if let Some(value) = line.strip_prefix("height=") {
            height = height.or_else(|| value.parse::<u32>().ok());
        } else if let Some(value) = line.strip_prefix("r_frame_rate=") {
            fps = fps.or_else(|| parse_rate(value));
        }
        if width.is_some() && height.is_some() && fps.is_some() {
            break;
        }
    }

    Some(VideoGeometry::new(width?, height?, fps.unwrap_or(0.0)))
}

fn parse_rate(text: &str) -> Option<f64> {
    let (num, den) = text.split_once('/')?;
    let num: u32 = num.trim().parse().ok()?;
    let den: u32 = den.trim().parse().ok()?;
    (den != 0).then(|| f64::from(num) / f64::from(den))
}

/// Ask the stream-info program for the geometry of `path`.
///
/// # Errors
///
/// - [`StreamError::Spawn`] if the stream-info program cannot be started
/// - [`StreamError::ProcessFailed`] if it exits unsuccessfully
/// - [`StreamError::Geometry`] if its output names no width or height
pub fn query_geometry(path: impl AsRef<Path>, config: &VideoConfig) -> Result<VideoGeometry> {
    let path = path.as_ref();
    let output = info_command(path, config)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|source| StreamError::Spawn {
            program: config.info_program.clone(),
            archive: path.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(StreamError::process_failed(&config.info_program, output.status));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let geometry = parse_stream_info(&text).ok_or_else(|| StreamError::Geometry {
        path: path.to_path_buf(),
        reason: "no width and height reported".to_string(),
    })?;
    debug!(path = ?path, width = geometry.width, height = geometry.height, fps = geometry.fps, "Video geometry");
    Ok(geometry)
}

fn verbosity_args(config: &VideoConfig, with_stats: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(4);
    if !config.show_banner {
        args.push("-hide_banner".to_string());
    }
    if with_stats && !config.show_stats {
        args.push("-nostats".to_string());
    }
    args.push("-loglevel".to_string());
    args.push(config.log_level.to_string());
    args
}

fn info_command(path: &Path, config: &VideoConfig) -> Command {
    let mut command = Command::new(&config.info_program);
    command
        .args(&config.info_args)
        .args(verbosity_args(config, false))
        .args(["-show_entries", "stream=width,height,r_frame_rate"])
        .arg(path);
    command
}

fn decode_command(path: &Path, geometry: &VideoGeometry, config: &VideoConfig) -> Command {
    let mut command = Command::new(&config.program);
    command
        .args(&config.program_args)
        .args(verbosity_args(config, true))
        .args(&config.decoding_args)
        .arg("-i")
        .arg(path)
        .args(RAW_VIDEO_FORMAT)
        .arg("-an")
        .arg("-video_size")
        .arg(geometry.video_size())
        .arg("-");
    command
}

fn encode_command(path: &Path, geometry: &VideoGeometry, config: &VideoConfig) -> Command {
    let mut command = Command::new(&config.program);
    command
        .args(&config.program_args)
        .args(verbosity_args(config, true))
        .args(RAW_VIDEO_FORMAT)
        .arg("-video_size")
        .arg(geometry.video_size())
        .arg("-r")
        .arg(format!("{:.3}", geometry.fps))
        .args(["-i", "-"])
        .args(&config.encoding_args)
        .arg("-an")
        .arg(path);
    command
}

/// Raw frames decoded from a video file, front to back.
///
/// The frame buffer is allocated once for the geometry's frame size and
/// reused by every [`read_frame`](Self::read_frame).
pub struct VideoReader {
    source: PipeSource,
    path: PathBuf,
    geometry: VideoGeometry,
    frame: Vec<u8>,
    frames_read: u64,
}

impl VideoReader {
    /// Start decoding `path` into frames of the given geometry.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Io`] for an empty geometry and
    /// [`StreamError::Spawn`] if the decoder cannot be started.
    pub fn open(path: impl AsRef<Path>, geometry: VideoGeometry, config: &VideoConfig) -> Result<Self> {
        let path = path.as_ref();
        let frame_size = geometry.checked_frame_size()?;
        let command = decode_command(path, &geometry, config);
        let source = PipeSource::from_command(command, &config.program, path).map_err(|source| {
            StreamError::Spawn {
                program: config.program.clone(),
                archive: path.to_path_buf(),
                source,
            }
        })?;

        debug!(path = ?path, size = %geometry.video_size(), frame_size, "Video decoder opened");
        Ok(Self {
            source,
            path: path.to_path_buf(),
            geometry,
            frame: vec![0; frame_size],
            frames_read: 0,
        })
    }

    /// Look up the geometry of `path` with the stream-info program, then start decoding.
    ///
    /// # Errors
    ///
    /// Any error of [`query_geometry`] or [`open`](Self::open).
    pub fn open_detected(path: impl AsRef<Path>, config: &VideoConfig) -> Result<Self> {
        let path = path.as_ref();
        let geometry = query_geometry(path, config)?;
        Self::open(path, geometry, config)
    }

    /// Read the next frame, `Ok(None)` once the decoder has no more frames.
    ///
    /// # Errors
    ///
    /// - [`StreamError::FrameSize`] if the video ends inside a frame
    /// - [`StreamError::ProcessFailed`] if the decoder exits unsuccessfully
    /// - [`StreamError::Io`] on pipe failures
    pub fn read_frame(&mut self) -> Result<Option<&[u8]>> {
        let mut filled = 0usize;
        while let Some(rest) = self.frame.get_mut(filled..) {
            if rest.is_empty() {
                break;
            }
            match self.source.read(rest) {
                Ok(0) => break,
                Ok(n) => filled = filled.saturating_add(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(StreamError::from_io(e)),
            }
        }

        if filled == 0 {
            debug!(path = ?self.path, frames = self.frames_read, "Video decoder finished");
            return Ok(None);
        }
        if filled < self.frame.len() {
            return Err(StreamError::FrameSize {
                expected: self.frame.len(),
                actual: filled,
            });
        }

        self.frames_read = self.frames_read.saturating_add(1);
        Ok(Some(self.frame.as_slice()))
    }

    /// Geometry frames are read with
    pub fn geometry(&self) -> &VideoGeometry {
        &self.geometry
    }

    /// Bytes per frame
    pub fn frame_size(&self) -> usize {
        self.frame.len()
    }

    /// Frames returned so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Source video path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the decoder and release the pipe
    pub fn close(self) {
        self.source.shutdown();
    }
}

impl std::fmt::Debug for VideoReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoReader")
            .field("path", &self.path)
            .field("geometry", &self.geometry)
            .field("frames_read", &self.frames_read)
            .finish_non_exhaustive()
    }
}

/// Raw frames encoded into a video file by an external encoder.
///
/// Call [`finish`](Self::finish) to close the encoder's input and learn
/// whether it succeeded. Dropping an unfinished writer closes the input and
/// reaps the encoder, logging any failure.
pub struct VideoWriter {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    program: String,
    path: PathBuf,
    geometry: VideoGeometry,
    frame_size: usize,
    frames_written: u64,
}

impl VideoWriter {
    /// Start an encoder writing `path` from frames of the given geometry.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Io`] for an empty geometry and
    /// [`StreamError::Spawn`] if the encoder cannot be started.
    pub fn create(path: impl AsRef<Path>, geometry: VideoGeometry, config: &VideoConfig) -> Result<Self> {
        let path = path.as_ref();
        let frame_size = geometry.checked_frame_size()?;
        let spawn_error = |source: io::Error| StreamError::Spawn {
            program: config.program.clone(),
            archive: path.to_path_buf(),
            source,
        };

        let mut child = encode_command(path, &geometry, config)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;

        let Some(stdin) = child.stdin.take() else {
            reap(&mut child);
            return Err(spawn_error(io::Error::other("child stdin unavailable")));
        };

        debug!(path = ?path, size = %geometry.video_size(), fps = geometry.fps, pid = child.id(), "Video encoder started");
        Ok(Self {
            child,
            stdin: Some(BufWriter::with_capacity(frame_size, stdin)),
            program: config.program.clone(),
            path: path.to_path_buf(),
            geometry,
            frame_size,
            frames_written: 0,
        })
    }

    /// Send one frame to the encoder.
    ///
    /// # Errors
    ///
    /// - [`StreamError::FrameSize`] if `frame` is not exactly one frame long
    /// - [`StreamError::Io`] if the encoder stopped reading
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() != self.frame_size {
            return Err(StreamError::FrameSize {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }
        let stdin = self.stdin.as_mut().ok_or(StreamError::NotOpen)?;
        stdin.write_all(frame)?;
        self.frames_written = self.frames_written.saturating_add(1);
        Ok(())
    }

    /// Close the encoder's input and wait for it, returning the frame count.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ProcessFailed`] if the encoder exits
    /// unsuccessfully and [`StreamError::Io`] if the last frames cannot be
    /// flushed.
    pub fn finish(mut self) -> Result<u64> {
        self.close_and_wait()?;
        Ok(self.frames_written)
    }

    /// Geometry frames are written with
    pub fn geometry(&self) -> &VideoGeometry {
        &self.geometry
    }

    /// Frames accepted so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Destination video path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn close_and_wait(&mut self) -> Result<()> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };
        let flushed = stdin.flush();
        drop(stdin);

        let status = self.child.wait()?;
        if !status.success() {
            warn!(program = %self.program, path = ?self.path, %status, "Video encoder failed");
            return Err(StreamError::process_failed(&self.program, status));
        }
        flushed?;
        debug!(path = ?self.path, frames = self.frames_written, "Video encoder finished");
        Ok(())
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close_and_wait() {
            warn!(path = ?self.path, error = %e, "Video encoder did not finish cleanly");
        }
    }
}

impl std::fmt::Debug for VideoWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoWriter")
            .field("program", &self.program)
            .field("path", &self.path)
            .field("geometry", &self.geometry)
            .field("frames_written", &self.frames_written)
            .finish_non_exhaustive()
    }
}
