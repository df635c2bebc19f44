use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as Scaler, Flags};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The container could not be opened or parsed.
    #[error("open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg::Error,
    },

    /// The container holds no stream a video decoder can be bound to.
    #[error("{}: no decodable video stream", .path.display())]
    StreamNotFound { path: PathBuf },

    /// Decoder or converter negotiation failed after the stream was chosen.
    #[error("{stage}: {source}")]
    Init {
        stage: &'static str,
        #[source]
        source: ffmpeg::Error,
    },

    /// The codec rejected data mid-stream or broke a sizing invariant.
    #[error("{0}")]
    CodecFailure(String),
}

/// Outcome of one decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Decoded,
    NoMoreFrames,
}

// ---------------------------------------------------------------------------
// Decode session
// ---------------------------------------------------------------------------

/// Pixel format the display surface consumes: BGRA bytes, which read as
/// little-endian 0x00RRGGBB words.
pub const OUTPUT_FORMAT: Pixel = Pixel::BGRA;

/// Packed bytes per pixel for the single-plane output formats this session
/// supports.
fn packed_bpp(format: Pixel) -> usize {
    match format {
        Pixel::RGB24 | Pixel::BGR24 => 3,
        _ => 4,
    }
}

/// One open media file: demuxer, decoder and color converter, plus the
/// packed output buffer the last decoded frame was written to.
///
/// All buffers are sized from the decoder-reported width/height at open time
/// and never resize mid-stream. Dropping the session releases the decoder,
/// demuxer, converter and buffers exactly once.
pub struct DecodeSession {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: Scaler,
    // Transient frames, overwritten on every decode attempt.
    decoded: ffmpeg::frame::Video,
    converted: ffmpeg::frame::Video,
    output: Vec<u8>,
    width: u32,
    height: u32,
    bpp: usize,
    flushed: bool,
}

// The ffmpeg handles (`Input`, `Video` decoder/frames, scaling `Context`) do
// not implement `Debug`, so the struct cannot derive it. A manual impl reports
// the plain sizing/state fields the tests' `unwrap_err()` needs without
// touching behavior.
impl std::fmt::Debug for DecodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeSession")
            .field("stream_index", &self.stream_index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bpp", &self.bpp)
            .field("flushed", &self.flushed)
            .finish_non_exhaustive()
    }
}

impl DecodeSession {
    /// Probe `path`, bind a decoder to its best video stream and set up the
    /// conversion to `output_format` (must be packed, single-plane).
    pub fn open(path: &Path, output_format: Pixel) -> Result<Self, DecodeError> {
        ffmpeg::init().map_err(|e| DecodeError::Init {
            stage: "library init",
            source: e,
        })?;

        let input = ffmpeg::format::input(&path).map_err(|e| DecodeError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        let (stream_index, decoder) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| DecodeError::StreamNotFound {
                    path: path.to_path_buf(),
                })?;
            let codec_ctx =
                ffmpeg::codec::context::Context::from_parameters(stream.parameters()).map_err(
                    |e| DecodeError::Init {
                        stage: "codec context",
                        source: e,
                    },
                )?;
            let decoder = codec_ctx.decoder().video().map_err(|e| DecodeError::Init {
                stage: "video decoder",
                source: e,
            })?;
            (stream.index(), decoder)
        };

        let width = decoder.width();
        let height = decoder.height();
        log::info!(
            "stream[{}]: codec={:?} pix_fmt={:?} {}x{}",
            stream_index,
            decoder.id(),
            decoder.format(),
            width,
            height
        );

        let scaler = Scaler::get(
            decoder.format(),
            width,
            height,
            output_format,
            width,
            height,
            Flags::LANCZOS,
        )
        .map_err(|e| DecodeError::Init {
            stage: "scaler",
            source: e,
        })?;

        let bpp = packed_bpp(output_format);
        let output = vec![0u8; width as usize * height as usize * bpp];

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            decoded: ffmpeg::frame::Video::empty(),
            converted: ffmpeg::frame::Video::empty(),
            output,
            width,
            height,
            bpp,
            flushed: false,
        })
    }

    /// Decode until one frame has been converted into the output buffer.
    ///
    /// Demux units belonging to other streams are discarded. Returns
    /// `NoMoreFrames` once the container and the decoder's flush queue are
    /// both exhausted; repeated calls keep returning `NoMoreFrames`.
    pub fn next_frame(&mut self) -> Result<FrameStatus, DecodeError> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                self.convert_current()?;
                return Ok(FrameStatus::Decoded);
            }
            if self.flushed {
                return Ok(FrameStatus::NoMoreFrames);
            }
            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| DecodeError::CodecFailure(format!("send_packet: {e}")))?;
                }
                None => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| DecodeError::CodecFailure(format!("send_eof: {e}")))?;
                    self.flushed = true;
                }
            }
        }
    }

    /// Run the converter over the pending frame and pack the result into the
    /// flat output buffer, dropping any stride padding.
    fn convert_current(&mut self) -> Result<(), DecodeError> {
        let (fw, fh) = (self.decoded.width(), self.decoded.height());
        // The converter and buffers were sized from the open-time dimensions.
        if fw != self.width || fh != self.height {
            return Err(DecodeError::CodecFailure(format!(
                "frame size {}x{} does not match stream {}x{}",
                fw, fh, self.width, self.height
            )));
        }

        self.scaler
            .run(&self.decoded, &mut self.converted)
            .map_err(|e| DecodeError::CodecFailure(format!("scale: {e}")))?;

        let row = self.width as usize * self.bpp;
        let stride = self.converted.stride(0);
        let data = self.converted.data(0);
        for y in 0..self.height as usize {
            let src = y * stride;
            let dst = y * row;
            self.output[dst..dst + row].copy_from_slice(&data[src..src + row]);
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed pixels of the last decoded frame.
    pub fn frame_bytes(&self) -> &[u8] {
        &self.output
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Write a small binary PPM; a format the decode library demuxes as a
    /// single-frame video stream.
    fn write_ppm(dir: &Path, w: u32, h: u32) -> PathBuf {
        let mut bytes = format!("P6\n{} {}\n255\n", w, h).into_bytes();
        for i in 0..(w * h) {
            bytes.extend_from_slice(&[(i % 256) as u8, 40, 200]);
        }
        let path = dir.join("frame.ppm");
        fs::write(&path, bytes).unwrap();
        path
    }

    /// Write a minimal PCM WAV: a parsable container with no video stream.
    fn write_wav(dir: &Path) -> PathBuf {
        let mut b: Vec<u8> = Vec::new();
        b.extend_from_slice(b"RIFF");
        b.extend_from_slice(&36u32.to_le_bytes());
        b.extend_from_slice(b"WAVE");
        b.extend_from_slice(b"fmt ");
        b.extend_from_slice(&16u32.to_le_bytes());
        b.extend_from_slice(&1u16.to_le_bytes()); // PCM
        b.extend_from_slice(&1u16.to_le_bytes()); // mono
        b.extend_from_slice(&8000u32.to_le_bytes());
        b.extend_from_slice(&16000u32.to_le_bytes());
        b.extend_from_slice(&2u16.to_le_bytes());
        b.extend_from_slice(&16u16.to_le_bytes());
        b.extend_from_slice(b"data");
        b.extend_from_slice(&0u32.to_le_bytes());
        let path = dir.join("tone.wav");
        fs::write(&path, b).unwrap();
        path
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = DecodeSession::open(Path::new("/no/such/file.mkv"), OUTPUT_FORMAT).unwrap_err();
        assert!(matches!(err, DecodeError::Open { .. }), "got {err:?}");
    }

    #[test]
    fn container_without_video_is_stream_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path());
        let err = DecodeSession::open(&path, OUTPUT_FORMAT).unwrap_err();
        assert!(matches!(err, DecodeError::StreamNotFound { .. }), "got {err:?}");
    }

    #[test]
    fn first_frame_fills_the_sized_output_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ppm(dir.path(), 4, 2);
        let mut session = DecodeSession::open(&path, OUTPUT_FORMAT).unwrap();
        assert_eq!((session.width(), session.height()), (4, 2));

        assert_eq!(session.next_frame().unwrap(), FrameStatus::Decoded);
        assert_eq!(session.frame_bytes().len(), 4 * 2 * 4);
        // First source pixel is rgb(0, 40, 200); packed output is BGRA.
        assert_eq!(&session.frame_bytes()[..4], &[200, 40, 0, 255][..]);
    }

    #[test]
    fn exhausted_stream_stays_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ppm(dir.path(), 4, 2);
        let mut session = DecodeSession::open(&path, OUTPUT_FORMAT).unwrap();
        assert_eq!(session.next_frame().unwrap(), FrameStatus::Decoded);
        assert_eq!(session.next_frame().unwrap(), FrameStatus::NoMoreFrames);
        assert_eq!(session.next_frame().unwrap(), FrameStatus::NoMoreFrames);
    }
}
