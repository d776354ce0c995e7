//! Encoded audio to planar PCM.
//!
//! WAV goes straight through hound. Everything else is probed and decoded by
//! symphonia (MP3, FLAC, Ogg Vorbis, AAC/MP4, ...). Output keeps at most two
//! channels; wider sources keep their first pair.

use std::io::Cursor;

use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::wav::read_wav_planar;
use crate::{Error, Result};

/// Immutable planar PCM with one or two channels.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedBuffer {
    /// Build a buffer from planar channels.
    ///
    /// Returns [`Error::Empty`] when there are no channels or no frames, and
    /// [`Error::Decode`] for more than two channels or ragged lengths.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(Error::Empty);
        };
        if channels.len() > 2 {
            return Err(Error::Decode(format!("{} channels, expected 1 or 2", channels.len())));
        }
        if channels.iter().any(|c| c.len() != first.len()) {
            return Err(Error::Decode("channels differ in length".into()));
        }
        if first.is_empty() {
            return Err(Error::Empty);
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// A mono buffer.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        Self::new(sample_rate, vec![samples])
    }

    /// A stereo buffer.
    pub fn stereo(sample_rate: u32, left: Vec<f32>, right: Vec<f32>) -> Result<Self> {
        Self::new(sample_rate, vec![left, right])
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels (1 or 2).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Planar channel data.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// One channel's samples.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Whether the buffer carries two channels.
    pub fn is_stereo(&self) -> bool {
        self.channels.len() == 2
    }

    /// Average of all channels.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.as_slice() {
            [mono] => mono.clone(),
            [left, right] => left.iter().zip(right).map(|(l, r)| (l + r) * 0.5).collect(),
            _ => Vec::new(),
        }
    }
}

fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode encoded audio to planar PCM at its native rate.
///
/// `hint` is an optional file extension that helps the prober.
pub fn decode_bytes(bytes: &[u8], hint: Option<&str>) -> Result<DecodedBuffer> {
    if bytes.is_empty() {
        return Err(Error::Empty);
    }
    if is_wav(bytes) {
        // Fall through to symphonia for WAV variants hound rejects (e.g. A-law).
        match read_wav_planar(bytes) {
            Ok((planar, spec)) => return DecodedBuffer::new(spec.sample_rate, planar),
            Err(err) => tracing::debug!(error = %err, "hound rejected WAV, trying symphonia"),
        }
    }
    decode_with_symphonia(bytes.to_vec(), hint)
}

fn decode_with_symphonia(bytes: Vec<u8>, hint_ext: Option<&str>) -> Result<DecodedBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = hint_ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => Error::UnsupportedFormat(what.to_owned()),
            other => Error::UnsupportedFormat(other.to_string()),
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::UnsupportedFormat("no audio track".into()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    let mut sample_rate = params.sample_rate;
    let mut channel_count = params.channels.map(|c| c.count());
    let mut interleaved: Vec<f32> = Vec::new();
    let mut scratch: Option<(u64, SignalSpec, SampleBuffer<f32>)> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!(error = msg, "skipping undecodable packet");
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(Error::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channel_count.get_or_insert(spec.channels.count());

        let needed = decoded.capacity() as u64;
        let reuse = matches!(&scratch, Some((cap, s, _)) if *cap >= needed && *s == spec);
        if !reuse {
            scratch = Some((needed, spec, SampleBuffer::<f32>::new(needed, spec)));
        }
        if let Some((_, _, buf)) = scratch.as_mut() {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| Error::Decode("unknown sample rate".into()))?;
    let channels = channel_count.unwrap_or(1).max(1);
    let frames = interleaved.len() / channels;
    if frames == 0 {
        return Err(Error::Empty);
    }

    let kept = channels.min(2);
    let mut planar = vec![Vec::with_capacity(frames); kept];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, out) in planar.iter_mut().enumerate() {
            out.push(frame[ch]);
        }
    }

    tracing::debug!(sample_rate, channels, frames, "decoded with symphonia");
    DecodedBuffer::new(sample_rate, planar)
}
