//! Synthesis parameters and the values exchanged with a session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Audio output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Pcm,
    #[default]
    Mp3,
    Opus,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Pcm => "pcm",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wav" => Ok(AudioFormat::Wav),
            "pcm" => Ok(AudioFormat::Pcm),
            "mp3" => Ok(AudioFormat::Mp3),
            "opus" => Ok(AudioFormat::Opus),
            other => Err(Error::Validation(format!("unsupported audio format: {other}"))),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tradeoff between audio quality and time to first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyMode {
    /// Higher quality.
    Normal,
    /// Faster first audio.
    #[default]
    Balanced,
}

impl FromStr for LatencyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(LatencyMode::Normal),
            "balanced" => Ok(LatencyMode::Balanced),
            other => Err(Error::Validation(format!("unsupported latency mode: {other}"))),
        }
    }
}

/// Synthesis model, selected with the `model` header of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Model {
    Speech1_5,
    Speech1_6,
    #[default]
    S1,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Speech1_5 => "speech-1.5",
            Model::Speech1_6 => "speech-1.6",
            Model::S1 => "s1",
        }
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speech-1.5" => Ok(Model::Speech1_5),
            "speech-1.6" => Ok(Model::Speech1_6),
            "s1" => Ok(Model::S1),
            other => Err(Error::Validation(format!("unsupported model: {other}"))),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speech speed and volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prosody {
    /// Speed multiplier in `[0.5, 2.0]`.
    pub speed: f32,
    /// Volume adjustment in decibels, `[-20.0, 20.0]`.
    pub volume: f32,
}

impl Default for Prosody {
    fn default() -> Self {
        Self {
            speed: 1.0,
            volume: 0.0,
        }
    }
}

impl Prosody {
    /// Prosody with the given speed, keeping the volume of `base` if any.
    pub fn with_speed(speed: f32, base: Option<&Prosody>) -> Self {
        Self {
            speed,
            volume: base.map(|p| p.volume).unwrap_or(0.0),
        }
    }
}

/// Reference sample for instant voice cloning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAudio {
    /// Encoded audio file bytes.
    #[serde(with = "serde_bytes")]
    pub audio: Vec<u8>,
    /// Exact transcription of the sample, punctuation included.
    pub text: String,
}

/// Synthesis parameters for one streaming session.
///
/// Validated before the connection is opened and fixed for the session's
/// lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Voice model id.
    pub reference_id: Option<String>,
    /// Inline reference samples.
    pub references: Vec<ReferenceAudio>,
    pub format: AudioFormat,
    /// Output sample rate in Hz; `None` uses the format default.
    pub sample_rate: Option<u32>,
    /// One of 64, 128, 192.
    pub mp3_bitrate: u32,
    /// One of -1000, 24, 32, 48, 64.
    pub opus_bitrate: i32,
    /// Normalize input text before synthesis.
    pub normalize: bool,
    /// Characters per generation chunk, `[100, 300]`.
    pub chunk_length: u32,
    pub latency: LatencyMode,
    pub prosody: Option<Prosody>,
    /// Nucleus sampling, `[0.0, 1.0]`.
    pub top_p: f32,
    /// Sampling temperature, `[0.0, 1.0]`.
    pub temperature: f32,
    pub max_new_tokens: u32,
    pub repetition_penalty: f32,
    pub min_chunk_length: u32,
    pub condition_on_previous_chunks: bool,
    pub early_stop_threshold: f32,
    pub model: Model,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reference_id: None,
            references: Vec::new(),
            format: AudioFormat::default(),
            sample_rate: None,
            mp3_bitrate: 128,
            opus_bitrate: 32,
            normalize: true,
            chunk_length: 200,
            latency: LatencyMode::default(),
            prosody: None,
            top_p: 0.7,
            temperature: 0.7,
            max_new_tokens: 1024,
            repetition_penalty: 1.2,
            min_chunk_length: 50,
            condition_on_previous_chunks: true,
            early_stop_threshold: 1.0,
            model: Model::default(),
        }
    }
}

const MP3_BITRATES: [u32; 3] = [64, 128, 192];
const OPUS_BITRATES: [i32; 5] = [-1000, 24, 32, 48, 64];

impl SessionConfig {
    /// Configuration for a voice with default settings.
    pub fn for_voice(reference_id: impl Into<String>) -> Self {
        Self {
            reference_id: Some(reference_id.into()),
            ..Default::default()
        }
    }

    /// Sets the output audio format.
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the latency mode.
    pub fn with_latency(mut self, latency: LatencyMode) -> Self {
        self.latency = latency;
        self
    }

    /// Sets the synthesis model.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Overrides the speech speed, keeping any configured volume.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.prosody = Some(Prosody::with_speed(speed, self.prosody.as_ref()));
        self
    }

    /// Checks every field against the ranges the service accepts.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(id) = &self.reference_id {
            if id.trim().is_empty() {
                return invalid("reference_id must not be empty");
            }
        }
        if self.sample_rate == Some(0) {
            return invalid("sample_rate must be positive");
        }
        if !MP3_BITRATES.contains(&self.mp3_bitrate) {
            return invalid(format!("unsupported mp3_bitrate: {}", self.mp3_bitrate));
        }
        if !OPUS_BITRATES.contains(&self.opus_bitrate) {
            return invalid(format!("unsupported opus_bitrate: {}", self.opus_bitrate));
        }
        if !(100..=300).contains(&self.chunk_length) {
            return invalid(format!(
                "chunk_length must be within [100, 300], got {}",
                self.chunk_length
            ));
        }
        if let Some(prosody) = &self.prosody {
            check_range("prosody.speed", prosody.speed, 0.5, 2.0)?;
            check_range("prosody.volume", prosody.volume, -20.0, 20.0)?;
        }
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("temperature", self.temperature, 0.0, 1.0)?;
        if self.max_new_tokens == 0 {
            return invalid("max_new_tokens must be positive");
        }
        if !self.repetition_penalty.is_finite() || !self.early_stop_threshold.is_finite() {
            return invalid("repetition_penalty and early_stop_threshold must be finite");
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Result<(), Error> {
    Err(Error::Validation(message.into()))
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<(), Error> {
    // NaN fails the contains check as well.
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        invalid(format!("{name} must be within [{min}, {max}], got {value}"))
    }
}

/// One element of caller-supplied input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextInput {
    /// Text appended to the spoken content.
    Fragment(String),
    /// Asks the service to synthesize everything buffered so far.
    Flush,
}

impl From<&str> for TextInput {
    fn from(text: &str) -> Self {
        TextInput::Fragment(text.to_string())
    }
}

impl From<String> for TextInput {
    fn from(text: String) -> Self {
        TextInput::Fragment(text)
    }
}

/// A unit of synthesized audio, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Position in the stream, starting at 0.
    pub seq: u64,
    /// Encoded audio bytes in the session's output format.
    pub data: Vec<u8>,
}
