//! Strongly-typed loader for `settings.yaml`. The file is shared verbatim
//! between the client and the ingestor so both ends derive identical record
//! sizes and port ranges from it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),
    #[error("reading {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("parsing {0}: {1}")]
    Parse(PathBuf, serde_yaml::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ingestor: IngestorConfig,
    pub jetson: JetsonConfig,
    pub bmi: BmiConfig,
    pub buffer: BufferConfig,
    pub audio: AudioConfig,
    pub speaker: SpeakerConfig,
    pub sensor: SensorConfig,
    pub camera: CameraConfig,
    pub data_paths: DataPathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestorConfig {
    pub ip: String,
    pub gateway_port: u16,
    pub data_port_range_start: u16,
    pub data_port_range_end: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JetsonConfig {
    pub ip: String,
    pub ingest_comm_port: u16,
    pub bmi_comm_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BmiConfig {
    pub ip: String,
    pub listen_port: u16,
    pub comm_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Seconds of headroom each ring holds.
    pub buffer_length: u32,
    /// Frames per second for the paced producers.
    pub framerate: u32,
}

impl BufferConfig {
    pub fn ring_capacity(&self) -> usize {
        (self.buffer_length * self.framerate) as usize
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub channels: u32,
    pub format: AudioFormat,
    pub rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AudioFormat {
    #[serde(rename = "S16_LE")]
    S16Le,
    #[serde(rename = "U8")]
    U8,
    #[serde(rename = "S32_LE")]
    S32Le,
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::S16Le => write!(f, "S16_LE"),
            AudioFormat::U8 => write!(f, "U8"),
            AudioFormat::S32Le => write!(f, "S32_LE"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerConfig {
    pub block_size: u32,
    pub amplitude: f64,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    /// Both OTOS units report the same factory address; one sits behind an
    /// address-translation IC, hence two distinct entries here.
    pub i2c_addr: [u8; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub ident: [u8; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPathsConfig {
    pub sensor: PathBuf,
    pub camera: PathBuf,
    pub audio: PathBuf,
    pub logs: PathBuf,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Payload bytes in one audio record: one capture period of 16-bit
    /// samples. Both ends size their reads from this.
    pub fn chunk_bytes(&self) -> usize {
        2 * (self.audio.rate / self.buffer.framerate * self.audio.channels) as usize
    }
}
