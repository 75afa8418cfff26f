use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeakerError {
    #[cfg(feature = "cpal")]
    #[error("no output device available")]
    NoDevice,
    #[cfg(feature = "cpal")]
    #[error("building output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[cfg(feature = "cpal")]
    #[error("starting output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// Commanded output frequency. Written by the control listener, read inside
/// the audio callback, which runs on the driver's thread and must not lock.
#[derive(Clone)]
pub struct FrequencyControl(Arc<AtomicU32>);

impl FrequencyControl {
    pub fn new(hz: f32) -> FrequencyControl {
        FrequencyControl(Arc::new(AtomicU32::new(hz.to_bits())))
    }

    pub fn set(&self, hz: f32) {
        self.0.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Sine generator whose phase counter persists across callbacks. Resetting
/// the counter per callback produces audible discontinuities whenever the
/// frequency changes.
pub struct SineGenerator {
    phase: u64,
    sample_rate: f64,
    amplitude: f64,
    frequency: FrequencyControl,
}

impl SineGenerator {
    pub fn new(sample_rate: u32, amplitude: f64, frequency: FrequencyControl) -> SineGenerator {
        SineGenerator {
            phase: 0,
            sample_rate: sample_rate as f64,
            amplitude,
            frequency,
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let hz = self.frequency.get() as f64;
        let t = self.phase as f64 / self.sample_rate;
        self.phase += 1;
        (self.amplitude * (TAU * hz * t).sin()) as f32
    }

    /// Fills an interleaved output buffer, duplicating the mono tone across
    /// channels.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels) {
            let sample = self.next_sample();
            frame.fill(sample);
        }
    }

    pub fn phase(&self) -> u64 {
        self.phase
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpeakerOpt {
    pub sample_rate: u32,
    pub block_size: u32,
    pub channels: u16,
    pub amplitude: f64,
}

/// The output tone device. Starts silent (frequency zero) until the
/// controller commands otherwise. The control handle is shared so the
/// listener thread can steer a stream owned elsewhere.
pub struct Speaker {
    control: FrequencyControl,
    opt: SpeakerOpt,
    #[cfg(feature = "cpal")]
    stream: Option<cpal::Stream>,
}

impl Speaker {
    pub fn new(opt: SpeakerOpt, control: FrequencyControl) -> Speaker {
        Speaker {
            control,
            opt,
            #[cfg(feature = "cpal")]
            stream: None,
        }
    }

    /// Shared handle for the control listener thread.
    pub fn control(&self) -> FrequencyControl {
        self.control.clone()
    }

    pub fn set_frequency(&self, hz: f32) {
        self.control.set(hz);
    }

    #[cfg(feature = "cpal")]
    pub fn start(&mut self) -> Result<(), SpeakerError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(SpeakerError::NoDevice)?;

        let config = cpal::StreamConfig {
            channels: self.opt.channels,
            sample_rate: cpal::SampleRate(self.opt.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.opt.block_size),
        };

        let channels = self.opt.channels as usize;
        let mut generator = SineGenerator::new(
            self.opt.sample_rate,
            self.opt.amplitude,
            self.control.clone(),
        );

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                generator.fill(data, channels);
            },
            |err| log::error!("speaker stream error: {err}"),
            None,
        )?;
        stream.play()?;
        self.stream = Some(stream);
        log::info!("speaker output started at {} Hz sample rate", self.opt.sample_rate);
        Ok(())
    }

    #[cfg(feature = "cpal")]
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            log::info!("speaker stopped");
        }
    }

    #[cfg(not(feature = "cpal"))]
    pub fn start(&mut self) -> Result<(), SpeakerError> {
        log::info!(
            "speaker output compiled out (enable the `cpal` feature); sine generator idle at {} Hz sample rate",
            self.opt.sample_rate
        );
        Ok(())
    }

    #[cfg(not(feature = "cpal"))]
    pub fn stop(&mut self) {
        log::info!("speaker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_persists_across_fills() {
        let control = FrequencyControl::new(440.0);
        let mut generator = SineGenerator::new(48_000, 0.5, control);

        let mut block = [0f32; 64];
        generator.fill(&mut block, 1);
        assert_eq!(generator.phase(), 64);
        generator.fill(&mut block, 1);
        assert_eq!(generator.phase(), 128);
    }

    #[test]
    fn test_frequency_change_does_not_reset_phase() {
        let control = FrequencyControl::new(440.0);
        let mut generator = SineGenerator::new(48_000, 0.5, control.clone());

        let mut block = [0f32; 32];
        generator.fill(&mut block, 1);
        control.set(750.0);
        generator.fill(&mut block, 1);
        assert_eq!(generator.phase(), 64);
    }

    #[test]
    fn test_zero_frequency_is_silence() {
        let control = FrequencyControl::new(0.0);
        let mut generator = SineGenerator::new(48_000, 0.5, control);
        let mut block = [1f32; 16];
        generator.fill(&mut block, 1);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_fill_duplicates_across_channels() {
        let control = FrequencyControl::new(100.0);
        let mut generator = SineGenerator::new(8_000, 1.0, control);
        let mut block = [0f32; 8];
        generator.fill(&mut block, 2);
        for frame in block.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_amplitude_bounds_output() {
        let control = FrequencyControl::new(997.0);
        let mut generator = SineGenerator::new(48_000, 0.25, control);
        let mut block = [0f32; 4096];
        generator.fill(&mut block, 1);
        assert!(block.iter().all(|s| s.abs() <= 0.25 + f32::EPSILON));
        assert!(block.iter().any(|s| s.abs() > 0.2));
    }
}
