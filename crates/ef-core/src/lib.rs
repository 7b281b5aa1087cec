//! ef-core: Shared types, math and infrastructure for EchoForge
//!
//! Foundational pieces used by every engine crate:
//! - 3-D math (vectors, transforms, coordinate frames)
//! - Multichannel `AudioBuffer` with ambisonics conversion
//! - Frequency-band partitioning
//! - Speaker layouts
//! - Serialized-payload envelope (magic/version/CRC)
//! - Lock-free triple buffering
//! - Fixed-worker thread pool and job graphs
//! - Process-wide engine settings

mod bands;
mod buffer;
mod error;
mod math;
mod serialized;
mod settings;
mod speaker;
mod thread_pool;
mod triple_buffer;

pub use bands::*;
pub use buffer::*;
pub use error::*;
pub use math::*;
pub use serialized::*;
pub use settings::*;
pub use speaker::*;
pub use thread_pool::*;
pub use triple_buffer::*;

/// Audio sample type used throughout the engine
pub type Sample = f32;

/// Speed of sound in air, m/s
pub const SPEED_OF_SOUND: f32 = 343.0;

/// Sample rate and block length an audio pipeline is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioSettings {
    sampling_rate: u32,
    frame_size: usize,
}

impl AudioSettings {
    /// Validate and construct. Rates must be positive; frame sizes must be
    /// positive and even (overlap-save transforms require it).
    pub fn new(sampling_rate: u32, frame_size: usize) -> CoreResult<Self> {
        if sampling_rate == 0 {
            return Err(CoreError::InvalidAudioSettings(
                "sampling rate must be positive".into(),
            ));
        }
        if frame_size == 0 || frame_size % 2 != 0 {
            return Err(CoreError::InvalidAudioSettings(format!(
                "frame size must be positive and even, got {frame_size}"
            )));
        }
        Ok(Self {
            sampling_rate,
            frame_size,
        })
    }

    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Duration of one block, seconds
    pub fn frame_duration(&self) -> f32 {
        self.frame_size as f32 / self.sampling_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_settings_validation() {
        assert!(AudioSettings::new(48000, 1024).is_ok());
        assert!(AudioSettings::new(0, 1024).is_err());
        assert!(AudioSettings::new(48000, 0).is_err());
        assert!(AudioSettings::new(48000, 1023).is_err());
    }

    #[test]
    fn test_frame_duration() {
        let settings = AudioSettings::new(48000, 480).unwrap();
        assert!((settings.frame_duration() - 0.01).abs() < 1e-6);
    }
}
