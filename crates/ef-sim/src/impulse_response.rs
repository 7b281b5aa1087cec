//! Time-domain impulse responses

use ef_core::{SerializedReader, SerializedWriter};
use crate::{SimError, SimResult};

const IR_MAJOR: u32 = 1;
const IR_MINOR: u32 = 0;

/// Multichannel impulse response at a sampling rate
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    sampling_rate: u32,
    data: Vec<Vec<f32>>,
}

impl ImpulseResponse {
    pub fn new(num_channels: usize, num_samples: usize, sampling_rate: u32) -> Self {
        Self {
            sampling_rate,
            data: vec![vec![0.0; num_samples]; num_channels],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.data.len()
    }

    pub fn num_samples(&self) -> usize {
        self.data.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    pub fn duration(&self) -> f32 {
        self.num_samples() as f32 / self.sampling_rate as f32
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.data[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index]
    }

    /// Channel rows as borrowed slices, the shape the FIR partitioner
    /// consumes.
    pub fn channels(&self) -> Vec<&[f32]> {
        self.data.iter().map(|c| c.as_slice()).collect()
    }

    pub fn reset(&mut self) {
        for channel in &mut self.data {
            channel.fill(0.0);
        }
    }

    /// `self += other * scalar` over the overlapping extent
    pub fn scale_accumulate(&mut self, other: &ImpulseResponse, scalar: f32) {
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            for (a, b) in dst.iter_mut().zip(src) {
                *a += b * scalar;
            }
        }
    }

    pub fn save(&self, writer: &mut SerializedWriter) {
        writer.write_u32(self.sampling_rate);
        writer.write_u64(self.data.len() as u64);
        for channel in &self.data {
            writer.write_f32_slice(channel);
        }
    }

    pub fn load(reader: &mut SerializedReader) -> SimResult<Self> {
        let sampling_rate = reader.read_u32()?;
        let num_channels = reader.read_u64()? as usize;
        let mut data = Vec::with_capacity(num_channels);
        for _ in 0..num_channels {
            data.push(reader.read_f32_vec()?);
        }
        let lengths_match = data.windows(2).all(|w| w[0].len() == w[1].len());
        if !lengths_match {
            return Err(SimError::MalformedBakedData(
                "impulse response channels have uneven lengths".into(),
            ));
        }
        Ok(Self {
            sampling_rate,
            data,
        })
    }

    /// Standalone enveloped serialization.
    pub fn save_bytes(&self) -> Vec<u8> {
        let mut writer = SerializedWriter::new();
        self.save(&mut writer);
        writer.finish(IR_MAJOR, IR_MINOR)
    }

    pub fn load_bytes(bytes: &[u8]) -> SimResult<Self> {
        let mut reader = SerializedReader::open(bytes, IR_MAJOR)?;
        Self::load(&mut reader)
    }
}
