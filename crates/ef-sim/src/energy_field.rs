//! Directional energy fields
//!
//! A three-way array `[channels x bands x time bins]` of non-negative
//! energy, accumulated by the reflection simulator. Channels are SH
//! coefficients of the incoming energy direction.

use ef_core::NUM_BANDS;
use ef_spatial::sh;

/// Width of one time bin, seconds
pub const ENERGY_BIN_DURATION: f32 = 0.01;

/// SH-directional, banded, time-binned energy accumulator
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyField {
    num_channels: usize,
    num_bins: usize,
    /// Flattened `[channel][band][bin]`
    data: Vec<f32>,
}

impl EnergyField {
    /// Allocate for a `(duration, order)` pair.
    pub fn new(duration: f32, order: usize) -> Self {
        let num_channels = sh::num_coeffs(order);
        let num_bins = (duration / ENERGY_BIN_DURATION).ceil().max(1.0) as usize;
        Self {
            num_channels,
            num_bins,
            data: vec![0.0; num_channels * NUM_BANDS * num_bins],
        }
    }

    /// Zeroed field with the same shape as another.
    pub fn like(other: &EnergyField) -> Self {
        Self {
            num_channels: other.num_channels,
            num_bins: other.num_bins,
            data: vec![0.0; other.data.len()],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Duration covered by the field, seconds
    pub fn duration(&self) -> f32 {
        self.num_bins as f32 * ENERGY_BIN_DURATION
    }

    #[inline]
    fn index(&self, channel: usize, band: usize, bin: usize) -> usize {
        (channel * NUM_BANDS + band) * self.num_bins + bin
    }

    #[inline]
    pub fn get(&self, channel: usize, band: usize, bin: usize) -> f32 {
        self.data[self.index(channel, band, bin)]
    }

    #[inline]
    pub fn add_energy(&mut self, channel: usize, band: usize, bin: usize, energy: f32) {
        let index = self.index(channel, band, bin);
        self.data[index] += energy;
    }

    /// One channel-band row of bins
    pub fn bins(&self, channel: usize, band: usize) -> &[f32] {
        let start = (channel * NUM_BANDS + band) * self.num_bins;
        &self.data[start..start + self.num_bins]
    }

    pub fn reset(&mut self) {
        self.data.fill(0.0);
    }

    /// `self += other`
    pub fn add(&mut self, other: &EnergyField) {
        debug_assert_eq!(self.data.len(), other.data.len());
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// `self *= scalar`
    pub fn scale(&mut self, scalar: f32) {
        for value in &mut self.data {
            *value *= scalar;
        }
    }

    /// `self += other * scalar`
    pub fn scale_accumulate(&mut self, other: &EnergyField, scalar: f32) {
        debug_assert_eq!(self.data.len(), other.data.len());
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b * scalar;
        }
    }

    pub fn copy_from(&mut self, other: &EnergyField) {
        debug_assert_eq!(self.data.len(), other.data.len());
        self.data.copy_from_slice(&other.data);
    }

    pub fn swap(&mut self, other: &mut EnergyField) {
        std::mem::swap(&mut self.data, &mut other.data);
        std::mem::swap(&mut self.num_channels, &mut other.num_channels);
        std::mem::swap(&mut self.num_bins, &mut other.num_bins);
    }

    /// Total energy across everything (diagnostics)
    pub fn total_energy(&self) -> f32 {
        self.data.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_shape() {
        let field = EnergyField::new(1.0, 2);
        assert_eq!(field.num_channels(), 9);
        assert_eq!(field.num_bins(), 100);
    }

    #[test]
    fn test_arithmetic_roundtrip() {
        // copy, add to itself, scale by half: back to the original.
        let mut field = EnergyField::new(0.5, 1);
        field.add_energy(0, 0, 3, 1.5);
        field.add_energy(2, 1, 7, 0.25);

        let original = field.clone();
        let mut copy = EnergyField::new(0.5, 1);
        copy.copy_from(&field);
        field.add(&copy);
        field.scale(0.5);

        for channel in 0..field.num_channels() {
            for band in 0..NUM_BANDS {
                for bin in 0..field.num_bins() {
                    let a = field.get(channel, band, bin);
                    let b = original.get(channel, band, bin);
                    assert!((a - b).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_scale_accumulate() {
        let mut a = EnergyField::new(0.2, 0);
        let mut b = EnergyField::new(0.2, 0);
        b.add_energy(0, 0, 0, 2.0);
        a.scale_accumulate(&b, 0.25);
        assert!((a.get(0, 0, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_swap() {
        let mut a = EnergyField::new(0.2, 0);
        let mut b = EnergyField::new(0.2, 0);
        a.add_energy(0, 0, 1, 1.0);
        a.swap(&mut b);
        assert_eq!(a.get(0, 0, 1), 0.0);
        assert_eq!(b.get(0, 0, 1), 1.0);
    }
}
