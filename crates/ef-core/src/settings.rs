//! Process-wide engine settings
//!
//! Set these before any simulator or worker thread is constructed; they
//! are read lock-free from hot paths afterwards.

use portable_atomic::{AtomicBool, AtomicF32, Ordering};

static DC_CORRECTION_FOR_PHASE_INTERPOLATION: AtomicBool = AtomicBool::new(true);
static PATHS_FROM_ALL_SOURCE_PROBES: AtomicBool = AtomicBool::new(false);
static MAX_HRTF_NORMALIZATION_VOLUME_GAIN_DB: AtomicF32 = AtomicF32::new(12.0);

/// Accessors for the global engine toggles
pub struct EngineSettings;

impl EngineSettings {
    /// Force the DC bin real (and non-negative) after HRTF phase
    /// interpolation. Default `true`.
    pub fn dc_correction_for_phase_interpolation() -> bool {
        DC_CORRECTION_FOR_PHASE_INTERPOLATION.load(Ordering::Relaxed)
    }

    pub fn set_dc_correction_for_phase_interpolation(enabled: bool) {
        DC_CORRECTION_FOR_PHASE_INTERPOLATION.store(enabled, Ordering::Relaxed);
    }

    /// Aggregate runtime paths over every source-side probe rather than
    /// the nearest one only. Default `false`.
    pub fn paths_from_all_source_probes() -> bool {
        PATHS_FROM_ALL_SOURCE_PROBES.load(Ordering::Relaxed)
    }

    pub fn set_paths_from_all_source_probes(enabled: bool) {
        PATHS_FROM_ALL_SOURCE_PROBES.store(enabled, Ordering::Relaxed);
    }

    /// Hard cap on applied HRTF loudness-normalization gain, in dB.
    /// Default 12.0.
    pub fn max_hrtf_normalization_volume_gain_db() -> f32 {
        MAX_HRTF_NORMALIZATION_VOLUME_GAIN_DB.load(Ordering::Relaxed)
    }

    pub fn set_max_hrtf_normalization_volume_gain_db(gain_db: f32) {
        MAX_HRTF_NORMALIZATION_VOLUME_GAIN_DB.store(gain_db, Ordering::Relaxed);
    }
}
