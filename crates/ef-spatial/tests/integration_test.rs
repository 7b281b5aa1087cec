//! End-to-end rendering scenarios across the spatial effects.

use ef_core::{AudioBuffer, AudioSettings, SpeakerLayout, Vector3};
use ef_spatial::{
    AmbisonicsEncodeEffect, AmbisonicsEncodeEffectParams, AmbisonicsEncodeEffectSettings,
    AmbisonicsPanningEffect, AmbisonicsPanningEffectParams, AmbisonicsPanningEffectSettings,
    BinauralEffect, BinauralEffectParams, BinauralEffectSettings, HrtfDatabase, HrtfInterpolation,
    HrtfSettings, PanningEffect, PanningEffectParams, PanningEffectSettings, PhaseInterpolation,
};
use std::sync::Arc;

fn rms(x: &[f32]) -> f32 {
    (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
}

fn sine_block(freq: f32, rate: u32, frame: usize, offset: usize) -> AudioBuffer {
    let mut buffer = AudioBuffer::new(1, frame);
    for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
        *s = (2.0 * std::f32::consts::PI * freq * (offset + i) as f32 / rate as f32).sin();
    }
    buffer
}

/// A 1 kHz tone straight ahead renders with matched left/right levels.
#[test]
fn binaural_null_direction_is_balanced() {
    let audio = AudioSettings::new(48000, 1024).unwrap();
    let hrtf = Arc::new(HrtfDatabase::default_database(audio, &HrtfSettings::default()));
    let mut effect = BinauralEffect::new(BinauralEffectSettings { audio, hrtf });
    let params = BinauralEffectParams {
        direction: Vector3::new(0.0, 0.0, -1.0),
        interpolation: HrtfInterpolation::Nearest,
        phase: PhaseInterpolation::Full,
        spatial_blend: 1.0,
    };

    let mut output = AudioBuffer::new(2, 1024);
    let mut left = 0.0f32;
    let mut right = 0.0f32;
    for block in 0..16 {
        let input = sine_block(1000.0, 48000, 1024, block * 1024);
        effect.apply(&params, &input, &mut output);
        if block >= 2 {
            left += rms(output.channel(0));
            right += rms(output.channel(1));
        }
    }
    let imbalance_db = 20.0 * (left / right).log10();
    assert!(imbalance_db.abs() < 0.3, "imbalance {imbalance_db} dB");
}

/// A source hard right leaves the left stereo channel essentially silent.
#[test]
fn panning_hard_right_silences_left() {
    let mut effect = PanningEffect::new(PanningEffectSettings {
        layout: SpeakerLayout::stereo(),
    });
    let mut input = AudioBuffer::new(1, 512);
    input.channel_mut(0).fill(1.0);
    let mut output = AudioBuffer::new(2, 512);
    effect.apply(
        &PanningEffectParams {
            direction: Vector3::new(1.0, 0.0, 0.0),
        },
        &input,
        &mut output,
    );

    let peak = |x: &[f32]| x.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    let left_db = 20.0 * (peak(output.channel(0)).max(1e-9)).log10();
    let right_db = 20.0 * peak(output.channel(1)).log10();
    assert!(left_db < -40.0, "left at {left_db} dB");
    assert!(right_db > -0.5, "right at {right_db} dB");
}

/// Mono encoded at (1,0,0) to order 3 then decoded to stereo puts the
/// energy on the right by at least 3 dB.
#[test]
fn ambisonics_roundtrip_lateralizes() {
    let mut encode = AmbisonicsEncodeEffect::new(AmbisonicsEncodeEffectSettings { max_order: 3 });
    let mut decode = AmbisonicsPanningEffect::new(AmbisonicsPanningEffectSettings {
        layout: SpeakerLayout::stereo(),
        max_order: 3,
    });

    let mut input = AudioBuffer::new(1, 512);
    input.channel_mut(0).fill(1.0);
    let mut field = AudioBuffer::new(16, 512);
    let mut speakers = AudioBuffer::new(2, 512);
    for _ in 0..3 {
        encode.apply(
            &AmbisonicsEncodeEffectParams {
                direction: Vector3::new(1.0, 0.0, 0.0),
                order: 3,
            },
            &input,
            &mut field,
        );
        decode.apply(&AmbisonicsPanningEffectParams { order: 3 }, &field, &mut speakers);
    }

    let energy = |x: &[f32]| x.iter().map(|v| v * v).sum::<f32>();
    let left = energy(speakers.channel(0));
    let right = energy(speakers.channel(1));
    let separation_db = 10.0 * (right / left.max(1e-12)).log10();
    assert!(separation_db >= 3.0, "separation {separation_db} dB");
}
