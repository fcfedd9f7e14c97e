// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fringe detection statistics for baseline spectra
//!
//! A cross-power spectrum of `num_channels + 1` samples holds the
//! non-negative half of a Hermitian spectrum. Inverting it gives the lag
//! function of `2 * num_channels` samples, whose peak is the fringe. The
//! noise floor is measured everywhere except a guard band around the peak.

use std::{fmt::Debug, sync::Arc};

use log::trace;
use rustfft::{
    num_complex::{Complex, Complex64},
    Fft, FftPlanner,
};
use thiserror::Error;

use crate::constants::{DEFAULT_FRINGE_GUARD, NOISE_FLOOR};

/// Errors from the fringe statistics engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FringeError {
    /// The spectrum has no lags to search.
    #[error("Invalid spectrum: {len} samples, at least two are needed")]
    InvalidSpectrum {
        /// Number of samples given
        len: usize,
    },
    /// The spectrum doesn't have the length the engine was planned for.
    #[error("Spectrum has {got} samples, but the engine was planned for {expected}")]
    SpectrumLength {
        /// `num_channels + 1` for the planned engine
        expected: usize,
        /// Number of samples given
        got: usize,
    },
}

/// How to express a fringe offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetConvention {
    /// Lags of the `2 * num_channels` point lag function, as computed.
    Oversampled,
    /// Half the oversampled offset, rounded half away from zero.
    Nyquist,
}

impl Default for OffsetConvention {
    fn default() -> Self {
        OffsetConvention::Oversampled
    }
}

/// The detection statistics of one cross-correlation spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FringeStats {
    /// Height of the lag function peak
    pub amplitude: f64,
    /// Peak height above the mean noise, in units of the noise deviation
    pub snr: f64,
    /// Peak position relative to zero lag, in oversampled lags
    pub offset_samples: i64,
}

impl FringeStats {
    /// The fringe offset in the given convention.
    pub fn offset(&self, convention: OffsetConvention) -> i64 {
        match convention {
            OffsetConvention::Oversampled => self.offset_samples,
            OffsetConvention::Nyquist => (self.offset_samples as f64 / 2.0).round() as i64,
        }
    }
}

/// The average of an auto-correlation spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoAmplitude {
    /// Trapezoid-weighted mean of the real part
    pub real: f64,
    /// Mean of the imaginary part
    pub imag: f64,
}

/// The noise estimate outside the guard band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NoiseFloor {
    pub mean: f64,
    pub sum_sq_dev: f64,
    pub count: usize,
}

/// Mean and summed squared deviation of `lags` outside the `guard` samples
/// either side of `peak`. The band wraps around both ends of the array.
pub(crate) fn noise_floor(lags: &[f64], peak: usize, guard: usize) -> NoiseFloor {
    let n = lags.len();
    let upper = n.saturating_sub(guard);
    let outside = |&(idx, _): &(usize, &f64)| {
        let rel = (idx + n - peak) % n;
        rel >= guard && rel < upper
    };

    let (sum, count) = lags
        .iter()
        .enumerate()
        .filter(outside)
        .fold((0.0, 0usize), |(sum, count), (_, &v)| (sum + v, count + 1));
    let mean = sum / count.max(1) as f64;
    let sum_sq_dev = lags
        .iter()
        .enumerate()
        .filter(outside)
        .map(|(_, &v)| (v - mean).powi(2))
        .sum();
    NoiseFloor {
        mean,
        sum_sq_dev,
        count,
    }
}

/// Computes [`FringeStats`] for spectra of one fixed length.
///
/// The inverse transform is planned once, so a single engine should be reused
/// for every baseline of a run.
#[derive(Clone)]
pub struct FringeEngine {
    num_channels: usize,
    guard_fraction: f64,
    ifft: Arc<dyn Fft<f64>>,
}

impl Debug for FringeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FringeEngine")
            .field("num_channels", &self.num_channels)
            .field("guard_fraction", &self.guard_fraction)
            .finish()
    }
}

impl FringeEngine {
    /// Plan an engine for spectra of `num_channels + 1` samples.
    ///
    /// # Errors
    ///
    /// [`FringeError::InvalidSpectrum`] if `num_channels` is zero.
    pub fn new(num_channels: usize, guard_fraction: f64) -> Result<Self, FringeError> {
        if num_channels == 0 {
            return Err(FringeError::InvalidSpectrum { len: 1 });
        }
        let ifft = FftPlanner::new().plan_fft_inverse(2 * num_channels);
        Ok(Self {
            num_channels,
            guard_fraction,
            ifft,
        })
    }

    /// Number of lags in the lag function.
    pub fn num_lags(&self) -> usize {
        2 * self.num_channels
    }

    /// Width of the guard band either side of the peak, in lags.
    pub fn guard(&self) -> usize {
        ((self.num_lags() as f64 * self.guard_fraction).round() as usize).max(1)
    }

    /// The magnitude of the lag function, shifted so zero lag sits at the
    /// centre index `num_lags / 2`.
    ///
    /// The DC sample is taken as purely real, and so is the last sample,
    /// which sits at the Nyquist lag.
    ///
    /// # Errors
    ///
    /// [`FringeError::SpectrumLength`] if `spectrum` isn't `num_channels + 1` long.
    pub fn lag_function(&self, spectrum: &[Complex<f32>]) -> Result<Vec<f64>, FringeError> {
        let nchan = self.num_channels;
        if spectrum.len() != nchan + 1 {
            return Err(FringeError::SpectrumLength {
                expected: nchan + 1,
                got: spectrum.len(),
            });
        }
        let n = self.num_lags();

        // Hermitian extension of the half spectrum.
        let mut buf = vec![Complex64::new(0.0, 0.0); n];
        buf[0] = Complex64::new(spectrum[0].re as f64, 0.0);
        for k in 1..nchan {
            let sample = Complex64::new(spectrum[k].re as f64, spectrum[k].im as f64);
            buf[k] = sample;
            buf[n - k] = sample.conj();
        }
        buf[nchan] = Complex64::new(spectrum[nchan].re as f64, 0.0);

        self.ifft.process(&mut buf);

        let scale = 1.0 / n as f64;
        Ok((0..n)
            .map(|idx| (buf[(idx + n / 2) % n].re * scale).abs())
            .collect())
    }

    /// Fringe amplitude, SNR and offset of one cross-correlation spectrum.
    ///
    /// NaNs are not checked for here.
    ///
    /// # Errors
    ///
    /// [`FringeError::SpectrumLength`] if `spectrum` isn't `num_channels + 1` long.
    pub fn fringe_stats(&self, spectrum: &[Complex<f32>]) -> Result<FringeStats, FringeError> {
        let lags = self.lag_function(spectrum)?;
        let n = lags.len();

        // first maximum wins
        let (peak, amplitude) = lags
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(best_idx, best), (idx, &v)| {
                if v > best {
                    (idx, v)
                } else {
                    (best_idx, best)
                }
            });

        let guard = self.guard();
        let floor = noise_floor(&lags, peak, guard);
        let snr = ((amplitude - floor.mean).powi(2) * floor.count as f64
            / floor.sum_sq_dev.max(NOISE_FLOOR))
        .max(0.0)
        .sqrt();
        let offset_samples = peak as i64 - (n / 2) as i64;
        trace!(
            "fringe peak {} at lag {} (guard {}, {} noise lags, noise mean {})",
            amplitude,
            offset_samples,
            guard,
            floor.count,
            floor.mean
        );

        Ok(FringeStats {
            amplitude,
            snr,
            offset_samples,
        })
    }
}

/// Fringe statistics of a single spectrum with the default guard band.
///
/// Plans a fresh transform each call; prefer a [`FringeEngine`] for many spectra.
///
/// # Errors
///
/// [`FringeError::InvalidSpectrum`] for a spectrum of fewer than two samples.
pub fn fringe_stats(spectrum: &[Complex<f32>]) -> Result<FringeStats, FringeError> {
    if spectrum.len() < 2 {
        return Err(FringeError::InvalidSpectrum {
            len: spectrum.len(),
        });
    }
    FringeEngine::new(spectrum.len() - 1, DEFAULT_FRINGE_GUARD)?.fringe_stats(spectrum)
}

/// Average an auto-correlation spectrum without transforming it.
///
/// The real part is a trapezoid over the channels, so the first and last
/// samples count half. The imaginary part is a plain mean.
///
/// # Errors
///
/// [`FringeError::InvalidSpectrum`] for a spectrum of fewer than two samples.
pub fn auto_amplitude(spectrum: &[Complex<f32>]) -> Result<AutoAmplitude, FringeError> {
    let len = spectrum.len();
    if len < 2 {
        return Err(FringeError::InvalidSpectrum { len });
    }
    let nchan = len - 1;
    let inner: f64 = spectrum[1..nchan].iter().map(|c| c.re as f64).sum();
    let edges = (spectrum[0].re as f64 + spectrum[nchan].re as f64) / 2.0;
    let imag: f64 = spectrum.iter().map(|c| c.im as f64).sum();
    Ok(AutoAmplitude {
        real: (inner + edges) / nchan as f64,
        imag: imag / len as f64,
    })
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;

    /// A noiseless fringe of `amplitude` at `delay` lags.
    fn synthetic_fringe(num_channels: usize, amplitude: f64, delay: i64) -> Vec<Complex<f32>> {
        let n = (2 * num_channels) as f64;
        (0..=num_channels)
            .map(|k| {
                let phase = -2.0 * PI * k as f64 * delay as f64 / n;
                Complex::new(
                    (amplitude * phase.cos()) as f32,
                    (amplitude * phase.sin()) as f32,
                )
            })
            .collect()
    }

    #[test]
    fn test_dc_spectrum_is_delta_at_zero_lag() {
        let spectrum = vec![Complex::new(1.0f32, 0.0); 5];
        let engine = FringeEngine::new(4, DEFAULT_FRINGE_GUARD).unwrap();
        let lags = engine.lag_function(&spectrum).unwrap();
        assert_eq!(lags.len(), 8);
        assert_abs_diff_eq!(lags[4], 1.0, epsilon = 1e-12);
        for (idx, &v) in lags.iter().enumerate() {
            if idx != 4 {
                assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
            }
        }

        let stats = engine.fringe_stats(&spectrum).unwrap();
        assert_abs_diff_eq!(stats.amplitude, 1.0, epsilon = 1e-12);
        assert_eq!(stats.offset_samples, 0);
        // guard of one lag either side leaves six noise lags at the floor
        assert_relative_eq!(stats.snr, (6.0f64 / NOISE_FLOOR).sqrt(), max_relative = 1e-6);
    }

    #[test]
    fn test_recovers_injected_delay() {
        for &(delay, amplitude) in &[(3i64, 2.5f64), (-5, 0.75), (0, 10.0), (15, 1.0)] {
            let spectrum = synthetic_fringe(16, amplitude, delay);
            let stats = fringe_stats(&spectrum).unwrap();
            assert_eq!(stats.offset_samples, delay, "delay {delay}");
            assert_relative_eq!(stats.amplitude, amplitude, max_relative = 1e-5);
            assert!(stats.snr > 1e4, "snr {} for delay {delay}", stats.snr);
        }
    }

    #[test]
    fn test_zero_spectrum() {
        let spectrum = vec![Complex::new(0.0f32, 0.0); 9];
        let stats = fringe_stats(&spectrum).unwrap();
        assert_eq!(stats.amplitude, 0.0);
        assert_eq!(stats.snr, 0.0);
    }

    #[test]
    fn test_imaginary_dc_is_ignored() {
        let mut spectrum = vec![Complex::new(1.0f32, 0.0); 5];
        let reference = fringe_stats(&spectrum).unwrap();
        spectrum[0].im = 123.0;
        spectrum[4].im = -7.0;
        assert_eq!(fringe_stats(&spectrum).unwrap(), reference);
    }

    #[test]
    fn test_degenerate_spectra() {
        assert_eq!(
            fringe_stats(&[]),
            Err(FringeError::InvalidSpectrum { len: 0 })
        );
        assert_eq!(
            fringe_stats(&[Complex::new(1.0, 0.0)]),
            Err(FringeError::InvalidSpectrum { len: 1 })
        );
        assert!(FringeEngine::new(0, DEFAULT_FRINGE_GUARD).is_err());

        let engine = FringeEngine::new(8, DEFAULT_FRINGE_GUARD).unwrap();
        assert_eq!(
            engine.fringe_stats(&[Complex::new(1.0, 0.0); 5]),
            Err(FringeError::SpectrumLength {
                expected: 9,
                got: 5
            })
        );
    }

    #[test]
    fn test_guard_width() {
        assert_eq!(FringeEngine::new(4, 0.05).unwrap().guard(), 1);
        assert_eq!(FringeEngine::new(64, 0.05).unwrap().guard(), 6);
        assert_eq!(FringeEngine::new(1024, 0.05).unwrap().guard(), 102);
        assert_eq!(FringeEngine::new(16, 0.0).unwrap().guard(), 1);
    }

    #[test]
    fn test_noise_floor_wraps_at_start() {
        let lags: Vec<f64> = vec![10.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let floor = noise_floor(&lags, 0, 1);
        // lags 0 and 9 sit in the guard band
        assert_eq!(floor.count, 8);
        assert_abs_diff_eq!(floor.mean, 4.5);
        assert_abs_diff_eq!(floor.sum_sq_dev, 42.0);
    }

    #[test]
    fn test_noise_floor_wraps_at_end() {
        let lags: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let floor = noise_floor(&lags, 9, 2);
        // lags 7, 8, 9 and 0 sit in the guard band
        assert_eq!(floor.count, 6);
        assert_abs_diff_eq!(floor.mean, 4.5);
    }

    #[test]
    fn test_noise_floor_guard_covers_everything() {
        let lags = vec![1.0; 6];
        let floor = noise_floor(&lags, 2, 3);
        assert_eq!(floor.count, 0);
        assert_eq!(floor.mean, 0.0);
        assert_eq!(floor.sum_sq_dev, 0.0);
    }

    #[test]
    fn test_offset_conventions() {
        let stats = FringeStats {
            amplitude: 1.0,
            snr: 10.0,
            offset_samples: -5,
        };
        assert_eq!(stats.offset(OffsetConvention::Oversampled), -5);
        assert_eq!(stats.offset(OffsetConvention::Nyquist), -3);
        let stats = FringeStats {
            offset_samples: 6,
            ..stats
        };
        assert_eq!(stats.offset(OffsetConvention::Nyquist), 3);
    }

    #[test]
    fn test_auto_amplitude_constant() {
        let spectrum = vec![Complex::new(2.5f32, 0.0); 17];
        let auto = auto_amplitude(&spectrum).unwrap();
        assert_eq!(auto.real, 2.5);
        assert_eq!(auto.imag, 0.0);
    }

    #[test]
    fn test_auto_amplitude_edges_count_half() {
        let mut spectrum = vec![Complex::new(1.0f32, 1.0); 5];
        spectrum[0].re = 5.0;
        spectrum[4].re = 3.0;
        let auto = auto_amplitude(&spectrum).unwrap();
        // (1 + 1 + 1 + 5/2 + 3/2) / 4
        assert_abs_diff_eq!(auto.real, 7.0 / 4.0);
        assert_abs_diff_eq!(auto.imag, 1.0);
        assert!(auto_amplitude(&spectrum[..1]).is_err());
    }
}
