// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants.
//!
//! Sizes are in bytes and describe the on-disk layout of correlator output.

/// Width of the leading length field of the global header.
pub const HEADER_SIZE_FIELD_BYTES: usize = 4;
/// Size of the oldest global header layout: fixed fields only.
pub const GLOBAL_HEADER_BASIC_BYTES: usize = 64;
/// Size of the global header layout that adds a branch name and job numbers.
pub const GLOBAL_HEADER_BRANCHED_BYTES: usize = 84;
/// Size of the fixed region of the widest global header layout. Any bytes
/// beyond this hold the NUL-separated station and source names.
pub const GLOBAL_HEADER_NAMED_BYTES: usize = 92;
/// Width of the fixed-size experiment name field.
pub const EXPERIMENT_NAME_BYTES: usize = 32;
/// Width of the fixed-size correlator branch name field.
pub const BRANCH_NAME_BYTES: usize = 12;

/// `{slice_nr, num_baselines, num_uvw, num_stats}`, all `i32`.
pub const TIMESLICE_HEADER_BYTES: usize = 16;
/// Two `i32` indices followed by three `f64` coordinates.
pub const UVW_RECORD_BYTES: usize = 32;
/// Four `u8` indices followed by five `i32` level counts.
pub const STAT_RECORD_BYTES: usize = 24;
/// `i32` weight followed by four `u8` fields.
pub const BASELINE_HEADER_BYTES: usize = 8;
/// One interleaved `f32` real/imaginary pair.
pub const COMPLEX_SAMPLE_BYTES: usize = 8;

/// Number of quantizer bins reported for each station stream.
pub const NUM_LEVELS: usize = 5;
/// Added to the level count total so that empty records don't divide by zero.
pub const LEVEL_FRACTION_EPSILON: f64 = 1e-4;

/// Fraction of the lag function around the peak that is excluded from the
/// noise estimate.
pub const DEFAULT_FRINGE_GUARD: f64 = 0.05;
/// Lower bound on the noise variance sum used in the SNR.
pub const NOISE_FLOOR: f64 = 1e-12;

/// Per-station maps are sized for this many stations when the global header
/// doesn't say how many there are.
pub const DEFAULT_STATION_COUNT: usize = 32;
/// Station indices in baseline and statistics records are a single byte.
pub const MAX_STATIONS: usize = u8::MAX as usize + 1;
/// Largest channel count accepted from a global header. Anything wider is
/// taken as a corrupt header.
pub const MAX_NUM_CHANNELS: usize = 1 << 20;
