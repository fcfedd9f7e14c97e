// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! Corfringe decodes the binary output of a software VLBI correlator and
//! derives quick-look statistics from it: sampler level occupancy for every
//! station, and fringe amplitude, signal to noise ratio and delay offset for
//! every baseline.
//!
//! # Examples
//!
//! Walk the time slices of a stream and print the fringes it contains.
//!
//! ```rust
//! use std::io::Cursor;
//! use corfringe::{
//!     test_common::{GlobalHeaderSpec, SliceSpec, SyntheticStream},
//!     BaselineStats, Complex, DecodeOptions, GlobalHeader, OffsetConvention, TimeSliceWalker,
//! };
//!
//! // a stream with one slice holding a single baseline
//! let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("N24L1", 16));
//! stream.push_slice(SliceSpec::new(0).baseline(1, 0, 1, 0, vec![Complex::new(1.0, 0.0); 17]));
//!
//! let mut reader = Cursor::new(stream.into_bytes());
//! let header = GlobalHeader::read(&mut reader).unwrap();
//! let walker = TimeSliceWalker::new(reader, &header, DecodeOptions::default());
//!
//! for slice in walker {
//!     let slice = slice.unwrap();
//!     for ((station1, station2), results) in &slice.aggregate.baselines {
//!         for result in results {
//!             if let BaselineStats::Cross(stats) = result.stats {
//!                 println!(
//!                     "{}-{}: ampl = {:.3}, SNR = {:.1}, offset = {}",
//!                     station1,
//!                     station2,
//!                     stats.amplitude,
//!                     stats.snr,
//!                     stats.offset(OffsetConvention::Nyquist)
//!                 );
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! # Details
//!
//! The stream is a [`GlobalHeader`] followed by time slices. Each slice is
//! decoded by the [`TimeSliceWalker`] into a [`SliceAggregate`], computing
//! [`FringeStats`] for cross-correlations with a [`FringeEngine`] and,
//! optionally, [`AutoAmplitude`]s for auto-correlations.

pub mod aggregate;
pub use aggregate::{BaselineResult, BaselineStats, SkippedBaseline, SliceAggregate, StatEntry};

pub mod constants;

pub mod epoch;
pub use epoch::{SliceTime, StartEpoch};

pub mod error;
pub use error::{CLIError, CorFringeError};

pub mod fringe;
pub use fringe::{
    auto_amplitude, fringe_stats, AutoAmplitude, FringeEngine, FringeError, FringeStats,
    OffsetConvention,
};

pub mod io;
pub use io::{
    error::DecodeError,
    header::{GlobalHeader, HeaderVersion, NameTable, PolarisationMode},
    records::{BaselineRecord, ChannelSelector, StatRecord, TimesliceHeader, UvwRecord},
};

pub mod slice;
pub use slice::{DecodeOptions, DecodeOptionsBuilder, TimeSlice, TimeSliceWalker};

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub use cli::CorFringeContext;

#[doc(hidden)]
pub mod test_common;

pub use rustfft::num_complex::Complex;
