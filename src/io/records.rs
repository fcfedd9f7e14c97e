// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fixed-schema records that make up a time slice.
//!
//! Every decoder reads the whole record in one go. A short read is always
//! [`DecodeError::EndOfStream`]; there are no retries.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use itertools::Itertools;
use log::trace;
use rustfft::num_complex::Complex;

use super::{error::DecodeError, ReadFullExt};
use crate::constants::{
    BASELINE_HEADER_BYTES, COMPLEX_SAMPLE_BYTES, LEVEL_FRACTION_EPSILON, NUM_LEVELS,
    STAT_RECORD_BYTES, TIMESLICE_HEADER_BYTES, UVW_RECORD_BYTES,
};

/// The byte width of one baseline's spectrum: `num_channels + 1` complex samples.
pub fn baseline_payload_bytes(num_channels: usize) -> usize {
    (num_channels + 1) * COMPLEX_SAMPLE_BYTES
}

/// The header that opens every run of records in a time slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimesliceHeader {
    /// Integration slice number, non-decreasing through the stream
    pub slice_nr: i32,
    /// Number of baseline records that follow
    pub num_baselines: usize,
    /// Number of UVW records that follow
    pub num_uvw: usize,
    /// Number of bit statistics records that follow
    pub num_stats: usize,
}

impl TimesliceHeader {
    /// Parse a time slice header from exactly [`TIMESLICE_HEADER_BYTES`] bytes.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidRecordCount`] if any count is negative.
    pub fn from_bytes(buf: &[u8; TIMESLICE_HEADER_BYTES]) -> Result<Self, DecodeError> {
        let slice_nr = LittleEndian::read_i32(&buf[0..4]);
        let count = |ofs: usize, record: &'static str| {
            let count = LittleEndian::read_i32(&buf[ofs..ofs + 4]);
            usize::try_from(count).map_err(|_| DecodeError::InvalidRecordCount {
                slice_nr,
                record,
                count,
            })
        };
        Ok(Self {
            slice_nr,
            num_baselines: count(4, "baseline")?,
            num_uvw: count(8, "uvw")?,
            num_stats: count(12, "statistics")?,
        })
    }

    /// Read a time slice header.
    ///
    /// # Errors
    ///
    /// [`DecodeError::EndOfStream`] on a short read, see also [`TimesliceHeader::from_bytes`].
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut buf = [0u8; TIMESLICE_HEADER_BYTES];
        reader.read_record(&mut buf, "time slice header")?;
        Self::from_bytes(&buf)
    }
}

/// Projected baseline coordinates of one station at the middle of a slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvwRecord {
    /// Station index
    pub station_nr: i32,
    /// Source index
    pub source_nr: i32,
    /// u coordinate
    pub u: f64,
    /// v coordinate
    pub v: f64,
    /// w coordinate
    pub w: f64,
}

impl UvwRecord {
    /// Read one UVW record.
    ///
    /// # Errors
    ///
    /// [`DecodeError::EndOfStream`] on a short read.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut buf = [0u8; UVW_RECORD_BYTES];
        reader.read_record(&mut buf, "uvw record")?;
        Ok(Self {
            station_nr: LittleEndian::read_i32(&buf[0..4]),
            source_nr: LittleEndian::read_i32(&buf[4..8]),
            u: LittleEndian::read_f64(&buf[8..16]),
            v: LittleEndian::read_f64(&buf[16..24]),
            w: LittleEndian::read_f64(&buf[24..32]),
        })
    }
}

/// Sampler level occupancy for one station stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
    /// Station index
    pub station_nr: u8,
    /// Frequency channel index
    pub frequency_nr: u8,
    /// Sideband flag, 0 for lower and 1 for upper
    pub sideband: u8,
    /// Polarisation index
    pub polarisation: u8,
    /// Counts of `--`, `-+`, `+-`, `++` and invalid samples
    pub levels: [i32; NUM_LEVELS],
}

impl StatRecord {
    /// Read one bit statistics record.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::EndOfStream`] on a short read
    /// - [`DecodeError::InvalidLevelCount`] if any level count is negative
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut buf = [0u8; STAT_RECORD_BYTES];
        reader.read_record(&mut buf, "statistics record")?;
        let mut levels = [0i32; NUM_LEVELS];
        LittleEndian::read_i32_into(&buf[4..STAT_RECORD_BYTES], &mut levels);
        if let Some((level, &count)) = levels.iter().find_position(|&&count| count < 0) {
            return Err(DecodeError::InvalidLevelCount {
                station_nr: buf[0],
                level,
                count,
            });
        }
        Ok(Self {
            station_nr: buf[0],
            frequency_nr: buf[1],
            sideband: buf[2],
            polarisation: buf[3],
            levels,
        })
    }

    /// Each level count as a fraction of the total.
    ///
    /// The total carries a small epsilon so an empty record gives zeros.
    /// For a record from [`StatRecord::read`] every fraction is in `[0, 1)`.
    pub fn level_fractions(&self) -> [f64; NUM_LEVELS] {
        let total = self.levels.iter().map(|&l| l as f64).sum::<f64>() + LEVEL_FRACTION_EPSILON;
        self.levels.map(|l| l as f64 / total)
    }
}

/// The packed polarisation, sideband and frequency byte of a baseline header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelector {
    /// Polarisation index, the low two bits
    pub polarisation: u8,
    /// Sideband flag, bit two
    pub sideband: u8,
    /// Frequency channel index, the remaining bits
    pub frequency_nr: u8,
}

impl From<u8> for ChannelSelector {
    fn from(byte: u8) -> Self {
        Self {
            polarisation: byte & 0b11,
            sideband: (byte >> 2) & 0b1,
            frequency_nr: byte >> 3,
        }
    }
}

impl From<ChannelSelector> for u8 {
    fn from(sel: ChannelSelector) -> Self {
        (sel.frequency_nr << 3) | ((sel.sideband & 0b1) << 2) | (sel.polarisation & 0b11)
    }
}

/// The visibility spectrum of one baseline, channel and polarisation.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRecord {
    /// Accumulation count
    pub weight: i32,
    /// First station
    pub station1: u8,
    /// Second station, equal to `station1` for an auto-correlation
    pub station2: u8,
    /// Which channel and polarisation this spectrum belongs to
    pub selector: ChannelSelector,
    /// `num_channels + 1` complex samples
    pub spectrum: Vec<Complex<f32>>,
}

impl BaselineRecord {
    /// Read one baseline record and its `num_channels + 1` sample payload.
    ///
    /// The payload is always consumed, whatever the caller does with it.
    ///
    /// # Errors
    ///
    /// [`DecodeError::EndOfStream`] on a short read of the header or payload.
    pub fn read<R: Read>(reader: &mut R, num_channels: usize) -> Result<Self, DecodeError> {
        let mut header = [0u8; BASELINE_HEADER_BYTES];
        reader.read_record(&mut header, "baseline header")?;
        let weight = LittleEndian::read_i32(&header[0..4]);
        let (station1, station2) = (header[4], header[5]);
        let selector = ChannelSelector::from(header[6]);
        trace!(
            "baseline ({}, {}) {:?}, weight {}",
            station1,
            station2,
            selector,
            weight
        );

        let mut payload = vec![0u8; baseline_payload_bytes(num_channels)];
        reader.read_record(&mut payload, "baseline payload")?;
        let mut floats = vec![0f32; 2 * (num_channels + 1)];
        LittleEndian::read_f32_into(&payload, &mut floats);
        let spectrum = floats
            .into_iter()
            .tuples()
            .map(|(re, im)| Complex::new(re, im))
            .collect();

        Ok(Self {
            weight,
            station1,
            station2,
            selector,
            spectrum,
        })
    }

    /// Whether both ends of the baseline are the same station.
    pub fn is_auto(&self) -> bool {
        self.station1 == self.station2
    }

    /// Check every sample of the spectrum is finite.
    ///
    /// # Errors
    ///
    /// [`DecodeError::NaNPayload`] identifying the record otherwise.
    pub fn check_finite(&self) -> Result<(), DecodeError> {
        if self
            .spectrum
            .iter()
            .all(|c| c.re.is_finite() && c.im.is_finite())
        {
            Ok(())
        } else {
            Err(DecodeError::NaNPayload {
                station1: self.station1,
                station2: self.station2,
                frequency_nr: self.selector.frequency_nr,
                sideband: self.selector.sideband,
                polarisation: self.selector.polarisation,
            })
        }
    }
}
