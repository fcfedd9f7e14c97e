// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The global header at the start of every correlator output file.
//!
//! The header opens with its own length, and the length alone decides which
//! layout follows: 64 bytes of fixed fields, 84 bytes which add the
//! correlator branch and job numbers, or 92 bytes and up which add station
//! and source counts followed by a block of NUL-separated names.

use std::{
    convert::TryFrom,
    fmt::{self, Display},
    io::{Read, Seek, SeekFrom},
};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use super::{error::DecodeError, ReadFullExt};
use crate::{
    constants::{
        BRANCH_NAME_BYTES, EXPERIMENT_NAME_BYTES, GLOBAL_HEADER_BASIC_BYTES,
        GLOBAL_HEADER_BRANCHED_BYTES, GLOBAL_HEADER_NAMED_BYTES, HEADER_SIZE_FIELD_BYTES,
        MAX_NUM_CHANNELS,
    },
    epoch::StartEpoch,
};

/// The polarisations present in the correlated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarisationMode {
    /// Left circular only
    Left,
    /// Right circular only
    Right,
    /// Both hands, parallel hands only
    LeftRight,
    /// Both hands including the cross hands
    LeftRightWithCrosses,
}

impl TryFrom<i8> for PolarisationMode {
    type Error = DecodeError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PolarisationMode::Left),
            1 => Ok(PolarisationMode::Right),
            2 => Ok(PolarisationMode::LeftRight),
            3 => Ok(PolarisationMode::LeftRightWithCrosses),
            other => Err(DecodeError::InvalidPolarisationMode(other)),
        }
    }
}

impl Display for PolarisationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PolarisationMode::Left => "L",
                PolarisationMode::Right => "R",
                PolarisationMode::LeftRight => "LR",
                PolarisationMode::LeftRightWithCrosses => "LR+cross",
            }
        )
    }
}

/// Correlator branch and job information, present from the 84 byte layout on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BranchInfo {
    /// Name of the correlator software branch
    pub branch: String,
    /// Correlation job number
    pub job_nr: i32,
    /// Sub-job number within the job
    pub subjob_nr: i32,
}

/// Ordered station and source display names.
///
/// These only ever label output; decoding never depends on them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameTable {
    /// Station names, indexed by station number
    pub stations: Vec<String>,
    /// Source names, indexed by source number
    pub sources: Vec<String>,
}

impl NameTable {
    /// Build a table from names supplied by some other means, e.g. a schedule.
    pub fn new(stations: Vec<String>, sources: Vec<String>) -> Self {
        Self { stations, sources }
    }

    /// Split a block of NUL-separated text into `num_stations` station names
    /// followed by `num_sources` source names. Anything after those is ignored.
    ///
    /// # Errors
    ///
    /// [`DecodeError::MalformedNameTable`] if either count is negative or the
    /// block holds fewer names than requested.
    pub fn parse(block: &[u8], num_stations: i32, num_sources: i32) -> Result<Self, DecodeError> {
        let malformed = |found| DecodeError::MalformedNameTable {
            stations: num_stations,
            sources: num_sources,
            found,
        };
        if num_stations < 0 || num_sources < 0 {
            return Err(malformed(0));
        }

        let mut names: Vec<String> = block
            .split(|&b| b == 0)
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();
        // `split` yields a trailing empty piece after the final NUL; that isn't a name.
        if names.last().map_or(false, String::is_empty) {
            names.pop();
        }

        let (num_stations, num_sources) = (num_stations as usize, num_sources as usize);
        if names.len() < num_stations + num_sources {
            return Err(malformed(names.len()));
        }
        names.truncate(num_stations + num_sources);
        let sources = names.split_off(num_stations);
        Ok(Self {
            stations: names,
            sources,
        })
    }

    /// The name of station `idx`, or its index if it has no name.
    pub fn station_label(&self, idx: usize) -> String {
        self.stations
            .get(idx)
            .cloned()
            .unwrap_or_else(|| idx.to_string())
    }

    /// The name of source `idx`, or its index if it has no name.
    pub fn source_label(&self, idx: usize) -> String {
        self.sources
            .get(idx)
            .cloned()
            .unwrap_or_else(|| idx.to_string())
    }
}

/// The header layout, and the fields only that layout carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderVersion {
    /// 64 bytes: fixed fields only
    Basic,
    /// 84 bytes: adds the branch name and job numbers
    Branched(BranchInfo),
    /// 92 bytes or more: adds embedded station and source names
    Named(BranchInfo, NameTable),
}

/// Experiment metadata read once from the start of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalHeader {
    /// Total header length in bytes, as declared by the header itself
    pub header_size: usize,
    /// Experiment name
    pub experiment: String,
    /// Year the correlated data starts
    pub start_year: i16,
    /// Day of year the correlated data starts (1-based)
    pub start_day: i16,
    /// Seconds since midnight the correlated data starts
    pub start_time: i32,
    /// Number of spectral channels per baseline
    pub num_channels: usize,
    /// Integration time of one time slice in microseconds
    pub integration_time_us: i64,
    /// Version of this output format
    pub output_format_version: i32,
    /// Version of the correlator software
    pub correlator_version: i32,
    /// Polarisations present in the data
    pub polarisation_mode: PolarisationMode,
    /// Layout-specific fields
    pub version: HeaderVersion,
}

fn nul_terminated(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

impl GlobalHeader {
    /// Read the global header from the start of `reader`, leaving the reader
    /// positioned at the first time slice header.
    ///
    /// The leading length field is read, the stream is rewound to offset 0,
    /// and then exactly that many bytes are read.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::TruncatedHeader`] if fewer bytes are available than declared
    /// - [`DecodeError::UnsupportedHeaderSize`] if the length matches no layout
    /// - [`DecodeError::UnsupportedChannelCount`] above [`MAX_NUM_CHANNELS`]
    /// - [`DecodeError::MalformedNameTable`], [`DecodeError::InvalidPolarisationMode`]
    ///   from [`GlobalHeader::from_bytes`]
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut size_buf = [0u8; HEADER_SIZE_FIELD_BYTES];
        let found = reader.read_full(&mut size_buf)?;
        if found < HEADER_SIZE_FIELD_BYTES {
            return Err(DecodeError::TruncatedHeader {
                expected: HEADER_SIZE_FIELD_BYTES,
                found,
            });
        }
        let header_size = LittleEndian::read_i32(&size_buf);
        Self::check_header_size(header_size)?;
        trace!("global header declares {} bytes", header_size);

        reader.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        reader
            .by_ref()
            .take(header_size as u64)
            .read_to_end(&mut buf)?;
        if buf.len() < header_size as usize {
            return Err(DecodeError::TruncatedHeader {
                expected: header_size as usize,
                found: buf.len(),
            });
        }
        Self::from_bytes(&buf)
    }

    fn check_header_size(header_size: i32) -> Result<usize, DecodeError> {
        match usize::try_from(header_size) {
            Ok(n)
                if n == GLOBAL_HEADER_BASIC_BYTES
                    || n == GLOBAL_HEADER_BRANCHED_BYTES
                    || n >= GLOBAL_HEADER_NAMED_BYTES =>
            {
                Ok(n)
            }
            _ => Err(DecodeError::UnsupportedHeaderSize(header_size)),
        }
    }

    /// Parse a complete global header, dispatching on the length it declares.
    ///
    /// # Errors
    ///
    /// See [`GlobalHeader::read`].
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE_FIELD_BYTES {
            return Err(DecodeError::TruncatedHeader {
                expected: HEADER_SIZE_FIELD_BYTES,
                found: buf.len(),
            });
        }
        let header_size = Self::check_header_size(LittleEndian::read_i32(&buf[0..4]))?;
        if buf.len() < header_size {
            return Err(DecodeError::TruncatedHeader {
                expected: header_size,
                found: buf.len(),
            });
        }

        let experiment = nul_terminated(&buf[4..4 + EXPERIMENT_NAME_BYTES]);
        let start_year = LittleEndian::read_i16(&buf[36..38]);
        let start_day = LittleEndian::read_i16(&buf[38..40]);
        let start_time = LittleEndian::read_i32(&buf[40..44]);
        // a negative channel count can only mean corruption, treat it as empty.
        let raw_channels = LittleEndian::read_i32(&buf[44..48]);
        let num_channels = raw_channels.max(0) as usize;
        if num_channels > MAX_NUM_CHANNELS {
            return Err(DecodeError::UnsupportedChannelCount(raw_channels));
        }
        let integration_time_us = LittleEndian::read_i32(&buf[48..52]) as i64;
        let output_format_version = LittleEndian::read_i32(&buf[52..56]);
        let correlator_version = LittleEndian::read_i32(&buf[56..60]);
        let polarisation_mode = PolarisationMode::try_from(buf[60] as i8)?;

        let version = if header_size == GLOBAL_HEADER_BASIC_BYTES {
            HeaderVersion::Basic
        } else {
            let branch = BranchInfo {
                branch: nul_terminated(&buf[64..64 + BRANCH_NAME_BYTES]),
                job_nr: LittleEndian::read_i32(&buf[76..80]),
                subjob_nr: LittleEndian::read_i32(&buf[80..84]),
            };
            if header_size == GLOBAL_HEADER_BRANCHED_BYTES {
                HeaderVersion::Branched(branch)
            } else {
                let num_stations = LittleEndian::read_i32(&buf[84..88]);
                let num_sources = LittleEndian::read_i32(&buf[88..92]);
                let names = NameTable::parse(
                    &buf[GLOBAL_HEADER_NAMED_BYTES..header_size],
                    num_stations,
                    num_sources,
                )?;
                HeaderVersion::Named(branch, names)
            }
        };
        debug!(
            "global header: {} bytes, experiment {}, {} channels, {}us integrations",
            header_size, experiment, num_channels, integration_time_us
        );

        Ok(Self {
            header_size,
            experiment,
            start_year,
            start_day,
            start_time,
            num_channels,
            integration_time_us,
            output_format_version,
            correlator_version,
            polarisation_mode,
            version,
        })
    }

    /// The epoch of the first time slice.
    pub fn start_epoch(&self) -> StartEpoch {
        StartEpoch {
            year: self.start_year as i32,
            day_of_year: self.start_day as i32,
            second_of_day: self.start_time as i64,
        }
    }

    /// The correlator software version, with the branch name when the layout has one.
    pub fn software_version(&self) -> String {
        match &self.version {
            HeaderVersion::Basic => self.correlator_version.to_string(),
            HeaderVersion::Branched(branch) | HeaderVersion::Named(branch, _) => {
                if branch.branch.is_empty() {
                    self.correlator_version.to_string()
                } else {
                    format!("{} ({})", self.correlator_version, branch.branch)
                }
            }
        }
    }

    /// Branch and job information, if the layout carries it.
    pub fn branch_info(&self) -> Option<&BranchInfo> {
        match &self.version {
            HeaderVersion::Basic => None,
            HeaderVersion::Branched(branch) | HeaderVersion::Named(branch, _) => Some(branch),
        }
    }

    /// The embedded station and source names, if the layout carries them.
    pub fn names(&self) -> Option<&NameTable> {
        match &self.version {
            HeaderVersion::Named(_, names) => Some(names),
            _ => None,
        }
    }

    /// The byte width of one baseline's spectrum payload.
    pub fn baseline_payload_bytes(&self) -> usize {
        crate::io::records::baseline_payload_bytes(self.num_channels)
    }
}

impl Display for GlobalHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.start_time / 3600;
        let minutes = (self.start_time % 3600) / 60;
        let seconds = self.start_time % 60;
        write!(
            f,
            "Experiment {}, correlator version = {}, date = {}y{}d{}h{}m{}s, nchan = {}, pol = {}",
            self.experiment,
            self.software_version(),
            self.start_year,
            self.start_day,
            hours,
            minutes,
            seconds,
            self.num_channels,
            self.polarisation_mode,
        )
    }
}
