// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors that can occur while decoding correlator output

use thiserror::Error;

#[derive(Error, Debug)]
/// All the errors that can occur while decoding a correlator output stream
pub enum DecodeError {
    /// The stream ended before the declared global header length.
    #[error("Truncated global header: expected {expected} bytes, found {found}")]
    TruncatedHeader {
        /// The number of bytes the header declares (or the width of the length field)
        expected: usize,
        /// The number of bytes that were available
        found: usize,
    },

    /// The declared header length doesn't match any known layout.
    #[error("Unsupported global header size {0}, expected 64, 84 or at least 92 bytes")]
    UnsupportedHeaderSize(i32),

    /// The polarisation byte of the global header is not one of the four known modes.
    #[error("Invalid polarisation mode {0} in global header")]
    InvalidPolarisationMode(i8),

    /// The global header declares more channels than any correlator produces.
    #[error("Unsupported channel count {0} in global header, expected at most {max}", max = crate::constants::MAX_NUM_CHANNELS)]
    UnsupportedChannelCount(i32),

    /// The widest header declares more names than its text block contains.
    #[error("Malformed name table: header declares {stations} stations and {sources} sources, but only {found} names are present")]
    MalformedNameTable {
        /// Declared number of stations
        stations: i32,
        /// Declared number of sources
        sources: i32,
        /// Number of NUL-terminated names found
        found: usize,
    },

    /// A short read while decoding a record. At a slice boundary this simply
    /// means there is no more data.
    #[error("End of stream while reading {record}: expected {expected} bytes, found {found}")]
    EndOfStream {
        /// The kind of record being read
        record: &'static str,
        /// The number of bytes the record needs
        expected: usize,
        /// The number of bytes that were available
        found: usize,
    },

    /// A time slice header declares a negative number of records.
    #[error("Invalid record count in time slice {slice_nr}: {count} {record} records")]
    InvalidRecordCount {
        /// The slice the header belongs to
        slice_nr: i32,
        /// The kind of record being counted
        record: &'static str,
        /// The count that was read
        count: i32,
    },

    /// A statistics record holds a negative level count.
    #[error("Invalid level count {count} for level {level} of station {station_nr}")]
    InvalidLevelCount {
        /// Station the record belongs to
        station_nr: u8,
        /// Index of the offending level
        level: usize,
        /// The count that was read
        count: i32,
    },

    /// A baseline payload contains non-finite floats. Records with this
    /// condition are skipped with a warning rather than propagated.
    #[error("Non-finite payload for baseline ({station1}, {station2}), freq = {frequency_nr}, sb = {sideband}, pol = {polarisation}")]
    NaNPayload {
        /// First station of the baseline
        station1: u8,
        /// Second station of the baseline
        station2: u8,
        /// Frequency channel index
        frequency_nr: u8,
        /// Sideband flag
        sideband: u8,
        /// Polarisation index
        polarisation: u8,
    },

    #[error(transparent)]
    /// Error derived from [`crate::fringe::FringeError`]
    Fringe(#[from] crate::fringe::FringeError),

    #[error(transparent)]
    /// Error derived from [`std::io::Error`]
    IO(#[from] std::io::Error),
}

impl DecodeError {
    /// Whether this error only signals that the stream has no more data.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, DecodeError::EndOfStream { .. })
    }
}
