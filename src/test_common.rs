// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Writers for synthetic correlator output, shared by unit tests, integration
//! tests and benches. Not part of the public API.

use std::{fs::File, io::Write, path::Path};

use byteorder::{LittleEndian, WriteBytesExt};
use rustfft::num_complex::Complex;

use crate::{
    constants::{
        BRANCH_NAME_BYTES, EXPERIMENT_NAME_BYTES, GLOBAL_HEADER_BASIC_BYTES,
        GLOBAL_HEADER_BRANCHED_BYTES, GLOBAL_HEADER_NAMED_BYTES,
    },
    io::{
        header::NameTable,
        records::{ChannelSelector, StatRecord, UvwRecord},
    },
};

fn write_padded(buf: &mut Vec<u8>, text: &str, width: usize) {
    let mut field = vec![0u8; width];
    let len = text.len().min(width - 1);
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
    buf.extend_from_slice(&field);
}

/// Field values for a synthetic global header.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalHeaderSpec {
    pub experiment: String,
    /// year, day of year, second of day
    pub start: (i16, i16, i32),
    pub num_channels: i32,
    pub integration_time_us: i32,
    pub output_format_version: i32,
    pub correlator_version: i32,
    pub polarisation: i8,
    /// branch name, job number and subjob number. Selects the 84 byte layout.
    pub branch: Option<(String, i32, i32)>,
    /// Selects the named layout, with a default branch if there is none.
    pub names: Option<NameTable>,
}

impl GlobalHeaderSpec {
    /// A 64 byte header with one second integrations.
    pub fn basic(experiment: &str, num_channels: i32) -> Self {
        Self {
            experiment: experiment.into(),
            start: (2024, 1, 0),
            num_channels,
            integration_time_us: 1_000_000,
            output_format_version: 1,
            correlator_version: 1000,
            polarisation: 2,
            branch: None,
            names: None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let name_block: Option<Vec<u8>> = self.names.as_ref().map(|names| {
            names
                .stations
                .iter()
                .chain(names.sources.iter())
                .flat_map(|name| name.bytes().chain(std::iter::once(0)))
                .collect()
        });
        let header_size = match (&name_block, &self.branch) {
            (Some(block), _) => GLOBAL_HEADER_NAMED_BYTES + block.len(),
            (None, Some(_)) => GLOBAL_HEADER_BRANCHED_BYTES,
            (None, None) => GLOBAL_HEADER_BASIC_BYTES,
        };

        let mut buf = Vec::with_capacity(header_size);
        buf.write_i32::<LittleEndian>(header_size as i32).unwrap();
        write_padded(&mut buf, &self.experiment, EXPERIMENT_NAME_BYTES);
        buf.write_i16::<LittleEndian>(self.start.0).unwrap();
        buf.write_i16::<LittleEndian>(self.start.1).unwrap();
        buf.write_i32::<LittleEndian>(self.start.2).unwrap();
        for field in [
            self.num_channels,
            self.integration_time_us,
            self.output_format_version,
            self.correlator_version,
        ] {
            buf.write_i32::<LittleEndian>(field).unwrap();
        }
        buf.write_i8(self.polarisation).unwrap();
        buf.extend_from_slice(&[0u8; 3]);

        if header_size > GLOBAL_HEADER_BASIC_BYTES {
            let (branch, job_nr, subjob_nr) = self
                .branch
                .clone()
                .unwrap_or_else(|| (String::new(), 0, 0));
            write_padded(&mut buf, &branch, BRANCH_NAME_BYTES);
            buf.write_i32::<LittleEndian>(job_nr).unwrap();
            buf.write_i32::<LittleEndian>(subjob_nr).unwrap();
        }
        if let (Some(names), Some(block)) = (&self.names, &name_block) {
            buf.write_i32::<LittleEndian>(names.stations.len() as i32)
                .unwrap();
            buf.write_i32::<LittleEndian>(names.sources.len() as i32)
                .unwrap();
            buf.extend_from_slice(block);
        }
        assert_eq!(buf.len(), header_size);
        buf
    }
}

pub fn write_timeslice_header(
    buf: &mut Vec<u8>,
    slice_nr: i32,
    num_baselines: i32,
    num_uvw: i32,
    num_stats: i32,
) {
    for field in [slice_nr, num_baselines, num_uvw, num_stats] {
        buf.write_i32::<LittleEndian>(field).unwrap();
    }
}

pub fn write_uvw(buf: &mut Vec<u8>, record: &UvwRecord) {
    buf.write_i32::<LittleEndian>(record.station_nr).unwrap();
    buf.write_i32::<LittleEndian>(record.source_nr).unwrap();
    for coord in [record.u, record.v, record.w] {
        buf.write_f64::<LittleEndian>(coord).unwrap();
    }
}

pub fn write_stat(buf: &mut Vec<u8>, record: &StatRecord) {
    buf.extend_from_slice(&[
        record.station_nr,
        record.frequency_nr,
        record.sideband,
        record.polarisation,
    ]);
    for level in record.levels {
        buf.write_i32::<LittleEndian>(level).unwrap();
    }
}

pub fn write_baseline(
    buf: &mut Vec<u8>,
    weight: i32,
    station1: u8,
    station2: u8,
    selector: ChannelSelector,
    spectrum: &[Complex<f32>],
) {
    buf.write_i32::<LittleEndian>(weight).unwrap();
    buf.extend_from_slice(&[station1, station2, u8::from(selector), 0]);
    for sample in spectrum {
        buf.write_f32::<LittleEndian>(sample.re).unwrap();
        buf.write_f32::<LittleEndian>(sample.im).unwrap();
    }
}

/// One run of records under a single time slice header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SliceSpec {
    pub slice_nr: i32,
    pub uvw: Vec<UvwRecord>,
    pub stats: Vec<StatRecord>,
    /// weight, station1, station2, packed selector byte, spectrum
    pub baselines: Vec<(i32, u8, u8, u8, Vec<Complex<f32>>)>,
}

impl SliceSpec {
    pub fn new(slice_nr: i32) -> Self {
        Self {
            slice_nr,
            ..Self::default()
        }
    }

    pub fn uvw(mut self, record: UvwRecord) -> Self {
        self.uvw.push(record);
        self
    }

    pub fn stat(mut self, record: StatRecord) -> Self {
        self.stats.push(record);
        self
    }

    pub fn baseline(
        mut self,
        weight: i32,
        station1: u8,
        station2: u8,
        selector: u8,
        spectrum: Vec<Complex<f32>>,
    ) -> Self {
        self.baselines
            .push((weight, station1, station2, selector, spectrum));
        self
    }
}

/// A correlator output stream, built up in memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyntheticStream {
    bytes: Vec<u8>,
}

impl SyntheticStream {
    pub fn new(header: GlobalHeaderSpec) -> Self {
        Self {
            bytes: header.to_bytes(),
        }
    }

    /// Append a time slice header followed by its uvw, statistics and baseline records.
    pub fn push_slice(&mut self, slice: SliceSpec) {
        write_timeslice_header(
            &mut self.bytes,
            slice.slice_nr,
            slice.baselines.len() as i32,
            slice.uvw.len() as i32,
            slice.stats.len() as i32,
        );
        for record in &slice.uvw {
            write_uvw(&mut self.bytes, record);
        }
        for record in &slice.stats {
            write_stat(&mut self.bytes, record);
        }
        for (weight, station1, station2, selector, spectrum) in &slice.baselines {
            write_baseline(
                &mut self.bytes,
                *weight,
                *station1,
                *station2,
                ChannelSelector::from(*selector),
                spectrum,
            );
        }
    }

    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        File::create(path)?.write_all(&self.bytes)
    }
}
