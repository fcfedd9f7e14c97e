// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Walking a correlator output stream one time slice at a time.
//!
//! A time slice is one or more runs of records that share a slice number,
//! each run opened by a [`TimesliceHeader`]. The walker only learns a slice
//! has ended by reading the next header, so that header is handed back to the
//! stream with a seek and read again by the following call.

use std::{
    fmt::Display,
    io::{Read, Seek, SeekFrom},
};

use derive_builder::Builder;
use log::{debug, trace, warn};

use crate::{
    aggregate::{BaselineResult, BaselineStats, SliceAggregate},
    constants::{DEFAULT_FRINGE_GUARD, DEFAULT_STATION_COUNT, TIMESLICE_HEADER_BYTES},
    fringe::{auto_amplitude, FringeEngine, FringeError},
    io::{
        error::DecodeError,
        header::GlobalHeader,
        records::{BaselineRecord, StatRecord, TimesliceHeader, UvwRecord},
        ReadFullExt,
    },
};

/// Options for decoding a correlator output stream
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    /// Whether to compute amplitudes for auto-correlations
    #[builder(default = "false")]
    pub include_autos: bool,
    /// Fraction of the lag function either side of the fringe peak that is
    /// left out of the noise estimate
    #[builder(default = "DEFAULT_FRINGE_GUARD")]
    pub fringe_guard: f64,
    /// Number of stations to size the per-station maps for, when the header
    /// doesn't say
    #[builder(default = "DEFAULT_STATION_COUNT")]
    pub station_count_hint: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            include_autos: false,
            fringe_guard: DEFAULT_FRINGE_GUARD,
            station_count_hint: DEFAULT_STATION_COUNT,
        }
    }
}

impl Display for DecodeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} compute auto-correlation amplitudes.",
            if self.include_autos {
                "Will"
            } else {
                "Will not"
            }
        )?;
        writeln!(
            f,
            "Will ignore {}% of lags either side of the fringe peak for the noise estimate.",
            self.fringe_guard * 100.0
        )?;
        Ok(())
    }
}

/// One decoded time slice.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlice {
    /// The slice number shared by every run of records in the slice
    pub slice_nr: i32,
    /// Everything decoded from the slice
    pub aggregate: SliceAggregate,
}

/// Decodes time slices from a stream positioned just after its global header.
#[derive(Debug)]
pub struct TimeSliceWalker<R> {
    reader: R,
    num_channels: usize,
    num_stations: usize,
    options: DecodeOptions,
    engine: Option<FringeEngine>,
    slices_read: usize,
    finished: bool,
}

impl<R: Read + Seek> TimeSliceWalker<R> {
    /// Create a walker over `reader`, which must be positioned where
    /// [`GlobalHeader::read`] left it.
    pub fn new(reader: R, header: &GlobalHeader, options: DecodeOptions) -> Self {
        let num_stations = header
            .names()
            .map(|names| names.stations.len())
            .filter(|&n| n > 0)
            .unwrap_or(options.station_count_hint);
        // planning fails only for a header without channels
        let engine = FringeEngine::new(header.num_channels, options.fringe_guard).ok();
        Self {
            reader,
            num_channels: header.num_channels,
            num_stations,
            options,
            engine,
            slices_read: 0,
            finished: false,
        }
    }

    /// Number of complete slices decoded so far.
    pub fn slices_read(&self) -> usize {
        self.slices_read
    }

    /// The options this walker decodes with.
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Number of stations the per-station maps are sized for.
    pub fn num_stations(&self) -> usize {
        self.num_stations
    }

    /// The underlying reader. Reading from or seeking it will confuse the walker.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Decode the next time slice into `aggregate`, which is cleared first.
    ///
    /// Returns the slice number, or `None` once the stream is exhausted. After
    /// the end of the stream or any error, every further call returns `None`.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::EndOfStream`] if the stream ends partway through a slice
    /// - [`DecodeError::InvalidRecordCount`] for a corrupt time slice header
    /// - [`DecodeError::IO`] if the reader fails
    pub fn next_slice_into(
        &mut self,
        aggregate: &mut SliceAggregate,
    ) -> Result<Option<i32>, DecodeError> {
        if self.finished {
            return Ok(None);
        }
        aggregate.clear();
        let result = self.decode_slice(aggregate);
        match result {
            Ok(Some(_)) => self.slices_read += 1,
            Ok(None) | Err(_) => self.finished = true,
        }
        result
    }

    /// Decode the next time slice into freshly allocated maps.
    ///
    /// # Errors
    ///
    /// See [`TimeSliceWalker::next_slice_into`].
    pub fn next_slice(&mut self) -> Result<Option<TimeSlice>, DecodeError> {
        let mut aggregate = SliceAggregate::new(self.num_stations);
        Ok(self
            .next_slice_into(&mut aggregate)?
            .map(|slice_nr| TimeSlice {
                slice_nr,
                aggregate,
            }))
    }

    /// Read a time slice header, or `None` if the stream ends first.
    fn read_slice_header(&mut self) -> Result<Option<TimesliceHeader>, DecodeError> {
        let mut buf = [0u8; TIMESLICE_HEADER_BYTES];
        match self.reader.read_full(&mut buf)? {
            0 => Ok(None),
            found if found < TIMESLICE_HEADER_BYTES => {
                warn!(
                    "Ignoring {} trailing bytes, too few for a time slice header",
                    found
                );
                Ok(None)
            }
            _ => {
                let header = TimesliceHeader::from_bytes(&buf)?;
                trace!("{:?}", header);
                Ok(Some(header))
            }
        }
    }

    fn decode_slice(
        &mut self,
        aggregate: &mut SliceAggregate,
    ) -> Result<Option<i32>, DecodeError> {
        let mut header = match self.read_slice_header()? {
            Some(header) => header,
            None => return Ok(None),
        };
        let slice_nr = header.slice_nr;
        debug!("decoding time slice {}", slice_nr);

        loop {
            self.decode_records(&header, aggregate)?;
            match self.read_slice_header()? {
                Some(next) if next.slice_nr == slice_nr => header = next,
                Some(next) => {
                    trace!("slice {} starts, rewinding its header", next.slice_nr);
                    self.reader
                        .seek(SeekFrom::Current(-(TIMESLICE_HEADER_BYTES as i64)))?;
                    break;
                }
                None => {
                    // every later call would find the same end of stream
                    self.finished = true;
                    break;
                }
            }
        }
        Ok(Some(slice_nr))
    }

    fn decode_records(
        &mut self,
        header: &TimesliceHeader,
        aggregate: &mut SliceAggregate,
    ) -> Result<(), DecodeError> {
        for _ in 0..header.num_uvw {
            let record = UvwRecord::read(&mut self.reader)?;
            trace!("{:?}", record);
            // baseline and statistics records index stations with one byte
            match u8::try_from(record.station_nr) {
                Ok(station) => aggregate.push_uvw(station, record),
                Err(_) => warn!(
                    "Skipping uvw record with out of range station {} in slice {}",
                    record.station_nr, header.slice_nr
                ),
            }
        }

        for _ in 0..header.num_stats {
            let record = StatRecord::read(&mut self.reader)?;
            trace!("{:?}", record);
            aggregate.push_stat(&record);
        }

        for _ in 0..header.num_baselines {
            let record = BaselineRecord::read(&mut self.reader, self.num_channels)?;
            let stations = (record.station1, record.station2);
            if record.is_auto() && !self.options.include_autos {
                continue;
            }
            if let Err(reason) = record.check_finite() {
                warn!("Skipping record in slice {}: {}", header.slice_nr, reason);
                aggregate.push_skipped(stations, record.selector);
                continue;
            }

            let stats = if record.is_auto() {
                BaselineStats::Auto(auto_amplitude(&record.spectrum)?)
            } else {
                let engine = self.engine.as_ref().ok_or(FringeError::InvalidSpectrum {
                    len: record.spectrum.len(),
                })?;
                BaselineStats::Cross(engine.fringe_stats(&record.spectrum)?)
            };
            aggregate.push_baseline(
                stations,
                BaselineResult {
                    weight: record.weight,
                    selector: record.selector,
                    stats,
                },
            );
        }
        Ok(())
    }
}

impl<R: Read + Seek> Iterator for TimeSliceWalker<R> {
    type Item = Result<TimeSlice, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_slice().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use approx::assert_abs_diff_eq;
    use rustfft::num_complex::Complex;

    use super::*;
    use crate::{
        constants::MAX_STATIONS,
        io::{header::NameTable, records::ChannelSelector},
        test_common::{GlobalHeaderSpec, SliceSpec, SyntheticStream},
    };

    fn walker(stream: SyntheticStream, options: DecodeOptions) -> TimeSliceWalker<Cursor<Vec<u8>>> {
        let mut cursor = Cursor::new(stream.into_bytes());
        let header = GlobalHeader::read(&mut cursor).unwrap();
        TimeSliceWalker::new(cursor, &header, options)
    }

    fn dc_spectrum(num_channels: usize) -> Vec<Complex<f32>> {
        vec![Complex::new(1.0, 0.0); num_channels + 1]
    }

    #[test]
    fn test_runs_with_same_id_are_one_slice() {
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        stream.push_slice(SliceSpec::new(5).baseline(1, 0, 1, 0, dc_spectrum(4)));
        stream.push_slice(SliceSpec::new(5).baseline(1, 0, 2, 0, dc_spectrum(4)));
        stream.push_slice(SliceSpec::new(6).baseline(1, 1, 2, 0, dc_spectrum(4)));
        let total = stream.len();

        let mut walker = walker(stream, DecodeOptions::default());
        let first = walker.next_slice().unwrap().unwrap();
        assert_eq!(first.slice_nr, 5);
        assert_eq!(
            first.aggregate.baselines.keys().copied().collect::<Vec<_>>(),
            vec![(0, 1), (0, 2)]
        );

        let second = walker.next_slice().unwrap().unwrap();
        assert_eq!(second.slice_nr, 6);
        assert_eq!(
            second.aggregate.baselines.keys().copied().collect::<Vec<_>>(),
            vec![(1, 2)]
        );

        assert!(walker.next_slice().unwrap().is_none());
        assert!(walker.next_slice().unwrap().is_none());
        assert_eq!(walker.slices_read(), 2);
        let cursor = walker.into_inner();
        assert_eq!(cursor.position() as usize, total);
    }

    #[test]
    fn test_records_land_in_maps() {
        let stat = StatRecord {
            station_nr: 1,
            frequency_nr: 0,
            sideband: 1,
            polarisation: 0,
            levels: [25, 25, 25, 25, 0],
        };
        let uvw = UvwRecord {
            station_nr: 1,
            source_nr: 0,
            u: 10.0,
            v: -20.0,
            w: 30.0,
        };
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 8));
        stream.push_slice(
            SliceSpec::new(0)
                .uvw(uvw)
                .stat(stat)
                .baseline(7, 0, 1, 0b1001, dc_spectrum(8)),
        );

        let slice = walker(stream, DecodeOptions::default())
            .next_slice()
            .unwrap()
            .unwrap();
        let agg = slice.aggregate;
        assert_eq!(agg.uvw[1], vec![uvw]);
        assert_eq!(agg.stats[1].len(), 1);
        assert_abs_diff_eq!(agg.stats[1][0].level_fractions[0], 0.25, epsilon = 1e-5);

        let results = &agg.baselines[&(0, 1)];
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].weight, 7);
        assert_eq!(results[0].selector, ChannelSelector::from(0b1001));
        match results[0].stats {
            BaselineStats::Cross(stats) => {
                assert_abs_diff_eq!(stats.amplitude, 1.0, epsilon = 1e-9);
                assert_eq!(stats.offset_samples, 0);
            }
            other => panic!("expected cross stats, got {other:?}"),
        }
    }

    #[test]
    fn test_nan_payload_is_skipped() {
        let mut bad = dc_spectrum(4);
        bad[2].re = f32::NAN;
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        stream.push_slice(
            SliceSpec::new(1)
                .baseline(1, 0, 1, 0, bad)
                .baseline(1, 0, 2, 0, dc_spectrum(4)),
        );
        stream.push_slice(SliceSpec::new(2).baseline(1, 0, 1, 0, dc_spectrum(4)));

        let mut walker = walker(stream, DecodeOptions::default());
        let first = walker.next_slice().unwrap().unwrap();
        assert!(!first.aggregate.baselines.contains_key(&(0, 1)));
        assert!(first.aggregate.baselines.contains_key(&(0, 2)));
        assert_eq!(first.aggregate.skipped.len(), 1);
        assert_eq!(first.aggregate.skipped[0].stations, (0, 1));

        // the bad payload was still consumed
        let second = walker.next_slice().unwrap().unwrap();
        assert_eq!(second.slice_nr, 2);
        assert!(second.aggregate.baselines.contains_key(&(0, 1)));
    }

    #[test]
    fn test_autos_only_when_requested() {
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        stream.push_slice(
            SliceSpec::new(0)
                .baseline(1, 3, 3, 0, vec![Complex::new(2.0, 0.0); 5])
                .baseline(1, 0, 3, 0, dc_spectrum(4)),
        );

        let slice = walker(stream.clone(), DecodeOptions::default())
            .next_slice()
            .unwrap()
            .unwrap();
        assert!(!slice.aggregate.baselines.contains_key(&(3, 3)));
        assert!(slice.aggregate.baselines.contains_key(&(0, 3)));

        let options = DecodeOptionsBuilder::default()
            .include_autos(true)
            .build()
            .unwrap();
        let slice = walker(stream, options).next_slice().unwrap().unwrap();
        match slice.aggregate.baselines[&(3, 3)][0].stats {
            BaselineStats::Auto(auto) => assert_abs_diff_eq!(auto.real, 2.0),
            other => panic!("expected auto amplitude, got {other:?}"),
        }
    }

    #[test]
    fn test_nan_auto_payload_is_skipped() {
        let mut bad = vec![Complex::new(2.0, 0.0); 5];
        bad[0].im = f32::INFINITY;
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        stream.push_slice(
            SliceSpec::new(0)
                .baseline(1, 3, 3, 0b10, bad)
                .baseline(1, 2, 2, 0, vec![Complex::new(1.0, 0.0); 5]),
        );

        let options = DecodeOptionsBuilder::default()
            .include_autos(true)
            .build()
            .unwrap();
        let slice = walker(stream, options).next_slice().unwrap().unwrap();
        let agg = slice.aggregate;
        assert!(!agg.baselines.contains_key(&(3, 3)));
        assert!(agg.baselines.contains_key(&(2, 2)));
        assert_eq!(agg.skipped.len(), 1);
        assert_eq!(agg.skipped[0].stations, (3, 3));
        assert_eq!(agg.skipped[0].selector, ChannelSelector::from(0b10));
    }

    #[test]
    fn test_out_of_range_uvw_station_is_skipped() {
        let uvw = |station_nr| UvwRecord {
            station_nr,
            source_nr: 0,
            u: 1.0,
            v: 2.0,
            w: 3.0,
        };
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        stream.push_slice(
            SliceSpec::new(0)
                .uvw(uvw(5_000_000))
                .uvw(uvw(i32::MAX))
                .uvw(uvw(-1))
                .uvw(uvw(256))
                .uvw(uvw(255))
                .baseline(1, 0, 1, 0, dc_spectrum(4)),
        );

        let slice = walker(stream, DecodeOptions::default())
            .next_slice()
            .unwrap()
            .unwrap();
        let agg = slice.aggregate;
        assert_eq!(agg.uvw.len(), MAX_STATIONS);
        assert_eq!(agg.uvw[255], vec![uvw(255)]);
        assert_eq!(agg.uvw.iter().map(Vec::len).sum::<usize>(), 1);
        // the records after the skipped ones are still aligned
        assert!(agg.baselines.contains_key(&(0, 1)));
    }

    #[test]
    fn test_partial_trailing_header_is_end() {
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        stream.push_slice(SliceSpec::new(3).baseline(1, 0, 1, 0, dc_spectrum(4)));
        stream.push_raw(&[1, 2, 3, 4, 5]);

        let slices: Vec<_> = walker(stream, DecodeOptions::default())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].slice_nr, 3);
    }

    #[test]
    fn test_truncated_slice_is_end_of_stream() {
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        stream.push_slice(SliceSpec::new(0).baseline(1, 0, 1, 0, dc_spectrum(4)));
        stream.push_slice(SliceSpec::new(1).baseline(1, 0, 1, 0, dc_spectrum(4)));
        stream.truncate(stream.len() - 10);

        let mut walker = walker(stream, DecodeOptions::default());
        assert_eq!(walker.next_slice().unwrap().unwrap().slice_nr, 0);
        let err = walker.next_slice().unwrap_err();
        assert!(err.is_end_of_stream(), "{err}");
        assert!(walker.next_slice().unwrap().is_none());
        assert_eq!(walker.slices_read(), 1);
    }

    #[test]
    fn test_empty_stream() {
        let stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        let mut walker = walker(stream, DecodeOptions::default());
        assert!(walker.next().is_none());
        assert_eq!(walker.slices_read(), 0);
    }

    #[test]
    fn test_station_maps_sized_from_names() {
        let mut spec = GlobalHeaderSpec::basic("T", 4);
        spec.branch = Some(("trunk".into(), 0, 0));
        spec.names = Some(NameTable::new(
            vec!["Ef".into(), "Wb".into()],
            vec!["3C84".into()],
        ));
        let mut stream = SyntheticStream::new(spec);
        stream.push_slice(SliceSpec::new(0));
        let slice = walker(stream, DecodeOptions::default())
            .next_slice()
            .unwrap()
            .unwrap();
        assert_eq!(slice.aggregate.stats.len(), 2);

        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("T", 4));
        stream.push_slice(SliceSpec::new(0));
        let slice = walker(stream, DecodeOptions::default())
            .next_slice()
            .unwrap()
            .unwrap();
        assert_eq!(slice.aggregate.stats.len(), DEFAULT_STATION_COUNT);
    }

    #[test]
    fn test_decode_options_display() {
        let display = format!("{}", DecodeOptions::default());
        assert!(display.contains("Will not compute auto-correlation amplitudes."));
        assert!(display.contains("5%"));
        assert_eq!(
            DecodeOptionsBuilder::default().build().unwrap(),
            DecodeOptions::default()
        );
    }
}
