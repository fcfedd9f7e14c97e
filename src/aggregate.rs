// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-slice accumulation of decoded statistics, keyed for reporting.

use std::collections::BTreeMap;

use crate::{
    constants::{MAX_STATIONS, NUM_LEVELS},
    fringe::{AutoAmplitude, FringeStats},
    io::records::{ChannelSelector, StatRecord, UvwRecord},
};

/// Sampler statistics of one station stream in one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatEntry {
    /// Frequency channel index
    pub frequency_nr: u8,
    /// Sideband flag
    pub sideband: u8,
    /// Polarisation index
    pub polarisation: u8,
    /// Raw level counts
    pub levels: [i32; NUM_LEVELS],
    /// Level counts as fractions of their total
    pub level_fractions: [f64; NUM_LEVELS],
}

impl From<&StatRecord> for StatEntry {
    fn from(record: &StatRecord) -> Self {
        Self {
            frequency_nr: record.frequency_nr,
            sideband: record.sideband,
            polarisation: record.polarisation,
            levels: record.levels,
            level_fractions: record.level_fractions(),
        }
    }
}

/// What was computed for one baseline spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineStats {
    /// Fringe statistics of a cross-correlation
    Cross(FringeStats),
    /// Averages of an auto-correlation
    Auto(AutoAmplitude),
}

/// One entry of the per-baseline results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineResult {
    /// Accumulation count of the record
    pub weight: i32,
    /// Channel and polarisation of the spectrum
    pub selector: ChannelSelector,
    /// The statistics themselves
    pub stats: BaselineStats,
}

/// A baseline record that was dropped because its payload was not finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedBaseline {
    /// The station pair
    pub stations: (u8, u8),
    /// Channel and polarisation of the spectrum
    pub selector: ChannelSelector,
}

/// Everything decoded from one time slice.
///
/// Station-indexed maps are sized up front and grow when a record names a
/// larger station index, up to [`MAX_STATIONS`] slots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SliceAggregate {
    /// Sampler statistics, indexed by station
    pub stats: Vec<Vec<StatEntry>>,
    /// UVW coordinates, indexed by station
    pub uvw: Vec<Vec<UvwRecord>>,
    /// Per-baseline results, ordered by station pair
    pub baselines: BTreeMap<(u8, u8), Vec<BaselineResult>>,
    /// Baseline records skipped for non-finite payloads
    pub skipped: Vec<SkippedBaseline>,
}

fn slot<T>(map: &mut Vec<Vec<T>>, station: usize) -> &mut Vec<T> {
    if station >= map.len() {
        map.resize_with(station + 1, Vec::new);
    }
    &mut map[station]
}

impl SliceAggregate {
    /// Create empty maps for `num_stations` stations, at most [`MAX_STATIONS`].
    pub fn new(num_stations: usize) -> Self {
        let num_stations = num_stations.min(MAX_STATIONS);
        Self {
            stats: vec![Vec::new(); num_stations],
            uvw: vec![Vec::new(); num_stations],
            baselines: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }

    /// Empty every map, keeping the station slots.
    pub fn clear(&mut self) {
        self.stats.iter_mut().for_each(Vec::clear);
        self.uvw.iter_mut().for_each(Vec::clear);
        self.baselines.clear();
        self.skipped.clear();
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.stats.iter().all(Vec::is_empty)
            && self.uvw.iter().all(Vec::is_empty)
            && self.baselines.is_empty()
            && self.skipped.is_empty()
    }

    /// Record the sampler statistics of one station stream.
    pub fn push_stat(&mut self, record: &StatRecord) {
        slot(&mut self.stats, record.station_nr as usize).push(StatEntry::from(record));
    }

    /// Record the UVW coordinates of station `station`.
    pub fn push_uvw(&mut self, station: u8, record: UvwRecord) {
        slot(&mut self.uvw, station as usize).push(record);
    }

    /// Record the result for one baseline spectrum.
    pub fn push_baseline(&mut self, stations: (u8, u8), result: BaselineResult) {
        self.baselines.entry(stations).or_default().push(result);
    }

    /// Record a dropped baseline spectrum.
    pub fn push_skipped(&mut self, stations: (u8, u8), selector: ChannelSelector) {
        self.skipped.push(SkippedBaseline { stations, selector });
    }

    /// The stations with any sampler statistics, with their entries.
    pub fn stations_with_stats(&self) -> impl Iterator<Item = (usize, &[StatEntry])> + '_ {
        self.stats
            .iter()
            .enumerate()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(station, entries)| (station, entries.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(station_nr: u8) -> StatRecord {
        StatRecord {
            station_nr,
            frequency_nr: 0,
            sideband: 0,
            polarisation: 0,
            levels: [1, 2, 3, 4, 0],
        }
    }

    #[test]
    fn test_maps_are_presized() {
        let agg = SliceAggregate::new(4);
        assert_eq!(agg.stats.len(), 4);
        assert_eq!(agg.uvw.len(), 4);
        assert!(agg.is_empty());
    }

    #[test]
    fn test_maps_grow_past_hint() {
        let mut agg = SliceAggregate::new(2);
        agg.push_stat(&stat(5));
        assert_eq!(agg.stats.len(), 6);
        assert_eq!(agg.stats[5].len(), 1);
        assert_eq!(agg.stations_with_stats().map(|(s, _)| s).collect::<Vec<_>>(), vec![5]);

        agg.push_uvw(
            9,
            UvwRecord {
                station_nr: 9,
                source_nr: 2,
                u: 0.0,
                v: 0.0,
                w: 0.0,
            },
        );
        assert_eq!(agg.uvw.len(), 10);
        assert_eq!(agg.uvw[9][0].source_nr, 2);
    }

    #[test]
    fn test_maps_never_exceed_station_range() {
        let mut agg = SliceAggregate::new(MAX_STATIONS + 10);
        assert_eq!(agg.uvw.len(), MAX_STATIONS);
        agg.push_stat(&stat(u8::MAX));
        agg.push_uvw(
            u8::MAX,
            UvwRecord {
                station_nr: 255,
                source_nr: 0,
                u: 0.0,
                v: 0.0,
                w: 0.0,
            },
        );
        assert_eq!(agg.stats.len(), MAX_STATIONS);
        assert_eq!(agg.uvw.len(), MAX_STATIONS);
    }

    #[test]
    fn test_baselines_are_ordered() {
        let mut agg = SliceAggregate::new(0);
        let result = BaselineResult {
            weight: 1,
            selector: ChannelSelector::from(0),
            stats: BaselineStats::Auto(AutoAmplitude {
                real: 1.0,
                imag: 0.0,
            }),
        };
        agg.push_baseline((2, 3), result);
        agg.push_baseline((0, 1), result);
        agg.push_baseline((2, 3), result);
        let keys: Vec<_> = agg.baselines.keys().copied().collect();
        assert_eq!(keys, vec![(0, 1), (2, 3)]);
        assert_eq!(agg.baselines[&(2, 3)].len(), 2);

        agg.clear();
        assert!(agg.is_empty());
    }
}
