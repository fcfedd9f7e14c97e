// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wall-clock labels for time slices.
//!
//! Times are handled in the TAI scale: the correlator's calendar is a plain
//! year / day-of-year / second-of-day count with no leap seconds.

use std::fmt::{self, Display};

use hifitime::{Epoch, Unit};

/// The start of the correlated data, as declared by the global header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartEpoch {
    /// Calendar year
    pub year: i32,
    /// Day of year, 1-based
    pub day_of_year: i32,
    /// Seconds since midnight
    pub second_of_day: i64,
}

impl StartEpoch {
    /// This start time as a [`hifitime::Epoch`].
    pub fn epoch(&self) -> Epoch {
        Epoch::from_gregorian_tai_at_midnight(self.year, 1, 1)
            + Unit::Day * (self.day_of_year as i64 - 1)
            + Unit::Second * self.second_of_day
    }

    /// The wall-clock label of slice `slice_nr`, `slice_nr` integrations of
    /// `integration_time_us` microseconds after the start.
    ///
    /// Day and year boundaries roll over as the calendar does.
    pub fn slice_time(&self, slice_nr: i32, integration_time_us: i64) -> SliceTime {
        SliceTime::from_epoch(
            self.epoch() + Unit::Microsecond * (slice_nr as i64 * integration_time_us),
        )
    }
}

/// A calendar label for one time slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceTime {
    /// The instant itself
    pub epoch: Epoch,
    /// Calendar year
    pub year: i32,
    /// Day of year, 1-based
    pub day_of_year: u16,
    /// Hour of day
    pub hour: u8,
    /// Minute of hour
    pub minute: u8,
    /// Seconds of minute, including any fraction
    pub second: f64,
}

impl SliceTime {
    /// Break an epoch down into year, day of year and time of day.
    pub fn from_epoch(epoch: Epoch) -> Self {
        let (year, _, _, hour, minute, second, nanos) = epoch.to_gregorian_tai();
        let into_year = epoch - Epoch::from_gregorian_tai_at_midnight(year, 1, 1);
        let day_of_year = into_year.to_unit(Unit::Day).floor() as u16 + 1;
        Self {
            epoch,
            year,
            day_of_year,
            hour,
            minute,
            second: second as f64 + nanos as f64 / 1e9,
        }
    }

    /// Seconds since midnight, including any fraction.
    pub fn second_of_day(&self) -> f64 {
        self.hour as f64 * 3600.0 + self.minute as f64 * 60.0 + self.second
    }
}

impl Display for SliceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}y{:03}d{:02}h{:02}m{:02}s",
            self.year,
            self.day_of_year,
            self.hour,
            self.minute,
            self.second.floor() as u8
        )
    }
}
