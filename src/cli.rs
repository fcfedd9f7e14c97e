// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command Line Interface helpers for corfringe

use std::{
    ffi::OsString,
    fmt::{Debug, Display},
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    path::PathBuf,
};

use clap::{arg, command, PossibleValue, ValueHint::FilePath};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, trace, warn};

use crate::{
    aggregate::{BaselineStats, SliceAggregate},
    epoch::StartEpoch,
    error::{CLIError::InvalidCommandLineArgument, CorFringeError, CorFringeError::DryRun},
    fringe::OffsetConvention,
    io::header::{GlobalHeader, HeaderVersion, NameTable},
    slice::{DecodeOptions, TimeSliceWalker},
};

/// Args for decoding a correlator output file.
#[derive(Debug)]
pub struct CorFringeContext {
    /// Path to the correlator output
    pub input: PathBuf,
    /// The global header, as read by [`CorFringeContext::from_args`]
    pub header: GlobalHeader,
    /// Decoding parameters
    pub options: DecodeOptions,
    /// How fringe offsets are reported
    pub offset_convention: OffsetConvention,
    /// Labels for stations and sources
    pub names: NameTable,
    /// Whether to draw a progress bar
    pub draw_progress: bool,
}

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write many info-level log lines of how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match GIT_HEAD_REF {
        Some(hr) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                GIT_COMMIT_HASH.unwrap_or("<unknown>"),
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {hr}")?;
        }
        None => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {BUILT_TIME_UTC}")?;
    writeln!(f, "         with compiler {RUSTC_VERSION}")?;
    writeln!(f)?;
    Ok(())
}

impl Display for CorFringeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        writeln!(f, "Reading correlator output from {}", self.input.display())?;
        writeln!(f, "{}", self.header)?;
        match &self.header.version {
            HeaderVersion::Basic => writeln!(
                f,
                "Global header is {} bytes, with no branch or name table.",
                self.header.header_size
            )?,
            HeaderVersion::Branched(branch) | HeaderVersion::Named(branch, _) => writeln!(
                f,
                "Global header is {} bytes, job {}.{} of branch {:?}.",
                self.header.header_size, branch.job_nr, branch.subjob_nr, branch.branch
            )?,
        }
        writeln!(
            f,
            "Integration time is {}s, output format version {}.",
            self.header.integration_time_us as f64 / 1e6,
            self.header.output_format_version
        )?;
        writeln!(
            f,
            "Will label {} stations and {} sources by name.",
            self.names.stations.len(),
            self.names.sources.len()
        )?;

        write!(f, "{}", self.options)?;
        writeln!(
            f,
            "Will report fringe offsets in {} lags.",
            match self.offset_convention {
                OffsetConvention::Oversampled => "oversampled",
                OffsetConvention::Nyquist => "Nyquist",
            }
        )?;
        writeln!(
            f,
            "{} draw progress bars.",
            if self.draw_progress {
                "Will"
            } else {
                "Will not"
            }
        )?;
        Ok(())
    }
}

/// Log the contents of one decoded time slice, in the order stations then baselines.
fn log_slice(
    slice_nr: i32,
    aggregate: &SliceAggregate,
    header: &GlobalHeader,
    start: &StartEpoch,
    names: &NameTable,
    convention: OffsetConvention,
) {
    let time = start.slice_time(slice_nr, header.integration_time_us);
    info!("---------- time slice {} ({}) ---------", slice_nr, time);

    for (station, records) in aggregate.uvw.iter().enumerate() {
        for record in records {
            let source = usize::try_from(record.source_nr)
                .map_or_else(|_| record.source_nr.to_string(), |idx| names.source_label(idx));
            debug!(
                "uvw {} -> {}: ({}, {}, {})",
                names.station_label(station),
                source,
                record.u,
                record.v,
                record.w
            );
        }
    }

    for (station, entries) in aggregate.stations_with_stats() {
        info!("Station {}", names.station_label(station));
        for entry in entries {
            let levels = entry.level_fractions;
            info!(
                "freq = {}, sb = {}, pol = {}, levels : --={:.6} -+={:.6} +-={:.6} ++={:.6} invalid={:.6}",
                entry.frequency_nr,
                entry.sideband,
                entry.polarisation,
                levels[0],
                levels[1],
                levels[2],
                levels[3],
                levels[4]
            );
        }
    }

    for (&(station1, station2), results) in &aggregate.baselines {
        info!(
            "Baseline : station1 = {}, station2 = {}",
            names.station_label(station1 as usize),
            names.station_label(station2 as usize)
        );
        for result in results {
            let sel = result.selector;
            match result.stats {
                BaselineStats::Cross(stats) => info!(
                    "freq = {}, sb = {}, pol = {}, fringe ampl = {:.6}, SNR = {:.6}, offset = {}, weight = {}",
                    sel.frequency_nr,
                    sel.sideband,
                    sel.polarisation,
                    stats.amplitude,
                    stats.snr,
                    stats.offset(convention),
                    result.weight
                ),
                BaselineStats::Auto(auto) => info!(
                    "freq = {}, sb = {}, pol = {}, auto ampl = {:.6} + {:.6}i, weight = {}",
                    sel.frequency_nr,
                    sel.sideband,
                    sel.polarisation,
                    auto.real,
                    auto.imag,
                    result.weight
                ),
            }
        }
    }
}

impl CorFringeContext {
    fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, CorFringeError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let mut app = command!()
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Decode software correlator output and report per-baseline fringe statistics.")
            .args(&[
                arg!(input: <INPUT> "Correlator output file").value_hint(FilePath),
                arg!(--"dry-run" "Just print the summary and exit"),
                arg!(--"no-draw-progress" "do not show progress bars"),

                // decoding
                arg!(--autos "Also report auto-correlation amplitudes")
                    .help_heading("DECODE"),
                arg!(--guard <FRACTION> "Fraction of lags either side of the fringe peak left out of the noise estimate")
                    .required(false)
                    .default_value("0.05")
                    .help_heading("DECODE"),
                arg!(--"offset-convention" <CONVENTION> "How to report fringe offsets")
                    .required(false)
                    .possible_values([
                        PossibleValue::new("oversampled")
                            .help("lags of the 2 * nchan point lag function"),
                        PossibleValue::new("nyquist")
                            .help("half the oversampled offset, rounded away from zero"),
                    ])
                    .default_value("nyquist")
                    .help_heading("DECODE"),

                // labels
                arg!(--"station-names" <NAMES>... "Station names, in station index order")
                    .multiple_values(true)
                    .required(false)
                    .help_heading("LABELS"),
                arg!(--"source-names" <NAMES>... "Source names, in source index order")
                    .multiple_values(true)
                    .required(false)
                    .help_heading("LABELS"),
            ]);
        let matches = app.try_get_matches_from_mut(args)?;
        Ok(matches)
    }

    fn parse_decode_matches(matches: &clap::ArgMatches) -> Result<DecodeOptions, CorFringeError> {
        let fringe_guard = matches.value_of_t::<f64>("guard")?;
        if !(0.0..0.5).contains(&fringe_guard) {
            return Err(InvalidCommandLineArgument {
                option: "--guard <FRACTION>".into(),
                expected: "a fraction in [0, 0.5)".into(),
                received: format!("{fringe_guard}"),
            }
            .into());
        }
        Ok(DecodeOptions {
            include_autos: matches.is_present("autos"),
            fringe_guard,
            ..DecodeOptions::default()
        })
    }

    fn parse_name_matches(matches: &clap::ArgMatches, header: &GlobalHeader) -> NameTable {
        let mut names = header.names().cloned().unwrap_or_default();
        if let Some(stations) = matches.values_of("station-names") {
            if !names.stations.is_empty() {
                info!("Overriding station names from the global header.");
            }
            names.stations = stations.map(String::from).collect();
        }
        if let Some(sources) = matches.values_of("source-names") {
            if !names.sources.is_empty() {
                info!("Overriding source names from the global header.");
            }
            names.sources = sources.map(String::from).collect();
        }
        names
    }

    /// Parse an iterator of arguments, `args` into a `CorFringeContext`,
    /// reading the global header of the input.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - `clap::Error` if clap cannot parse `args`
    /// - `std::io::Error` if the input can't be opened
    /// - `DecodeError` if the global header is unreadable
    /// - `CLIError` if the arguments are invalid
    /// - `DryRun` if `--dry-run` was given
    pub fn from_args<I, T>(args: I) -> Result<Self, CorFringeError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let input = match matches.value_of_t::<PathBuf>("input") {
            Ok(path) => path,
            _ => unreachable!("<INPUT> is required, enforced by clap"),
        };
        let options = Self::parse_decode_matches(&matches)?;
        let offset_convention = match matches.value_of("offset-convention") {
            Some("oversampled") => OffsetConvention::Oversampled,
            _ => OffsetConvention::Nyquist,
        };

        let mut reader = BufReader::new(File::open(&input)?);
        let header = GlobalHeader::read(&mut reader)?;
        let names = Self::parse_name_matches(&matches, &header);

        let result = Self {
            input,
            header,
            options,
            offset_convention,
            names,
            draw_progress: !matches.is_present("no-draw-progress"),
        };

        info!("{}", &result);

        if matches.is_present("dry-run") {
            return Err(DryRun {});
        }

        Ok(result)
    }

    /// Decode every time slice of the input and log its statistics.
    ///
    /// A final slice cut short by the end of the file is dropped with a warning.
    /// Returns the number of slices decoded.
    ///
    /// # Errors
    ///
    /// can raise:
    /// - `std::io::Error` if the input can't be read
    /// - `DecodeError` for corrupt records
    pub fn run(self) -> Result<usize, CorFringeError> {
        let CorFringeContext {
            input,
            header,
            options,
            offset_convention,
            names,
            draw_progress,
        } = self;

        let file = File::open(&input)?;
        let total_bytes = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(header.header_size as u64))?;

        let draw_target = if draw_progress {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let progress = ProgressBar::with_draw_target(Some(total_bytes), draw_target)
            .with_position(header.header_size as u64)
            .with_message("time slices");
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{msg:16}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta:5})",
        ) {
            progress.set_style(style.progress_chars("=> "));
        }

        let start = header.start_epoch();
        let mut walker = TimeSliceWalker::new(reader, &header, options);
        let mut aggregate = SliceAggregate::new(walker.num_stations());
        loop {
            match walker.next_slice_into(&mut aggregate) {
                Ok(Some(slice_nr)) => log_slice(
                    slice_nr,
                    &aggregate,
                    &header,
                    &start,
                    &names,
                    offset_convention,
                ),
                Ok(None) => break,
                Err(e) if e.is_end_of_stream() => {
                    warn!("Dropping the final, incomplete time slice: {}", e);
                    break;
                }
                Err(e) => {
                    progress.abandon();
                    return Err(e.into());
                }
            }
            progress.set_position(walker.get_mut().stream_position()?);
        }
        progress.finish();

        info!("Reached end of file after {} time slices", walker.slices_read());
        Ok(walker.slices_read())
    }
}
