// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use clap::ErrorKind::{DisplayHelp, DisplayVersion};
use corfringe::{
    CorFringeContext,
    CorFringeError::{ClapError, DryRun},
};
use log::{info, trace};
use std::{env, ffi::OsString, fmt::Debug};

fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    I: Debug,
{
    let ctx = match CorFringeContext::from_args(args) {
        Ok(ctx) => ctx,
        Err(DryRun {}) => {
            info!("Dry run. No time slices will be decoded.");
            return 0;
        }
        Err(ClapError(inner)) => {
            // Swallow broken pipe errors
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                DisplayHelp | DisplayVersion => return 0,
                _ => return 1,
            }
        }
        Err(e) => {
            eprintln!("error parsing args: {e}");
            return 1;
        }
    };

    match ctx.run() {
        Ok(num_slices) => {
            info!("decoded {} time slices", num_slices);
            0
        }
        Err(e) => {
            eprintln!("decoding error: {e}");
            1
        }
    }
}

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    trace!("start main");
    let retcode = main_with_args(env::args());
    trace!("end main");
    std::process::exit(retcode);
}

#[cfg(test)]
mod tests {
    use corfringe::{
        test_common::{GlobalHeaderSpec, SliceSpec, SyntheticStream},
        Complex,
    };
    use tempfile::tempdir;

    use super::main_with_args;

    #[test]
    fn main_with_version_succeeds() {
        assert_eq!(main_with_args(["corfringe", "--version"]), 0);
    }

    #[test]
    fn main_with_help_succeeds() {
        assert_eq!(main_with_args(["corfringe", "--help"]), 0);
    }

    #[test]
    fn main_with_missing_file_returns_1() {
        assert_ne!(main_with_args(["corfringe", "does/not/exist.cor"]), 0);
    }

    #[test]
    fn main_decodes_file() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("eg078b.cor");
        let mut stream = SyntheticStream::new(GlobalHeaderSpec::basic("EG078B", 16));
        stream.push_slice(SliceSpec::new(0).baseline(1, 0, 1, 0, vec![Complex::new(1.0, 0.0); 17]));
        stream.write_to(&path).unwrap();

        let path = path.to_str().unwrap();
        assert_eq!(main_with_args(["corfringe", path, "--dry-run"]), 0);
        assert_eq!(main_with_args(["corfringe", path, "--no-draw-progress"]), 0);
    }
}
