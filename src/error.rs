// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors that can occur in corfringe

use thiserror::Error;

pub use crate::{fringe::FringeError, io::error::DecodeError};

#[derive(Error, Debug)]
/// Errors from interpreting the command line
pub enum CLIError {
    #[error("Invalid Command Line Argument {option}. Expected {expected}, received {received}")]
    /// A value that clap accepted, but which makes no sense
    InvalidCommandLineArgument {
        /// The argument name within the `clap::App`
        option: String,
        /// Description of what was expected
        expected: String,
        /// What was received instead
        received: String,
    },
}

#[derive(Error, Debug)]
/// All the errors that can occur in corfringe
pub enum CorFringeError {
    #[error(transparent)]
    /// Error derived from [`DecodeError`]
    DecodeError(#[from] DecodeError),

    #[error(transparent)]
    /// Error derived from [`FringeError`]
    FringeError(#[from] FringeError),

    #[error(transparent)]
    /// Error derived from [`CLIError`]
    CLIError(#[from] CLIError),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    /// Error derived from [`clap::Error`]
    ClapError(#[from] clap::Error),

    #[error(transparent)]
    /// Error derived from [`std::io::Error`]
    IOError(#[from] std::io::Error),

    #[error("Dry run")]
    /// Not really an error, the input was inspected but nothing was decoded.
    DryRun {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_convert() {
        let err: CorFringeError = DecodeError::UnsupportedHeaderSize(70).into();
        assert!(matches!(
            err,
            CorFringeError::DecodeError(DecodeError::UnsupportedHeaderSize(70))
        ));
        assert_eq!(
            err.to_string(),
            "Unsupported global header size 70, expected 64, 84 or at least 92 bytes"
        );

        let err: CorFringeError = CLIError::InvalidCommandLineArgument {
            option: "--guard <FRACTION>".into(),
            expected: "a fraction in [0, 0.5)".into(),
            received: "2".into(),
        }
        .into();
        assert!(err.to_string().contains("--guard <FRACTION>"));
    }
}
