// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Input data file format modules
//!
//! Correlator output is a global header followed by a run of time slices,
//! each of which is a time slice header and its UVW, bit statistics and
//! baseline records. See [`header`] and [`records`].

pub mod error;
pub mod header;
pub mod records;

use std::io::{self, Read};

use self::error::DecodeError;

/// Extend the `Read` trait with a read that fills as much of a buffer as the
/// stream allows, distinguishing a short read from an I/O failure.
pub trait ReadFullExt: Read {
    /// Like `Read::read_exact`, except a short read is not an error: it
    /// returns the number of bytes actually placed in `buf`, which is less
    /// than `buf.len()` only if the stream ended.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error other than `Interrupted`.
    fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Fill `buf` completely or fail with [`DecodeError::EndOfStream`] naming
    /// the `record` being read.
    ///
    /// # Errors
    ///
    /// [`DecodeError::EndOfStream`] on a short read, [`DecodeError::IO`] otherwise.
    fn read_record(&mut self, buf: &mut [u8], record: &'static str) -> Result<(), DecodeError> {
        let found = self.read_full(buf)?;
        if found < buf.len() {
            return Err(DecodeError::EndOfStream {
                record,
                expected: buf.len(),
                found,
            });
        }
        Ok(())
    }
}

impl<R: Read + ?Sized> ReadFullExt for R {
    fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut ofs = 0;
        while ofs < buf.len() {
            match self.read(&mut buf[ofs..]) {
                Ok(0) => break,
                Ok(n) => ofs += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(ofs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;

    /// A reader that hands out at most `chunk` bytes per call.
    struct Trickle<R> {
        inner: R,
        chunk: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_read_full_across_short_reads() {
        let mut reader = Trickle {
            inner: Cursor::new((0u8..20).collect::<Vec<_>>()),
            chunk: 3,
        };
        let mut buf = [0u8; 16];
        assert_eq!(reader.read_full(&mut buf).unwrap(), 16);
        assert_eq!(buf[15], 15);

        let mut buf = [0u8; 16];
        assert_eq!(reader.read_full(&mut buf).unwrap(), 4);
    }

    #[test]
    fn test_read_record_short() {
        let mut reader = Cursor::new(vec![0u8; 10]);
        let mut buf = [0u8; 16];
        match reader.read_record(&mut buf, "time slice header") {
            Err(DecodeError::EndOfStream {
                record,
                expected,
                found,
            }) => {
                assert_eq!(record, "time slice header");
                assert_eq!(expected, 16);
                assert_eq!(found, 10);
            }
            other => panic!("expected EndOfStream, got {other:?}"),
        }
    }
}
