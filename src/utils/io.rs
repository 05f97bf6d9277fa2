/*!
Error-checked binary stream wrappers.

The block codecs chain many small fixed-width reads and writes. Wrapping the
underlying stream with a sticky first-error keeps that code linear: once an
operation fails, every later operation is skipped and the first failure is
surfaced at the end. A buffer produced through a writer that recorded an
error must be discarded by the caller.

Fixed-width integers are encoded little-endian via the
[`integer_encoding::FixedInt`] trait, so the same generic methods cover every
integer width used by the file formats.
*/

use std::io::{self, Read, Write};

use integer_encoding::FixedInt;

/// A writer that records the first error and ignores all writes after it.
pub(crate) struct ErrorWriter<W: Write> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> ErrorWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    /// Write a fixed-width integer in little-endian encoding.
    pub(crate) fn write_fixed<T: FixedInt>(&mut self, value: T) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.inner.write_all(&value.encode_fixed_vec()) {
            self.error = Some(error);
        }
    }

    /// Write a raw byte slice.
    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.inner.write_all(bytes) {
            self.error = Some(error);
        }
    }

    /// Consume the writer, returning the first recorded error if there was one.
    pub(crate) fn finish(self) -> io::Result<W> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.inner),
        }
    }
}

/// A reader that records the first error and ignores all reads after it.
pub(crate) struct ErrorReader<R: Read> {
    inner: R,
    error: Option<io::Error>,
}

impl<R: Read> ErrorReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, error: None }
    }

    /**
    Read a fixed-width little-endian integer.

    Returns the integer's default value (zero) if an error was previously
    recorded or occurs during this read.
    */
    pub(crate) fn read_fixed<T: FixedInt + Default>(&mut self) -> T {
        if self.error.is_some() {
            return T::default();
        }

        let mut buffer = [0_u8; 8];
        let width = T::required_space();
        match self.inner.read_exact(&mut buffer[..width]) {
            Ok(()) => T::decode_fixed(&buffer[..width]),
            Err(error) => {
                self.error = Some(error);
                T::default()
            }
        }
    }

    /// Read exactly `length` raw bytes. Returns an empty vector after an error.
    pub(crate) fn read_bytes(&mut self, length: usize) -> Vec<u8> {
        if self.error.is_some() {
            return vec![];
        }

        let mut buffer = vec![0_u8; length];
        match self.inner.read_exact(&mut buffer) {
            Ok(()) => buffer,
            Err(error) => {
                self.error = Some(error);
                vec![]
            }
        }
    }

    /// Get the first recorded error, if any.
    pub(crate) fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    /// Consume the reader, returning the first recorded error if there was one.
    pub(crate) fn finish(self) -> io::Result<()> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl<'a> ErrorReader<&'a [u8]> {
    /// The number of unread bytes. Only meaningful for in-memory readers.
    pub(crate) fn remaining(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fixed_width_round_trip() {
        let mut writer = ErrorWriter::new(Vec::new());
        writer.write_fixed(0xdead_beef_u32);
        writer.write_fixed(42_u16);
        writer.write_fixed(u64::MAX);
        writer.write_bytes(b"tail");
        let buffer = writer.finish().unwrap();

        let mut reader = ErrorReader::new(buffer.as_slice());
        assert_eq!(reader.read_fixed::<u32>(), 0xdead_beef);
        assert_eq!(reader.read_fixed::<u16>(), 42);
        assert_eq!(reader.read_fixed::<u64>(), u64::MAX);
        assert_eq!(reader.read_bytes(4), b"tail");
        assert_eq!(reader.remaining(), 0);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn reader_sticks_on_first_error() {
        let short: &[u8] = &[0x01, 0x02];
        let mut reader = ErrorReader::new(short);

        // Asking for a u64 from two bytes must fail and stick.
        assert_eq!(reader.read_fixed::<u64>(), 0);
        assert!(reader.error().is_some());

        // Later reads are skipped and return defaults.
        assert_eq!(reader.read_fixed::<u16>(), 0);
        assert_eq!(reader.read_bytes(1), Vec::<u8>::new());
        assert!(reader.finish().is_err());
    }

    #[test]
    fn little_endian_layout() {
        let mut writer = ErrorWriter::new(Vec::new());
        writer.write_fixed(0x0102_0304_u32);
        let buffer = writer.finish().unwrap();
        assert_eq!(buffer, vec![0x04, 0x03, 0x02, 0x01]);
    }
}
