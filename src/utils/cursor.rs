use crate::error::{ExtractError, Result};

/// The structure a [`ByteCursor`] walks over.
///
/// Decides which error an out-of-bounds read turns into, so a PMT that lies
/// about its length surfaces as a malformed table and not as a PES problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    /// Program Association Table section.
    Pat,
    /// Program Map Table section.
    Pmt,
    /// PES packet header.
    Pes,
    /// Transport packet header and adaptation field.
    Packet,
}

impl Structure {
    /// Builds the error reported for a malformed instance of this structure.
    pub fn malformed(self, reason: impl Into<String>) -> ExtractError {
        let reason = reason.into();
        match self {
            Structure::Pat => ExtractError::MalformedTable {
                table: "PAT",
                reason,
            },
            Structure::Pmt => ExtractError::MalformedTable {
                table: "PMT",
                reason,
            },
            Structure::Pes => ExtractError::MalformedPes(reason),
            Structure::Packet => ExtractError::MalformedPacket(reason),
        }
    }
}

/// A bounds-checked big-endian reader over a byte slice.
///
/// Every read validates `position + width <= len` first and fails with the
/// structure's malformed error instead of reading past the end.
///
/// Example:
/// ```
/// use tsaudio::utils::{ByteCursor, Structure};
///
/// let data = [0x00, 0xB0, 0x0D, 0xE1, 0x00];
/// let mut cursor = ByteCursor::new(&data, Structure::Pat);
///
/// assert_eq!(cursor.read_u8().unwrap(), 0x00);
/// assert_eq!(cursor.read_length12().unwrap(), 13);
/// assert_eq!(cursor.read_pid().unwrap(), 0x0100);
/// assert!(cursor.read_u8().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
    structure: Structure,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor positioned at the first byte of `data`.
    pub fn new(data: &'a [u8], structure: Structure) -> Self {
        ByteCursor {
            data,
            position: 0,
            structure,
        }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total length of the underlying slice.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the end of the slice.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn ensure(&self, width: usize) -> Result<()> {
        if self.position + width > self.data.len() {
            return Err(self.structure.malformed(format!(
                "need {} byte(s) at offset {}, only {} available",
                width,
                self.position,
                self.remaining()
            )));
        }
        Ok(())
    }

    /// Moves the cursor to an absolute offset. Seeking to `len()` is allowed.
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(self.structure.malformed(format!(
                "offset {} is past the end ({} bytes)",
                position,
                self.data.len()
            )));
        }
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.position += n;
        Ok(())
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.data[self.position])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.peek_u8()?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        let value =
            ((self.data[self.position] as u16) << 8) | self.data[self.position + 1] as u16;
        self.position += 2;
        Ok(value)
    }

    /// Reads a 13-bit PID from two bytes, discarding the 3 reserved bits.
    pub fn read_pid(&mut self) -> Result<u16> {
        Ok(self.read_u16()? & 0x1FFF)
    }

    /// Reads a 12-bit length field from two bytes, discarding the top nibble.
    pub fn read_length12(&mut self) -> Result<usize> {
        Ok((self.read_u16()? & 0x0FFF) as usize)
    }

    /// Borrows the next `n` bytes and advances past them.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }
}
