//! # Utility Functions and Types
//!
//! Low-level helpers shared by the transport stream parsers:
//!
//! - Bounds-checked byte reading over packet and section buffers
//! - CRC calculation and validation for PSI sections
//!
//! ## Byte Cursor
//!
//! ```rust
//! use tsaudio::utils::{ByteCursor, Structure};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let section = [0x02, 0xB0, 0x12];
//! let mut cursor = ByteCursor::new(&section, Structure::Pmt);
//!
//! let table_id = cursor.read_u8()?;
//! let section_length = cursor.read_length12()?;
//! assert_eq!((table_id, section_length), (0x02, 0x12));
//! # Ok(())
//! # }
//! ```
//!
//! ## CRC Calculation
//!
//! ```rust
//! use tsaudio::utils::Crc32Mpeg2;
//!
//! # fn main() {
//! let crc = Crc32Mpeg2::new();
//! println!("CRC32: {:08x}", crc.calculate(b"Hello, world!"));
//! # }
//! ```

/// Bounds-checked byte cursor
pub mod cursor;

/// CRC calculation implementations
pub mod crc;

pub use crc::Crc32Mpeg2;
pub use cursor::{ByteCursor, Structure};
