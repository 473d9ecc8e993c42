//! Helpers for encoding and decoding the big-endian byte-oriented data used
//! throughout the cell and relay-cell wire formats.
//!
//! Unlike `std::io::Read`/`Write`, [`Reader`] and [`Writer`] work purely
//! in memory, with a simple error type meant for parsing fixed-format
//! protocol data rather than arbitrary streams.

#![warn(missing_docs)]

mod err;
mod reader;
mod secretbuf;
mod writer;

pub use err::{EncodeError, Error};
pub use reader::Reader;
pub use secretbuf::SecretBuf;
pub use writer::Writer;

/// Result type used for [`Reader`]-related methods.
pub type Result<T> = std::result::Result<T, Error>;
/// Result type used for [`Writer`]-related methods.
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

/// Trait for objects that can be written onto a [`Writer`].
pub trait Writeable {
    /// Encode `self` onto `w`.
    fn write_onto<W: Writer + ?Sized>(&self, w: &mut W) -> EncodeResult<()>;
}

/// Trait for objects that can be parsed out of a [`Reader`].
pub trait Readable: Sized {
    /// Try to extract an instance of `Self` from `r`.
    fn take_from(r: &mut Reader<'_>) -> Result<Self>;
}

macro_rules! impl_uint {
    ($t:ty, $take:ident, $write:ident, $n:expr) => {
        impl Readable for $t {
            fn take_from(r: &mut Reader<'_>) -> Result<Self> {
                r.$take()
            }
        }
        impl Writeable for $t {
            fn write_onto<W: Writer + ?Sized>(&self, w: &mut W) -> EncodeResult<()> {
                w.$write(*self);
                Ok(())
            }
        }
    };
}

impl_uint!(u8, take_u8, write_u8, 1);
impl_uint!(u16, take_u16, write_u16, 2);
impl_uint!(u32, take_u32, write_u32, 4);
impl_uint!(u64, take_u64, write_u64, 8);
