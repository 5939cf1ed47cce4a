//! The RFB wire codec: pure `from_bytes`/`to_bytes` functions over byte
//! readers/writers for every message type the client and recorder need.

mod message;
mod rectangle;
pub mod tight;

pub use message::{
    ClientInit, Encoding, SecurityResult, SecurityType, SecurityTypes, ServerInit, Version, C2S,
    S2C,
};
pub use rectangle::{CopyRect, RectangleHeader};

use std::io::{Read, Write};

use crate::error::Result;

/// Anything that can be read from and written to an RFB byte stream.
pub trait Message: Sized {
    fn read_from<R: Read>(reader: &mut R) -> Result<Self>;
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()>;
}
