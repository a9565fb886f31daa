//! A collection of functions which allow for better debug output.

use crate::setup::SetupPacket;
use std::fmt::{Debug, Display, Formatter, LowerHex, Result as FmtResult};

/// Just a thin wrapper to allow for printing in hexadecimal
#[derive(Clone)]
pub struct DbgBuf<'a>(pub &'a [u8]);

impl Debug for DbgBuf<'_> {
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      if self.0.is_empty() {
         return f.write_str("[]");
      }

      f.write_str("[ ")?;
      f.write_fmt(format_args!("{:02x}", self))?;
      f.write_str("]")
   }
}

impl Display for DbgBuf<'_> {
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      Debug::fmt(self, f)
   }
}

impl LowerHex for DbgBuf<'_> {
   fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
      for byte in self.0 {
         (fmt.write_fmt(format_args!("{:02x} ", byte)))?;
      }
      Ok(())
   }
}

#[derive(Clone)]
pub struct DbgEmpty;

impl Debug for DbgEmpty {
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      f.write_str("(empty)")
   }
}

/// Prints the raw setup block of a submit command as a decoded setup packet.
#[derive(Clone)]
pub struct DbgSetup<'a>(pub &'a [u8; 8]);

impl Debug for DbgSetup<'_> {
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      if self.0 == &[0; 8] {
         return Debug::fmt(&DbgEmpty, f);
      }

      Debug::fmt(&SetupPacket::from_bytes(self.0), f)
   }
}
