//! Pieces shared by every message of the attached (URB) phase.

use crate::{ProtocolViolation, UsbIpError};
use bitflags::bitflags;

pub const USBIP_CMD_SUBMIT: u32 = 0x0001;
pub const USBIP_RET_SUBMIT: u32 = 0x0003;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
   Out,
   In,
}

impl Direction {
   pub fn from_u32(value: u32) -> Result<Self, ProtocolViolation> {
      match value {
         0 => Ok(Self::Out),
         1 => Ok(Self::In),
         other => Err(ProtocolViolation::InvalidDirection(other)),
      }
   }

   pub fn to_u32(self) -> u32 {
      match self {
         Self::Out => 0,
         Self::In => 1,
      }
   }
}

bitflags! {
   /// URB transfer flags as carried in a submit command.
   pub struct TransferFlags: u32 {
      const SHORT_NOT_OK = 0x0000_0001;
      const ISO_ASAP = 0x0000_0002;
      const NO_TRANSFER_DMA_MAP = 0x0000_0004;
      const NO_FSBR = 0x0000_0020;
      const ZERO_PACKET = 0x0000_0040;
      const NO_INTERRUPT = 0x0000_0080;
      const FREE_BUFFER = 0x0000_0100;
      const DIR_MASK = 0x0000_0200;
   }
}

/// The 20 byte header that starts every submit command and return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbIpHeader {
   pub command: u32,
   pub seqnum: u32,
   pub devid: u32,
   /// Raw direction word, see [`UsbIpHeader::direction`].
   pub direction: u32,
   pub ep: u32,
}

impl UsbIpHeader {
   pub const SIZE: usize = 20;

   pub fn to_array(&self) -> [u8; 20] {
      let mut result = [0; 20];

      result[0..4].copy_from_slice(&self.command.to_be_bytes());
      result[4..8].copy_from_slice(&self.seqnum.to_be_bytes());
      result[8..12].copy_from_slice(&self.devid.to_be_bytes());
      result[12..16].copy_from_slice(&self.direction.to_be_bytes());
      result[16..20].copy_from_slice(&self.ep.to_be_bytes());

      result
   }

   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      check_len("usbip header", Self::SIZE, data)?;

      Ok(Self {
         command: be_u32(data, 0),
         seqnum: be_u32(data, 4),
         devid: be_u32(data, 8),
         direction: be_u32(data, 12),
         ep: be_u32(data, 16),
      })
   }

   /// Decodes the direction word. Only 0 (OUT) and 1 (IN) are valid.
   pub fn direction(&self) -> Result<Direction, ProtocolViolation> {
      Direction::from_u32(self.direction)
   }
}

pub(crate) fn check_len(
   what: &'static str,
   expected: usize,
   data: &[u8],
) -> Result<(), UsbIpError> {
   if data.len() != expected {
      return Err(UsbIpError::Malformed {
         what,
         expected,
         actual: data.len(),
      });
   }
   Ok(())
}

// NOTE: Callers check the buffer length before reading fields
pub(crate) fn be_u16(data: &[u8], at: usize) -> u16 {
   u16::from_be_bytes([data[at], data[at + 1]])
}

pub(crate) fn be_u32(data: &[u8], at: usize) -> u32 {
   u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

pub(crate) fn be_i32(data: &[u8], at: usize) -> i32 {
   be_u32(data, at) as i32
}
