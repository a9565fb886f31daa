use crate::{
   cmd::{be_i32, check_len, Direction, UsbIpHeader, USBIP_RET_SUBMIT},
   debug::DbgBuf,
   ProtocolViolation, UsbIpError,
};
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// A `USBIP_RET_SUBMIT` message: header, return fields, padding and the IN payload.
#[derive(Clone, PartialEq, Eq)]
pub struct UsbIpResponse {
   pub header: UsbIpHeader,
   pub cmd: UsbIpRetSubmit,
   pub data: Vec<u8>,
}

impl Debug for UsbIpResponse {
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      f.debug_struct("UsbIpResponse")
         .field("header", &self.header)
         .field("cmd", &self.cmd)
         .field("data", &DbgBuf(&self.data))
         .finish()
   }
}

impl UsbIpResponse {
   /// Size of everything before the payload, padding included.
   pub const HEADER_SIZE: usize = UsbIpHeader::SIZE + UsbIpRetSubmit::SIZE;

   /// Builds the return for a finished transfer. `data` is only sent for IN.
   pub fn ret_submit(
      seqnum: u32,
      devid: u32,
      direction: Direction,
      ep: u32,
      status: i32,
      data: Vec<u8>,
   ) -> Self {
      let actual_length = match direction {
         Direction::In => data.len() as i32,
         Direction::Out => 0,
      };

      Self {
         header: UsbIpHeader {
            command: USBIP_RET_SUBMIT,
            seqnum,
            devid,
            direction: direction.to_u32(),
            ep,
         },
         cmd: UsbIpRetSubmit {
            status,
            actual_length,
            start_frame: 0,
            number_of_packets: 0,
            error_count: 0,
         },
         data,
      }
   }

   pub fn to_vec(&self) -> Vec<u8> {
      let mut result = Vec::with_capacity(Self::HEADER_SIZE + self.data.len());

      result.extend_from_slice(&self.header.to_array());
      result.extend_from_slice(&self.cmd.to_array());

      if self.header.direction == Direction::In.to_u32() {
         result.extend_from_slice(&self.data[..]);
      }

      result
   }

   /// Decodes the fixed part of a return without judging its contents.
   ///
   /// Whether the command, sequence number and lengths make sense is up to the
   /// caller, see [`crate::engine::classify_return`].
   pub fn parse_header(data: &[u8]) -> Result<(UsbIpHeader, UsbIpRetSubmit), UsbIpError> {
      check_len("submit return", Self::HEADER_SIZE, data)?;

      let header = UsbIpHeader::from_slice(&data[0..UsbIpHeader::SIZE])?;
      let cmd = UsbIpRetSubmit::from_slice(&data[UsbIpHeader::SIZE..])?;
      Ok((header, cmd))
   }

   /// Decodes a complete return, payload included.
   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      if data.len() < Self::HEADER_SIZE {
         return Err(UsbIpError::Malformed {
            what: "submit return",
            expected: Self::HEADER_SIZE,
            actual: data.len(),
         });
      }

      let (header, cmd) = Self::parse_header(&data[..Self::HEADER_SIZE])?;
      if header.command != USBIP_RET_SUBMIT {
         return Err(ProtocolViolation::UnexpectedCommand {
            expected: USBIP_RET_SUBMIT,
            actual: header.command,
         }
         .into());
      }

      let expected = Self::HEADER_SIZE + cmd.in_length(header.direction()?)?;
      check_len("submit return", expected, data)?;

      Ok(Self {
         header,
         cmd,
         data: data[Self::HEADER_SIZE..].to_vec(),
      })
   }
}

#[derive(Clone, PartialEq, Eq)]
pub struct UsbIpRetSubmit {
   pub status: i32,
   pub actual_length: i32,
   pub start_frame: i32,
   pub number_of_packets: i32,
   pub error_count: i32,
}

impl Debug for UsbIpRetSubmit {
   /// As `start_frame`, `number_of_packets` and `error_count` are unused as of now,
   /// they are not being printed
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      f.debug_struct("UsbIpRetSubmit")
         .field("status", &self.status)
         .field("actual_length", &self.actual_length)
         .finish()
   }
}

impl UsbIpRetSubmit {
   /// Five fields and eight bytes of padding.
   pub const SIZE: usize = 28;

   pub fn to_array(&self) -> [u8; 28] {
      let mut result = [0; 28];

      result[0..4].copy_from_slice(&self.status.to_be_bytes());
      result[4..8].copy_from_slice(&self.actual_length.to_be_bytes());
      result[8..12].copy_from_slice(&self.start_frame.to_be_bytes());
      result[12..16].copy_from_slice(&self.number_of_packets.to_be_bytes());
      result[16..20].copy_from_slice(&self.error_count.to_be_bytes());

      result
   }

   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      check_len("submit return fields", Self::SIZE, data)?;

      Ok(Self {
         status: be_i32(data, 0),
         actual_length: be_i32(data, 4),
         start_frame: be_i32(data, 8),
         number_of_packets: be_i32(data, 12),
         error_count: be_i32(data, 16),
      })
   }

   /// Number of payload bytes that follow the return on the wire.
   pub fn in_length(&self, direction: Direction) -> Result<usize, ProtocolViolation> {
      if direction == Direction::Out {
         return Ok(0);
      }
      if self.actual_length < 0 {
         return Err(ProtocolViolation::NegativeLength {
            what: "actual length",
            value: self.actual_length,
         });
      }
      Ok(self.actual_length as usize)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn in_return_layout() {
      let data = vec![0x04, 0x03, 0x09, 0x04];
      let response = UsbIpResponse::ret_submit(1, 0x0001_0002, Direction::In, 0, 0, data);
      let raw = response.to_vec();

      assert_eq!(raw.len(), 48 + 4);
      assert_eq!(&raw[0..4], &[0, 0, 0, 3]);
      assert_eq!(&raw[24..28], &[0, 0, 0, 4]);
      assert_eq!(&raw[40..48], &[0; 8]);
      assert_eq!(UsbIpResponse::from_slice(&raw).unwrap(), response);
   }

   #[test]
   fn padding_is_ignored_on_decode() {
      let response = UsbIpResponse::ret_submit(1, 2, Direction::Out, 3, 1, vec![]);
      let mut raw = response.to_vec();
      raw[40..48].copy_from_slice(&[0xaa; 8]);

      assert_eq!(UsbIpResponse::from_slice(&raw).unwrap(), response);
   }

   #[test]
   fn negative_status_round_trips() {
      let response = UsbIpResponse::ret_submit(7, 2, Direction::In, 2, -32, vec![]);
      let (header, cmd) = UsbIpResponse::parse_header(&response.to_vec()).unwrap();

      assert_eq!(header.seqnum, 7);
      assert_eq!(cmd.status, -32);
      assert_eq!(cmd.actual_length, 0);
   }

   #[test]
   fn header_decode_accepts_any_direction_word() {
      let mut raw = UsbIpResponse::ret_submit(1, 2, Direction::In, 4, 1, vec![]).to_vec();
      raw[12..16].copy_from_slice(&7u32.to_be_bytes());

      let (header, cmd) = UsbIpResponse::parse_header(&raw).unwrap();
      assert_eq!(header.direction, 7);
      assert_eq!(cmd.status, 1);
   }

   #[test]
   fn payload_must_match_actual_length() {
      let mut raw = UsbIpResponse::ret_submit(1, 2, Direction::In, 4, 0, vec![b'H']).to_vec();
      raw.push(0);

      assert!(matches!(
         UsbIpResponse::from_slice(&raw),
         Err(UsbIpError::Malformed { expected: 49, actual: 50, .. })
      ));
   }
}
