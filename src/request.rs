use crate::{
   cmd::{be_i32, be_u32, check_len, Direction, TransferFlags, UsbIpHeader, USBIP_CMD_SUBMIT},
   debug::{DbgBuf, DbgSetup},
   transport::Transport,
   ProtocolViolation, UsbIpError,
};
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// A `USBIP_CMD_SUBMIT` message: header, submit fields, setup block and the
/// OUT payload.
#[derive(Clone, PartialEq, Eq)]
pub struct UsbIpRequest {
   pub header: UsbIpHeader,
   pub cmd: UsbIpCmdSubmit,
   pub data: Vec<u8>,
}

impl Debug for UsbIpRequest {
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      f.debug_struct("UsbIpRequest")
         .field("header", &self.header)
         .field("cmd", &self.cmd)
         .field("data", &DbgBuf(&self.data))
         .finish()
   }
}

impl UsbIpRequest {
   /// Size of everything before the payload.
   pub const HEADER_SIZE: usize = UsbIpHeader::SIZE + UsbIpCmdSubmit::SIZE;

   pub fn submit(
      seqnum: u32,
      devid: u32,
      direction: Direction,
      ep: u32,
      transfer_buffer_length: i32,
      setup: [u8; 8],
      data: Vec<u8>,
   ) -> Self {
      Self {
         header: UsbIpHeader {
            command: USBIP_CMD_SUBMIT,
            seqnum,
            devid,
            direction: direction.to_u32(),
            ep,
         },
         cmd: UsbIpCmdSubmit {
            transfer_flags: TransferFlags::DIR_MASK,
            transfer_buffer_length,
            start_frame: 0,
            number_of_packets: 0,
            interval: 0,
            setup,
         },
         data,
      }
   }

   pub fn to_vec(&self) -> Vec<u8> {
      let mut result = Vec::with_capacity(Self::HEADER_SIZE + self.data.len());

      result.extend_from_slice(&self.header.to_array());
      result.extend_from_slice(&self.cmd.to_array());

      // Only OUT submissions carry a payload
      if self.header.direction == Direction::Out.to_u32() {
         result.extend_from_slice(&self.data[..]);
      }

      result
   }

   /// Decodes the fixed part of a submit command.
   pub fn parse_header(data: &[u8]) -> Result<(UsbIpHeader, UsbIpCmdSubmit), UsbIpError> {
      check_len("submit command", Self::HEADER_SIZE, data)?;

      let header = UsbIpHeader::from_slice(&data[0..UsbIpHeader::SIZE])?;
      if header.command != USBIP_CMD_SUBMIT {
         return Err(ProtocolViolation::UnexpectedCommand {
            expected: USBIP_CMD_SUBMIT,
            actual: header.command,
         }
         .into());
      }

      let cmd = UsbIpCmdSubmit::from_slice(&data[UsbIpHeader::SIZE..])?;
      Ok((header, cmd))
   }

   /// Decodes a complete submit command, payload included.
   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      if data.len() < Self::HEADER_SIZE {
         return Err(UsbIpError::Malformed {
            what: "submit command",
            expected: Self::HEADER_SIZE,
            actual: data.len(),
         });
      }

      let (header, cmd) = Self::parse_header(&data[..Self::HEADER_SIZE])?;
      let expected = Self::HEADER_SIZE + cmd.out_length(header.direction()?);
      check_len("submit command", expected, data)?;

      Ok(Self {
         header,
         cmd,
         data: data[Self::HEADER_SIZE..].to_vec(),
      })
   }

   /// Reads one submit command off the transport.
   pub fn read<T: Transport>(reader: &mut T) -> Result<Self, UsbIpError> {
      let (header, cmd) = Self::parse_header(&reader.receive_exact(Self::HEADER_SIZE)?)?;

      log::debug!(
         "received submit with seqnum {} for devid {:#x}",
         header.seqnum,
         header.devid
      );

      // Receive the URB if this is a OUT packet
      let length = cmd.out_length(header.direction()?);
      let data = if length != 0 {
         reader.receive_exact(length)?
      } else {
         vec![]
      };

      Ok(Self { header, cmd, data })
   }
}

#[derive(Clone, PartialEq, Eq)]
pub struct UsbIpCmdSubmit {
   pub transfer_flags: TransferFlags,
   pub transfer_buffer_length: i32,
   pub start_frame: i32,
   pub number_of_packets: i32,
   pub interval: i32,
   pub setup: [u8; 8],
}

impl Debug for UsbIpCmdSubmit {
   /// As `start_frame`, `number_of_packets` and `interval` are unused as of now,
   /// they are not being printed
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      f.debug_struct("UsbIpCmdSubmit")
         .field("transfer_flags", &self.transfer_flags)
         .field("transfer_buffer_length", &self.transfer_buffer_length)
         .field("setup", &DbgSetup(&self.setup))
         .finish()
   }
}

impl UsbIpCmdSubmit {
   pub const SIZE: usize = 28;

   pub fn to_array(&self) -> [u8; 28] {
      let mut result = [0; 28];

      result[0..4].copy_from_slice(&self.transfer_flags.bits().to_be_bytes());
      result[4..8].copy_from_slice(&self.transfer_buffer_length.to_be_bytes());
      result[8..12].copy_from_slice(&self.start_frame.to_be_bytes());
      result[12..16].copy_from_slice(&self.number_of_packets.to_be_bytes());
      result[16..20].copy_from_slice(&self.interval.to_be_bytes());
      result[20..28].copy_from_slice(&self.setup);

      result
   }

   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      check_len("submit fields", Self::SIZE, data)?;

      let transfer_buffer_length = be_i32(data, 4);
      if transfer_buffer_length < 0 {
         return Err(ProtocolViolation::NegativeLength {
            what: "transfer buffer length",
            value: transfer_buffer_length,
         }
         .into());
      }

      let mut setup = [0; 8];
      setup.copy_from_slice(&data[20..28]);

      Ok(Self {
         transfer_flags: TransferFlags::from_bits_truncate(be_u32(data, 0)),
         transfer_buffer_length,
         start_frame: be_i32(data, 8),
         number_of_packets: be_i32(data, 12),
         interval: be_i32(data, 16),
         setup,
      })
   }

   /// Number of payload bytes that follow the command on the wire.
   pub fn out_length(&self, direction: Direction) -> usize {
      match direction {
         Direction::Out => self.transfer_buffer_length.max(0) as usize,
         Direction::In => 0,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn control_out_layout() {
      let setup = [0x21, 0x20, 0, 0, 0, 0, 7, 0];
      let payload = vec![0x80, 0x25, 0, 0, 0, 0, 8];
      let request = UsbIpRequest::submit(1, 0x0001_0002, Direction::Out, 0, 7, setup, payload);
      let raw = request.to_vec();

      assert_eq!(raw.len(), 48 + 7);
      assert_eq!(&raw[0..4], &[0, 0, 0, 1]);
      assert_eq!(&raw[20..24], &[0, 0, 0x02, 0]);
      assert_eq!(&raw[24..28], &[0, 0, 0, 7]);
      assert_eq!(&raw[40..48], &setup);
      assert_eq!(&raw[48..], &[0x80, 0x25, 0, 0, 0, 0, 8]);
      assert_eq!(UsbIpRequest::from_slice(&raw).unwrap(), request);
   }

   #[test]
   fn in_submission_carries_no_payload() {
      let request = UsbIpRequest::submit(1, 2, Direction::In, 4, 64, [0; 8], vec![]);
      assert_eq!(request.to_vec().len(), UsbIpRequest::HEADER_SIZE);
   }

   #[test]
   fn truncated_payload_is_malformed() {
      let request = UsbIpRequest::submit(1, 2, Direction::Out, 3, 4, [0; 8], vec![1, 2, 3, 4]);
      let raw = request.to_vec();

      assert!(matches!(
         UsbIpRequest::from_slice(&raw[..raw.len() - 1]),
         Err(UsbIpError::Malformed { expected: 52, actual: 51, .. })
      ));
   }
}
