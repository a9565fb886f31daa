//! Submits single transfers to an attached device and judges the returns.

use crate::{
   cmd::{Direction, UsbIpHeader, USBIP_RET_SUBMIT},
   handshake,
   op::DeviceRecord,
   request::UsbIpRequest,
   response::{UsbIpResponse, UsbIpRetSubmit},
   setup::SetupPacket,
   transport::Transport,
   ProtocolViolation, UsbIpError,
};

/// Only one transfer is ever in flight, so every submission uses the same number.
pub const SEQNUM: u32 = 1;

/// Bus 1, device 2, used until a device record says otherwise.
pub const DEFAULT_DEVID: u32 = 0x0001_0002;

/// How a submit return ended, judged from its fixed header alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
   /// The transfer completed. IN payload, if any, follows on the wire.
   Complete,
   /// The device was not ready. Any non-zero status lands here.
   NotReady(i32),
   Violation(ProtocolViolation),
}

impl TransferOutcome {
   pub fn into_result(self) -> Result<(), UsbIpError> {
      match self {
         Self::Complete => Ok(()),
         Self::NotReady(status) => Err(UsbIpError::Nak { status }),
         Self::Violation(violation) => Err(violation.into()),
      }
   }
}

/// Classifies a decoded return against the command it answers.
///
/// Command and sequence number are checked before anything else, so a mismatch
/// is a violation no matter the status. An OUT return must report no data, even
/// when it NAKs.
pub fn classify_return(
   seqnum: u32,
   direction: Direction,
   header: &UsbIpHeader,
   ret: &UsbIpRetSubmit,
) -> TransferOutcome {
   if header.command != USBIP_RET_SUBMIT {
      return TransferOutcome::Violation(ProtocolViolation::UnexpectedCommand {
         expected: USBIP_RET_SUBMIT,
         actual: header.command,
      });
   }
   if header.seqnum != seqnum {
      return TransferOutcome::Violation(ProtocolViolation::SequenceMismatch {
         expected: seqnum,
         actual: header.seqnum,
      });
   }

   match direction {
      Direction::Out if ret.actual_length != 0 => {
         let violation = ProtocolViolation::NonZeroOutLength(ret.actual_length);
         return TransferOutcome::Violation(violation);
      }
      Direction::In if ret.status == 0 && ret.actual_length < 0 => {
         return TransferOutcome::Violation(ProtocolViolation::NegativeLength {
            what: "actual length",
            value: ret.actual_length,
         });
      }
      _ => (),
   }

   match ret.status {
      0 => TransferOutcome::Complete,
      status => TransferOutcome::NotReady(status),
   }
}

/// An imported device. Owns the connection, so transfers are strictly serial.
#[derive(Debug)]
pub struct UsbIpClient<T: Transport> {
   transport: T,
   devid: u32,
   device: Option<DeviceRecord>,
}

impl<T: Transport> UsbIpClient<T> {
   /// Wraps a transport that is already in the attached state.
   pub fn new(transport: T) -> Self {
      Self {
         transport,
         devid: DEFAULT_DEVID,
         device: None,
      }
   }

   /// Imports `bus_id` over `transport` and addresses transfers to that device.
   pub fn attach(mut transport: T, bus_id: &str) -> Result<Self, UsbIpError> {
      let device = handshake::attach(&mut transport, bus_id)?;
      Ok(Self {
         transport,
         devid: device.devid(),
         device: Some(device),
      })
   }

   pub fn device(&self) -> Option<&DeviceRecord> {
      self.device.as_ref()
   }

   pub fn devid(&self) -> u32 {
      self.devid
   }

   pub fn transport_mut(&mut self) -> &mut T {
      &mut self.transport
   }

   /// Sends `data` to `ep`. A setup packet makes it a control write.
   ///
   /// A NAK comes back as [`UsbIpError::Nak`]; retrying is up to the caller.
   pub fn submit_out(
      &mut self,
      ep: u32,
      setup: Option<SetupPacket>,
      data: &[u8],
   ) -> Result<(), UsbIpError> {
      let request = UsbIpRequest::submit(
         SEQNUM,
         self.devid,
         Direction::Out,
         ep,
         wire_length(data.len())?,
         setup.map_or([0; 8], |setup| setup.to_bytes()),
         data.to_vec(),
      );
      log::debug!("submit {:?}", request);
      self.transport.send(&request.to_vec())?;

      let (header, ret) = self.receive_return()?;
      classify_return(SEQNUM, Direction::Out, &header, &ret).into_result()
   }

   /// Reads up to `max_len` bytes from `ep`.
   ///
   /// Without `max_len`, control reads ask for the setup packet's `wLength` and
   /// everything else for nothing.
   pub fn submit_in(
      &mut self,
      ep: u32,
      setup: Option<SetupPacket>,
      max_len: Option<usize>,
   ) -> Result<Vec<u8>, UsbIpError> {
      let length = match (max_len, setup) {
         (Some(length), _) => length,
         (None, Some(setup)) => {
            log::debug!("inferred transfer length {} from setup packet", setup.length);
            usize::from(setup.length)
         }
         (None, None) => 0,
      };

      let request = UsbIpRequest::submit(
         SEQNUM,
         self.devid,
         Direction::In,
         ep,
         wire_length(length)?,
         setup.map_or([0; 8], |setup| setup.to_bytes()),
         vec![],
      );
      log::debug!("submit {:?}", request);
      self.transport.send(&request.to_vec())?;

      let (header, ret) = self.receive_return()?;
      classify_return(SEQNUM, Direction::In, &header, &ret).into_result()?;

      let actual = ret.in_length(Direction::In)?;
      if actual > length {
         return Err(ProtocolViolation::ExcessLength {
            requested: length,
            actual,
         }
         .into());
      }
      if actual == 0 {
         return Ok(vec![]);
      }
      let data = self.transport.receive_exact(actual)?;
      log::debug!("ep {} returned {:?}", ep, crate::debug::DbgBuf(&data));
      Ok(data)
   }

   fn receive_return(&mut self) -> Result<(UsbIpHeader, UsbIpRetSubmit), UsbIpError> {
      let raw = self.transport.receive_exact(UsbIpResponse::HEADER_SIZE)?;
      let (header, ret) = UsbIpResponse::parse_header(&raw)?;
      log::debug!("return {:?} {:?}", header, ret);
      Ok((header, ret))
   }
}

/// Transfer buffer lengths travel as signed 32 bit integers.
fn wire_length(len: usize) -> Result<i32, ProtocolViolation> {
   i32::try_from(len).map_err(|_| ProtocolViolation::FieldTooLong {
      what: "transfer buffer",
      len,
      max: i32::MAX as usize,
   })
}
