//! USB control setup packets and the class payloads some of them carry.
//!
//! Unlike the USB/IP framing around them, setup packet fields are little endian.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use usb_device::{
   control::{Recipient, Request, RequestType},
   descriptor::descriptor_type,
   UsbDirection,
};

/// Not part of `usb_device::descriptor::descriptor_type`.
pub const DEVICE_QUALIFIER: u8 = 6;

/// US English, the language every string descriptor of the test device uses.
pub const LANG_ID_EN_US: u16 = 0x0409;

/// CDC ACM class requests
pub const CDC_SET_LINE_CODING: u8 = 0x20;
pub const CDC_GET_LINE_CODING: u8 = 0x21;
pub const CDC_SET_CONTROL_LINE_STATE: u8 = 0x22;

/// `SET_CONTROL_LINE_STATE` bits
pub const LINE_STATE_DTR: u16 = 0x0001;
pub const LINE_STATE_RTS: u16 = 0x0002;

/// Builds `bmRequestType`.
pub fn request_type(direction: UsbDirection, kind: RequestType, recipient: Recipient) -> u8 {
   direction as u8 | (kind as u8) << 5 | recipient as u8
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
   pub request_type: u8,
   pub request: u8,
   pub value: u16,
   pub index: u16,
   pub length: u16,
}

impl SetupPacket {
   pub const SIZE: usize = 8;

   pub const fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
      Self {
         request_type,
         request,
         value,
         index,
         length,
      }
   }

   /// `GET_DESCRIPTOR` with the type in the high and the index in the low byte of `wValue`.
   pub fn get_descriptor(
      descriptor_type: u8,
      descriptor_index: u8,
      lang_id: u16,
      length: u16,
   ) -> Self {
      Self::new(
         request_type(UsbDirection::In, RequestType::Standard, Recipient::Device),
         Request::GET_DESCRIPTOR,
         u16::from(descriptor_type) << 8 | u16::from(descriptor_index),
         lang_id,
         length,
      )
   }

   pub fn get_device_descriptor(length: u16) -> Self {
      Self::get_descriptor(descriptor_type::DEVICE, 0, 0, length)
   }

   pub fn get_device_qualifier(length: u16) -> Self {
      Self::get_descriptor(DEVICE_QUALIFIER, 0, 0, length)
   }

   pub fn get_configuration_descriptor(index: u8, length: u16) -> Self {
      Self::get_descriptor(descriptor_type::CONFIGURATION, index, 0, length)
   }

   /// Index 0 with language 0 reads the table of supported languages.
   pub fn get_string_descriptor(index: u8, lang_id: u16, length: u16) -> Self {
      Self::get_descriptor(descriptor_type::STRING, index, lang_id, length)
   }

   pub fn set_configuration(configuration: u8) -> Self {
      Self::new(
         request_type(UsbDirection::Out, RequestType::Standard, Recipient::Device),
         Request::SET_CONFIGURATION,
         u16::from(configuration),
         0,
         0,
      )
   }

   pub fn set_line_coding(interface: u16) -> Self {
      Self::new(
         request_type(UsbDirection::Out, RequestType::Class, Recipient::Interface),
         CDC_SET_LINE_CODING,
         0,
         interface,
         LineCoding::SIZE as u16,
      )
   }

   pub fn set_control_line_state(interface: u16, state: u16) -> Self {
      Self::new(
         request_type(UsbDirection::Out, RequestType::Class, Recipient::Interface),
         CDC_SET_CONTROL_LINE_STATE,
         state,
         interface,
         0,
      )
   }

   pub fn direction(&self) -> UsbDirection {
      UsbDirection::from(self.request_type)
   }

   pub fn descriptor_type(&self) -> u8 {
      (self.value >> 8) as u8
   }

   pub fn descriptor_index(&self) -> u8 {
      self.value as u8
   }

   pub fn to_bytes(&self) -> [u8; 8] {
      let mut result = [0; 8];

      result[0] = self.request_type;
      result[1] = self.request;
      result[2..4].copy_from_slice(&self.value.to_le_bytes());
      result[4..6].copy_from_slice(&self.index.to_le_bytes());
      result[6..8].copy_from_slice(&self.length.to_le_bytes());

      result
   }

   pub fn from_bytes(data: &[u8; 8]) -> Self {
      Self {
         request_type: data[0],
         request: data[1],
         value: u16::from_le_bytes([data[2], data[3]]),
         index: u16::from_le_bytes([data[4], data[5]]),
         length: u16::from_le_bytes([data[6], data[7]]),
      }
   }

   fn request_name(&self) -> Option<&'static str> {
      let kind = (self.request_type >> 5) & 0b11;
      match (kind, self.request) {
         (0, Request::GET_STATUS) => Some("GET_STATUS"),
         (0, Request::CLEAR_FEATURE) => Some("CLEAR_FEATURE"),
         (0, Request::SET_FEATURE) => Some("SET_FEATURE"),
         (0, Request::SET_ADDRESS) => Some("SET_ADDRESS"),
         (0, Request::GET_DESCRIPTOR) => Some("GET_DESCRIPTOR"),
         (0, Request::SET_DESCRIPTOR) => Some("SET_DESCRIPTOR"),
         (0, Request::GET_CONFIGURATION) => Some("GET_CONFIGURATION"),
         (0, Request::SET_CONFIGURATION) => Some("SET_CONFIGURATION"),
         (1, CDC_SET_LINE_CODING) => Some("SET_LINE_CODING"),
         (1, CDC_GET_LINE_CODING) => Some("GET_LINE_CODING"),
         (1, CDC_SET_CONTROL_LINE_STATE) => Some("SET_CONTROL_LINE_STATE"),
         _ => None,
      }
   }
}

impl Debug for SetupPacket {
   fn fmt(&self, f: &mut Formatter) -> FmtResult {
      let mut dbg = f.debug_struct("SetupPacket");
      dbg.field("request_type", &format_args!("{:#04x}", self.request_type));
      match self.request_name() {
         Some(name) => dbg.field("request", &format_args!("{}", name)),
         None => dbg.field("request", &format_args!("{:#04x}", self.request)),
      };
      dbg.field("value", &format_args!("{:#06x}", self.value))
         .field("index", &format_args!("{:#06x}", self.index))
         .field("length", &self.length)
         .finish()
   }
}

/// The 7 byte CDC line coding structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCoding {
   pub data_rate: u32,
   /// 0 = 1 stop bit, 1 = 1.5, 2 = 2
   pub stop_bits: u8,
   /// 0 = none, 1 = odd, 2 = even, 3 = mark, 4 = space
   pub parity: u8,
   pub data_bits: u8,
}

impl LineCoding {
   pub const SIZE: usize = 7;

   /// `data_rate` baud, 8 data bits, no parity, one stop bit.
   pub const fn eight_n_one(data_rate: u32) -> Self {
      Self {
         data_rate,
         stop_bits: 0,
         parity: 0,
         data_bits: 8,
      }
   }

   pub fn to_bytes(&self) -> [u8; 7] {
      let mut result = [0; 7];

      result[0..4].copy_from_slice(&self.data_rate.to_le_bytes());
      result[4] = self.stop_bits;
      result[5] = self.parity;
      result[6] = self.data_bits;

      result
   }
}
