//! Messages of the import phase, exchanged before a device is attached.

use crate::{
   cmd::{be_u16, be_u32, check_len},
   ProtocolViolation, UsbIpError,
};

/// USB/IP protocol version 1.1.6
pub const USBIP_VERSION: u16 = 0x0106;

pub const OP_REQUEST: u16 = 0x80 << 8;
pub const OP_REPLY: u16 = 0x00 << 8;
pub const OP_IMPORT: u16 = 0x03;
pub const OP_DEVLIST: u16 = 0x05;

pub const OP_REQ_IMPORT: u16 = OP_REQUEST | OP_IMPORT;
pub const OP_REP_IMPORT: u16 = OP_REPLY | OP_IMPORT;
pub const OP_REQ_DEVLIST: u16 = OP_REQUEST | OP_DEVLIST;
pub const OP_REP_DEVLIST: u16 = OP_REPLY | OP_DEVLIST;

pub const ST_OK: u32 = 0x00;
pub const ST_NA: u32 = 0x01;

pub const SYSFS_PATH_MAX: usize = 256;
pub const SYSFS_BUS_ID_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpHeader {
   pub version: u16,
   pub command: u16,
   pub status: u32,
}

impl OpHeader {
   pub const SIZE: usize = 8;

   pub fn request(command: u16) -> Self {
      Self {
         version: USBIP_VERSION,
         command,
         status: ST_OK,
      }
   }

   pub fn to_array(&self) -> [u8; 8] {
      let mut result = [0; 8];

      result[0..2].copy_from_slice(&self.version.to_be_bytes());
      result[2..4].copy_from_slice(&self.command.to_be_bytes());
      result[4..8].copy_from_slice(&self.status.to_be_bytes());

      result
   }

   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      check_len("op header", Self::SIZE, data)?;

      Ok(Self {
         version: be_u16(data, 0),
         command: be_u16(data, 2),
         status: be_u32(data, 4),
      })
   }

   /// Checks version and reply code. The status is left to the caller.
   pub fn expect_reply(&self, command: u16) -> Result<(), ProtocolViolation> {
      if self.version != USBIP_VERSION {
         return Err(ProtocolViolation::VersionMismatch {
            expected: USBIP_VERSION,
            actual: self.version,
         });
      }
      if self.command != command {
         return Err(ProtocolViolation::UnexpectedOpCode {
            expected: command,
            actual: self.command,
         });
      }
      Ok(())
   }
}

/// `OP_REQ_IMPORT`: the common header followed by the bus id to import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpImportRequest {
   pub version: u16,
   pub bus_id: String,
}

impl OpImportRequest {
   pub const SIZE: usize = OpHeader::SIZE + SYSFS_BUS_ID_SIZE;

   pub fn new(bus_id: &str) -> Self {
      Self {
         version: USBIP_VERSION,
         bus_id: bus_id.to_string(),
      }
   }

   pub fn to_vec(&self) -> Result<Vec<u8>, UsbIpError> {
      let mut result = Vec::with_capacity(Self::SIZE);

      let header = OpHeader {
         version: self.version,
         command: OP_REQ_IMPORT,
         status: ST_OK,
      };
      result.extend_from_slice(&header.to_array());
      result.extend_from_slice(&encode_fixed_str::<SYSFS_BUS_ID_SIZE>("bus id", &self.bus_id)?);

      Ok(result)
   }

   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      check_len("import request", Self::SIZE, data)?;

      let header = OpHeader::from_slice(&data[..OpHeader::SIZE])?;
      if header.command != OP_REQ_IMPORT {
         return Err(ProtocolViolation::UnexpectedOpCode {
            expected: OP_REQ_IMPORT,
            actual: header.command,
         }
         .into());
      }

      Ok(Self {
         version: header.version,
         bus_id: decode_fixed_str(&data[OpHeader::SIZE..]),
      })
   }
}

/// The description of an exported device, as sent in import and device list replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
   pub path: String,
   pub bus_id: String,
   pub busnum: u32,
   pub devnum: u32,
   pub speed: u32,
   pub vendor: u16,
   pub product: u16,
   pub bcd_device: u16,
   pub device_class: u8,
   pub device_subclass: u8,
   pub device_protocol: u8,
   pub configuration_value: u8,
   pub num_configurations: u8,
   pub num_interfaces: u8,
}

impl DeviceRecord {
   pub const SIZE: usize = SYSFS_PATH_MAX + SYSFS_BUS_ID_SIZE + 3 * 4 + 3 * 2 + 6;

   /// The device id used to address this device in submit commands.
   pub fn devid(&self) -> u32 {
      (self.busnum << 16) | self.devnum
   }

   pub fn to_vec(&self) -> Result<Vec<u8>, UsbIpError> {
      let mut result = Vec::with_capacity(Self::SIZE);

      result.extend_from_slice(&encode_fixed_str::<SYSFS_PATH_MAX>("path", &self.path)?);
      result.extend_from_slice(&encode_fixed_str::<SYSFS_BUS_ID_SIZE>("bus id", &self.bus_id)?);
      result.extend_from_slice(&self.busnum.to_be_bytes());
      result.extend_from_slice(&self.devnum.to_be_bytes());
      result.extend_from_slice(&self.speed.to_be_bytes());
      result.extend_from_slice(&self.vendor.to_be_bytes());
      result.extend_from_slice(&self.product.to_be_bytes());
      result.extend_from_slice(&self.bcd_device.to_be_bytes());
      result.extend_from_slice(&[
         self.device_class,
         self.device_subclass,
         self.device_protocol,
         self.configuration_value,
         self.num_configurations,
         self.num_interfaces,
      ]);

      Ok(result)
   }

   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      check_len("device record", Self::SIZE, data)?;

      let fields = SYSFS_PATH_MAX + SYSFS_BUS_ID_SIZE;
      Ok(Self {
         path: decode_fixed_str(&data[..SYSFS_PATH_MAX]),
         bus_id: decode_fixed_str(&data[SYSFS_PATH_MAX..fields]),
         busnum: be_u32(data, fields),
         devnum: be_u32(data, fields + 4),
         speed: be_u32(data, fields + 8),
         vendor: be_u16(data, fields + 12),
         product: be_u16(data, fields + 14),
         bcd_device: be_u16(data, fields + 16),
         device_class: data[fields + 18],
         device_subclass: data[fields + 19],
         device_protocol: data[fields + 20],
         configuration_value: data[fields + 21],
         num_configurations: data[fields + 22],
         num_interfaces: data[fields + 23],
      })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceRecord {
   pub interface_class: u8,
   pub interface_subclass: u8,
   pub interface_protocol: u8,
}

impl InterfaceRecord {
   pub const SIZE: usize = 4;

   pub fn to_array(&self) -> [u8; 4] {
      [
         self.interface_class,
         self.interface_subclass,
         self.interface_protocol,
         0,
      ]
   }

   pub fn from_slice(data: &[u8]) -> Result<Self, UsbIpError> {
      check_len("interface record", Self::SIZE, data)?;

      Ok(Self {
         interface_class: data[0],
         interface_subclass: data[1],
         interface_protocol: data[2],
      })
   }
}

/// One entry of a device list reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDevice {
   pub device: DeviceRecord,
   pub interfaces: Vec<InterfaceRecord>,
}

fn encode_fixed_str<const N: usize>(
   what: &'static str,
   value: &str,
) -> Result<[u8; N], UsbIpError> {
   let bytes = value.as_bytes();
   if bytes.len() > N {
      log::warn!("{} is longer than {} bytes", what, N);
      return Err(ProtocolViolation::FieldTooLong {
         what,
         len: bytes.len(),
         max: N,
      }
      .into());
   }

   let mut result = [0; N];
   result[..bytes.len()].copy_from_slice(bytes);
   Ok(result)
}

fn decode_fixed_str(data: &[u8]) -> String {
   let end = data.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
   String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
pub(crate) fn sample_record() -> DeviceRecord {
   DeviceRecord {
      path: "/sys/devices/pci0000:00/0000:00:01.2/usb1/1-1".to_string(),
      bus_id: "1-1".to_string(),
      busnum: 1,
      devnum: 2,
      speed: 2,
      vendor: 0x16c0,
      product: 0x047a,
      bcd_device: 0x0100,
      device_class: 2,
      device_subclass: 0,
      device_protocol: 0,
      configuration_value: 1,
      num_configurations: 1,
      num_interfaces: 2,
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn import_request_layout() {
      let raw = OpImportRequest::new("1-1").to_vec().unwrap();

      assert_eq!(raw.len(), 40);
      assert_eq!(&raw[0..8], &[0x01, 0x06, 0x80, 0x03, 0, 0, 0, 0]);
      assert_eq!(&raw[8..11], b"1-1");
      assert!(raw[11..].iter().all(|&b| b == 0));
      assert_eq!(OpImportRequest::from_slice(&raw).unwrap().bus_id, "1-1");
   }

   #[test]
   fn overlong_bus_id_is_rejected() {
      let bus_id = "1".repeat(33);
      assert!(matches!(
         OpImportRequest::new(&bus_id).to_vec(),
         Err(UsbIpError::Protocol(ProtocolViolation::FieldTooLong { len: 33, max: 32, .. }))
      ));
   }

   #[test]
   fn device_record_layout() {
      let record = sample_record();
      let raw = record.to_vec().unwrap();

      assert_eq!(raw.len(), 312);
      assert_eq!(&raw[288..300], &[0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 2]);
      assert_eq!(&raw[300..306], &[0x16, 0xc0, 0x04, 0x7a, 0x01, 0x00]);
      assert_eq!(&raw[306..312], &[2, 0, 0, 1, 1, 2]);
      assert_eq!(DeviceRecord::from_slice(&raw).unwrap(), record);
      assert_eq!(record.devid(), 0x0001_0002);
   }

   #[test]
   fn device_record_rejects_wrong_size() {
      assert!(matches!(
         DeviceRecord::from_slice(&[0; 311]),
         Err(UsbIpError::Malformed { expected: 312, actual: 311, .. })
      ));
   }

   #[test]
   fn fixed_strings_trim_trailing_nuls_only() {
      assert_eq!(decode_fixed_str(b"1-1\0\0\0"), "1-1");
      assert_eq!(decode_fixed_str(&[0; 4]), "");
      assert_eq!(decode_fixed_str(b"a\0b\0"), "a\0b");
   }

   #[test]
   fn reply_header_checks() {
      let header = OpHeader {
         version: USBIP_VERSION,
         command: OP_REP_IMPORT,
         status: ST_NA,
      };
      assert_eq!(OpHeader::from_slice(&header.to_array()).unwrap(), header);
      assert!(header.expect_reply(OP_REP_IMPORT).is_ok());
      assert_eq!(
         header.expect_reply(OP_REP_DEVLIST),
         Err(ProtocolViolation::UnexpectedOpCode {
            expected: OP_REP_DEVLIST,
            actual: OP_REP_IMPORT
         })
      );

      let old = OpHeader { version: 0x0111, ..header };
      assert!(matches!(
         old.expect_reply(OP_REP_IMPORT),
         Err(ProtocolViolation::VersionMismatch { actual: 0x0111, .. })
      ));
   }
}
