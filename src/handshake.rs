//! The one-shot exchanges that happen before any transfer.

use crate::{
   cmd::be_u32,
   op::{
      DeviceRecord, ExportedDevice, InterfaceRecord, OpHeader, OpImportRequest, OP_REP_DEVLIST,
      OP_REP_IMPORT, OP_REQ_DEVLIST, ST_OK,
   },
   transport::Transport,
   UsbIpError,
};

/// Imports the device exported under `bus_id`.
///
/// Any failure here is final, the exporter does not expect a second attempt on
/// the same connection.
pub fn attach<T: Transport>(transport: &mut T, bus_id: &str) -> Result<DeviceRecord, UsbIpError> {
   log::info!("importing device {}", bus_id);
   transport.send(&OpImportRequest::new(bus_id).to_vec()?)?;

   let header = OpHeader::from_slice(&transport.receive_exact(OpHeader::SIZE)?)?;
   header.expect_reply(OP_REP_IMPORT)?;
   if header.status != ST_OK {
      log::warn!("import of {} denied with status {}", bus_id, header.status);
      return Err(UsbIpError::ImportDenied {
         status: header.status,
      });
   }

   let device = DeviceRecord::from_slice(&transport.receive_exact(DeviceRecord::SIZE)?)?;
   log::info!(
      "attached {} ({}) {:04x}:{:04x} bus {} dev {} speed {}",
      device.bus_id,
      device.path,
      device.vendor,
      device.product,
      device.busnum,
      device.devnum,
      device.speed
   );
   log::debug!("{:?}", device);

   Ok(device)
}

/// Asks the exporter which devices it offers.
pub fn list_devices<T: Transport>(transport: &mut T) -> Result<Vec<ExportedDevice>, UsbIpError> {
   log::info!("requesting device list");
   transport.send(&OpHeader::request(OP_REQ_DEVLIST).to_array())?;

   let header = OpHeader::from_slice(&transport.receive_exact(OpHeader::SIZE)?)?;
   header.expect_reply(OP_REP_DEVLIST)?;
   if header.status != ST_OK {
      return Err(UsbIpError::ListDenied {
         status: header.status,
      });
   }

   let count = be_u32(&transport.receive_exact(4)?, 0);
   log::debug!("exporter lists {} devices", count);

   let mut devices = Vec::new();
   for _ in 0..count {
      let device = DeviceRecord::from_slice(&transport.receive_exact(DeviceRecord::SIZE)?)?;

      let mut interfaces = Vec::with_capacity(usize::from(device.num_interfaces));
      for _ in 0..device.num_interfaces {
         let raw = transport.receive_exact(InterfaceRecord::SIZE)?;
         interfaces.push(InterfaceRecord::from_slice(&raw)?);
      }

      log::info!(
         "{}: {:04x}:{:04x} with {} interfaces",
         device.bus_id,
         device.vendor,
         device.product,
         interfaces.len()
      );
      devices.push(ExportedDevice { device, interfaces });
   }

   Ok(devices)
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      op::{sample_record, OpHeader, OP_REQ_IMPORT, ST_NA, USBIP_VERSION},
      transport::mock::MockTransport,
      ProtocolViolation,
   };

   fn reply(command: u16, status: u32) -> [u8; 8] {
      OpHeader {
         version: USBIP_VERSION,
         command,
         status,
      }
      .to_array()
   }

   #[test]
   fn attach_returns_device_record() {
      let mut transport = MockTransport::new();
      transport.push_reply(&reply(OP_REP_IMPORT, ST_OK));
      transport.push_reply(&sample_record().to_vec().unwrap());

      let device = attach(&mut transport, "1-1").unwrap();

      assert_eq!(device, sample_record());
      assert_eq!(transport.sent.len(), 1);
      assert_eq!(&transport.sent[0][0..4], &[0x01, 0x06, 0x80, 0x03]);
      assert_eq!(transport.remaining(), 0);
   }

   #[test]
   fn attach_denied_reads_no_record() {
      let mut transport = MockTransport::new();
      transport.push_reply(&reply(OP_REP_IMPORT, ST_NA));

      assert!(matches!(
         attach(&mut transport, "1-1"),
         Err(UsbIpError::ImportDenied { status: 1 })
      ));
   }

   #[test]
   fn attach_rejects_wrong_reply_code() {
      let mut transport = MockTransport::new();
      transport.push_reply(&reply(OP_REQ_IMPORT, ST_NA));

      assert!(matches!(
         attach(&mut transport, "1-1"),
         Err(UsbIpError::Protocol(ProtocolViolation::UnexpectedOpCode {
            expected: OP_REP_IMPORT,
            actual: OP_REQ_IMPORT,
         }))
      ));
   }

   #[test]
   fn attach_rejects_wrong_version() {
      let mut transport = MockTransport::new();
      let mut raw = reply(OP_REP_IMPORT, ST_OK);
      raw[1] = 0x11;
      transport.push_reply(&raw);

      assert!(matches!(
         attach(&mut transport, "1-1"),
         Err(UsbIpError::Protocol(ProtocolViolation::VersionMismatch { actual: 0x0111, .. }))
      ));
   }

   #[test]
   fn attach_with_truncated_record_fails() {
      let mut transport = MockTransport::new();
      transport.push_reply(&reply(OP_REP_IMPORT, ST_OK));
      transport.push_reply(&[0; 100]);

      assert!(matches!(
         attach(&mut transport, "1-1"),
         Err(UsbIpError::ConnectionClosed { expected: 312, received: 100 })
      ));
   }

   #[test]
   fn list_devices_reads_interfaces() {
      let mut transport = MockTransport::new();
      transport.push_reply(&reply(OP_REP_DEVLIST, ST_OK));
      transport.push_reply(&1u32.to_be_bytes());
      transport.push_reply(&sample_record().to_vec().unwrap());
      transport.push_reply(&[0x02, 0x02, 0x01, 0x00]);
      transport.push_reply(&[0x0a, 0x00, 0x00, 0x00]);

      let devices = list_devices(&mut transport).unwrap();

      assert_eq!(transport.sent[0], vec![0x01, 0x06, 0x80, 0x05, 0, 0, 0, 0]);
      assert_eq!(devices.len(), 1);
      assert_eq!(devices[0].device.bus_id, "1-1");
      assert_eq!(devices[0].interfaces.len(), 2);
      assert_eq!(devices[0].interfaces[1].interface_class, 0x0a);
   }

   #[test]
   fn list_devices_denied() {
      let mut transport = MockTransport::new();
      transport.push_reply(&reply(OP_REP_DEVLIST, ST_NA));

      assert!(matches!(
         list_devices(&mut transport),
         Err(UsbIpError::ListDenied { status: 1 })
      ));
   }
}
