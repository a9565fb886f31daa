//! An in-process USB/IP exporter serving the CDC ACM test device.

#![allow(dead_code)]

use std::{collections::VecDeque, net::TcpListener, thread};
use usbip_tester::{
   cmd::Direction,
   op::{
      DeviceRecord, InterfaceRecord, OpHeader, OP_REP_DEVLIST, OP_REP_IMPORT, OP_REQ_DEVLIST,
      OP_REQ_IMPORT, SYSFS_BUS_ID_SIZE, ST_NA, ST_OK, USBIP_VERSION,
   },
   request::UsbIpRequest,
   response::UsbIpResponse,
   setup::SetupPacket,
   transport::{TcpTransport, Transport},
   verify, UsbIpError,
};

const DESCRIPTOR_DEVICE: u8 = 1;
const DESCRIPTOR_CONFIGURATION: u8 = 2;
const DESCRIPTOR_STRING: u8 = 3;
const GET_DESCRIPTOR: u8 = 6;

/// Status the exporter reports for a NAKed transfer.
const NAK: i32 = 1;

#[derive(Debug, Clone, Default)]
pub struct ExporterOptions {
   /// NAK this many bulk writes before accepting one.
   pub bulk_out_naks: u32,
   /// Answer this many bulk reads with an empty completion first.
   pub bulk_in_empty_reads: u32,
   /// Added to the sequence number of every return.
   pub seqnum_offset: u32,
}

pub struct SimulatedExporter {
   port: u16,
}

impl SimulatedExporter {
   pub fn spawn(options: ExporterOptions) -> Self {
      let _ = pretty_env_logger::try_init();

      let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind exporter");
      let port = listener.local_addr().expect("local addr").port();

      thread::spawn(move || {
         for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let Ok(transport) = TcpTransport::from_stream(stream) else { continue };

            let mut connection = Connection::new(transport, options.clone());
            if let Err(err) = connection.serve() {
               log::debug!("exporter connection ended: {}", err);
            }
         }
      });

      Self { port }
   }

   pub fn port(&self) -> u16 {
      self.port
   }
}

pub fn device_record() -> DeviceRecord {
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

struct Connection {
   transport: TcpTransport,
   options: ExporterOptions,
   echo: VecDeque<u8>,
}

impl Connection {
   fn new(transport: TcpTransport, options: ExporterOptions) -> Self {
      Self {
         transport,
         options,
         echo: VecDeque::new(),
      }
   }

   fn serve(&mut self) -> Result<(), UsbIpError> {
      while !self.handle_op()? {}

      loop {
         let request = UsbIpRequest::read(&mut self.transport)?;
         let response = self.handle_cmd(request);
         self.transport.send(&response.to_vec())?;
      }
   }

   /// Returns whether a device got attached.
   fn handle_op(&mut self) -> Result<bool, UsbIpError> {
      let header = OpHeader::from_slice(&self.transport.receive_exact(OpHeader::SIZE)?)?;

      match header.command {
         OP_REQ_DEVLIST => {
            let reply = OpHeader {
               version: USBIP_VERSION,
               command: OP_REP_DEVLIST,
               status: ST_OK,
            };
            self.transport.send(&reply.to_array())?;
            self.transport.send(&1u32.to_be_bytes())?;
            self.transport.send(&device_record().to_vec()?)?;
            for interface in [
               InterfaceRecord {
                  interface_class: 2,
                  interface_subclass: 2,
                  interface_protocol: 1,
               },
               InterfaceRecord {
                  interface_class: 10,
                  interface_subclass: 0,
                  interface_protocol: 0,
               },
            ] {
               self.transport.send(&interface.to_array())?;
            }
            Ok(false)
         }
         OP_REQ_IMPORT => {
            let raw = self.transport.receive_exact(SYSFS_BUS_ID_SIZE)?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            let bus_id = String::from_utf8_lossy(&raw[..end]).into_owned();
            let device = device_record();

            let status = if bus_id == device.bus_id { ST_OK } else { ST_NA };
            let reply = OpHeader {
               version: USBIP_VERSION,
               command: OP_REP_IMPORT,
               status,
            };
            self.transport.send(&reply.to_array())?;
            if status != ST_OK {
               return Ok(false);
            }

            log::info!("exporter: device {} attached", bus_id);
            self.transport.send(&device.to_vec()?)?;
            Ok(true)
         }
         other => {
            log::warn!("exporter: unknown op {:#06x}", other);
            Err(UsbIpError::ConnectionClosed { expected: 0, received: 0 })
         }
      }
   }

   fn handle_cmd(&mut self, request: UsbIpRequest) -> UsbIpResponse {
      let header = &request.header;
      let direction = header.direction().expect("direction checked on read");
      let (status, data) = match (header.ep, direction) {
         (0, Direction::In) => {
            let setup = SetupPacket::from_bytes(&request.cmd.setup);
            match control_read(&setup) {
               Some(mut data) => {
                  data.truncate(request.cmd.transfer_buffer_length as usize);
                  (0, data)
               }
               None => (NAK, vec![]),
            }
         }
         (0, Direction::Out) => (0, vec![]),
         (3, Direction::Out) => {
            if self.options.bulk_out_naks > 0 {
               self.options.bulk_out_naks -= 1;
               (NAK, vec![])
            } else {
               self.echo.extend(request.data.iter().copied());
               (0, vec![])
            }
         }
         (4, Direction::In) => {
            if self.options.bulk_in_empty_reads > 0 {
               self.options.bulk_in_empty_reads -= 1;
               (0, vec![])
            } else {
               let count = self.echo.len().min(request.cmd.transfer_buffer_length as usize);
               (0, self.echo.drain(..count).collect())
            }
         }
         // Interrupt endpoint 2 never has anything pending
         _ => (NAK, vec![]),
      };

      UsbIpResponse::ret_submit(
         header.seqnum + self.options.seqnum_offset,
         header.devid,
         direction,
         header.ep,
         status,
         data,
      )
   }
}

fn control_read(setup: &SetupPacket) -> Option<Vec<u8>> {
   if setup.request != GET_DESCRIPTOR {
      return None;
   }

   match (setup.descriptor_type(), setup.descriptor_index()) {
      (DESCRIPTOR_DEVICE, 0) => Some(verify::DEVICE_DESCRIPTOR.to_vec()),
      (DESCRIPTOR_CONFIGURATION, 0) => Some(verify::CONFIGURATION_BUNDLE.to_vec()),
      (DESCRIPTOR_STRING, 0) => Some(verify::LANGUAGE_TABLE.to_vec()),
      (DESCRIPTOR_STRING, index) => string(index).map(verify::string_descriptor),
      // Full speed only, so no device qualifier either
      _ => None,
   }
}

fn string(index: u8) -> Option<&'static str> {
   match index {
      verify::MANUFACTURER_INDEX => Some(verify::MANUFACTURER),
      verify::PRODUCT_INDEX => Some(verify::PRODUCT),
      verify::SERIAL_NUMBER_INDEX => Some(verify::SERIAL_NUMBER),
      _ => None,
   }
}
