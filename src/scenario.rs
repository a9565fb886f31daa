//! Standard USB requests against an imported device, and the ordered step lists
//! that exercise the simulated CDC ACM test device.

use crate::{
   config::TesterConfig,
   engine::UsbIpClient,
   handshake,
   op::ExportedDevice,
   retry::{retry_on_nak, retry_until_data},
   setup::{LineCoding, SetupPacket, LANG_ID_EN_US, LINE_STATE_DTR, LINE_STATE_RTS},
   transport::{TcpTransport, Transport},
   verify, UsbIpError,
};
use std::{fmt, thread};

/// Control endpoint
pub const EP0: u32 = 0;

/// Longest string descriptor a device can return.
pub const MAX_STRING_LENGTH: u16 = 255;

/// Max packet size used for bulk and interrupt reads.
pub const MAX_PACKET_SIZE: usize = 64;

/// One verified exchange with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
   DeviceDescriptor,
   /// The device is full speed only, so it must NAK this.
   DeviceQualifierNak,
   ConfigurationDescriptor,
   StringDescriptors,
   SetConfiguration,
   Settle,
   LineCoding,
   InterruptPolls(u32),
   BulkEcho(u32),
}

impl fmt::Display for Step {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      match self {
         Self::DeviceDescriptor => f.write_str("get device descriptor"),
         Self::DeviceQualifierNak => f.write_str("get device qualifier"),
         Self::ConfigurationDescriptor => f.write_str("get configuration descriptor"),
         Self::StringDescriptors => f.write_str("get string descriptors"),
         Self::SetConfiguration => f.write_str("set configuration"),
         Self::Settle => f.write_str("settle"),
         Self::LineCoding => f.write_str("cdc line coding"),
         Self::InterruptPolls(count) => write!(f, "{} interrupt polls", count),
         Self::BulkEcho(count) => write!(f, "{} bulk echo rounds", count),
      }
   }
}

/// Which step list to run after attaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
   /// Everything, in enumeration order
   Full,
   /// Only list the exported devices, do not attach
   List,
   /// Device, qualifier and configuration descriptors
   Enumerate,
   /// String descriptors
   Strings,
   /// Configure and set up the serial line
   Cdc,
   /// Poll the idle interrupt endpoint
   Interrupt,
   /// Write to the bulk OUT endpoint and read the echo back
   BulkEcho,
}

impl ScenarioKind {
   pub fn steps(self) -> &'static [Step] {
      match self {
         Self::Full => &[
            Step::DeviceDescriptor,
            Step::DeviceQualifierNak,
            Step::ConfigurationDescriptor,
            Step::StringDescriptors,
            Step::SetConfiguration,
            Step::Settle,
            Step::LineCoding,
            Step::InterruptPolls(10),
            Step::BulkEcho(10),
         ],
         Self::List => &[],
         Self::Enumerate => &[
            Step::DeviceDescriptor,
            Step::DeviceQualifierNak,
            Step::ConfigurationDescriptor,
         ],
         Self::Strings => &[Step::StringDescriptors],
         Self::Cdc => &[Step::SetConfiguration, Step::Settle, Step::LineCoding],
         Self::Interrupt => &[Step::SetConfiguration, Step::Settle, Step::InterruptPolls(10)],
         Self::BulkEcho => &[
            Step::SetConfiguration,
            Step::Settle,
            Step::LineCoding,
            Step::BulkEcho(10),
         ],
      }
   }
}

/// Connects, attaches and runs `kind` to completion. The first failure ends the run.
pub fn run(config: &TesterConfig, kind: ScenarioKind) -> Result<(), UsbIpError> {
   if kind == ScenarioKind::List {
      list(config)?;
      return Ok(());
   }

   let transport = connect(config)?;
   let mut client = UsbIpClient::attach(transport, &config.bus_id)?;
   Scenario::new(&mut client, config).run(kind.steps())
}

/// Connects and fetches the exporter's device list.
pub fn list(config: &TesterConfig) -> Result<Vec<ExportedDevice>, UsbIpError> {
   let mut transport = connect(config)?;
   handshake::list_devices(&mut transport)
}

fn connect(config: &TesterConfig) -> Result<TcpTransport, UsbIpError> {
   let transport = TcpTransport::connect(&config.host, config.port)?;
   transport.set_read_timeout(config.read_timeout)?;
   Ok(transport)
}

/// Request helpers bound to one attached device.
pub struct Scenario<'a, T: Transport> {
   client: &'a mut UsbIpClient<T>,
   config: &'a TesterConfig,
}

impl<'a, T: Transport> Scenario<'a, T> {
   pub fn new(client: &'a mut UsbIpClient<T>, config: &'a TesterConfig) -> Self {
      Self { client, config }
   }

   pub fn get_device_descriptor(&mut self) -> Result<Vec<u8>, UsbIpError> {
      self.client
         .submit_in(EP0, Some(SetupPacket::get_device_descriptor(64)), None)
   }

   pub fn get_device_qualifier(&mut self) -> Result<Vec<u8>, UsbIpError> {
      self.client
         .submit_in(EP0, Some(SetupPacket::get_device_qualifier(10)), None)
   }

   pub fn get_configuration(&mut self, length: u16) -> Result<Vec<u8>, UsbIpError> {
      self.client.submit_in(
         EP0,
         Some(SetupPacket::get_configuration_descriptor(0, length)),
         None,
      )
   }

   /// Reads the 9 byte header for `wTotalLength`, then the whole bundle.
   pub fn get_configuration_descriptor(&mut self) -> Result<Vec<u8>, UsbIpError> {
      let header = self.get_configuration(9)?;
      let total = configuration_total_length(&header)?;
      self.get_configuration(total)
   }

   pub fn get_string_descriptor(&mut self, index: u8, lang_id: u16) -> Result<Vec<u8>, UsbIpError> {
      self.client.submit_in(
         EP0,
         Some(SetupPacket::get_string_descriptor(index, lang_id, MAX_STRING_LENGTH)),
         None,
      )
   }

   pub fn set_configuration(&mut self, configuration: u8) -> Result<(), UsbIpError> {
      self.client
         .submit_out(EP0, Some(SetupPacket::set_configuration(configuration)), &[])
   }

   pub fn set_line_coding(&mut self, coding: &LineCoding) -> Result<(), UsbIpError> {
      self.client
         .submit_out(EP0, Some(SetupPacket::set_line_coding(0)), &coding.to_bytes())
   }

   pub fn set_control_line_state(&mut self, state: u16) -> Result<(), UsbIpError> {
      self.client
         .submit_out(EP0, Some(SetupPacket::set_control_line_state(0, state)), &[])
   }

   /// Polls the interrupt endpoint once. Nothing is pending, so it has to NAK.
   pub fn poll_interrupt(&mut self) -> Result<(), UsbIpError> {
      let ep = self.config.interrupt_ep;
      expect_nak("interrupt poll", self.client.submit_in(ep, None, Some(MAX_PACKET_SIZE)))
   }

   /// Writes to the bulk OUT endpoint, retrying while the device NAKs.
   pub fn write_bulk(&mut self, data: &[u8]) -> Result<(), UsbIpError> {
      let ep = self.config.bulk_out_ep;
      let policy = self.config.bulk_out_retry;
      let client = &mut *self.client;

      retry_on_nak(&policy, |_| client.submit_out(ep, None, data))
   }

   /// Reads from the bulk IN endpoint until data arrives or retries run out.
   pub fn read_bulk(&mut self) -> Result<Vec<u8>, UsbIpError> {
      let ep = self.config.bulk_in_ep;
      let policy = self.config.bulk_in_retry;
      let client = &mut *self.client;

      retry_until_data(&policy, |_| client.submit_in(ep, None, Some(MAX_PACKET_SIZE)))
   }

   /// Reads from the bulk IN endpoint once, expecting nothing to be queued.
   pub fn read_bulk_expect_nak(&mut self) -> Result<(), UsbIpError> {
      let ep = self.config.bulk_in_ep;
      expect_nak("bulk read", self.client.submit_in(ep, None, Some(MAX_PACKET_SIZE)))
   }

   pub fn run(&mut self, steps: &[Step]) -> Result<(), UsbIpError> {
      for step in steps {
         self.run_step(*step)?;
      }
      log::info!("all {} steps passed", steps.len());
      Ok(())
   }

   pub fn run_step(&mut self, step: Step) -> Result<(), UsbIpError> {
      log::info!("{}", step);

      match step {
         Step::DeviceDescriptor => {
            let data = self.get_device_descriptor()?;
            verify::expect_bytes("device descriptor", &verify::DEVICE_DESCRIPTOR, &data)
         }
         Step::DeviceQualifierNak => {
            expect_nak("device qualifier", self.get_device_qualifier())
         }
         Step::ConfigurationDescriptor => {
            let header = self.get_configuration(9)?;
            verify::expect_bytes("configuration header", verify::configuration_header(), &header)?;

            let total = configuration_total_length(&header)?;
            verify::expect_value(
               "configuration total length",
               u64::from(verify::CONFIGURATION_TOTAL_LENGTH),
               u64::from(total),
            )?;

            let bundle = self.get_configuration(total)?;
            verify::expect_bytes("configuration descriptor", &verify::CONFIGURATION_BUNDLE, &bundle)
         }
         Step::StringDescriptors => {
            let languages = self.get_string_descriptor(0, 0)?;
            verify::expect_bytes("language table", &verify::LANGUAGE_TABLE, &languages)?;

            let strings = [
               ("product string", verify::PRODUCT_INDEX, verify::PRODUCT),
               ("manufacturer string", verify::MANUFACTURER_INDEX, verify::MANUFACTURER),
               ("serial number string", verify::SERIAL_NUMBER_INDEX, verify::SERIAL_NUMBER),
            ];
            for (what, index, text) in strings {
               let data = self.get_string_descriptor(index, LANG_ID_EN_US)?;
               verify::expect_bytes(what, &verify::string_descriptor(text), &data)?;
            }
            Ok(())
         }
         Step::SetConfiguration => self.set_configuration(1),
         Step::Settle => {
            thread::sleep(self.config.settle);
            Ok(())
         }
         Step::LineCoding => {
            self.set_line_coding(&LineCoding::eight_n_one(9600))?;
            self.set_line_coding(&LineCoding::eight_n_one(57600))?;
            self.set_control_line_state(LINE_STATE_DTR | LINE_STATE_RTS)
         }
         Step::InterruptPolls(count) => {
            for _ in 0..count {
               self.poll_interrupt()?;
            }
            Ok(())
         }
         Step::BulkEcho(count) => {
            for round in 0..count {
               log::debug!("bulk echo round {}", round);
               self.write_bulk(b"H")?;
               let echo = self.read_bulk()?;
               verify::expect_bytes("bulk echo", b"H", &echo)?;
            }
            Ok(())
         }
      }
   }
}

/// `wTotalLength` of a configuration descriptor header.
pub fn configuration_total_length(header: &[u8]) -> Result<u16, UsbIpError> {
   if header.len() < 4 {
      return Err(UsbIpError::Malformed {
         what: "configuration descriptor header",
         expected: 9,
         actual: header.len(),
      });
   }
   Ok(u16::from_le_bytes([header[2], header[3]]))
}

/// Turns an expected NAK into success and a completed transfer into a failure.
fn expect_nak<T>(step: &'static str, result: Result<T, UsbIpError>) -> Result<(), UsbIpError> {
   match result {
      Err(err) if err.is_nak() => Ok(()),
      Err(err) => Err(err),
      Ok(_) => Err(UsbIpError::UnexpectedSuccess { step }),
   }
}
