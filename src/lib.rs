//! A client-side emulation of the USB/IP protocol.
//!
//! This crate plays the part normally taken by the `vhci-hcd` kernel driver together
//! with the `usbip` userspace tool. It attaches to a remote USB/IP exporter, imports a
//! device and then drives control, bulk and interrupt transfers against it, checking
//! the replies byte for byte against what a known device should answer.
//!
//! ```no_run
//! use usbip_tester::{scenario, ScenarioKind, TesterConfig};
//!
//! let config = TesterConfig::default();
//! scenario::run(&config, ScenarioKind::Enumerate)?;
//! # Ok::<(), usbip_tester::UsbIpError>(())
//! ```

pub mod cmd;
pub mod config;
pub mod debug;
pub mod engine;
pub mod handshake;
pub mod op;
pub mod request;
pub mod response;
pub mod retry;
pub mod scenario;
pub mod setup;
pub mod transport;
pub mod verify;

pub use config::TesterConfig;
pub use engine::{TransferOutcome, UsbIpClient};
pub use handshake::{attach, list_devices};
pub use op::{DeviceRecord, ExportedDevice, InterfaceRecord};
pub use retry::RetryPolicy;
pub use scenario::{Scenario, ScenarioKind, Step};
pub use setup::{LineCoding, SetupPacket};
pub use transport::{TcpTransport, Transport};

use crate::debug::DbgBuf;
use thiserror::Error;

/// The TCP port USB/IP exporters listen on by default.
pub const USBIP_PORT: u16 = 3240;

/// Everything that can end a transfer, a handshake or a scenario.
///
/// Only [`UsbIpError::Nak`] is transient. Every other variant is fatal to the
/// scenario that produced it.
#[derive(Debug, Error)]
pub enum UsbIpError {
   #[error("connection error: {0}")]
   Connection(#[from] std::io::Error),

   #[error("connection closed after {received} of {expected} bytes")]
   ConnectionClosed { expected: usize, received: usize },

   #[error("malformed {what}: expected {expected} bytes, got {actual}")]
   Malformed {
      what: &'static str,
      expected: usize,
      actual: usize,
   },

   #[error("protocol error: {0}")]
   Protocol(#[from] ProtocolViolation),

   #[error("import denied by exporter (status {status})")]
   ImportDenied { status: u32 },

   #[error("device list denied by exporter (status {status})")]
   ListDenied { status: u32 },

   #[error("device not ready (status {status})")]
   Nak { status: i32 },

   #[error("expected data but none arrived after {attempts} attempts")]
   NoData { attempts: u32 },

   #[error("{step}: expected the device to NAK, but the transfer completed")]
   UnexpectedSuccess { step: &'static str },

   #[error("{what} mismatch: expected {}, got {}", DbgBuf(.expected), DbgBuf(.actual))]
   Mismatch {
      what: &'static str,
      expected: Vec<u8>,
      actual: Vec<u8>,
   },

   #[error("{what}: expected {expected}, got {actual}")]
   UnexpectedValue {
      what: &'static str,
      expected: u64,
      actual: u64,
   },
}

impl UsbIpError {
   /// Whether this is the transient "device not ready" signal.
   pub fn is_nak(&self) -> bool {
      matches!(self, Self::Nak { .. })
   }
}

/// A hard violation of the USB/IP framing. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
   #[error("protocol version {actual:#06x}, expected {expected:#06x}")]
   VersionMismatch { expected: u16, actual: u16 },

   #[error("op code {actual:#06x}, expected {expected:#06x}")]
   UnexpectedOpCode { expected: u16, actual: u16 },

   #[error("command {actual:#x}, expected {expected:#x}")]
   UnexpectedCommand { expected: u32, actual: u32 },

   #[error("sequence number {actual}, expected {expected}")]
   SequenceMismatch { expected: u32, actual: u32 },

   #[error("OUT transfer returned non-zero actual length {0}")]
   NonZeroOutLength(i32),

   #[error("negative {what} {value}")]
   NegativeLength { what: &'static str, value: i32 },

   #[error("invalid direction {0}")]
   InvalidDirection(u32),

   #[error("{actual} bytes returned, only {requested} requested")]
   ExcessLength { requested: usize, actual: usize },

   #[error("{what} is {len} bytes, at most {max} fit")]
   FieldTooLong {
      what: &'static str,
      len: usize,
      max: usize,
   },
}
