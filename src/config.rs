use crate::{retry::RetryPolicy, USBIP_PORT};
use std::time::Duration;

/// Where to find the exporter and how to talk to the imported device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesterConfig {
   pub host: String,
   pub port: u16,
   pub bus_id: String,

   pub interrupt_ep: u32,
   pub bulk_out_ep: u32,
   pub bulk_in_ep: u32,

   pub bulk_out_retry: RetryPolicy,
   pub bulk_in_retry: RetryPolicy,

   /// Pause after `SET_CONFIGURATION` before talking to the CDC interface.
   pub settle: Duration,

   /// Socket read deadline. `None` waits forever.
   pub read_timeout: Option<Duration>,
}

impl Default for TesterConfig {
   fn default() -> Self {
      Self {
         host: "127.0.0.1".to_string(),
         port: USBIP_PORT,
         bus_id: "1-1".to_string(),
         interrupt_ep: 2,
         bulk_out_ep: 3,
         bulk_in_ep: 4,
         bulk_out_retry: RetryPolicy::BULK_OUT,
         bulk_in_retry: RetryPolicy::BULK_IN,
         settle: Duration::from_millis(100),
         read_timeout: None,
      }
   }
}
