//! Bounded retries for endpoints that NAK while the device is busy.
//!
//! The transfer primitives in [`crate::engine`] never retry on their own. Callers
//! pick a [`RetryPolicy`] per endpoint and wrap the transfer in one of the helpers
//! below.

use crate::UsbIpError;
use std::{thread, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
   /// Retries after the first attempt.
   pub max_retries: u32,
   pub delay: Duration,
}

impl RetryPolicy {
   /// Outbound bulk data: three attempts in total.
   pub const BULK_OUT: Self = Self::new(2, Duration::from_millis(50));

   /// Inbound bulk data: thirteen attempts in total.
   pub const BULK_IN: Self = Self::new(12, Duration::from_millis(50));

   pub const fn new(max_retries: u32, delay: Duration) -> Self {
      Self { max_retries, delay }
   }

   pub const fn with_delay(self, delay: Duration) -> Self {
      Self { delay, ..self }
   }

   pub fn attempts(&self) -> u32 {
      self.max_retries + 1
   }
}

/// Runs `op` until it returns something other than a NAK or the policy runs out.
///
/// `op` receives the zero based attempt number. When every attempt NAKs, the
/// last [`UsbIpError::Nak`] is returned. Any other error ends the loop at once.
pub fn retry_on_nak<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, UsbIpError>
where
   F: FnMut(u32) -> Result<T, UsbIpError>,
{
   let mut attempt = 0;
   loop {
      match op(attempt) {
         Err(err) if err.is_nak() && attempt < policy.max_retries => {
            log::warn!(
               "attempt {} of {}: {}, retrying in {:?}",
               attempt + 1,
               policy.attempts(),
               err,
               policy.delay
            );
            thread::sleep(policy.delay);
            attempt += 1;
         }
         result => return result,
      }
   }
}

/// Like [`retry_on_nak`], but a completed read without payload counts as a NAK too.
///
/// Running out of attempts yields [`UsbIpError::NoData`].
pub fn retry_until_data<F>(policy: &RetryPolicy, mut op: F) -> Result<Vec<u8>, UsbIpError>
where
   F: FnMut(u32) -> Result<Vec<u8>, UsbIpError>,
{
   let result = retry_on_nak(policy, |attempt| {
      let data = op(attempt)?;
      if data.is_empty() {
         return Err(UsbIpError::Nak { status: 0 });
      }
      Ok(data)
   });

   match result {
      Err(err) if err.is_nak() => Err(UsbIpError::NoData {
         attempts: policy.attempts(),
      }),
      other => other,
   }
}
