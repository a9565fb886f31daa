//! What the simulated CDC ACM test device must answer, and the comparisons
//! against it.

use crate::{debug::DbgBuf, UsbIpError};

pub const DEVICE_DESCRIPTOR: [u8; 18] = [
   0x12, 0x01, 0x00, 0x02, 0x02, 0x00, 0x00, 0x10, 0xc0, 0x16, 0x7a, 0x04, 0x00, 0x01, 0x01, 0x02,
   0x03, 0x01,
];

/// Total length of the configuration descriptor with everything it bundles.
pub const CONFIGURATION_TOTAL_LENGTH: u16 = 67;

pub const CONFIGURATION_BUNDLE: [u8; 67] = [
   // Configuration 1, 2 interfaces, self powered, 100 mA
   0x09, 0x02, 0x43, 0x00, 0x02, 0x01, 0x00, 0xc0, 0x32,
   // Interface 0: CDC communication, ACM, AT commands
   0x09, 0x04, 0x00, 0x00, 0x01, 0x02, 0x02, 0x01, 0x00,
   // CDC header, call management, ACM, union
   0x05, 0x24, 0x00, 0x10, 0x01,
   0x05, 0x24, 0x01, 0x01, 0x01,
   0x04, 0x24, 0x02, 0x06,
   0x05, 0x24, 0x06, 0x00, 0x01,
   // Endpoint 2 IN, interrupt, 16 bytes
   0x07, 0x05, 0x82, 0x03, 0x10, 0x00, 0x40,
   // Interface 1: CDC data
   0x09, 0x04, 0x01, 0x00, 0x02, 0x0a, 0x00, 0x00, 0x00,
   // Endpoint 3 OUT, bulk, 32 bytes
   0x07, 0x05, 0x03, 0x02, 0x20, 0x00, 0x00,
   // Endpoint 4 IN, bulk, 32 bytes
   0x07, 0x05, 0x84, 0x02, 0x20, 0x00, 0x00,
];

/// String descriptor 0: only US English.
pub const LANGUAGE_TABLE: [u8; 4] = [0x04, 0x03, 0x09, 0x04];

pub const MANUFACTURER_INDEX: u8 = 1;
pub const PRODUCT_INDEX: u8 = 2;
pub const SERIAL_NUMBER_INDEX: u8 = 3;

pub const MANUFACTURER: &str = "Your Name";
pub const PRODUCT: &str = "USB Serial";
pub const SERIAL_NUMBER: &str = "12345";

/// The first 9 bytes of [`CONFIGURATION_BUNDLE`].
pub fn configuration_header() -> &'static [u8] {
   &CONFIGURATION_BUNDLE[..9]
}

/// Encodes `text` the way a device returns it: length, type 3, UTF-16LE.
pub fn string_descriptor(text: &str) -> Vec<u8> {
   let units: Vec<u16> = text.encode_utf16().collect();

   let mut result = Vec::with_capacity(2 + 2 * units.len());
   result.push((2 + 2 * units.len()) as u8);
   result.push(0x03);
   for unit in units {
      result.extend_from_slice(&unit.to_le_bytes());
   }
   result
}

/// Fails with both buffers unless `actual` is exactly `expected`.
pub fn expect_bytes(what: &'static str, expected: &[u8], actual: &[u8]) -> Result<(), UsbIpError> {
   if expected != actual {
      log::error!(
         "{} mismatch\n  expected {:?}\n  actual   {:?}",
         what,
         DbgBuf(expected),
         DbgBuf(actual)
      );
      return Err(UsbIpError::Mismatch {
         what,
         expected: expected.to_vec(),
         actual: actual.to_vec(),
      });
   }
   Ok(())
}

pub fn expect_value(what: &'static str, expected: u64, actual: u64) -> Result<(), UsbIpError> {
   if expected != actual {
      return Err(UsbIpError::UnexpectedValue {
         what,
         expected,
         actual,
      });
   }
   Ok(())
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn string_descriptors_match_device_bytes() {
      assert_eq!(
         string_descriptor(PRODUCT),
         b"\x16\x03U\x00S\x00B\x00 \x00S\x00e\x00r\x00i\x00a\x00l\x00".to_vec()
      );
      assert_eq!(
         string_descriptor(MANUFACTURER),
         b"\x14\x03Y\x00o\x00u\x00r\x00 \x00N\x00a\x00m\x00e\x00".to_vec()
      );
      assert_eq!(
         string_descriptor(SERIAL_NUMBER),
         b"\x0c\x031\x002\x003\x004\x005\x00".to_vec()
      );
   }

   #[test]
   fn configuration_header_announces_bundle_length() {
      assert_eq!(configuration_header(), b"\t\x02C\x00\x02\x01\x00\xc02");
      assert_eq!(
         u16::from_le_bytes([CONFIGURATION_BUNDLE[2], CONFIGURATION_BUNDLE[3]]),
         CONFIGURATION_TOTAL_LENGTH
      );
   }

   #[test]
   fn mismatch_reports_both_buffers() {
      let err = expect_bytes("device descriptor", &[0x12, 0x01], &[0x12, 0x02]).unwrap_err();

      assert_eq!(
         err.to_string(),
         "device descriptor mismatch: expected [ 12 01 ], got [ 12 02 ]"
      );
      assert!(expect_bytes("same", &[1, 2], &[1, 2]).is_ok());
   }

   #[test]
   fn value_mismatch() {
      assert!(expect_value("total length", 67, 67).is_ok());
      assert!(matches!(
         expect_value("total length", 67, 9),
         Err(UsbIpError::UnexpectedValue { expected: 67, actual: 9, .. })
      ));
   }
}
