use crate::{debug::DbgBuf, UsbIpError};
use std::{
   io::{ErrorKind, Read, Write},
   net::{Shutdown, SocketAddr, TcpStream},
   time::Duration,
};

/// A byte stream to a USB/IP peer with exact-length reads.
pub trait Transport {
   /// Writes all of `data` or fails.
   fn send(&mut self, data: &[u8]) -> Result<(), UsbIpError>;

   /// Blocks until exactly `len` bytes arrived.
   ///
   /// A peer that closes the stream before that yields
   /// [`UsbIpError::ConnectionClosed`].
   fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>, UsbIpError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
   fn send(&mut self, data: &[u8]) -> Result<(), UsbIpError> {
      (**self).send(data)
   }

   fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>, UsbIpError> {
      (**self).receive_exact(len)
   }
}

/// A TCP connection to an exporter. The socket is shut down when this is dropped.
#[derive(Debug)]
pub struct TcpTransport {
   stream: TcpStream,
   peer: SocketAddr,
}

impl TcpTransport {
   pub fn connect(host: &str, port: u16) -> Result<Self, UsbIpError> {
      let stream = TcpStream::connect((host, port))?;
      let transport = Self::from_stream(stream)?;
      log::info!("connected to usbip exporter at {}", transport.peer);
      Ok(transport)
   }

   /// Wraps an already connected stream, e.g. one accepted by a listener.
   pub fn from_stream(stream: TcpStream) -> Result<Self, UsbIpError> {
      stream.set_nodelay(true)?;
      let peer = stream.peer_addr()?;
      Ok(Self { stream, peer })
   }

   /// Sets a deadline for every read. `None` blocks indefinitely.
   pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), UsbIpError> {
      self.stream.set_read_timeout(timeout)?;
      Ok(())
   }
}

impl Transport for TcpTransport {
   fn send(&mut self, data: &[u8]) -> Result<(), UsbIpError> {
      log::trace!("send {:?}", DbgBuf(data));
      self.stream.write_all(data)?;
      Ok(())
   }

   fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>, UsbIpError> {
      let mut buf = vec![0; len];
      let mut received = 0;

      while received < len {
         match self.stream.read(&mut buf[received..]) {
            Ok(0) => {
               log::warn!("peer {} closed the connection", self.peer);
               return Err(UsbIpError::ConnectionClosed {
                  expected: len,
                  received,
               });
            }
            Ok(count) => received += count,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
         }
      }

      log::trace!("received {:?}", DbgBuf(&buf));
      Ok(buf)
   }
}

impl Drop for TcpTransport {
   fn drop(&mut self) {
      match self.stream.shutdown(Shutdown::Both) {
         Ok(()) => log::debug!("closed connection to {}", self.peer),
         // The peer may already be gone
         Err(err) => log::debug!("shutdown of {} failed: {}", self.peer, err),
      }
   }
}
