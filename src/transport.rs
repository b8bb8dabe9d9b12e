use std::io;
use std::result::Result;

use thiserror::Error;

use super::*;

/// Failure reported by a `Transport`.
///
/// The loaders and the storage framer only ever retry on `Timeout` (memory writes) and
/// `Stall` (Bulk-Only command and status stages); everything else is surfaced.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transfer timed out")]
    Timeout,

    /// Endpoint halted (`EPIPE`).
    #[error("pipe stalled")]
    Stall,

    #[error("device disconnected")]
    Disconnected,

    #[error("i/o error: {0}")]
    Io(io::Error),
}

impl TransportError {
    /// True for the errors a device produces when it drops off the bus, which is expected
    /// right after its CPU has been released from reset.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Disconnected => true,
            TransportError::Io(err) => matches!(err.raw_os_error(), Some(libc::EIO) | Some(libc::EPROTO)),
            _ => false,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ETIMEDOUT) => TransportError::Timeout,
            Some(libc::EPIPE) => TransportError::Stall,
            Some(libc::ENODEV) | Some(libc::ESHUTDOWN) => TransportError::Disconnected,
            _ if err.kind() == io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Io(err),
        }
    }
}

/// Blocking USB operations needed by the firmware loaders and the mass storage framer.
///
/// `Device` implements this over usbfs.  All methods take `&self`; a transport is a handle to
/// an open device, not a buffer owner.  The `Ok` result is the number of bytes transferred.
pub trait Transport {
    /// Control transfer from host to device.  `data` may be empty.
    fn control_out(&self,
                   setuptype: SetupType,
                   setuprecipient: SetupRecipient,
                   bRequest: u8,
                   wValue: u16,
                   wIndex: u16,
                   data: &[u8],
                   timeout_ms: u32)
                   -> Result<usize, TransportError>;

    /// Control transfer from device to host into `data`.
    fn control_in(&self,
                  setuptype: SetupType,
                  setuprecipient: SetupRecipient,
                  bRequest: u8,
                  wValue: u16,
                  wIndex: u16,
                  data: &mut [u8],
                  timeout_ms: u32)
                  -> Result<usize, TransportError>;

    /// Bulk transfer on `endpoint`.  The direction follows bit 7 of the endpoint address; for
    /// OUT endpoints `data` is only read.
    fn bulk_transfer(&self, endpoint: u8, data: &mut [u8], timeout_ms: u32) -> Result<usize, TransportError>;

    /// Clear a halt (stall) condition on `endpoint`.
    fn clear_halt(&self, endpoint: u8) -> Result<(), TransportError>;
}

impl<'a, T: Transport + ?Sized> Transport for &'a T {
    fn control_out(&self,
                   setuptype: SetupType,
                   setuprecipient: SetupRecipient,
                   bRequest: u8,
                   wValue: u16,
                   wIndex: u16,
                   data: &[u8],
                   timeout_ms: u32)
                   -> Result<usize, TransportError> {
        (**self).control_out(setuptype, setuprecipient, bRequest, wValue, wIndex, data, timeout_ms)
    }

    fn control_in(&self,
                  setuptype: SetupType,
                  setuprecipient: SetupRecipient,
                  bRequest: u8,
                  wValue: u16,
                  wIndex: u16,
                  data: &mut [u8],
                  timeout_ms: u32)
                  -> Result<usize, TransportError> {
        (**self).control_in(setuptype, setuprecipient, bRequest, wValue, wIndex, data, timeout_ms)
    }

    fn bulk_transfer(&self, endpoint: u8, data: &mut [u8], timeout_ms: u32) -> Result<usize, TransportError> {
        (**self).bulk_transfer(endpoint, data, timeout_ms)
    }

    fn clear_halt(&self, endpoint: u8) -> Result<(), TransportError> {
        (**self).clear_halt(endpoint)
    }
}


/// Scripted transport for unit tests.
///
/// Replies are consumed in order by control and bulk transfers.  When the script runs dry,
/// control writes land in a sparse memory map keyed by `wValue | wIndex << 16` and control
/// reads are served from it, so write/readback sequences verify naturally.
#[cfg(test)]
pub(crate) mod mock {
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    use super::*;

    #[derive(Debug)]
    pub(crate) enum Reply {
        /// Report this many bytes transferred.
        Done(usize),
        /// Copy these bytes into the IN buffer.
        Data(Vec<u8>),
        Fail(TransportError),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        ControlOut { request_type: u8, request: u8, value: u16, index: u16, data: Vec<u8> },
        ControlIn { request_type: u8, request: u8, value: u16, index: u16, len: usize },
        Bulk { endpoint: u8, data: Vec<u8> },
        ClearHalt(u8),
    }

    #[derive(Default)]
    pub(crate) struct MockTransport {
        pub calls: RefCell<Vec<Call>>,
        replies: RefCell<VecDeque<Reply>>,
        memory: RefCell<HashMap<u32, u8>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Default::default()
        }

        pub fn push(&self, reply: Reply) {
            self.replies.borrow_mut().push_back(reply);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        pub fn peek(&self, address: u32, len: usize) -> Vec<u8> {
            let memory = self.memory.borrow();
            (0..len).map(|i| *memory.get(&(address + i as u32)).unwrap_or(&0)).collect()
        }

        fn next_reply(&self) -> Option<Reply> {
            self.replies.borrow_mut().pop_front()
        }

        fn fill(data: &mut [u8], bytes: Vec<u8>) -> usize {
            let n = bytes.len().min(data.len());
            data[..n].copy_from_slice(&bytes[..n]);
            n
        }
    }

    impl Transport for MockTransport {
        fn control_out(&self,
                       setuptype: SetupType,
                       setuprecipient: SetupRecipient,
                       bRequest: u8,
                       wValue: u16,
                       wIndex: u16,
                       data: &[u8],
                       _timeout_ms: u32)
                       -> Result<usize, TransportError> {
            self.calls.borrow_mut().push(Call::ControlOut {
                request_type: request_type(SetupDirection::HostToDevice, setuptype, setuprecipient),
                request: bRequest,
                value: wValue,
                index: wIndex,
                data: data.to_vec(),
            });
            match self.next_reply() {
                Some(Reply::Done(n)) => Ok(n),
                Some(Reply::Data(_)) => Ok(data.len()),
                Some(Reply::Fail(err)) => Err(err),
                None => {
                    let base = (wValue as u32) | ((wIndex as u32) << 16);
                    let mut memory = self.memory.borrow_mut();
                    for (i, byte) in data.iter().enumerate() {
                        memory.insert(base.wrapping_add(i as u32), *byte);
                    }
                    Ok(data.len())
                }
            }
        }

        fn control_in(&self,
                      setuptype: SetupType,
                      setuprecipient: SetupRecipient,
                      bRequest: u8,
                      wValue: u16,
                      wIndex: u16,
                      data: &mut [u8],
                      _timeout_ms: u32)
                      -> Result<usize, TransportError> {
            self.calls.borrow_mut().push(Call::ControlIn {
                request_type: request_type(SetupDirection::DeviceToHost, setuptype, setuprecipient),
                request: bRequest,
                value: wValue,
                index: wIndex,
                len: data.len(),
            });
            match self.next_reply() {
                Some(Reply::Done(n)) => Ok(n),
                Some(Reply::Data(bytes)) => Ok(Self::fill(data, bytes)),
                Some(Reply::Fail(err)) => Err(err),
                None => {
                    let base = (wValue as u32) | ((wIndex as u32) << 16);
                    let memory = self.memory.borrow();
                    for (i, byte) in data.iter_mut().enumerate() {
                        *byte = *memory.get(&base.wrapping_add(i as u32)).unwrap_or(&0);
                    }
                    Ok(data.len())
                }
            }
        }

        fn bulk_transfer(&self, endpoint: u8, data: &mut [u8], _timeout_ms: u32) -> Result<usize, TransportError> {
            let sent = if is_in_endpoint(endpoint) { Vec::new() } else { data.to_vec() };
            self.calls.borrow_mut().push(Call::Bulk { endpoint, data: sent });
            match self.next_reply() {
                Some(Reply::Done(n)) => Ok(n),
                Some(Reply::Data(bytes)) => Ok(Self::fill(data, bytes)),
                Some(Reply::Fail(err)) => Err(err),
                None => Ok(data.len()),
            }
        }

        fn clear_halt(&self, endpoint: u8) -> Result<(), TransportError> {
            self.calls.borrow_mut().push(Call::ClearHalt(endpoint));
            Ok(())
        }
    }
}
