//! Vendor requests understood by the EZ-USB bootstrap loaders.
//!
//! The hardware (first stage) loader implements `RW_INTERNAL`; a second stage loader such as
//! Cypress' "a3load" or "Vend_Ax" adds `RW_MEMORY` for external memory.  A 32-bit address is
//! split over `wValue` (low half) and `wIndex` (high half).

use log::{debug, error, info, warn};

use super::*;

/// Write/read on-chip memory.  Implemented by the hardware.
pub const RW_INTERNAL: u8 = 0xa0;
/// Write/read external memory.  Needs a second stage loader.
pub const RW_MEMORY: u8 = 0xa3;

/// Attempts made for a memory transfer that keeps timing out.
pub const RETRY_LIMIT: usize = 5;
pub const CONTROL_TIMEOUT_MS: u32 = 1000;
/// Largest single vendor memory transfer.
pub const MAX_CHUNK: usize = 4096;

fn split_address(address: u32) -> (u16, u16) {
    ((address & 0xffff) as u16, (address >> 16) as u16)
}

/// Issue a vendor write of `data` at `address`.  `data` is at most `MAX_CHUNK` bytes.
///
/// Control messages are not NAKed (just dropped), so only a timeout is worth retrying; it is
/// retried until `RETRY_LIMIT` attempts have been made.  The `Ok` result is the number of
/// bytes the device accepted.
pub fn write<T: Transport + ?Sized>(device: &T,
                                    label: &'static str,
                                    request: u8,
                                    address: u32,
                                    data: &[u8])
                                    -> Result<usize> {
    check_chunk(label, data.len())?;
    debug!("{}, addr {:#010x} len {:4} ({:#06x})", label, address, data.len(), data.len());
    let (value, index) = split_address(address);
    retry(label, || device.control_out(SetupType::Vendor,
                                       SetupRecipient::Device,
                                       request,
                                       value,
                                       index,
                                       data,
                                       CONTROL_TIMEOUT_MS))
        .map(|n| check_len(label, data.len(), n))
}

/// Issue a vendor read into `data` from `address`.  Same retry policy as `write()`.
pub fn read<T: Transport + ?Sized>(device: &T,
                                   label: &'static str,
                                   request: u8,
                                   address: u32,
                                   data: &mut [u8])
                                   -> Result<usize> {
    check_chunk(label, data.len())?;
    debug!("{}, addr {:#010x} len {:4} ({:#06x})", label, address, data.len(), data.len());
    let (value, index) = split_address(address);
    let expected = data.len();
    retry(label, || device.control_in(SetupType::Vendor,
                                      SetupRecipient::Device,
                                      request,
                                      value,
                                      index,
                                      &mut *data,
                                      CONTROL_TIMEOUT_MS))
        .map(|n| check_len(label, expected, n))
}

fn check_chunk(label: &'static str, len: usize) -> Result<()> {
    if len > MAX_CHUNK {
        return Err(Error::TransferTooLarge { label, len, max: MAX_CHUNK });
    }
    Ok(())
}

fn retry<F>(label: &'static str, mut transfer: F) -> Result<usize>
    where F: FnMut() -> std::result::Result<usize, TransportError>
{
    let mut attempt = 1;
    loop {
        match transfer() {
            Ok(n) => return Ok(n),
            Err(TransportError::Timeout) if attempt < RETRY_LIMIT => {
                debug!("{}: timeout, attempt {} of {}", label, attempt, RETRY_LIMIT);
                attempt += 1;
            }
            Err(source) => {
                error!("{}: {}", label, source);
                return Err(Error::TransferFailed { label, source });
            }
        }
    }
}

fn check_len(label: &str, expected: usize, actual: usize) -> usize {
    if actual != expected {
        warn!("{} ==> {}", label, actual);
    }
    actual
}

/// Stop (`run == false`) or reset (`run == true`) the 8051 through its CPUCS register.
///
/// The device may drop off the bus as soon as it starts running new firmware, so a
/// disconnect while releasing the CPU counts as success.
pub fn cpucs<T: Transport + ?Sized>(device: &T, cpucs_address: u32, run: bool) -> Result<()> {
    const LABEL: &str = "can't modify CPUCS";

    info!("{}", if run { "reset CPU" } else { "stop CPU" });
    let (value, index) = split_address(cpucs_address);
    let data = [if run { 0x00 } else { 0x01 }];
    match device.control_out(SetupType::Vendor, SetupRecipient::Device, RW_INTERNAL,
                             value, index, &data, CONTROL_TIMEOUT_MS) {
        Ok(1) => Ok(()),
        Err(ref err) if run && err.is_disconnect() => Ok(()),
        Ok(n) => Err(Error::ShortTransfer { label: LABEL, expected: 1, actual: n }),
        Err(source) => {
            error!("{}: {}", LABEL, source);
            Err(Error::TransferFailed { label: LABEL, source })
        }
    }
}

/// Transfer FX3 execution to the program entry at `address`.
pub fn fx3_jump<T: Transport + ?Sized>(device: &T, address: u32) -> Result<()> {
    const LABEL: &str = "failed to send jump command";

    info!("transfer execution to Program Entry at {:#010x}", address);
    let (value, index) = split_address(address);
    match device.control_out(SetupType::Vendor, SetupRecipient::Device, RW_INTERNAL,
                             value, index, &[], CONTROL_TIMEOUT_MS) {
        Ok(0) => Ok(()),
        Err(ref err) if err.is_disconnect() => Ok(()),
        Ok(n) => Err(Error::ShortTransfer { label: LABEL, expected: 0, actual: n }),
        Err(source) => Err(Error::TransferFailed { label: LABEL, source }),
    }
}
