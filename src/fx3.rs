//! Cypress FX3 RAM images (see Cypress AN76405).
//!
//! Layout: a `'C' 'Y' ctl type` header, then records of `(length in 32-bit words, address)`
//! followed by the words themselves, a zero length record whose address is the program
//! entry, and a trailing checksum that is the wrapping sum of every data word.  All fields
//! are little endian.

use std::io::Read;

use log::{info, log_enabled, Level};

use super::*;
use crate::image::read_full;
use crate::memory::{MAX_CHUNK, RW_INTERNAL};

pub const BOOTLOADER_VERSION_ADDRESS: u32 = 0xffff_0020;

const IMAGE_NORMAL: u8 = 0xb0;
const IMAGE_SECURE: u8 = 0xb1;
const IMAGE_VIDPID: u8 = 0xb2;

fn read_u32<R: Read>(image: &mut R) -> Result<Option<u32>> {
    let mut word = [0u8; 4];
    match read_full(image, &mut word)? {
        4 => Ok(Some(u32::from_le_bytes(word))),
        _ => Ok(None),
    }
}

fn require_u32<R: Read>(image: &mut R) -> Result<u32> {
    read_u32(image)?.ok_or_else(|| Error::MalformedImage("could not read image".to_string()))
}

/// Write an FX3 image into device RAM, verifying every chunk, then jump to its entry point.
///
/// Data is written as it is read, so a checksum error is only detected after the whole
/// image has been transferred; the device is not started in that case.  Returns the entry
/// address.
pub fn load_ram<T: Transport + ?Sized, R: Read>(device: &T, mut image: R) -> Result<u32> {
    let mut header = [0u8; 4];
    if read_full(&mut image, &mut header)? != header.len() {
        return Err(Error::MalformedImage("could not read image header".to_string()));
    }

    // check "CY" signature byte and format
    if &header[..2] != b"CY" {
        return Err(Error::MalformedImage("image doesn't have a CYpress signature".to_string()));
    }
    match header[3] {
        IMAGE_NORMAL => info!("normal FW binary {} image with checksum",
                              if header[2] & 0x01 != 0 { "data" } else { "executable" }),
        IMAGE_SECURE => return Err(Error::MalformedImage(
            "security binary image is not currently supported".to_string())),
        IMAGE_VIDPID => return Err(Error::MalformedImage(
            "VID:PID image is not currently supported".to_string())),
        other => return Err(Error::MalformedImage(format!("invalid image type {:#04X}", other))),
    }

    if log_enabled!(Level::Info) {
        let mut version = [0u8; 4];
        memory::read(device, "read bootloader version", RW_INTERNAL, BOOTLOADER_VERSION_ADDRESS, &mut version)?;
        info!("FX3 bootloader version: {:#04X}{:02X}{:02X}{:02X}",
              version[3], version[2], version[1], version[0]);
    }

    info!("writing image...");
    let mut checksum = 0u32;
    let mut readback = vec![0u8; MAX_CHUNK];
    let entry = loop {
        let length = require_u32(&mut image)?;
        let mut address = require_u32(&mut image)?;
        if length == 0 {
            break address;
        }

        let byte_len = length as u64 * 4;
        let mut section = Vec::new();
        (&mut image).take(byte_len).read_to_end(&mut section)?;
        if section.len() as u64 != byte_len {
            return Err(Error::MalformedImage(
                format!("section at {:#010x} is truncated", address)));
        }

        checksum = section.chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .fold(checksum, u32::wrapping_add);

        for chunk in section.chunks(MAX_CHUNK) {
            let readback = &mut readback[..chunk.len()];
            memory::write(device, "write firmware", RW_INTERNAL, address, chunk)?;
            memory::read(device, "read firmware", RW_INTERNAL, address, readback)?;
            if let Some(pos) = chunk.iter().zip(readback.iter()).position(|(a, b)| a != b) {
                return Err(Error::VerificationFailed { address: address.wrapping_add(pos as u32) });
            }
            address = address.wrapping_add(chunk.len() as u32);
        }
    };

    // read pre-computed checksum data
    let expected = read_u32(&mut image)?;
    if expected != Some(checksum) {
        return Err(Error::ChecksumMismatch { computed: checksum, expected });
    }

    memory::fx3_jump(device, entry)?;
    Ok(entry)
}
