//! Firmware loading for Cypress EZ-USB microcontrollers and USB Mass Storage Bulk-Only
//! command framing, on top of Linux usbfs.
//!
//! # Features
//! * Parsing of Intel HEX, Cypress IIC, raw binary (BIX) and FX3 IMG firmware images.
//! * One and two stage RAM loads for AN21, FX, FX2 and FX2LP parts, and verified FX3 loads.
//! * Command/status wrappers, tag matching and stall recovery for Bulk-Only mass storage.
//! * Enumeration of USB devices using sysfs, and recognition of the common Cypress parts.
//!
//! All device access goes through the `Transport` trait.  `Device` implements it with usbfs
//! ioctls, so the crate needs no C library; the kernel only has to support usbfs.
//!
//! Progress and diagnostics are reported through the [`log`](https://docs.rs/log) facade.
//!
//! # Examples
//!
//! Load firmware into the first FX2LP found:
//!
//! ```no_run
//! use ezusb::*;
//!
//! fn main() -> Result<()> {
//!     let (info, fx_type) = find_fx_device(DeviceFilter::Any, Some(FxType::Fx2lp))?;
//!     let device = Device::new(&info)?;
//!     device.claim_interface(0)?;
//!     load_firmware(&device, "firmware.ihx", None, fx_type)
//! }
//! ```
//!
//! Ask a flash drive for its size:
//!
//! ```no_run
//! use ezusb::*;
//!
//! fn main() -> Result<()> {
//!     let device = Device::from_busdev(1, 5)?;
//!     device.claim_interface(0)?;
//!     let mut session = BotSession::new(&device, 0x81, 0x02);
//!     let lun = session.get_max_lun(0)?;
//!     let capacity = session.read_capacity(lun)?;
//!     println!("{} bytes", capacity.bytes());
//!     Ok(())
//! }
//! ```


#![allow(non_snake_case)]

extern crate libc;

#[macro_use]
extern crate nix;

#[macro_use]
extern crate bitflags;

mod usbtypes;
pub use usbtypes::*;

mod devfs;

mod error;
pub use error::{Error, Result};

mod transport;
pub use transport::*;

mod deviceinfo;
pub use deviceinfo::*;

mod device;
pub use device::*;

mod chip;
pub use chip::*;

pub mod image;
pub use image::{ImageFormat, Segment, segments};

pub mod memory;

mod poke;
pub use poke::*;

pub mod fx3;

mod loader;
pub use loader::*;

pub mod storage;
pub use storage::{BotSession, CommandStatus, Direction, SenseData, InquiryData, Capacity};
