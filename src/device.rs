use std::{io, fs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::fs::File;
use std::ffi::OsStr;
use std::result::Result;

use super::*;


/// Perform synchronous USB operations
///
/// This struct wraps a usbfs device for the blocking control and bulk transfers the firmware
/// loaders and the mass storage framer need.  It is the `Transport` used on real hardware.
pub struct Device(pub File);

// usbfs takes a 16-bit wLength and an unsigned int bulk length
fn transfer_len<T: TryFrom<usize>>(len: usize) -> io::Result<T> {
    T::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput,
                                                 format!("transfer of {} bytes is too long", len)))
}

impl AsRawFd for Device {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}


impl Device {
    /// Create new Device given a DeviceInfo struct.
    ///
    /// # Examples
    /// Open the first EZ-USB part found on the bus.
    ///
    /// ```no_run
    /// use ezusb::*;
    ///
    /// let (info, fx_type) = find_fx_device(DeviceFilter::Any, None).unwrap();
    /// let device = Device::new(&info).unwrap();
    /// // ...
    /// ```
    pub fn new(device: &DeviceInfo) -> io::Result<Self> {
        Self::from_busdev(device.busnum()?, device.devnum()?)
    }

    /// Open device from sysfs device name.  See [`DeviceInfo::from_devpath`]
    pub fn from_devpath<P: AsRef<OsStr>>(p: P) -> io::Result<Self> {
        Self::new(&DeviceInfo::from_devpath(p)?)
    }

    pub fn from_busdev(busnum: u32, devnum: u32) -> io::Result<Self> {
        let mut openopts = fs::OpenOptions::new();
        openopts.read(true).write(true);

        // pick first available path for device
        openopts.open(format!("/dev/bus/usb/{:03}/{:03}", busnum, devnum))
            .or_else(|_| openopts.open(format!("/dev/usbdev{}.{}", busnum, devnum)))
            .or_else(|_| openopts.open(format!("/proc/bus/usb/{:03}/{:03}", busnum, devnum)))
            .map(Device)
    }

    fn control(&self,
               bmRequestType: u8,
               bRequest: u8,
               wValue: u16,
               wIndex: u16,
               data: *mut u8,
               wLength: u16,
               timeout_ms: u32)
               -> io::Result<usize> {
        let mut xfer = devfs::CtrlTransfer {
            bmRequestType,
            bRequest,
            wValue,
            wIndex,
            wLength,
            timeout: timeout_ms,
            data,
        };

        unsafe { devfs::nix_result_to_io_result(devfs::control(self.as_raw_fd(), &mut xfer)) }
            .map(|n| n as usize)
    }

    /// Perform a single synchronous control transfer from the device.  Do not put a Setup
    /// packet in `data`; it receives only the IN data stage.
    ///
    /// The number of bytes transferred to `data` is returned as the `Ok` result.
    pub fn control_transfer_in(&self,
                               setuptype: SetupType,
                               setuprecipient: SetupRecipient,
                               bRequest: u8,
                               wValue: u16,
                               wIndex: u16,
                               data: &mut [u8],
                               timeout_ms: u32)
                               -> io::Result<usize> {
        self.control(request_type(SetupDirection::DeviceToHost, setuptype, setuprecipient),
                     bRequest,
                     wValue,
                     wIndex,
                     data.as_mut_ptr(),
                     transfer_len(data.len())?,
                     timeout_ms)
    }

    /// Control transfer to the device.  `data` may be empty if no exchange beyond the Setup
    /// packet is needed.
    pub fn control_transfer_out(&self,
                                setuptype: SetupType,
                                setuprecipient: SetupRecipient,
                                bRequest: u8,
                                wValue: u16,
                                wIndex: u16,
                                data: &[u8],
                                timeout_ms: u32)
                                -> io::Result<usize> {
        let ptr = if data.is_empty() { std::ptr::null_mut() } else { data.as_ptr() as *mut u8 };
        self.control(request_type(SetupDirection::HostToDevice, setuptype, setuprecipient),
                     bRequest,
                     wValue,
                     wIndex,
                     ptr,
                     transfer_len(data.len())?,
                     timeout_ms)
    }

    /// Synchronous bulk transfer.  Bit 7 of `endpoint` selects the direction; the kernel
    /// only reads `data` for OUT endpoints.
    pub fn bulk_transfer(&self, endpoint: u8, data: &mut [u8], timeout_ms: u32) -> io::Result<usize> {
        let mut xfer = devfs::BulkTransfer {
            ep: endpoint as devfs::c_uint,
            len: transfer_len(data.len())?,
            timeout: timeout_ms as devfs::c_uint,
            data: data.as_mut_ptr(),
        };

        unsafe { devfs::nix_result_to_io_result(devfs::bulk(self.as_raw_fd(), &mut xfer)) }
            .map(|n| n as usize)
    }

    pub fn clear_halt(&self, endpoint: u8) -> io::Result<()> {
        let ep: devfs::c_uint = endpoint as devfs::c_uint;
        unsafe { devfs::nix_result_to_io_result(devfs::clearhalt(self.as_raw_fd(), &ep).map(|_| ())) }
    }

    pub fn claim_interface(&self, interface: u32) -> io::Result<()> {
        let i: devfs::c_uint = interface as devfs::c_uint;
        unsafe { devfs::nix_result_to_io_result(devfs::claiminterface(self.as_raw_fd(), &i).map(|_| ())) }
    }

    pub fn release_interface(&self, interface: u32) -> io::Result<()> {
        let i: devfs::c_uint = interface as devfs::c_uint;
        unsafe { devfs::nix_result_to_io_result(devfs::releaseinterface(self.as_raw_fd(), &i).map(|_| ())) }
    }

    pub fn set_interface(&self, interface: u32, altsetting: u32) -> io::Result<()> {
        unsafe {
            let data = devfs::SetInterface{
                interface: interface as devfs::c_uint,
                altsetting: altsetting as devfs::c_uint,
            };
            devfs::nix_result_to_io_result(devfs::setinterface(self.as_raw_fd(), &data)).map(|_| ())
        }
    }
}

impl Transport for Device {
    fn control_out(&self,
                   setuptype: SetupType,
                   setuprecipient: SetupRecipient,
                   bRequest: u8,
                   wValue: u16,
                   wIndex: u16,
                   data: &[u8],
                   timeout_ms: u32)
                   -> Result<usize, TransportError> {
        Ok(self.control_transfer_out(setuptype, setuprecipient, bRequest, wValue, wIndex, data, timeout_ms)?)
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
        Ok(self.control_transfer_in(setuptype, setuprecipient, bRequest, wValue, wIndex, data, timeout_ms)?)
    }

    fn bulk_transfer(&self, endpoint: u8, data: &mut [u8], timeout_ms: u32) -> Result<usize, TransportError> {
        Ok(Device::bulk_transfer(self, endpoint, data, timeout_ms)?)
    }

    fn clear_halt(&self, endpoint: u8) -> Result<(), TransportError> {
        Ok(Device::clear_halt(self, endpoint)?)
    }
}
