use std::mem::size_of;
pub use nix::libc::c_uint;
use std::io;

// Definitions corresponding to https://github.com/torvalds/linux/blob/master/include/uapi/linux/usbdevice_fs.h

#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct CtrlTransfer {
    pub bmRequestType: u8,
    pub bRequest: u8,
    pub wValue: u16,
    pub wIndex: u16,
    pub wLength: u16,
    pub timeout: u32, // in milliseconds
    pub data: *mut u8,
}

// struct usbdevfs_bulktransfer {
//  unsigned int ep;
//  unsigned int len;
//  unsigned int timeout; /* in milliseconds */
//  void __user *data;
// };

#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct BulkTransfer {
    pub ep: c_uint,
    pub len: c_uint,
    pub timeout: c_uint, // in milliseconds
    pub data: *mut u8,
}

// struct usbdevfs_setinterface {
//  unsigned int interface;
//  unsigned int altsetting;
// };

#[derive(Debug)]
#[repr(C)]
pub struct SetInterface {
    pub interface: c_uint,
    pub altsetting: c_uint,
}


// Sigh, usbfs ioctls have incorrect inversion of read and write.
// This doesn't matter at all from C, but nix crate applies const/mut to
// wrappers.


// #define USBDEVFS_CONTROL           _IOWR('U', 0, struct usbdevfs_ctrltransfer)
ioctl_readwrite!(control, b'U', 0, CtrlTransfer);

// #define USBDEVFS_BULK              _IOWR('U', 2, struct usbdevfs_bulktransfer)
ioctl_readwrite!(bulk, b'U', 2, BulkTransfer);

// #define USBDEVFS_SETINTERFACE      _IOR('U', 4, struct usbdevfs_setinterface)
ioctl_write_ptr_bad!(setinterface, request_code_read!(b'U', 4, size_of::<SetInterface>()), SetInterface);

// #define USBDEVFS_CLAIMINTERFACE    _IOR('U', 15, unsigned int)
ioctl_write_ptr_bad!(claiminterface, request_code_read!(b'U', 15, size_of::<c_uint>()), c_uint);

// #define USBDEVFS_RELEASEINTERFACE  _IOR('U', 16, unsigned int)
ioctl_write_ptr_bad!(releaseinterface, request_code_read!(b'U', 16, size_of::<c_uint>()), c_uint);

// #define USBDEVFS_CLEAR_HALT        _IOR('U', 21, unsigned int)
ioctl_write_ptr_bad!(clearhalt, request_code_read!(b'U', 21, size_of::<c_uint>()), c_uint);

fn nix_err_to_io_err(err: nix::Error) -> io::Error {
    io::Error::from(err)
}

pub fn nix_result_to_io_result<T>(res: nix::Result<T>) -> io::Result<T> {
    res.map_err(nix_err_to_io_err)
}
