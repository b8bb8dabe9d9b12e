use std::{fs, io};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};

use super::*;

const SYSFS_DEVICE_PATH: &str = "/sys/bus/usb/devices";

/// Provides metadata about a specific USB device.
///
/// All information is collected from the linux `sysfs` directory.
/// See the function deviceinfo_enumerate()
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    dir: OsString,
}

impl DeviceInfo {

    /// New struct from a sysfs device name or path. Ex
    ///
    /// let di = DeviceInfo::from_devpath("/sys/bus/usb/devices/1-5")?;
    pub fn from_devpath<P: AsRef<OsStr>>(p: P) -> io::Result<DeviceInfo> {
        let path = Path::new(p.as_ref());
        match (is_device_dirname(path), path.file_name()) {
            (true, Some(name)) => Ok(DeviceInfo { dir: name.to_os_string() }),
            _ => Err(io::Error::new(io::ErrorKind::Other, "path fails device test")),
        }
    }

    fn attr_path(&self, attr: &str) -> PathBuf {
        Path::new(SYSFS_DEVICE_PATH).join(&self.dir).join(attr)
    }

    /// Device descriptor as cached by the kernel.
    pub fn device_descriptor(&self) -> io::Result<DeviceDescriptor> {
        let buf = fs::read(self.attr_path("descriptors"))?;
        DeviceDescriptor::from_bytes(&buf)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "short device descriptor"))
    }

    pub fn busnum(&self) -> io::Result<u32> {
        read_sysfs_num(self.attr_path("busnum"))
    }

    pub fn devnum(&self) -> io::Result<u32> {
        read_sysfs_num(self.attr_path("devnum"))
    }
}

fn read_sysfs_num<T: FromStr>(filename: PathBuf) -> io::Result<T> {
    fs::read_to_string(&filename)?
        .trim()
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, format!("bad parse of {}", filename.display())))
}

/// Enumerate all USB devices on the host.
///
/// # Examples
///
/// Show Device Descriptors for all USB devices:
///
/// ```no_run
/// use ezusb::*;
/// for di in deviceinfo_enumerate() {
///     let desc = di.device_descriptor().unwrap();
///     println!("device descriptor = {:?}", desc);
/// }
/// ```
pub fn deviceinfo_enumerate() -> impl Iterator<Item = DeviceInfo> {
    fs::read_dir(SYSFS_DEVICE_PATH)
        .into_iter()
        .flatten() // produce empty iterator if read_dir failed
        .filter_map(|x| x.ok()) // discard erroneous dir entries
        .map(|x| x.file_name())
        .filter(|x| is_device_dirname(x)) //discard non-device filnames
        .map(|x| DeviceInfo { dir: x })
}

// Root hubs are "usbN", interfaces are "B-P:C.I".
fn is_device_dirname<P: AsRef<Path>>(dirname: P) -> bool {
    dirname
        .as_ref() // &Path
        .file_name() // Option<&OsStr>
        .map(|x| x.as_bytes()) // Option<&[u8]>
        .map(|x| !x.starts_with(b"usb") && !x.contains(&b':'))
        .unwrap_or(false)
}


/// How the firmware target was specified.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceFilter {
    /// First known EZ-USB part found.
    Any,
    VidPid { vid: u16, pid: u16 },
    BusDev { busnum: u32, devnum: u32 },
}

impl DeviceFilter {
    /// Parse `"vid:pid"` in hexadecimal, e.g. `04b4:8613`.
    pub fn from_vid_pid(s: &str) -> Option<DeviceFilter> {
        let (vid, pid) = s.split_once(':')?;
        Some(DeviceFilter::VidPid { vid: parse_hex16(vid)?, pid: parse_hex16(pid)? })
    }

    /// Parse `"bus,dev"` in decimal, e.g. `1,5`.  This is the format of the `DEVICE`
    /// environment variable set by hotplug scripts.
    pub fn from_bus_dev(s: &str) -> Option<DeviceFilter> {
        let (busnum, devnum) = s.split_once(',')?;
        Some(DeviceFilter::BusDev { busnum: busnum.trim().parse().ok()?, devnum: devnum.trim().parse().ok()? })
    }
}

fn parse_hex16(s: &str) -> Option<u16> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u16::from_str_radix(digits, 16).ok()
}

/// Decide whether the device at `busnum`/`devnum` with descriptor `descr` is the target, and
/// of which type.
///
/// With an explicit type, a bus/dev or vid:pid filter selects any device.  Otherwise only
/// parts in `KNOWN_DEVICES` qualify and the type comes from the table.
pub fn match_fx_device(filter: DeviceFilter,
                       fx_type: Option<FxType>,
                       busnum: u32,
                       devnum: u32,
                       descr: &DeviceDescriptor)
                       -> Option<FxType> {
    let at = |b: u32, d: u32| busnum == b && devnum == d;
    let is = |v: u16, p: u16| descr.idVendor == v && descr.idProduct == p;

    match (filter, fx_type) {
        (DeviceFilter::BusDev { busnum: b, devnum: d }, Some(t)) => return Some(t).filter(|_| at(b, d)),
        (DeviceFilter::VidPid { vid, pid }, Some(t)) => return Some(t).filter(|_| is(vid, pid)),
        _ => {}
    }

    let known = lookup_known_device(descr.idVendor, descr.idProduct)?;
    let hit = match (filter, fx_type) {
        (DeviceFilter::Any, None) => true,
        (DeviceFilter::Any, Some(t)) => known.fx_type == t,
        (DeviceFilter::VidPid { vid, pid }, None) => is(vid, pid),
        (DeviceFilter::BusDev { busnum: b, devnum: d }, None) => at(b, d),
        _ => false,
    };
    if hit {
        debug!("found device '{}' [{:04x}:{:04x}] ({},{})",
               known.designation, descr.idVendor, descr.idProduct, busnum, devnum);
        Some(known.fx_type)
    } else {
        None
    }
}

/// Scan sysfs for the firmware target.
pub fn find_fx_device(filter: DeviceFilter, fx_type: Option<FxType>) -> Result<(DeviceInfo, FxType)> {
    for di in deviceinfo_enumerate() {
        let (busnum, devnum, descr) = match (di.busnum(), di.devnum(), di.device_descriptor()) {
            (Ok(b), Ok(d), Ok(descr)) => (b, d, descr),
            _ => continue,
        };
        debug!("examining {:04x}:{:04x} ({},{})", descr.idVendor, descr.idProduct, busnum, devnum);
        if let Some(t) = match_fx_device(filter, fx_type, busnum, devnum, &descr) {
            info!("using {:04x}:{:04x} ({},{}) as {}", descr.idVendor, descr.idProduct, busnum, devnum, t);
            return Ok((di, t));
        }
    }
    Err(Error::NoDevice)
}
