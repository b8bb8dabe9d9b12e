use std::fmt;
use std::str::FromStr;

use super::*;

/// EZ-USB family member.  Determines on-chip memory ranges and the CPUCS address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FxType {
    /// Original AnchorChips parts
    An21,
    /// Updated Cypress versions
    Fx,
    /// USB 2.0 versions
    Fx2,
    /// Updated FX2
    Fx2lp,
    /// USB 3.0 versions
    Fx3,
}

/// Answers whether the memory range `[addr, addr + len)` reaches external RAM.
pub type Classifier = fn(u32, usize) -> bool;

impl FxType {
    pub const ALL: [FxType; 5] = [FxType::An21, FxType::Fx, FxType::Fx2, FxType::Fx2lp, FxType::Fx3];

    pub fn name(self) -> &'static str {
        match self {
            FxType::An21 => "an21",
            FxType::Fx => "fx",
            FxType::Fx2 => "fx2",
            FxType::Fx2lp => "fx2lp",
            FxType::Fx3 => "fx3",
        }
    }

    /// Address of the CPUCS register, used to hold the 8051 in reset.
    pub fn cpucs_address(self) -> u32 {
        match self {
            FxType::Fx2 | FxType::Fx2lp => 0xe600,
            _ => 0x7f92,
        }
    }

    pub fn classifier(self) -> Classifier {
        match self {
            FxType::Fx2lp => fx2lp_is_external,
            FxType::Fx2 => fx2_is_external,
            _ => fx_is_external,
        }
    }

    /// First byte of an IIC image holding code loadable into RAM.
    pub fn iic_signature(self) -> Option<u8> {
        match self {
            FxType::Fx2 | FxType::Fx2lp => Some(0xc2),
            FxType::An21 => Some(0xb2),
            FxType::Fx => Some(0xb6),
            FxType::Fx3 => None,
        }
    }
}

impl fmt::Display for FxType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FxType {
    type Err = Error;

    fn from_str(s: &str) -> Result<FxType> {
        FxType::ALL.iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownFxType(s.to_string()))
    }
}

// with 8KB RAM, 0x0000-0x1b3f can be written
// we can't tell if it's a 4KB device here
pub fn fx_is_external(addr: u32, len: usize) -> bool {
    if addr <= 0x1b3f {
        return end(addr, len) > 0x1b40;
    }
    // there may be more RAM; unclear if we can write it.
    true
}

// 1st 8KB for data/code, 0x0000-0x1fff, and 512 for data, 0xe000-0xe1ff
pub fn fx2_is_external(addr: u32, len: usize) -> bool {
    match addr {
        0x0000..=0x1fff => end(addr, len) > 0x2000,
        0xe000..=0xe1ff => end(addr, len) > 0xe200,
        _ => true,
    }
}

// 1st 16KB for data/code, 0x0000-0x3fff, and 512 for data, 0xe000-0xe1ff
pub fn fx2lp_is_external(addr: u32, len: usize) -> bool {
    match addr {
        0x0000..=0x3fff => end(addr, len) > 0x4000,
        0xe000..=0xe1ff => end(addr, len) > 0xe200,
        _ => true,
    }
}

fn end(addr: u32, len: usize) -> u64 {
    addr as u64 + len as u64
}


/// A part recognized without being told its type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KnownDevice {
    pub vid: u16,
    pub pid: u16,
    pub fx_type: FxType,
    pub designation: &'static str,
}

pub const KNOWN_DEVICES: &[KnownDevice] = &[
    KnownDevice { vid: 0x0547, pid: 0x2122, fx_type: FxType::An21, designation: "Cypress EZ-USB (2122S)" },
    KnownDevice { vid: 0x0547, pid: 0x2125, fx_type: FxType::An21, designation: "Cypress EZ-USB (2121S/2125S)" },
    KnownDevice { vid: 0x0547, pid: 0x2126, fx_type: FxType::An21, designation: "Cypress EZ-USB (2126S)" },
    KnownDevice { vid: 0x0547, pid: 0x2131, fx_type: FxType::An21, designation: "Cypress EZ-USB (2131Q/2131S/2135S)" },
    KnownDevice { vid: 0x0547, pid: 0x2136, fx_type: FxType::An21, designation: "Cypress EZ-USB (2136S)" },
    KnownDevice { vid: 0x0547, pid: 0x2225, fx_type: FxType::An21, designation: "Cypress EZ-USB (2225)" },
    KnownDevice { vid: 0x0547, pid: 0x2226, fx_type: FxType::An21, designation: "Cypress EZ-USB (2226)" },
    KnownDevice { vid: 0x0547, pid: 0x2235, fx_type: FxType::An21, designation: "Cypress EZ-USB (2235)" },
    KnownDevice { vid: 0x0547, pid: 0x2236, fx_type: FxType::An21, designation: "Cypress EZ-USB (2236)" },
    KnownDevice { vid: 0x04b4, pid: 0x6473, fx_type: FxType::Fx, designation: "Cypress EZ-USB FX1" },
    KnownDevice { vid: 0x04b4, pid: 0x8613, fx_type: FxType::Fx2lp, designation: "Cypress EZ-USB FX2LP (68013A/68014A/68015A/68016A)" },
    KnownDevice { vid: 0x04b4, pid: 0x00f3, fx_type: FxType::Fx3, designation: "Cypress FX3" },
];

pub fn lookup_known_device(vid: u16, pid: u16) -> Option<&'static KnownDevice> {
    KNOWN_DEVICES.iter().find(|d| d.vid == vid && d.pid == pid)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for t in FxType::ALL.iter() {
            assert_eq!(t.name().parse::<FxType>().unwrap(), *t);
        }
        assert!(matches!("fx4".parse::<FxType>(), Err(Error::UnknownFxType(_))));
    }

    #[test]
    fn fx2lp_memory_map() {
        assert!(!fx2lp_is_external(0x0000, 0x4000));
        assert!(fx2lp_is_external(0x3ff0, 0x20));
        assert!(!fx2lp_is_external(0xe000, 0x200));
        assert!(fx2lp_is_external(0xe1f0, 0x20));
        assert!(fx2lp_is_external(0x8000, 1));
    }

    #[test]
    fn fx2_and_fx_memory_maps() {
        assert!(fx2_is_external(0x1ff0, 0x20));
        assert!(!fx2_is_external(0x1000, 0x10));
        assert!(!fx_is_external(0x1b00, 0x40));
        assert!(fx_is_external(0x1b00, 0x41));
        assert!(fx_is_external(0x2000, 1));
    }

    #[test]
    fn cpucs_per_family() {
        assert_eq!(FxType::Fx2lp.cpucs_address(), 0xe600);
        assert_eq!(FxType::An21.cpucs_address(), 0x7f92);
    }

    #[test]
    fn known_device_lookup() {
        assert_eq!(lookup_known_device(0x04b4, 0x8613).map(|d| d.fx_type), Some(FxType::Fx2lp));
        assert!(lookup_known_device(0x1234, 0x5678).is_none());
    }
}
