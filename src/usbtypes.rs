/// Direction bit of an endpoint address.  IN endpoints have bit 7 set.
pub const ENDPOINT_IN: u8 = 0x80;

/// Control request direction, part of Setup::bmRequestType.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetupDirection {
    HostToDevice = 0,
    DeviceToHost = 1<<7,
}

/// Control request type, part of Setup::bmRequestType.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetupType {
    Standard = 0<<5,
    Class = 1<<5,
    Vendor = 2<<5,
}

/// Control request recipient, part of Setup::bmRequestType.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetupRecipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
}

/// Combine the three Setup fields into `bmRequestType`.
pub fn request_type(setupdirection: SetupDirection,
                    setuptype: SetupType,
                    setuprecipient: SetupRecipient)
                    -> u8 {
    (setupdirection as u8) | (setuptype as u8) | (setuprecipient as u8)
}

/// True if `endpoint` addresses an IN (device to host) endpoint.
pub fn is_in_endpoint(endpoint: u8) -> bool {
    endpoint & ENDPOINT_IN != 0
}


/// Size of a device descriptor on the wire.
pub const DEVICE_DESCRIPTOR_LEN: usize = 18;

/// USB [Device Descriptor](http://www.beyondlogic.org/usbnutshell/usb5.shtml)
/// used for examining USB devices attached to the host.
///
/// Multi-byte fields are already converted from bus (little) endian.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bcdUSB: u16,
    pub bDeviceClass: u8,
    pub bDeviceSubClass: u8,
    pub bDeviceProtocol: u8,
    pub bMaxPacketSize0: u8,
    pub idVendor: u16,
    pub idProduct: u16,
    pub bcdDevice: u16,
    pub iManufacturer: u8,
    pub iProduct: u8,
    pub iSerialNumber: u8,
    pub bNumConfigurations: u8,
}

impl DeviceDescriptor {
    /// Decode a descriptor as read from sysfs or the control endpoint.
    /// Returns `None` if `buf` is shorter than a device descriptor.
    pub fn from_bytes(buf: &[u8]) -> Option<DeviceDescriptor> {
        if buf.len() < DEVICE_DESCRIPTOR_LEN {
            return None;
        }
        let le16 = |i: usize| u16::from_le_bytes([buf[i], buf[i + 1]]);
        Some(DeviceDescriptor {
            bLength: buf[0],
            bDescriptorType: buf[1],
            bcdUSB: le16(2),
            bDeviceClass: buf[4],
            bDeviceSubClass: buf[5],
            bDeviceProtocol: buf[6],
            bMaxPacketSize0: buf[7],
            idVendor: le16(8),
            idProduct: le16(10),
            bcdDevice: le16(12),
            iManufacturer: buf[14],
            iProduct: buf[15],
            iSerialNumber: buf[16],
            bNumConfigurations: buf[17],
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_type_vendor_out() {
        assert_eq!(request_type(SetupDirection::HostToDevice, SetupType::Vendor, SetupRecipient::Device), 0x40);
        assert_eq!(request_type(SetupDirection::DeviceToHost, SetupType::Vendor, SetupRecipient::Device), 0xc0);
        assert_eq!(request_type(SetupDirection::DeviceToHost, SetupType::Class, SetupRecipient::Interface), 0xa1);
    }

    #[test]
    fn decode_fx2lp_descriptor() {
        let raw = [0x12, 0x01, 0x00, 0x02, 0xff, 0xff, 0xff, 0x40,
                   0xb4, 0x04, 0x13, 0x86, 0x01, 0xa0, 0x00, 0x00, 0x00, 0x01];
        let descr = DeviceDescriptor::from_bytes(&raw).unwrap();
        assert_eq!(descr.idVendor, 0x04b4);
        assert_eq!(descr.idProduct, 0x8613);
        assert_eq!(descr.bcdUSB, 0x0200);
        assert_eq!(descr.bNumConfigurations, 1);
        assert!(DeviceDescriptor::from_bytes(&raw[..17]).is_none());
    }

    #[test]
    fn endpoint_direction() {
        assert!(is_in_endpoint(0x81));
        assert!(!is_in_endpoint(0x02));
    }
}
