//! Non destructive Bulk-Only transport test: read max LUN, INQUIRY, capacity and the first
//! block of a mass storage device.
//!
//!     mass_storage <bus,dev | sysfs name> [endpoint in] [endpoint out] [altsetting]
//!
//! The device may be given as `1,5` or by its sysfs name, e.g. `1-5` or
//! `/sys/bus/usb/devices/1-5`.

use anyhow::{anyhow, Result};
use ezusb::*;

fn parse_endpoint(arg: Option<&String>, default: u8) -> Result<u8> {
    match arg {
        None => Ok(default),
        Some(s) => u8::from_str_radix(s.trim_start_matches("0x"), 16)
            .map_err(|_| anyhow!("bad endpoint {:?}", s)),
    }
}

const USAGE: &str = "usage: mass_storage <bus,dev | sysfs name> [endpoint in] [endpoint out] [altsetting]";

fn open_device(arg: &str) -> Result<Device> {
    match DeviceFilter::from_bus_dev(arg) {
        Some(DeviceFilter::BusDev { busnum, devnum }) => Ok(Device::from_busdev(busnum, devnum)?),
        _ => Device::from_devpath(arg).map_err(|e| anyhow!("{}: {}", arg, e)),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let target = args.first().ok_or_else(|| anyhow!(USAGE))?;
    let endpoint_in = parse_endpoint(args.get(1), 0x81)?;
    let endpoint_out = parse_endpoint(args.get(2), 0x02)?;
    let altsetting = args.get(3).map(|s| s.parse::<u32>()).transpose()
        .map_err(|_| anyhow!(USAGE))?;

    let device = open_device(target)?;
    device.claim_interface(0)?;
    if let Some(alt) = altsetting {
        device.set_interface(0, alt)?;
    }

    let mut session = BotSession::new(&device, endpoint_in, endpoint_out);
    let lun = session.get_max_lun(0)?;
    println!("Max LUN = {}", lun);

    let inquiry = session.inquiry(lun)?;
    println!("VID:PID:REV \"{:>8}\":\"{:>16}\":\"{:>4}\"", inquiry.vendor, inquiry.product, inquiry.revision);

    let capacity = session.read_capacity(lun)?;
    println!("Max LBA: {:08X}, Block Size: {:08X} ({:.2} GB)", capacity.max_lba, capacity.block_size,
             capacity.bytes() as f64 / (1024.0 * 1024.0 * 1024.0));

    let block = session.read_blocks(lun, 0, 1, capacity.block_size)?;
    println!("READ: received {} bytes", block.len());
    for (i, line) in block.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        println!("  {:08x}  {}", i * 16, hex.join(" "));
    }

    device.release_interface(0)?;
    Ok(())
}
