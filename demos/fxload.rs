//! Load firmware into an EZ-USB part.
//!
//!     fxload <an21|fx|fx2|fx2lp|fx3|auto> <firmware> [second stage loader]
//!
//! The target is the first known Cypress part unless `DEVICE` holds `bus,dev`.  Set
//! `RUST_LOG=debug` to trace every memory write.

use anyhow::{anyhow, bail, Context, Result};
use ezusb::*;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 || args.len() > 3 {
        bail!("usage: fxload <an21|fx|fx2|fx2lp|fx3|auto> <firmware> [loader]");
    }

    let fx_type = match args[0].as_str() {
        "auto" => None,
        name => Some(name.parse::<FxType>()?),
    };

    let filter = match std::env::var("DEVICE") {
        Ok(dev) => DeviceFilter::from_bus_dev(&dev)
            .ok_or_else(|| anyhow!("DEVICE must be \"bus,dev\" in decimal, got {:?}", dev))?,
        Err(_) => DeviceFilter::Any,
    };

    let (info, fx_type) = find_fx_device(filter, fx_type)
        .context("could not find a known device - please specify type and/or bus,dev")?;
    let device = Device::new(&info).context("unable to open device")?;
    device.claim_interface(0).context("unable to claim interface 0")?;

    let result = load_firmware(&device, &args[1], args.get(2), fx_type);
    device.release_interface(0)?;
    result?;
    Ok(())
}
