//! RAM loading for EZ-USB parts, with or without a second stage loader.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use log::{debug, error, info};

use super::*;
use crate::image::read_full;

/// Which bootloader is answering the vendor requests.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Only the loader built into the EZ-USB hardware is running.  It can write on-chip
    /// memory and CPUCS, nothing else.
    Single,
    /// A second stage loader is resident and running.  External memory is written first,
    /// then the image is scanned again with the CPU halted to overwrite on-chip memory,
    /// including the loader itself.
    Second,
}

/// Load the firmware file at `path` into RAM.  The image format is guessed from the
/// extension when `format` is `None`.
pub fn load_ram<T, P>(device: &T, path: P, fx_type: FxType, format: Option<ImageFormat>, stage: Stage) -> Result<()>
    where T: Transport + ?Sized,
          P: AsRef<Path>
{
    let path = path.as_ref();
    let format = match format {
        Some(format) => format,
        None => ImageFormat::from_path(path)?,
    };
    info!("{}: type {}", path.display(), format.name());

    let file = File::open(path).map_err(|err| {
        error!("{}: unable to open for input", path.display());
        err
    })?;
    debug!("open firmware image {} for RAM upload", path.display());

    load_ram_image(device, BufReader::new(file), fx_type, format, stage).map_err(|err| {
        error!("unable to upload {}", path.display());
        err
    })
}

/// Load an already opened image into RAM and restart the CPU so it runs the new code.
///
/// FX3 parts have no CPUCS and no second stage protocol; their images are handed to
/// `fx3::load_ram` whatever `stage` says.
pub fn load_ram_image<T, R>(device: &T, mut image: R, fx_type: FxType, format: ImageFormat, stage: Stage) -> Result<()>
    where T: Transport + ?Sized,
          R: BufRead + Seek
{
    if fx_type == FxType::Fx3 {
        return fx3::load_ram(device, image).map(|_| ());
    }
    if format == ImageFormat::Img {
        return Err(Error::MalformedImage(format!("IMG images can't be loaded on {}", fx_type)));
    }

    if format == ImageFormat::Iic {
        let mut header = [0u8; 8];
        let n = read_full(&mut image, &mut header)?;
        if n != header.len() || fx_type.iic_signature() != Some(header[0]) {
            return Err(Error::MalformedImage(
                "IIC image does not contain executable code - cannot load to RAM".to_string()));
        }
    }

    let cpucs = fx_type.cpucs_address();
    let classify = Some(fx_type.classifier());

    let mut poker = match stage {
        Stage::Single => {
            // halt the CPU while we overwrite its code/data
            memory::cpucs(device, cpucs, false)?;
            RamPoker::new(device, RamMode::InternalOnly)
        }
        Stage::Second => {
            // let CPU run; overwrite the 2nd stage loader later
            info!("2nd stage: write external memory");
            RamPoker::new(device, RamMode::SkipInternal)
        }
    };

    let start = image.stream_position()?;
    poker.poke_all(segments(&mut image, format, classify)?)?;

    if stage == Stage::Second {
        poker.set_mode(RamMode::SkipExternal);
        memory::cpucs(device, cpucs, false)?;

        // at least write the interrupt vectors (at 0x0000) for reset
        image.seek(SeekFrom::Start(start))?;
        info!("2nd stage: write on-chip memory");
        poker.poke_all(segments(&mut image, format, classify)?)?;
    }

    if poker.count() != 0 {
        info!("... WROTE: {} bytes, {} segments, avg {}",
              poker.total(), poker.count(), poker.total() / poker.count());
    }

    // reset the CPU so it runs what we just uploaded
    memory::cpucs(device, cpucs, true)
}

/// Load `firmware`, first installing `loader` as a second stage loader when one is given.
pub fn load_firmware<T, P>(device: &T, firmware: P, loader: Option<P>, fx_type: FxType) -> Result<()>
    where T: Transport + ?Sized,
          P: AsRef<Path>
{
    info!("microcontroller type: {}", fx_type);
    match loader {
        None => {
            debug!("single stage: load on-chip memory");
            load_ram(device, firmware, fx_type, None, Stage::Single)
        }
        Some(loader) => {
            debug!("1st stage: load 2nd stage loader");
            load_ram(device, loader, fx_type, None, Stage::Single)?;
            debug!("2nd stage: load on-chip memory");
            load_ram(device, firmware, fx_type, None, Stage::Second)
        }
    }
}
