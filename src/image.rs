use std::ffi::OsStr;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::mem;
use std::path::Path;

use log::{debug, warn};

use super::*;

/// Upper bound on a merged Intel HEX segment.  EEPROM segments max out at 1023 bytes.
pub const HEX_MERGE_LIMIT: usize = 1023;

/// Staging size for IIC blocks and raw binary chunks.
pub const BLOCK_SIZE: usize = 4096;

// trailing reset IIC data, not firmware
const IIC_TRAILER_LEN: u64 = 5;

/// Firmware image file format.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageFormat {
    /// Intel HEX
    Hex,
    /// Cypress 8051 IIC
    Iic,
    /// Cypress 8051 BIX (raw binary)
    Bix,
    /// Cypress FX3 IMG
    Img,
}

impl ImageFormat {
    /// Pick a format from the file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ImageFormat> {
        let path = path.as_ref();
        let ext = path.extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("hex") | Some("ihx") => Ok(ImageFormat::Hex),
            Some("iic") => Ok(ImageFormat::Iic),
            Some("bix") => Ok(ImageFormat::Bix),
            Some("img") => Ok(ImageFormat::Img),
            _ => Err(Error::UnknownImageType(path.display().to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Hex => "Intel HEX",
            ImageFormat::Iic => "Cypress 8051 IIC",
            ImageFormat::Bix => "Cypress 8051 BIX",
            ImageFormat::Img => "Cypress IMG format",
        }
    }
}

/// A contiguous run of firmware bytes destined for one memory write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: u32,
    /// Whether the range reaches memory only a software loader can write.
    pub external: bool,
    pub data: Vec<u8>,
}

impl Segment {
    fn new(address: u32, data: Vec<u8>, classify: Option<Classifier>) -> Segment {
        let external = classify.map_or(false, |is_external| is_external(address, data.len()));
        Segment { address, external, data }
    }
}

/// Open a segment iterator over `image` starting at its current position.
///
/// The iterator is lazy and single pass; it yields at most one error and then ends.  FX3
/// images are not segment based, see `fx3::load_ram`.
pub fn segments<R: BufRead + Seek>(image: R,
                                   format: ImageFormat,
                                   classify: Option<Classifier>)
                                   -> Result<Segments<R>> {
    match format {
        ImageFormat::Hex => Ok(Segments::Hex(HexSegments::new(image, classify))),
        ImageFormat::Iic => IicSegments::new(image, classify).map(Segments::Iic),
        ImageFormat::Bix => Ok(Segments::Bin(BinSegments::new(image, classify))),
        ImageFormat::Img => Err(Error::MalformedImage("FX3 images hold no RAM segments".to_string())),
    }
}

pub enum Segments<R> {
    Hex(HexSegments<R>),
    Iic(IicSegments<R>),
    Bin(BinSegments<R>),
}

impl<R: BufRead + Seek> Iterator for Segments<R> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Result<Segment>> {
        match self {
            Segments::Hex(s) => s.next(),
            Segments::Iic(s) => s.next(),
            Segments::Bin(s) => s.next(),
        }
    }
}

fn malformed<T>(msg: String) -> Result<T> {
    Err(Error::MalformedImage(msg))
}

// Turn a fallible step into iterator output, ending the sequence after an error.
fn step(done: &mut bool, res: Result<Option<Segment>>) -> Option<Result<Segment>> {
    match res {
        Ok(Some(segment)) => Some(Ok(segment)),
        Ok(None) => {
            *done = true;
            None
        }
        Err(err) => {
            *done = true;
            Some(Err(err))
        }
    }
}

/// Read until `buf` is full or the stream ends.  Returns the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}


//////////////////////////////////////////////////////////////////////////////
///
/// Intel HEX
///

/// Segments of an Intel HEX image.
///
/// Each line holds a max of 16 bytes, but uploading is faster if lines are merged into larger
/// chunks, so contiguous data records are merged up to `HEX_MERGE_LIMIT` bytes.  Record
/// checksums are not checked.  Lines starting with `#` are comments.
pub struct HexSegments<R> {
    image: R,
    classify: Option<Classifier>,
    line: Vec<u8>,
    address: u32,
    data: Vec<u8>,
    eof: bool,
    done: bool,
}

impl<R: BufRead> HexSegments<R> {
    pub fn new(image: R, classify: Option<Classifier>) -> Self {
        HexSegments {
            image,
            classify,
            line: Vec::new(),
            address: 0,
            data: Vec::with_capacity(HEX_MERGE_LIMIT),
            eof: false,
            done: false,
        }
    }

    // emit the saved data, if any
    fn flush(&mut self) -> Option<Segment> {
        if self.data.is_empty() {
            return None;
        }
        let data = mem::replace(&mut self.data, Vec::with_capacity(HEX_MERGE_LIMIT));
        Some(Segment::new(self.address, data, self.classify))
    }

    fn next_segment(&mut self) -> Result<Option<Segment>> {
        while !self.eof {
            self.line.clear();
            if self.image.read_until(b'\n', &mut self.line)? == 0 {
                warn!("EOF without EOF record");
                self.eof = true;
                return Ok(self.flush());
            }

            let mut len = self.line.len();
            while len > 0 && (self.line[len - 1] == b'\n' || self.line[len - 1] == b'\r') {
                len -= 1;
            }
            let record = &self.line[..len];

            // EXTENSION: "# comment-till-end-of-line", for copyrights etc
            if record.first() == Some(&b'#') {
                continue;
            }
            if record.first() != Some(&b':') {
                return malformed(format!("not an ihex record: {:?}", String::from_utf8_lossy(record)));
            }
            // type dispatch needs only ":LLAAAATT"; data records are checked in full below
            if record.len() < 9 {
                return malformed(format!("record too short: {:?}", String::from_utf8_lossy(record)));
            }
            debug!("** LINE: {}", String::from_utf8_lossy(record));

            let size = hex_field(record, 1, 2)? as usize;
            let offset = hex_field(record, 3, 4)?;
            let rec_type = hex_field(record, 7, 2)?;

            match rec_type {
                0 => {}
                1 => {
                    debug!("EOF on hexfile");
                    self.eof = true;
                    return Ok(self.flush());
                }
                other => return malformed(format!("unsupported record type: {}", other)),
            }

            if size * 2 + 11 > record.len() {
                return malformed(format!("record too short: {:?}", String::from_utf8_lossy(record)));
            }

            let mut bytes = [0u8; 255];
            for (idx, byte) in bytes[..size].iter_mut().enumerate() {
                *byte = hex_field(record, 9 + idx * 2, 2)? as u8;
            }

            // flush the saved data if it's not contiguous,
            // or when we've buffered as much as we can.
            let flushed = if !self.data.is_empty()
                && (offset != self.address.wrapping_add(self.data.len() as u32)
                    || self.data.len() + size > HEX_MERGE_LIMIT) {
                self.flush()
            } else {
                None
            };

            // a new segment starts at the first record that lands in it
            if self.data.is_empty() {
                self.address = offset;
            }
            self.data.extend_from_slice(&bytes[..size]);

            if flushed.is_some() {
                return Ok(flushed);
            }
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for HexSegments<R> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Result<Segment>> {
        if self.done {
            return None;
        }
        let res = self.next_segment();
        step(&mut self.done, res)
    }
}

fn hex_field(record: &[u8], start: usize, len: usize) -> Result<u32> {
    record.get(start..start + len)
        .and_then(|digits| {
            digits.iter().try_fold(0u32, |acc, &c| (c as char).to_digit(16).map(|d| acc << 4 | d))
        })
        .ok_or_else(|| Error::MalformedImage(
            format!("bad hex field at column {}: {:?}", start, String::from_utf8_lossy(record))))
}


//////////////////////////////////////////////////////////////////////////////
///
/// Cypress IIC
///

/// Segments of a Cypress IIC image, read from the current stream position.
///
/// Blocks carry a big-endian `(length, address)` header.  The last 5 bytes of the file are the
/// reset record and are not reported.
pub struct IicSegments<R> {
    image: R,
    classify: Option<Classifier>,
    end: u64,
    done: bool,
}

impl<R: Read + Seek> IicSegments<R> {
    pub fn new(mut image: R, classify: Option<Classifier>) -> Result<Self> {
        let start = image.stream_position()?;
        let end = image.seek(SeekFrom::End(0))?;
        image.seek(SeekFrom::Start(start))?;
        Ok(IicSegments { image, classify, end, done: false })
    }

    fn next_segment(&mut self) -> Result<Option<Segment>> {
        if self.image.stream_position()? + IIC_TRAILER_LEN >= self.end {
            return Ok(None);
        }

        let mut header = [0u8; 4];
        if read_full(&mut self.image, &mut header)? != header.len() {
            return malformed("unable to read IIC block header".to_string());
        }
        let len = u16::from_be_bytes([header[0], header[1]]) as usize;
        let address = u16::from_be_bytes([header[2], header[3]]) as u32;
        if len > BLOCK_SIZE {
            return malformed(format!("IIC data block of {} bytes exceeds {}", len, BLOCK_SIZE));
        }

        let mut data = vec![0u8; len];
        if read_full(&mut self.image, &mut data)? != len {
            return malformed(format!("IIC data block at {:#06x} is truncated", address));
        }
        Ok(Some(Segment::new(address, data, self.classify)))
    }
}

impl<R: Read + Seek> Iterator for IicSegments<R> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Result<Segment>> {
        if self.done {
            return None;
        }
        let res = self.next_segment();
        step(&mut self.done, res)
    }
}


//////////////////////////////////////////////////////////////////////////////
///
/// Raw binary
///

/// Segments of a raw binary (BIX) image: consecutive `BLOCK_SIZE` chunks from address 0.
pub struct BinSegments<R> {
    image: R,
    classify: Option<Classifier>,
    address: u32,
    done: bool,
}

impl<R: Read> BinSegments<R> {
    pub fn new(image: R, classify: Option<Classifier>) -> Self {
        BinSegments { image, classify, address: 0, done: false }
    }

    fn next_segment(&mut self) -> Result<Option<Segment>> {
        let mut data = vec![0u8; BLOCK_SIZE];
        let len = read_full(&mut self.image, &mut data)?;
        if len == 0 {
            return Ok(None);
        }
        data.truncate(len);
        let segment = Segment::new(self.address, data, self.classify);
        self.address = self.address.wrapping_add(len as u32);
        Ok(Some(segment))
    }
}

impl<R: Read> Iterator for BinSegments<R> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Result<Segment>> {
        if self.done {
            return None;
        }
        let res = self.next_segment();
        step(&mut self.done, res)
    }
}
