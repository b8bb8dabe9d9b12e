//! USB Mass Storage Bulk-Only Transport.
//!
//! Every command is three bulk stages: a 31 byte Command Block Wrapper on the OUT endpoint,
//! an optional data stage, and a 13 byte Command Status Wrapper on the IN endpoint echoing
//! the command's tag.

use log::{debug, info, warn};

use super::*;

pub const CBW_SIGNATURE: [u8; 4] = *b"USBC";
pub const CSW_SIGNATURE: [u8; 4] = *b"USBS";
pub const CBW_LEN: usize = 31;
pub const CSW_LEN: usize = 13;

/// Bulk-Only class request returning the highest LUN.
pub const BOMS_GET_MAX_LUN: u8 = 0xfe;

/// Attempts made for a command or status transfer that keeps stalling.
pub const RETRY_LIMIT: usize = 5;
pub const COMMAND_TIMEOUT_MS: u32 = 1000;
pub const READ_TIMEOUT_MS: u32 = 5000;

pub const REQUEST_SENSE_LENGTH: usize = 18;
pub const INQUIRY_LENGTH: usize = 36;
pub const READ_CAPACITY_LENGTH: usize = 8;
/// Largest buffer `read_blocks` allocates for one READ(10).
pub const MAX_READ_LEN: usize = 1 << 24;

const OP_REQUEST_SENSE: u8 = 0x03;
const OP_INQUIRY: u8 = 0x12;
const OP_READ_CAPACITY: u8 = 0x25;
const OP_READ_10: u8 = 0x28;

bitflags! {
    pub struct CbwFlags: u8 {
        /// Data stage moves from device to host.
        const DATA_IN = 0x80;
    }
}

/// Direction of a command's data stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn flags(self) -> CbwFlags {
        match self {
            Direction::In => CbwFlags::DATA_IN,
            Direction::Out => CbwFlags::empty(),
        }
    }
}

/// Command block length for a SCSI operation code, from its group code.  Zero means the
/// opcode is not supported.
pub fn cdb_length(opcode: u8) -> u8 {
    match opcode {
        0x00..=0x1f => 6,
        0x20..=0x5f => 10,
        0x80..=0x9f => 16,
        0xa0..=0xbf => 12,
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlockWrapper {
    pub tag: u32,
    pub data_transfer_length: u32,
    pub flags: CbwFlags,
    pub lun: u8,
    pub cb_length: u8,
    pub command: [u8; 16],
}

impl CommandBlockWrapper {
    /// Build a wrapper for `cdb`, failing if its opcode has no known command length.
    pub fn new(tag: u32, lun: u8, cdb: &[u8; 16], direction: Direction, data_length: u32) -> Result<Self> {
        let cb_length = cdb_length(cdb[0]);
        if cb_length == 0 {
            return Err(Error::UnsupportedOpcode { opcode: cdb[0] });
        }
        let mut command = [0u8; 16];
        command[..cb_length as usize].copy_from_slice(&cdb[..cb_length as usize]);
        Ok(CommandBlockWrapper {
            tag,
            data_transfer_length: data_length,
            flags: direction.flags(),
            lun,
            cb_length,
            command,
        })
    }

    /// Wire format, little endian.
    pub fn to_bytes(&self) -> [u8; CBW_LEN] {
        let mut buf = [0u8; CBW_LEN];
        buf[0..4].copy_from_slice(&CBW_SIGNATURE);
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_transfer_length.to_le_bytes());
        buf[12] = self.flags.bits();
        buf[13] = self.lun;
        buf[14] = self.cb_length;
        buf[15..31].copy_from_slice(&self.command);
        buf
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandStatusWrapper {
    pub signature: [u8; 4],
    pub tag: u32,
    pub data_residue: u32,
    pub status: u8,
}

impl CommandStatusWrapper {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < CSW_LEN {
            return Err(Error::ShortStatus { received: buf.len() });
        }
        let le32 = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Ok(CommandStatusWrapper {
            signature: [buf[0], buf[1], buf[2], buf[3]],
            tag: le32(4),
            data_residue: le32(8),
            status: buf[12],
        })
    }
}

/// Outcome of a command whose status wrapper was accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Passed,
    /// Check condition; REQUEST SENSE tells why.
    NeedsSense,
}

/// Fixed format sense data, reduced to what identifies the error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SenseData {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseData {
    /// Decode a REQUEST SENSE response.  `None` unless it holds current or deferred fixed
    /// format sense data.
    pub fn parse(buf: &[u8]) -> Option<SenseData> {
        if buf.len() < 14 {
            return None;
        }
        match buf[0] {
            0x70 | 0x71 => Some(SenseData { key: buf[2] & 0x0f, asc: buf[12], ascq: buf[13] }),
            _ => None,
        }
    }
}

/// Identification strings from INQUIRY, with trailing padding removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryData {
    pub vendor: String,
    pub product: String,
    pub revision: String,
}

impl InquiryData {
    pub fn parse(buf: &[u8]) -> Option<InquiryData> {
        if buf.len() < INQUIRY_LENGTH {
            return None;
        }
        let text = |range: std::ops::Range<usize>| {
            String::from_utf8_lossy(&buf[range]).trim_end_matches(|c: char| c == ' ' || c == '\0').to_string()
        };
        Some(InquiryData { vendor: text(8..16), product: text(16..32), revision: text(32..36) })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Capacity {
    pub max_lba: u32,
    pub block_size: u32,
}

impl Capacity {
    pub fn parse(buf: &[u8]) -> Option<Capacity> {
        if buf.len() < READ_CAPACITY_LENGTH {
            return None;
        }
        Some(Capacity {
            max_lba: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            block_size: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Device size in bytes.
    pub fn bytes(&self) -> u64 {
        (self.max_lba as u64 + 1) * self.block_size as u64
    }
}

/// Command/status exchange with one Bulk-Only interface.
///
/// Holds the tag counter; tags start at 1 and every command wrapper sent, successfully or
/// not, consumes one.
pub struct BotSession<T> {
    transport: T,
    endpoint_in: u8,
    endpoint_out: u8,
    next_tag: u32,
}

impl<T: Transport> BotSession<T> {
    pub fn new(transport: T, endpoint_in: u8, endpoint_out: u8) -> Self {
        BotSession { transport, endpoint_in, endpoint_out, next_tag: 1 }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send a command wrapper and return its tag.
    pub fn send_command(&mut self, lun: u8, cdb: &[u8; 16], direction: Direction, data_length: u32) -> Result<u32> {
        if is_in_endpoint(self.endpoint_out) {
            return Err(Error::InvalidEndpoint(self.endpoint_out));
        }
        let cbw = CommandBlockWrapper::new(self.next_tag, lun, cdb, direction, data_length)?;
        self.next_tag = self.next_tag.wrapping_add(1);

        // The transfer length must always be exactly 31 bytes.
        let mut buf = cbw.to_bytes();
        let endpoint = self.endpoint_out;
        let n = self.retry_stall("send command", endpoint, |t| t.bulk_transfer(endpoint, &mut buf, COMMAND_TIMEOUT_MS))?;
        if n != CBW_LEN {
            return Err(Error::ShortTransfer { label: "send command", expected: CBW_LEN, actual: n });
        }
        debug!("sent {} CDB bytes, tag {:08X}", cbw.cb_length, cbw.tag);
        Ok(cbw.tag)
    }

    /// Run the data stage of a command.  Returns the number of bytes moved.
    pub fn transfer_data(&mut self, direction: Direction, data: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let (label, endpoint) = match direction {
            Direction::In => ("data in", self.endpoint_in),
            Direction::Out => ("data out", self.endpoint_out),
        };
        let n = self.transport.bulk_transfer(endpoint, data, timeout_ms)
            .map_err(|source| Error::TransferFailed { label, source })?;
        debug!("{}: {} of {} bytes", label, n, data.len());
        Ok(n)
    }

    /// Read the status wrapper for the command tagged `expected_tag`.
    pub fn receive_status(&mut self, expected_tag: u32) -> Result<CommandStatus> {
        // The device is allowed to STALL this transfer.  If it does, clear it and try again.
        let mut buf = [0u8; CSW_LEN];
        let endpoint = self.endpoint_in;
        let n = self.retry_stall("get status", endpoint, |t| t.bulk_transfer(endpoint, &mut buf, COMMAND_TIMEOUT_MS))?;
        if n != CSW_LEN {
            return Err(Error::ShortStatus { received: n });
        }

        let csw = CommandStatusWrapper::parse(&buf)?;
        if csw.tag != expected_tag {
            return Err(Error::TagMismatch { expected: expected_tag, received: csw.tag });
        }
        // lots of devices get the signature and residue wrong
        if csw.signature != CSW_SIGNATURE {
            warn!("bad status signature {:02X?}", csw.signature);
        }
        debug!("mass storage status: {:02X} ({}), residue {}",
               csw.status, if csw.status != 0 { "FAILED" } else { "Success" }, csw.data_residue);

        match csw.status {
            0 => Ok(CommandStatus::Passed),
            // only 1 means the command was understood; REQUEST SENSE is meaningful
            1 => Ok(CommandStatus::NeedsSense),
            status => Err(Error::CommandFailed { status }),
        }
    }

    /// Complete command: wrapper, data stage (if `data` is not empty), status.  A check
    /// condition is followed up with REQUEST SENSE and reported as `Error::CheckCondition`.
    pub fn execute(&mut self, lun: u8, cdb: &[u8; 16], direction: Direction, data: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let length = u32::try_from(data.len())
            .map_err(|_| Error::TransferTooLarge { label: "execute", len: data.len(), max: u32::MAX as usize })?;
        let tag = self.send_command(lun, cdb, direction, length)?;
        let n = if data.is_empty() { 0 } else { self.transfer_data(direction, data, timeout_ms)? };
        match self.receive_status(tag)? {
            CommandStatus::Passed => Ok(n),
            CommandStatus::NeedsSense => Err(Error::CheckCondition(self.request_sense(lun)?)),
        }
    }

    /// REQUEST SENSE.  `None` when the device returned no fixed format sense data.
    pub fn request_sense(&mut self, lun: u8) -> Result<Option<SenseData>> {
        let mut cdb = [0u8; 16];
        cdb[0] = OP_REQUEST_SENSE;
        cdb[4] = REQUEST_SENSE_LENGTH as u8;

        let mut sense = [0u8; REQUEST_SENSE_LENGTH];
        let tag = self.send_command(lun, &cdb, Direction::In, REQUEST_SENSE_LENGTH as u32)?;
        let n = self.transfer_data(Direction::In, &mut sense, COMMAND_TIMEOUT_MS)?;
        let data = SenseData::parse(&sense[..n]);
        match data {
            Some(s) => warn!("sense: {:02X} {:02X} {:02X}", s.key, s.asc, s.ascq),
            None => warn!("no sense data"),
        }
        match self.receive_status(tag)? {
            CommandStatus::Passed => Ok(data),
            // nothing more to ask for
            CommandStatus::NeedsSense => Err(Error::CheckCondition(None)),
        }
    }

    /// GET MAX LUN class request on `interface`.  Some devices STALL instead of answering,
    /// which means a single LUN.
    pub fn get_max_lun(&self, interface: u16) -> Result<u8> {
        const LABEL: &str = "get max LUN";

        let mut lun = [0u8; 1];
        match self.transport.control_in(SetupType::Class, SetupRecipient::Interface, BOMS_GET_MAX_LUN,
                                        0, interface, &mut lun, COMMAND_TIMEOUT_MS) {
            Ok(1) => {
                info!("max LUN = {}", lun[0]);
                Ok(lun[0])
            }
            Ok(n) => Err(Error::ShortTransfer { label: LABEL, expected: 1, actual: n }),
            Err(TransportError::Stall) => {
                info!("stalled, setting max LUN to 0");
                Ok(0)
            }
            Err(source) => Err(Error::TransferFailed { label: LABEL, source }),
        }
    }

    pub fn inquiry(&mut self, lun: u8) -> Result<InquiryData> {
        let mut cdb = [0u8; 16];
        cdb[0] = OP_INQUIRY;
        cdb[4] = INQUIRY_LENGTH as u8;

        let mut buf = [0u8; INQUIRY_LENGTH];
        let n = self.execute(lun, &cdb, Direction::In, &mut buf, COMMAND_TIMEOUT_MS)?;
        InquiryData::parse(&buf[..n])
            .ok_or(Error::ShortTransfer { label: "inquiry", expected: INQUIRY_LENGTH, actual: n })
    }

    /// READ CAPACITY(10).
    pub fn read_capacity(&mut self, lun: u8) -> Result<Capacity> {
        let mut cdb = [0u8; 16];
        cdb[0] = OP_READ_CAPACITY;

        let mut buf = [0u8; READ_CAPACITY_LENGTH];
        let n = self.execute(lun, &cdb, Direction::In, &mut buf, COMMAND_TIMEOUT_MS)?;
        let capacity = Capacity::parse(&buf[..n])
            .ok_or(Error::ShortTransfer { label: "read capacity", expected: READ_CAPACITY_LENGTH, actual: n })?;
        info!("max LBA: {:08X}, block size: {:08X} ({:.2} GB)", capacity.max_lba, capacity.block_size,
              capacity.bytes() as f64 / (1024.0 * 1024.0 * 1024.0));
        Ok(capacity)
    }

    /// READ(10) of `count` blocks starting at `lba`.  The result holds what the device sent.
    pub fn read_blocks(&mut self, lun: u8, lba: u32, count: u16, block_size: u32) -> Result<Vec<u8>> {
        let mut cdb = [0u8; 16];
        cdb[0] = OP_READ_10;
        cdb[2..6].copy_from_slice(&lba.to_be_bytes());
        cdb[7..9].copy_from_slice(&count.to_be_bytes());

        // block_size comes from the device
        let len = (count as usize).checked_mul(block_size as usize)
            .filter(|len| *len <= MAX_READ_LEN)
            .ok_or(Error::TransferTooLarge {
                label: "read blocks",
                len: (count as usize).saturating_mul(block_size as usize),
                max: MAX_READ_LEN,
            })?;
        let mut data = vec![0u8; len];
        let n = self.execute(lun, &cdb, Direction::In, &mut data, READ_TIMEOUT_MS)?;
        data.truncate(n);
        Ok(data)
    }

    // Bulk transfer that clears a halted endpoint and tries again, at most RETRY_LIMIT times.
    fn retry_stall<F>(&self, label: &'static str, endpoint: u8, mut transfer: F) -> Result<usize>
        where F: FnMut(&T) -> std::result::Result<usize, TransportError>
    {
        let mut attempt = 1;
        loop {
            match transfer(&self.transport) {
                Ok(n) => return Ok(n),
                Err(TransportError::Stall) => {
                    debug!("{}: stall on {:#04x}, attempt {} of {}", label, endpoint, attempt, RETRY_LIMIT);
                    if let Err(err) = self.transport.clear_halt(endpoint) {
                        warn!("{}: clear halt failed: {}", label, err);
                    }
                    if attempt >= RETRY_LIMIT {
                        return Err(Error::TransferFailed { label, source: TransportError::Stall });
                    }
                    attempt += 1;
                }
                Err(source) => return Err(Error::TransferFailed { label, source }),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{Call, MockTransport, Reply};

    const EP_IN: u8 = 0x81;
    const EP_OUT: u8 = 0x02;

    fn session() -> BotSession<MockTransport> {
        BotSession::new(MockTransport::new(), EP_IN, EP_OUT)
    }

    fn csw(tag: u32, status: u8) -> Reply {
        let mut buf = b"USBS".to_vec();
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.push(status);
        Reply::Data(buf)
    }

    fn cdb(opcode: u8) -> [u8; 16] {
        let mut cdb = [0u8; 16];
        cdb[0] = opcode;
        cdb
    }

    fn sent_tags(s: &BotSession<MockTransport>) -> Vec<u32> {
        s.transport().calls().into_iter().filter_map(|c| match c {
            Call::Bulk { endpoint: EP_OUT, data } if data.len() == CBW_LEN =>
                Some(u32::from_le_bytes([data[4], data[5], data[6], data[7]])),
            _ => None,
        }).collect()
    }

    #[test]
    fn cbw_layout() {
        let mut inquiry = cdb(OP_INQUIRY);
        inquiry[4] = 36;
        inquiry[10] = 0xee; // beyond the 6 byte command, dropped
        let cbw = CommandBlockWrapper::new(0x0102_0304, 2, &inquiry, Direction::In, 36).unwrap();
        let bytes = cbw.to_bytes();
        assert_eq!(&bytes[..15], &[b'U', b'S', b'B', b'C', 0x04, 0x03, 0x02, 0x01,
                                   36, 0, 0, 0, 0x80, 2, 6]);
        assert_eq!(&bytes[15..21], &[0x12, 0, 0, 0, 36, 0]);
        assert!(bytes[21..].iter().all(|b| *b == 0));
    }

    #[test]
    fn cdb_lengths_by_group() {
        assert_eq!(cdb_length(0x00), 6);
        assert_eq!(cdb_length(0x28), 10);
        assert_eq!(cdb_length(0x5f), 10);
        assert_eq!(cdb_length(0x60), 0);
        assert_eq!(cdb_length(0x88), 16);
        assert_eq!(cdb_length(0xa8), 12);
        assert_eq!(cdb_length(0xc0), 0);
    }

    #[test]
    fn tags_start_at_one_and_increase() {
        let mut s = session();
        assert_eq!(s.send_command(0, &cdb(0x00), Direction::Out, 0).unwrap(), 1);
        assert_eq!(s.send_command(0, &cdb(0x00), Direction::Out, 0).unwrap(), 2);
        assert_eq!(sent_tags(&s), vec![1, 2]);
    }

    #[test]
    fn tag_wraps() {
        let mut s = session();
        s.next_tag = u32::MAX;
        assert_eq!(s.send_command(0, &cdb(0x00), Direction::Out, 0).unwrap(), u32::MAX);
        assert_eq!(s.send_command(0, &cdb(0x00), Direction::Out, 0).unwrap(), 0);
    }

    #[test]
    fn unsupported_opcode_sends_nothing() {
        let mut s = session();
        assert!(matches!(s.send_command(0, &cdb(0x60), Direction::In, 0),
                         Err(Error::UnsupportedOpcode { opcode: 0x60 })));
        assert!(s.transport().calls().is_empty());
        assert_eq!(s.send_command(0, &cdb(0x00), Direction::Out, 0).unwrap(), 1);
    }

    #[test]
    fn command_on_in_endpoint() {
        let mut s = BotSession::new(MockTransport::new(), EP_IN, 0x82);
        assert!(matches!(s.send_command(0, &cdb(0x00), Direction::Out, 0), Err(Error::InvalidEndpoint(0x82))));
        assert!(s.transport().calls().is_empty());
    }

    #[test]
    fn stalled_command_is_cleared_and_retried() {
        let mut s = session();
        s.transport().push(Reply::Fail(TransportError::Stall));
        s.transport().push(Reply::Fail(TransportError::Stall));
        s.send_command(0, &cdb(0x00), Direction::Out, 0).unwrap();
        let calls: Vec<_> = s.transport().calls().into_iter().map(|c| match c {
            Call::Bulk { endpoint, .. } => format!("bulk {:02x}", endpoint),
            Call::ClearHalt(ep) => format!("clear {:02x}", ep),
            other => format!("{:?}", other),
        }).collect();
        assert_eq!(calls, vec!["bulk 02", "clear 02", "bulk 02", "clear 02", "bulk 02"]);
    }

    #[test]
    fn stalled_status_is_cleared_and_read_again() {
        let mut s = session();
        s.transport().push(Reply::Fail(TransportError::Stall));
        s.transport().push(csw(1, 0));
        assert_eq!(s.receive_status(1).unwrap(), CommandStatus::Passed);
        let calls = s.transport().calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], Call::Bulk { endpoint: EP_IN, .. }));
        assert_eq!(calls[1], Call::ClearHalt(EP_IN));
        assert!(matches!(&calls[2], Call::Bulk { endpoint: EP_IN, .. }));
    }

    #[test]
    fn stall_retry_is_bounded() {
        let mut s = session();
        for _ in 0..6 {
            s.transport().push(Reply::Fail(TransportError::Stall));
        }
        let res = s.send_command(0, &cdb(0x00), Direction::Out, 0);
        assert!(matches!(res, Err(Error::TransferFailed { source: TransportError::Stall, .. })));
        let bulks = s.transport().calls().iter().filter(|c| matches!(c, Call::Bulk { .. })).count();
        assert_eq!(bulks, RETRY_LIMIT);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut s = session();
        s.transport().push(Reply::Fail(TransportError::Timeout));
        assert!(matches!(s.receive_status(1), Err(Error::TransferFailed { source: TransportError::Timeout, .. })));
        assert_eq!(s.transport().calls().len(), 1);
    }

    #[test]
    fn status_outcomes() {
        let mut s = session();
        s.transport().push(csw(7, 0));
        assert_eq!(s.receive_status(7).unwrap(), CommandStatus::Passed);
        s.transport().push(csw(7, 1));
        assert_eq!(s.receive_status(7).unwrap(), CommandStatus::NeedsSense);
        s.transport().push(csw(7, 2));
        assert!(matches!(s.receive_status(7), Err(Error::CommandFailed { status: 2 })));
    }

    #[test]
    fn mismatched_tag_wins_over_status() {
        let mut s = session();
        s.transport().push(csw(8, 1));
        assert!(matches!(s.receive_status(7), Err(Error::TagMismatch { expected: 7, received: 8 })));
        s.transport().push(csw(8, 0));
        assert!(matches!(s.receive_status(7), Err(Error::TagMismatch { .. })));
    }

    #[test]
    fn short_status() {
        let mut s = session();
        s.transport().push(Reply::Data(vec![0; 12]));
        assert!(matches!(s.receive_status(1), Err(Error::ShortStatus { received: 12 })));
    }

    #[test]
    fn bad_signature_is_tolerated() {
        let mut s = session();
        let mut buf = b"XXXX".to_vec();
        buf.extend_from_slice(&[3, 0, 0, 0, 0, 0, 0, 0, 0]);
        s.transport().push(Reply::Data(buf));
        assert_eq!(s.receive_status(3).unwrap(), CommandStatus::Passed);
    }

    #[test]
    fn check_condition_fetches_sense() {
        let mut s = session();
        let t = s.transport();
        t.push(Reply::Done(CBW_LEN));
        t.push(Reply::Data(vec![0; 8]));
        t.push(csw(1, 1));
        // REQUEST SENSE
        t.push(Reply::Done(CBW_LEN));
        let mut sense = vec![0u8; REQUEST_SENSE_LENGTH];
        sense[0] = 0x70;
        sense[2] = 0x05;
        sense[12] = 0x24;
        t.push(Reply::Data(sense));
        t.push(csw(2, 0));

        let res = s.read_capacity(0);
        match res {
            Err(Error::CheckCondition(Some(sense))) => {
                assert_eq!(sense, SenseData { key: 5, asc: 0x24, ascq: 0 });
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sent_tags(&s), vec![1, 2]);
    }

    #[test]
    fn capacity() {
        let mut s = session();
        let t = s.transport();
        t.push(Reply::Done(CBW_LEN));
        t.push(Reply::Data(vec![0x00, 0x00, 0x0f, 0xff, 0x00, 0x00, 0x02, 0x00]));
        t.push(csw(1, 0));
        let cap = s.read_capacity(0).unwrap();
        assert_eq!(cap, Capacity { max_lba: 0xfff, block_size: 512 });
        assert_eq!(cap.bytes(), 0x1000 * 512);
    }

    #[test]
    fn inquiry_strings() {
        let mut s = session();
        let mut data = vec![0u8; INQUIRY_LENGTH];
        data[8..16].copy_from_slice(b"Generic ");
        data[16..32].copy_from_slice(b"Flash Disk      ");
        data[32..36].copy_from_slice(b"8.07");
        let t = s.transport();
        t.push(Reply::Done(CBW_LEN));
        t.push(Reply::Data(data));
        t.push(csw(1, 0));
        let inq = s.inquiry(0).unwrap();
        assert_eq!(inq.vendor, "Generic");
        assert_eq!(inq.product, "Flash Disk");
        assert_eq!(inq.revision, "8.07");
    }

    #[test]
    fn read_blocks_cdb() {
        let mut s = session();
        let t = s.transport();
        t.push(Reply::Done(CBW_LEN));
        t.push(Reply::Data(vec![0xab; 512]));
        t.push(csw(1, 0));
        let data = s.read_blocks(0, 0x0001_0002, 1, 512).unwrap();
        assert_eq!(data.len(), 512);
        match &s.transport().calls()[0] {
            Call::Bulk { data, .. } => {
                assert_eq!(&data[8..12], &512u32.to_le_bytes());
                assert_eq!(&data[15..25], &[0x28, 0, 0x00, 0x01, 0x00, 0x02, 0, 0x00, 0x01, 0]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn oversized_read_is_refused() {
        let mut s = session();
        let res = s.read_blocks(0, 0, 0xffff, u32::MAX);
        assert!(matches!(res, Err(Error::TransferTooLarge { max: MAX_READ_LEN, .. })));
        let res = s.read_blocks(0, 0, 0x1000, 0x1001);
        assert!(matches!(res, Err(Error::TransferTooLarge { len: 0x1001000, .. })));
        assert!(s.transport().calls().is_empty());
    }

    #[test]
    fn max_lun() {
        let s = session();
        s.transport().push(Reply::Data(vec![3]));
        assert_eq!(s.get_max_lun(0).unwrap(), 3);
        s.transport().push(Reply::Fail(TransportError::Stall));
        assert_eq!(s.get_max_lun(0).unwrap(), 0);
        match &s.transport().calls()[0] {
            Call::ControlIn { request_type, request, len, .. } => {
                assert_eq!((*request_type, *request, *len), (0xa1, BOMS_GET_MAX_LUN, 1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sense_parsing() {
        assert_eq!(SenseData::parse(&[0x72; 18]), None);
        assert_eq!(SenseData::parse(&[0x70; 4]), None);
    }
}
