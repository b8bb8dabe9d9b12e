use log::debug;

use super::*;

/// Which memory a RAM load pass may write.
///
/// A single stage load runs with `InternalOnly`.  A two stage load runs `SkipInternal` while
/// the second stage loader executes, then `SkipExternal` with the CPU halted, so on-chip
/// memory (including the loader itself and the reset vector) is overwritten last.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RamMode {
    /// hardware first-stage loader; CPU should be stopped
    InternalOnly,
    /// first phase, second-stage loader; CPU must be running
    SkipInternal,
    /// second phase, second-stage loader; CPU should be stopped
    SkipExternal,
}

/// Applies a `RamMode` to each segment and writes the ones that pass.
pub struct RamPoker<'a, T: ?Sized> {
    device: &'a T,
    mode: RamMode,
    total: usize,
    count: usize,
}

impl<'a, T: Transport + ?Sized> RamPoker<'a, T> {
    pub fn new(device: &'a T, mode: RamMode) -> Self {
        RamPoker { device, mode, total: 0, count: 0 }
    }

    pub fn mode(&self) -> RamMode {
        self.mode
    }

    /// Switch modes between passes.  The write totals carry over.
    pub fn set_mode(&mut self, mode: RamMode) {
        self.mode = mode;
    }

    /// Bytes written so far.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Segments written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn poke(&mut self, segment: &Segment) -> Result<()> {
        let len = segment.data.len();
        match (self.mode, segment.external) {
            (RamMode::InternalOnly, true) => {
                return Err(Error::InvalidSegment { address: segment.address, len });
            }
            (RamMode::SkipInternal, false) => {
                debug!("SKIP on-chip RAM, {} bytes at {:#010x}", len, segment.address);
                return Ok(());
            }
            (RamMode::SkipExternal, true) => {
                debug!("SKIP external RAM, {} bytes at {:#010x}", len, segment.address);
                return Ok(());
            }
            _ => {}
        }

        self.total += len;
        self.count += 1;

        let (label, request) = if segment.external {
            ("write external", memory::RW_MEMORY)
        } else {
            ("write on-chip", memory::RW_INTERNAL)
        };
        memory::write(self.device, label, request, segment.address, &segment.data).map(|_| ())
    }

    /// Poke every segment of `segments`, stopping at the first error.
    pub fn poke_all<I>(&mut self, segments: I) -> Result<()>
        where I: IntoIterator<Item = Result<Segment>>
    {
        for segment in segments {
            self.poke(&segment?)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{Call, MockTransport};

    fn seg(address: u32, external: bool) -> Segment {
        Segment { address, external, data: vec![0x55; 4] }
    }

    #[test]
    fn internal_only_rejects_external() {
        let dev = MockTransport::new();
        let mut poker = RamPoker::new(&dev, RamMode::InternalOnly);
        let res = poker.poke(&seg(0x8000, true));
        assert!(matches!(res, Err(Error::InvalidSegment { address: 0x8000, len: 4 })));
        assert!(dev.calls().is_empty());
        assert_eq!(poker.count(), 0);
    }

    #[test]
    fn internal_only_writes_internal() {
        let dev = MockTransport::new();
        let mut poker = RamPoker::new(&dev, RamMode::InternalOnly);
        poker.poke(&seg(0x0100, false)).unwrap();
        match &dev.calls()[..] {
            [Call::ControlOut { request, value, .. }] => {
                assert_eq!(*request, memory::RW_INTERNAL);
                assert_eq!(*value, 0x0100);
            }
            other => panic!("unexpected calls {:?}", other),
        }
        assert_eq!((poker.total(), poker.count()), (4, 1));
    }

    #[test]
    fn skip_internal_writes_external_only() {
        let dev = MockTransport::new();
        let mut poker = RamPoker::new(&dev, RamMode::SkipInternal);
        poker.poke(&seg(0x0000, false)).unwrap();
        assert!(dev.calls().is_empty());
        poker.poke(&seg(0x8000, true)).unwrap();
        match &dev.calls()[..] {
            [Call::ControlOut { request, .. }] => assert_eq!(*request, memory::RW_MEMORY),
            other => panic!("unexpected calls {:?}", other),
        }
    }

    #[test]
    fn skip_external_writes_internal_only() {
        let dev = MockTransport::new();
        let mut poker = RamPoker::new(&dev, RamMode::SkipExternal);
        poker.poke(&seg(0x8000, true)).unwrap();
        assert!(dev.calls().is_empty());
        poker.poke(&seg(0x0000, false)).unwrap();
        assert_eq!(dev.calls().len(), 1);
        assert_eq!(dev.peek(0, 4), vec![0x55; 4]);
    }

    #[test]
    fn poke_all_stops_at_first_error() {
        let dev = MockTransport::new();
        let mut poker = RamPoker::new(&dev, RamMode::InternalOnly);
        let segments = vec![
            Ok(seg(0x0000, false)),
            Ok(seg(0x8000, true)),
            Ok(seg(0x0010, false)),
        ];
        assert!(matches!(poker.poke_all(segments), Err(Error::InvalidSegment { .. })));
        assert_eq!(poker.count(), 1);
    }
}
