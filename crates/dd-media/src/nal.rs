//! Annex-B NAL unit scanning.
//!
//! Start codes are `00 00 01` or `00 00 00 01`. The scanner makes one linear
//! pass and yields views into the caller's buffer without copying.

/// A NAL unit borrowed from the scanned buffer. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nalu<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Nalu<'a> {
    /// NAL unit bytes, header included, start code excluded.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Position of the first NAL byte within the parent buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// First header byte, from which the unit type is derived.
    pub fn header(&self) -> u8 {
        self.data[0]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Locate the next start code at or after `from`, returning its position and
/// length. The 4-byte form wins when both match at the same position.
fn find_start_code(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= buf.len() {
        if buf[i] == 0 && buf[i + 1] == 0 {
            if buf[i + 2] == 1 {
                return Some((i, 3));
            }
            if buf[i + 2] == 0 && buf.get(i + 3) == Some(&1) {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// Iterator over the NAL units of an Annex-B buffer.
///
/// Bytes before the first start code are discarded, the final unit runs to
/// the end of the buffer, and empty units are skipped.
pub struct AnnexBIter<'a> {
    buf: &'a [u8],
    next_payload: Option<usize>,
}

impl<'a> AnnexBIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        let next_payload = if buf.len() < 4 {
            None
        } else {
            find_start_code(buf, 0).map(|(pos, len)| pos + len)
        };
        Self { buf, next_payload }
    }
}

impl<'a> Iterator for AnnexBIter<'a> {
    type Item = Nalu<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = self.next_payload?;
            let end = match find_start_code(self.buf, start) {
                Some((pos, len)) => {
                    self.next_payload = Some(pos + len);
                    pos
                }
                None => {
                    self.next_payload = None;
                    self.buf.len()
                }
            };
            if end > start {
                return Some(Nalu {
                    data: &self.buf[start..end],
                    offset: start,
                });
            }
        }
    }
}

/// Collect every NAL unit of `buf`. Empty when the buffer is shorter than
/// four bytes or carries no start code.
pub fn scan_annex_b(buf: &[u8]) -> Vec<Nalu<'_>> {
    AnnexBIter::new(buf).collect()
}
