//! Header cursor: the single place where packet memory is read.
//!
//! IMPORTANT: The eBPF verifier requires seeing the exact pattern:
//!   if (ptr + len > data_end) goto error
//!
//! The Rust compiler aggressively optimizes comparisons, transforming
//! `ptr + len > end` into `end > ptr` (dropping the +len). This breaks
//! the verifier's bounds tracking, so the access end goes through
//! `core::hint::black_box` before the comparison.

use core::marker::PhantomData;
use core::mem;

use crate::headers::Header;

/// Why a header could not be consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer bytes left than the header needs
    Truncated,
    /// A length field is inconsistent with the header it describes
    BadLength,
}

/// Read position inside `[start, end)`.
///
/// Invariant: `start <= pos <= end` at every observation point.
pub struct HdrCursor<'a> {
    start: usize,
    pos: usize,
    end: usize,
    _packet: PhantomData<&'a [u8]>,
}

impl<'a> HdrCursor<'a> {
    pub fn new(packet: &'a [u8]) -> Self {
        let start = packet.as_ptr() as usize;
        Self {
            start,
            pos: start,
            end: start + packet.len(),
            _packet: PhantomData,
        }
    }

    /// Cursor over raw packet bounds, as handed out by `XdpContext`.
    ///
    /// # Safety
    ///
    /// `[start, end)` must be readable for the whole lifetime `'a` and
    /// `start <= end` must hold.
    #[inline(always)]
    pub unsafe fn from_raw(start: usize, end: usize) -> Self {
        Self {
            start,
            pos: start,
            end,
            _packet: PhantomData,
        }
    }

    /// Consume one `T` and return a view of it.
    #[inline(always)]
    pub fn advance<T: Header>(&mut self) -> Result<&'a T, ParseError> {
        let hdr = self.peek::<T>()?;
        self.pos += mem::size_of::<T>();
        Ok(hdr)
    }

    /// View the next `T` without moving.
    #[inline(always)]
    pub fn peek<T: Header>(&self) -> Result<&'a T, ParseError> {
        let access_end = core::hint::black_box(self.pos + mem::size_of::<T>());
        if access_end > self.end {
            return Err(ParseError::Truncated);
        }
        // Safety: [pos, pos + size_of::<T>()) lies inside the packet, and
        // `Header` types have alignment 1 and accept any bit pattern.
        Ok(unsafe { &*(self.pos as *const T) })
    }

    /// Consume `len` bytes (variable-length headers).
    #[inline(always)]
    pub fn advance_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let access_end = match self.pos.checked_add(len) {
            Some(end) => core::hint::black_box(end),
            None => return Err(ParseError::Truncated),
        };
        if access_end > self.end {
            return Err(ParseError::Truncated);
        }
        // Safety: bounds checked right above.
        let bytes = unsafe { core::slice::from_raw_parts(self.pos as *const u8, len) };
        self.pos = access_end;
        Ok(bytes)
    }

    /// Bytes between the cursor and the end of the packet.
    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Bytes consumed so far.
    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.pos - self.start
    }

    /// Whole frame length (`data_end - data`).
    #[inline(always)]
    pub fn packet_len(&self) -> usize {
        self.end - self.start
    }
}
