//! Transfer buffers and per-endpoint/per-channel transfer records
//!
//! Interrupt handlers move bytes between the FIFO windows and caller memory
//! long after the submitting call returned, so buffers handed to the engine
//! must outlive it. [`TransferBuffer`] captures that as a `'static` borrow
//! (or an `unsafe` raw region); [`Transfer`] tracks progress through it with
//! a byte cursor instead of pointer arithmetic.

use core::ptr::NonNull;

use crate::error::{Result, UsbError};

/// Memory region a transfer reads from or writes into
#[derive(Debug)]
pub struct TransferBuffer {
    /// Start of the region
    data: NonNull<u8>,
    /// Length in bytes
    len: usize,
    /// Region may be written by receive transfers
    writable: bool,
}

// The region is owned by the buffer for as long as it exists.
unsafe impl Send for TransferBuffer {}

impl TransferBuffer {
    /// Buffer over a static mutable slice, usable for both directions
    pub fn from_static(buf: &'static mut [u8]) -> Self {
        Self {
            data: NonNull::from(&mut *buf).cast(),
            len: buf.len(),
            writable: true,
        }
    }

    /// Transmit-only buffer over static data (descriptors, constant payloads)
    pub fn from_static_ref(buf: &'static [u8]) -> Self {
        Self {
            data: NonNull::from(buf).cast(),
            len: buf.len(),
            writable: false,
        }
    }

    /// Buffer over a raw region
    ///
    /// # Safety
    ///
    /// `data` must be valid for reads (and writes, if `writable`) of `len`
    /// bytes until the buffer is taken back from the engine, and must not be
    /// accessed by anything else in the meantime.
    pub unsafe fn from_raw_parts(data: NonNull<u8>, len: usize, writable: bool) -> Self {
        Self { data, len, writable }
    }

    /// Length in bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length buffer
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Receive transfers may write into this buffer
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Bus address of byte `offset` for DMA programming
    pub fn dma_address(&self, offset: usize) -> u32 {
        (self.data.as_ptr() as usize).wrapping_add(offset) as u32
    }

    /// Buffer contents
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: constructors guarantee `len` readable bytes at `data`.
        unsafe { core::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// Mutable buffer contents, `None` for transmit-only buffers
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if !self.writable {
            return None;
        }
        // SAFETY: writable buffers come from `&'static mut` or a caller
        // promise of exclusive writable access.
        Some(unsafe { core::slice::from_raw_parts_mut(self.data.as_ptr(), self.len) })
    }
}

/// Progress of one transfer through its buffer
#[derive(Debug, Default)]
pub struct Transfer {
    buffer: Option<TransferBuffer>,
    /// Requested length in bytes
    len: usize,
    /// Bytes moved so far; never exceeds `len`
    count: usize,
}

impl Transfer {
    /// Idle record with no buffer
    pub const fn new() -> Self {
        Self {
            buffer: None,
            len: 0,
            count: 0,
        }
    }

    /// Start a transfer of `len` bytes through `buffer`
    ///
    /// A missing buffer is only valid for zero-length transfers.
    pub fn start(&mut self, buffer: Option<TransferBuffer>, len: usize) -> Result<()> {
        let capacity = buffer.as_ref().map_or(0, TransferBuffer::len);
        if len > capacity {
            return Err(UsbError::InvalidParameter);
        }
        self.buffer = buffer;
        self.len = len;
        self.count = 0;
        Ok(())
    }

    /// Start a receive, which needs a writable buffer when `len > 0`
    pub fn start_rx(&mut self, buffer: Option<TransferBuffer>, len: usize) -> Result<()> {
        if len > 0 && !buffer.as_ref().is_some_and(TransferBuffer::is_writable) {
            return Err(UsbError::InvalidState);
        }
        self.start(buffer, len)
    }

    /// Shorten the transfer to at most `len` bytes
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
        self.count = self.count.min(self.len);
    }

    /// Requested length
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length transfer
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes moved so far
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Bytes still to move
    pub const fn remaining(&self) -> usize {
        self.len - self.count
    }

    /// Bus address of the current cursor, 0 without a buffer
    pub fn dma_address(&self) -> u32 {
        self.buffer.as_ref().map_or(0, |b| b.dma_address(self.count))
    }

    /// Next `max` (or fewer) bytes to transmit
    pub fn pending(&self, max: usize) -> &[u8] {
        let end = self.count + self.remaining().min(max);
        match &self.buffer {
            Some(buf) => &buf.as_slice()[self.count..end],
            None => &[],
        }
    }

    /// Advance the cursor after transmitting `n` bytes
    pub fn advance(&mut self, n: usize) {
        self.count = (self.count + n).min(self.len);
    }

    /// Writable space for received data, clamped to the requested length
    pub fn receive_space(&mut self) -> &mut [u8] {
        let (start, end) = (self.count, self.len);
        match self.buffer.as_mut().and_then(TransferBuffer::as_mut_slice) {
            Some(slice) => &mut slice[start..end],
            None => &mut [],
        }
    }

    /// Set the byte count directly (DMA completion), clamped to the length
    pub fn set_count(&mut self, count: usize) {
        self.count = count.min(self.len);
    }

    /// Data received or sent so far
    pub fn data(&self) -> &[u8] {
        match &self.buffer {
            Some(buf) => &buf.as_slice()[..self.count],
            None => &[],
        }
    }

    /// Give the buffer back to the caller, leaving the record idle
    pub fn take_buffer(&mut self) -> Option<TransferBuffer> {
        self.len = 0;
        self.count = 0;
        self.buffer.take()
    }
}
