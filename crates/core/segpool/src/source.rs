//! Backing-store acquisition for pool buffers.

/// Supplies and reclaims the single raw buffer behind each pool.
///
/// The registry requests exactly one buffer per successful
/// [`open`](crate::PoolRegistry::open) and hands it back exactly once, on
/// [`close`](crate::PoolRegistry::close) or when a half-built pool is
/// abandoned.
pub trait BufferSource {
    /// Returns a buffer of exactly `size` bytes, or `None` if the request
    /// cannot be satisfied.
    fn acquire(&mut self, size: usize) -> Option<Box<[u8]>>;

    /// Takes back a buffer previously returned by [`acquire`](Self::acquire).
    fn release(&mut self, buffer: Box<[u8]>);
}

/// Zero-filled buffers from the global allocator.
///
/// Uses a fallible reservation so that an oversized request is reported
/// instead of aborting the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapSource;

impl BufferSource for HeapSource {
    fn acquire(&mut self, size: usize) -> Option<Box<[u8]>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).ok()?;
        buf.resize(size, 0);
        Some(buf.into_boxed_slice())
    }

    fn release(&mut self, buffer: Box<[u8]>) {
        drop(buffer);
    }
}
