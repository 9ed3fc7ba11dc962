//! Device sink
//!
//! The boundary between host-side buffers and whatever owns GPU memory.
//! A device only ever sees opaque handles, a target kind and raw bytes.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{MeshError, MeshResult};

/// Opaque handle to a device-side buffer resource.
///
/// Only meaningful on the device that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide identity of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u64);

impl DeviceId {
    /// Allocate an id no other device has
    pub fn next() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a device buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferTarget {
    /// Per-vertex attribute stream
    Vertex,
    /// Index stream
    Index,
}

/// How often buffer contents are expected to change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UsageHint {
    /// Written once, drawn many times
    #[default]
    Static,
    /// Rewritten occasionally
    Dynamic,
    /// Rewritten every frame
    Stream,
}

/// Graphics device sink.
///
/// Calls are synchronous; a returned error is reported straight to the
/// caller of the buffer operation.
pub trait Device: Send + Sync {
    /// Identity of this device; handles from one device are invalid on another
    fn id(&self) -> DeviceId;

    /// Allocate a new buffer handle
    fn create_buffer(&self) -> MeshResult<BufferHandle>;

    /// Make `handle` the current buffer for `target`
    fn bind_buffer(&self, target: BufferTarget, handle: BufferHandle) -> MeshResult<()>;

    /// Replace the whole contents of a buffer
    fn upload_full(
        &self,
        handle: BufferHandle,
        target: BufferTarget,
        bytes: &[u8],
        usage: UsageHint,
    ) -> MeshResult<()>;

    /// Overwrite a byte window of a previously uploaded buffer
    fn upload_partial(
        &self,
        handle: BufferHandle,
        target: BufferTarget,
        byte_offset: usize,
        bytes: &[u8],
    ) -> MeshResult<()>;
}

/// Transfer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Number of full uploads
    pub full_uploads: u64,
    /// Number of partial uploads
    pub partial_uploads: u64,
    /// Total bytes sent to the device
    pub bytes_transferred: u64,
}

#[derive(Debug)]
struct MemoryBuffer {
    target: Option<BufferTarget>,
    usage: Option<UsageHint>,
    bytes: Vec<u8>,
}

/// Device that keeps its "GPU" buffers in host memory.
///
/// Useful for headless tools and for checking exactly what would have been
/// sent to a real device.
#[derive(Debug)]
pub struct MemoryDevice {
    id: DeviceId,
    next_handle: AtomicU64,
    buffers: Mutex<AHashMap<BufferHandle, MemoryBuffer>>,
    bound: Mutex<AHashMap<BufferTarget, BufferHandle>>,
    stats: Mutex<TransferStats>,
}

impl MemoryDevice {
    /// Create an empty device
    pub fn new() -> Self {
        Self {
            id: DeviceId::next(),
            next_handle: AtomicU64::new(0),
            buffers: Mutex::new(AHashMap::new()),
            bound: Mutex::new(AHashMap::new()),
            stats: Mutex::new(TransferStats::default()),
        }
    }

    /// Copy of the bytes stored for a handle
    pub fn buffer_bytes(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        self.buffers.lock().get(&handle).map(|b| b.bytes.clone())
    }

    /// Usage hint of the last full upload to a handle
    pub fn buffer_usage(&self, handle: BufferHandle) -> Option<UsageHint> {
        self.buffers.lock().get(&handle).and_then(|b| b.usage)
    }

    /// Target the handle was last uploaded as
    pub fn buffer_target(&self, handle: BufferHandle) -> Option<BufferTarget> {
        self.buffers.lock().get(&handle).and_then(|b| b.target)
    }

    /// Buffer currently bound to `target`
    pub fn bound(&self, target: BufferTarget) -> Option<BufferHandle> {
        self.bound.lock().get(&target).copied()
    }

    /// Number of allocated handles
    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Transfer statistics so far
    pub fn stats(&self) -> TransferStats {
        *self.stats.lock()
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for MemoryDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn create_buffer(&self) -> MeshResult<BufferHandle> {
        let handle = BufferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.buffers.lock().insert(
            handle,
            MemoryBuffer {
                target: None,
                usage: None,
                bytes: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn bind_buffer(&self, target: BufferTarget, handle: BufferHandle) -> MeshResult<()> {
        if !self.buffers.lock().contains_key(&handle) {
            return Err(MeshError::Device(format!("unknown buffer handle {}", handle.0)));
        }
        self.bound.lock().insert(target, handle);
        Ok(())
    }

    fn upload_full(
        &self,
        handle: BufferHandle,
        target: BufferTarget,
        bytes: &[u8],
        usage: UsageHint,
    ) -> MeshResult<()> {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .get_mut(&handle)
            .ok_or_else(|| MeshError::Device(format!("unknown buffer handle {}", handle.0)))?;

        buffer.target = Some(target);
        buffer.usage = Some(usage);
        buffer.bytes.clear();
        buffer.bytes.extend_from_slice(bytes);

        let mut stats = self.stats.lock();
        stats.full_uploads += 1;
        stats.bytes_transferred += bytes.len() as u64;
        Ok(())
    }

    fn upload_partial(
        &self,
        handle: BufferHandle,
        target: BufferTarget,
        byte_offset: usize,
        bytes: &[u8],
    ) -> MeshResult<()> {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .get_mut(&handle)
            .ok_or_else(|| MeshError::Device(format!("unknown buffer handle {}", handle.0)))?;

        if buffer.target != Some(target) {
            return Err(MeshError::Device(format!(
                "buffer {} was not allocated as {:?}",
                handle.0, target
            )));
        }

        let end = byte_offset + bytes.len();
        if end > buffer.bytes.len() {
            return Err(MeshError::Device(format!(
                "write {}..{} past end of buffer {} ({} bytes)",
                byte_offset,
                end,
                handle.0,
                buffer.bytes.len()
            )));
        }
        buffer.bytes[byte_offset..end].copy_from_slice(bytes);

        let mut stats = self.stats.lock();
        stats.partial_uploads += 1;
        stats.bytes_transferred += bytes.len() as u64;
        Ok(())
    }
}
