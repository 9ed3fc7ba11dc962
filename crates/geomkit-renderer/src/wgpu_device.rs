//! wgpu-backed device sink

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::device::{BufferHandle, BufferTarget, Device, DeviceId, UsageHint};
use crate::{MeshError, MeshResult};

/// Device sink writing into wgpu buffers.
///
/// wgpu buffers are sized at creation, so a handle is only bound to a real
/// buffer on its first full upload. Later full uploads reuse the buffer when
/// it is large enough and reallocate otherwise.
pub struct WgpuDevice {
    id: DeviceId,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_handle: AtomicU64,
    buffers: Mutex<AHashMap<BufferHandle, Option<wgpu::Buffer>>>,
}

impl WgpuDevice {
    /// Wrap an existing wgpu device and queue
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            id: DeviceId::next(),
            device,
            queue,
            next_handle: AtomicU64::new(0),
            buffers: Mutex::new(AHashMap::new()),
        }
    }

    /// Run `f` with the wgpu buffer behind a handle, if it has been uploaded
    pub fn with_buffer<R>(
        &self,
        handle: BufferHandle,
        f: impl FnOnce(&wgpu::Buffer) -> R,
    ) -> Option<R> {
        self.buffers.lock().get(&handle).and_then(|b| b.as_ref()).map(f)
    }

    fn usages(target: BufferTarget) -> wgpu::BufferUsages {
        let copy = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        match target {
            BufferTarget::Vertex => wgpu::BufferUsages::VERTEX | copy,
            BufferTarget::Index => wgpu::BufferUsages::INDEX | copy,
        }
    }
}

/// Round a byte count up to the copy alignment wgpu requires
fn aligned_len(len: usize) -> usize {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    len.div_ceil(align) * align
}

impl Device for WgpuDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn create_buffer(&self) -> MeshResult<BufferHandle> {
        let handle = BufferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.buffers.lock().insert(handle, None);
        Ok(handle)
    }

    fn bind_buffer(&self, _target: BufferTarget, handle: BufferHandle) -> MeshResult<()> {
        // wgpu binds buffers per draw call, there is no global binding point
        if self.buffers.lock().contains_key(&handle) {
            Ok(())
        } else {
            Err(MeshError::Device(format!("unknown buffer handle {}", handle.0)))
        }
    }

    fn upload_full(
        &self,
        handle: BufferHandle,
        target: BufferTarget,
        bytes: &[u8],
        usage: UsageHint,
    ) -> MeshResult<()> {
        let padded_len = aligned_len(bytes.len()).max(wgpu::COPY_BUFFER_ALIGNMENT as usize);
        let mut buffers = self.buffers.lock();
        let slot = buffers
            .get_mut(&handle)
            .ok_or_else(|| MeshError::Device(format!("unknown buffer handle {}", handle.0)))?;

        let reusable = slot.as_ref().is_some_and(|b| {
            b.size() >= padded_len as u64 && b.usage().contains(Self::usages(target))
        });
        if !reusable {
            log::debug!(
                "Allocating wgpu buffer {} ({:?}, {:?}, {} bytes)",
                handle.0,
                target,
                usage,
                padded_len
            );
            *slot = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("geomkit buffer"),
                size: padded_len as u64,
                usage: Self::usages(target),
                mapped_at_creation: false,
            }));
        }

        if let Some(buffer) = slot.as_ref() {
            if bytes.len() == padded_len {
                self.queue.write_buffer(buffer, 0, bytes);
            } else {
                let mut padded = Vec::with_capacity(padded_len);
                padded.extend_from_slice(bytes);
                padded.resize(padded_len, 0);
                self.queue.write_buffer(buffer, 0, &padded);
            }
        }
        Ok(())
    }

    fn upload_partial(
        &self,
        handle: BufferHandle,
        _target: BufferTarget,
        byte_offset: usize,
        bytes: &[u8],
    ) -> MeshResult<()> {
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        if byte_offset % align != 0 || bytes.len() % align != 0 {
            return Err(MeshError::Device(format!(
                "partial write {}+{} is not {}-byte aligned",
                byte_offset,
                bytes.len(),
                align
            )));
        }

        let buffers = self.buffers.lock();
        let buffer = buffers
            .get(&handle)
            .and_then(|b| b.as_ref())
            .ok_or_else(|| MeshError::Device(format!("buffer {} was never uploaded", handle.0)))?;

        if (byte_offset + bytes.len()) as u64 > buffer.size() {
            return Err(MeshError::Device(format!(
                "partial write past end of buffer {}",
                handle.0
            )));
        }
        self.queue.write_buffer(buffer, byte_offset as u64, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu() -> Option<WgpuDevice> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
                .ok()?;
        Some(WgpuDevice::new(Arc::new(device), Arc::new(queue)))
    }

    fn read_back(sink: &WgpuDevice, handle: BufferHandle) -> Option<Vec<u8>> {
        let size = sink.with_buffer(handle, wgpu::Buffer::size)?;
        let staging = sink.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = sink
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        sink.with_buffer(handle, |buffer| {
            encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size)
        })?;
        sink.queue.submit([encoder.finish()]);

        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        let _ = sink.device.poll(wgpu::Maintain::Wait);
        let bytes = slice.get_mapped_range().to_vec();
        Some(bytes)
    }

    #[test]
    fn test_uploads_reach_gpu_buffer() {
        // headless machines without an adapter skip this
        let Some(sink) = gpu() else {
            return;
        };

        let handle = sink.create_buffer().unwrap();
        assert!(sink.with_buffer(handle, |_| ()).is_none());
        assert!(sink.upload_partial(handle, BufferTarget::Vertex, 0, &[0; 4]).is_err());

        sink.bind_buffer(BufferTarget::Vertex, handle).unwrap();
        sink.upload_full(handle, BufferTarget::Vertex, &[1, 2, 3, 4, 5, 6], UsageHint::Static)
            .unwrap();
        assert_eq!(sink.with_buffer(handle, wgpu::Buffer::size), Some(8));

        sink.upload_partial(handle, BufferTarget::Vertex, 4, &[9; 4]).unwrap();
        assert_eq!(read_back(&sink, handle).unwrap(), vec![1, 2, 3, 4, 9, 9, 9, 9]);

        assert!(sink.upload_partial(handle, BufferTarget::Vertex, 2, &[0; 4]).is_err());
        assert!(sink.upload_partial(handle, BufferTarget::Vertex, 8, &[0; 4]).is_err());
        assert!(sink.bind_buffer(BufferTarget::Index, BufferHandle(99)).is_err());
    }

    #[test]
    fn test_aligned_len() {
        assert_eq!(aligned_len(0), 0);
        assert_eq!(aligned_len(1), 4);
        assert_eq!(aligned_len(4), 4);
        assert_eq!(aligned_len(6), 8);
    }

    #[test]
    fn test_usages_per_target() {
        assert!(WgpuDevice::usages(BufferTarget::Vertex).contains(wgpu::BufferUsages::VERTEX));
        assert!(WgpuDevice::usages(BufferTarget::Index).contains(wgpu::BufferUsages::INDEX));
    }
}
