//! Typed buffers
//!
//! A [`TypedBuffer`] owns one homogeneous numeric array, knows how many
//! components make up one logical element (its spacing) and keeps track of
//! the device-side copy it was last uploaded to.

use std::borrow::Cow;
use std::slice::{ChunksExact, ChunksExactMut};
use std::sync::Arc;

use bytemuck::Pod;
use geomkit_core::math::{Mat4, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::device::{BufferHandle, BufferTarget, Device, DeviceId, UsageHint};
use crate::{MeshError, MeshResult};

/// Buffer shared between meshes; mutation is visible through every clone
pub type SharedBuffer = Arc<RwLock<TypedBuffer>>;

/// Element type of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    /// Host-only double precision; cannot be uploaded
    F64,
}

impl ElementType {
    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Whether a device accepts this element type
    pub fn is_device_compatible(self) -> bool {
        !matches!(self, Self::F64)
    }

    /// Largest integer value representable, for index types
    pub fn max_index(self) -> Option<u64> {
        match self {
            Self::U8 => Some(u8::MAX as u64),
            Self::U16 => Some(u16::MAX as u64),
            Self::U32 => Some(u32::MAX as u64),
            _ => None,
        }
    }
}

/// Contiguous numeric storage of one element type
#[derive(Debug, Clone, PartialEq)]
pub enum BufferData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! dispatch {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            BufferData::I8($v) => $body,
            BufferData::U8($v) => $body,
            BufferData::I16($v) => $body,
            BufferData::U16($v) => $body,
            BufferData::I32($v) => $body,
            BufferData::U32($v) => $body,
            BufferData::F32($v) => $body,
            BufferData::F64($v) => $body,
        }
    };
}

/// Numeric types a [`BufferData`] can hold
pub trait Scalar: Pod + PartialEq + std::fmt::Debug {
    /// Matching element type
    const ELEMENT_TYPE: ElementType;

    /// Borrow the data as a slice of `Self`, if the types match
    fn slice(data: &BufferData) -> Option<&[Self]>;

    /// Mutably borrow the data as a slice of `Self`, if the types match
    fn slice_mut(data: &mut BufferData) -> Option<&mut [Self]>;

    /// Wrap a vector into buffer data
    fn wrap(values: Vec<Self>) -> BufferData;

    /// Convert from a double, saturating/truncating as `as` does
    fn from_f64(value: f64) -> Self;

    /// Widen to a double
    fn to_f64(self) -> f64;
}

macro_rules! impl_scalar {
    ($ty:ty, $variant:ident) => {
        impl Scalar for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn slice(data: &BufferData) -> Option<&[Self]> {
                match data {
                    BufferData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut BufferData) -> Option<&mut [Self]> {
                match data {
                    BufferData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> BufferData {
                BufferData::$variant(values)
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_scalar!(i8, I8);
impl_scalar!(u8, U8);
impl_scalar!(i16, I16);
impl_scalar!(u16, U16);
impl_scalar!(i32, I32);
impl_scalar!(u32, U32);
impl_scalar!(f32, F32);
impl_scalar!(f64, F64);

fn convert<S: Scalar, T: Scalar>(values: &[S]) -> Vec<T> {
    values.iter().map(|v| T::from_f64(v.to_f64())).collect()
}

impl BufferData {
    /// Zero-filled storage of `len` elements
    pub fn zeroed(element_type: ElementType, len: usize) -> Self {
        match element_type {
            ElementType::I8 => Self::I8(vec![0; len]),
            ElementType::U8 => Self::U8(vec![0; len]),
            ElementType::I16 => Self::I16(vec![0; len]),
            ElementType::U16 => Self::U16(vec![0; len]),
            ElementType::I32 => Self::I32(vec![0; len]),
            ElementType::U32 => Self::U32(vec![0; len]),
            ElementType::F32 => Self::F32(vec![0.0; len]),
            ElementType::F64 => Self::F64(vec![0.0; len]),
        }
    }

    /// Build storage of `element_type` from doubles
    pub fn from_f64_slice(element_type: ElementType, values: &[f64]) -> Self {
        match element_type {
            ElementType::I8 => Self::I8(convert(values)),
            ElementType::U8 => Self::U8(convert(values)),
            ElementType::I16 => Self::I16(convert(values)),
            ElementType::U16 => Self::U16(convert(values)),
            ElementType::I32 => Self::I32(convert(values)),
            ElementType::U32 => Self::U32(convert(values)),
            ElementType::F32 => Self::F32(convert(values)),
            ElementType::F64 => Self::F64(values.to_vec()),
        }
    }

    /// Build index storage of `element_type` from 32-bit indices.
    ///
    /// Values wider than the target type wrap.
    pub fn from_indices(element_type: ElementType, indices: Vec<u32>) -> Self {
        match element_type {
            ElementType::U32 => Self::U32(indices),
            ElementType::U16 => Self::U16(indices.into_iter().map(|i| i as u16).collect()),
            ElementType::U8 => Self::U8(indices.into_iter().map(|i| i as u8).collect()),
            other => {
                let values: Vec<f64> = indices.into_iter().map(f64::from).collect();
                Self::from_f64_slice(other, &values)
            }
        }
    }

    /// Element type of the storage
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::I8(_) => ElementType::I8,
            Self::U8(_) => ElementType::U8,
            Self::I16(_) => ElementType::I16,
            Self::U16(_) => ElementType::U16,
            Self::I32(_) => ElementType::I32,
            Self::U32(_) => ElementType::U32,
            Self::F32(_) => ElementType::F32,
            Self::F64(_) => ElementType::F64,
        }
    }

    /// Number of scalar components
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    /// Check if there are no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes in native endianness
    pub fn as_bytes(&self) -> &[u8] {
        dispatch!(self, v => bytemuck::cast_slice(v.as_slice()))
    }

    /// View as `f32`, converting only when the storage is another type
    pub fn to_f32(&self) -> Cow<'_, [f32]> {
        match self {
            Self::F32(v) => Cow::Borrowed(v),
            other => Cow::Owned(dispatch!(other, v => convert(v))),
        }
    }

    /// View as `u32` indices, converting only when the storage is another type
    pub fn to_u32(&self) -> Cow<'_, [u32]> {
        match self {
            Self::U32(v) => Cow::Borrowed(v),
            other => Cow::Owned(dispatch!(other, v => convert(v))),
        }
    }

    /// Convert to another element type
    pub fn converted(&self, element_type: ElementType) -> Self {
        if self.element_type() == element_type {
            return self.clone();
        }
        match element_type {
            ElementType::I8 => Self::I8(dispatch!(self, v => convert(v))),
            ElementType::U8 => Self::U8(dispatch!(self, v => convert(v))),
            ElementType::I16 => Self::I16(dispatch!(self, v => convert(v))),
            ElementType::U16 => Self::U16(dispatch!(self, v => convert(v))),
            ElementType::I32 => Self::I32(dispatch!(self, v => convert(v))),
            ElementType::U32 => Self::U32(dispatch!(self, v => convert(v))),
            ElementType::F32 => Self::F32(dispatch!(self, v => convert(v))),
            ElementType::F64 => Self::F64(dispatch!(self, v => convert(v))),
        }
    }

    /// Copy the values out as doubles
    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch!(self, v => convert(v))
    }
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for BufferData {
                fn from(values: Vec<$ty>) -> Self {
                    Self::$variant(values)
                }
            }
        )*
    };
}

impl_from_vec!(
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    f32 => F32,
    f64 => F64,
);

/// What was recorded on a device handle at the last full upload to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBufferInfo {
    /// Device owning the handle
    pub device: DeviceId,
    /// Device handle
    pub handle: BufferHandle,
    /// Element type sent
    pub element_type: ElementType,
    /// Element size in bytes
    pub element_size: usize,
    /// Number of scalar components sent
    pub length: usize,
    /// Components per logical element
    pub spacing: usize,
}

/// Homogeneous numeric array with a device-side mirror
#[derive(Debug, Clone)]
pub struct TypedBuffer {
    name: String,
    target: BufferTarget,
    attribute: Option<String>,
    data: Option<BufferData>,
    spacing: usize,
    usage: UsageHint,
    // one entry per device, most recent upload last
    uploads: SmallVec<[DeviceBufferInfo; 1]>,
}

impl TypedBuffer {
    /// Create a buffer
    pub fn new(target: BufferTarget, data: BufferData, spacing: usize) -> Self {
        Self {
            name: String::new(),
            target,
            attribute: None,
            data: Some(data),
            spacing,
            usage: UsageHint::default(),
            uploads: SmallVec::new(),
        }
    }

    /// Create a named vertex attribute buffer
    pub fn vertex(name: impl Into<String>, data: BufferData, spacing: usize) -> Self {
        Self::new(BufferTarget::Vertex, data, spacing).with_name(name)
    }

    /// Create a named index buffer
    pub fn index(name: impl Into<String>, data: BufferData) -> Self {
        Self::new(BufferTarget::Index, data, 0).with_name(name)
    }

    /// Set the buffer name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the shader attribute tag
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Set the default usage hint for uploads
    pub fn with_usage(mut self, usage: UsageHint) -> Self {
        self.usage = usage;
        self
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedBuffer {
        Arc::new(RwLock::new(self))
    }

    /// Buffer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vertex or index stream
    pub fn target(&self) -> BufferTarget {
        self.target
    }

    /// Shader attribute tag
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Set the shader attribute tag
    pub fn set_attribute(&mut self, attribute: impl Into<String>) {
        self.attribute = Some(attribute.into());
    }

    /// Components per logical element; 0 for flat index streams
    pub fn spacing(&self) -> usize {
        self.spacing
    }

    /// Default usage hint
    pub fn usage(&self) -> UsageHint {
        self.usage
    }

    /// Host-side data, `None` once freed
    pub fn data(&self) -> Option<&BufferData> {
        self.data.as_ref()
    }

    /// Mutable host-side data
    pub fn data_mut(&mut self) -> Option<&mut BufferData> {
        self.data.as_mut()
    }

    /// Replace the host-side data.
    ///
    /// The device handle is kept; call [`upload`](Self::upload) to resync.
    pub fn set_data(&mut self, data: BufferData) {
        self.data = Some(data);
    }

    /// Drop the host-side data, keeping the device resource
    pub fn free_data(&mut self) -> Option<BufferData> {
        self.data.take()
    }

    /// Check if host-side data is present
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Element type of the host-side data
    pub fn element_type(&self) -> Option<ElementType> {
        self.data.as_ref().map(BufferData::element_type)
    }

    /// Number of scalar components, or 0 when freed
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, BufferData::len)
    }

    /// Check if the buffer holds no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of logical elements (`len / spacing`)
    pub fn element_count(&self) -> usize {
        self.len() / self.stride()
    }

    /// Size of the host-side data in bytes
    pub fn byte_len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.as_bytes().len())
    }

    /// What was recorded at the most recent upload, on any device
    pub fn device_info(&self) -> Option<&DeviceBufferInfo> {
        self.uploads.last()
    }

    /// What was recorded at the last upload to `device`
    pub fn device_info_on(&self, device: DeviceId) -> Option<&DeviceBufferInfo> {
        self.uploads.iter().find(|info| info.device == device)
    }

    /// Handle of the most recent upload, if uploaded
    pub fn handle(&self) -> Option<BufferHandle> {
        self.device_info().map(|info| info.handle)
    }

    /// Handle on `device`, if uploaded there
    pub fn handle_on(&self, device: DeviceId) -> Option<BufferHandle> {
        self.device_info_on(device).map(|info| info.handle)
    }

    fn stride(&self) -> usize {
        self.spacing.max(1)
    }

    fn missing(&self) -> MeshError {
        MeshError::InvalidState(format!("buffer '{}' has no data", self.name))
    }

    /// Send the whole buffer to the device.
    ///
    /// Creates the device resource on the first upload to `device` and
    /// reuses it afterwards. Handles on other devices are left alone.
    /// `usage` falls back to the buffer's default hint.
    pub fn upload(&mut self, device: &dyn Device, usage: Option<UsageHint>) -> MeshResult<()> {
        let data = self.data.as_ref().ok_or_else(|| self.missing())?;
        let element_type = data.element_type();
        if !element_type.is_device_compatible() {
            return Err(MeshError::UnsupportedType(format!(
                "buffer '{}' holds {:?} data",
                self.name, element_type
            )));
        }

        let device_id = device.id();
        let previous = self.uploads.iter().position(|info| info.device == device_id);
        let handle = match previous {
            Some(pos) => self.uploads[pos].handle,
            None => device.create_buffer()?,
        };
        let usage = usage.unwrap_or(self.usage);
        let length = data.len();

        device.bind_buffer(self.target, handle)?;
        device.upload_full(handle, self.target, data.as_bytes(), usage)?;

        log::debug!(
            "Uploaded buffer '{}' ({:?}, {} x {:?}, {:?})",
            self.name,
            self.target,
            length,
            element_type,
            usage
        );

        if let Some(pos) = previous {
            self.uploads.remove(pos);
        }
        self.uploads.push(DeviceBufferInfo {
            device: device_id,
            handle,
            element_type,
            element_size: element_type.size(),
            length,
            spacing: self.spacing,
        });
        Ok(())
    }

    /// Send a byte window of the buffer to the device.
    ///
    /// Requires a previous [`upload`](Self::upload) to the same device.
    pub fn upload_range(
        &self,
        device: &dyn Device,
        byte_offset: usize,
        byte_length: usize,
    ) -> MeshResult<()> {
        let data = self.data.as_ref().ok_or_else(|| self.missing())?;
        let info = self.device_info_on(device.id()).ok_or_else(|| {
            MeshError::InvalidState(format!(
                "buffer '{}' was never uploaded to this device",
                self.name
            ))
        })?;

        let bytes = data.as_bytes();
        let end = byte_offset
            .checked_add(byte_length)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                MeshError::InvalidState(format!(
                    "range {}+{} outside buffer '{}' ({} bytes)",
                    byte_offset,
                    byte_length,
                    self.name,
                    bytes.len()
                ))
            })?;

        device.bind_buffer(self.target, info.handle)?;
        device.upload_partial(info.handle, self.target, byte_offset, &bytes[byte_offset..end])
    }

    /// Iterate over element windows of `spacing` components
    pub fn elements<T: Scalar>(&self) -> MeshResult<ChunksExact<'_, T>> {
        let stride = self.stride();
        let data = self.data.as_ref().ok_or_else(|| self.missing())?;
        let values = T::slice(data).ok_or_else(|| self.type_mismatch::<T>())?;
        Ok(values.chunks_exact(stride))
    }

    /// Iterate mutably over element windows of `spacing` components
    pub fn elements_mut<T: Scalar>(&mut self) -> MeshResult<ChunksExactMut<'_, T>> {
        let stride = self.stride();
        match self.element_type() {
            None => return Err(self.missing()),
            Some(ty) if ty != T::ELEMENT_TYPE => return Err(self.type_mismatch::<T>()),
            Some(_) => {}
        }
        let Some(values) = self.data.as_mut().and_then(T::slice_mut) else {
            return Err(MeshError::UnsupportedType(format!(
                "buffer '{}' changed type",
                self.name
            )));
        };
        Ok(values.chunks_exact_mut(stride))
    }

    /// Call `visit` with every element window and its starting component index
    pub fn for_each<T: Scalar>(
        &mut self,
        mut visit: impl FnMut(&mut [T], usize),
    ) -> MeshResult<&mut Self> {
        let stride = self.stride();
        for (i, window) in self.elements_mut::<T>()?.enumerate() {
            visit(window, i * stride);
        }
        Ok(self)
    }

    /// Transform every element's first three components as a point.
    ///
    /// Nothing is re-uploaded.
    pub fn apply_transform(&mut self, matrix: &Mat4) -> MeshResult<&mut Self> {
        if self.spacing < 3 {
            return Err(MeshError::InvalidState(format!(
                "buffer '{}' has spacing {}, cannot transform as points",
                self.name, self.spacing
            )));
        }
        let spacing = self.spacing;
        let Some(data) = self.data.as_mut() else {
            return Err(MeshError::InvalidState(format!("buffer '{}' has no data", self.name)));
        };
        dispatch!(data, v => transform_points(v, spacing, matrix));
        Ok(self)
    }

    fn type_mismatch<T: Scalar>(&self) -> MeshError {
        MeshError::UnsupportedType(format!(
            "buffer '{}' holds {:?}, requested {:?}",
            self.name,
            self.element_type(),
            T::ELEMENT_TYPE
        ))
    }
}

fn transform_points<T: Scalar>(values: &mut [T], spacing: usize, matrix: &Mat4) {
    for window in values.chunks_exact_mut(spacing) {
        let p = Vec3::new(
            window[0].to_f64() as f32,
            window[1].to_f64() as f32,
            window[2].to_f64() as f32,
        );
        let p = matrix.transform_point3(p);
        window[0] = T::from_f64(p.x as f64);
        window[1] = T::from_f64(p.y as f64);
        window[2] = T::from_f64(p.z as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn triangle() -> TypedBuffer {
        TypedBuffer::vertex(
            "vertices",
            BufferData::F32(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            3,
        )
    }

    #[test]
    fn test_upload_records_format() {
        let device = MemoryDevice::new();
        let mut buffer = triangle();
        buffer.upload(&device, None).unwrap();

        let info = *buffer.device_info().unwrap();
        assert_eq!(info.element_type, ElementType::F32);
        assert_eq!(info.element_size, 4);
        assert_eq!(info.length, 9);
        assert_eq!(info.spacing, 3);
        assert_eq!(device.buffer_bytes(info.handle).unwrap().len(), 36);
        assert_eq!(device.buffer_usage(info.handle), Some(UsageHint::Static));
    }

    #[test]
    fn test_upload_reuses_handle() {
        let device = MemoryDevice::new();
        let mut buffer = triangle();
        buffer.upload(&device, None).unwrap();
        let first = buffer.handle();

        buffer.set_data(BufferData::F32(vec![1.0; 9]));
        buffer.upload(&device, Some(UsageHint::Dynamic)).unwrap();

        assert_eq!(buffer.handle(), first);
        assert_eq!(device.buffer_count(), 1);
        assert_eq!(device.buffer_usage(first.unwrap()), Some(UsageHint::Dynamic));
    }

    #[test]
    fn test_upload_keeps_handles_per_device() {
        let first = MemoryDevice::new();
        let second = MemoryDevice::new();
        let occupied = second.create_buffer().unwrap();
        second
            .upload_full(occupied, BufferTarget::Vertex, &[7; 4], UsageHint::Static)
            .unwrap();

        let mut buffer = triangle();
        buffer.upload(&first, None).unwrap();
        assert_eq!(buffer.handle_on(first.id()), Some(occupied));
        assert!(buffer.upload_range(&second, 0, 4).is_err());

        buffer.upload(&second, None).unwrap();
        let moved = buffer.handle_on(second.id()).unwrap();
        assert_ne!(moved, occupied);
        assert_eq!(second.buffer_bytes(occupied).unwrap(), vec![7; 4]);
        assert_eq!(second.buffer_bytes(moved).unwrap().len(), 36);
        assert_eq!(buffer.device_info().unwrap().device, second.id());

        // back on the first device, the original handle is reused
        buffer.upload(&first, None).unwrap();
        assert_eq!(buffer.handle(), Some(occupied));
        assert_eq!(first.buffer_count(), 1);
    }

    #[test]
    fn test_upload_without_data() {
        let device = MemoryDevice::new();
        let mut buffer = triangle();
        buffer.free_data();
        assert!(matches!(buffer.upload(&device, None), Err(MeshError::InvalidState(_))));
    }

    #[test]
    fn test_upload_unsupported_type() {
        let device = MemoryDevice::new();
        let mut buffer = TypedBuffer::vertex("extra", BufferData::F64(vec![1.0]), 1);
        assert!(matches!(buffer.upload(&device, None), Err(MeshError::UnsupportedType(_))));
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_upload_range() {
        let device = MemoryDevice::new();
        let mut buffer = TypedBuffer::index("triangles", BufferData::U16(vec![0, 1, 2, 3]));

        assert!(matches!(
            buffer.upload_range(&device, 0, 2),
            Err(MeshError::InvalidState(_))
        ));

        buffer.upload(&device, None).unwrap();
        if let Some(BufferData::U16(v)) = buffer.data_mut() {
            v[2] = 9;
        }
        buffer.upload_range(&device, 4, 2).unwrap();

        let bytes = device.buffer_bytes(buffer.handle().unwrap()).unwrap();
        assert_eq!(bytes, bytemuck::cast_slice::<u16, u8>(&[0, 1, 9, 3]).to_vec());
        assert!(matches!(
            buffer.upload_range(&device, 6, 4),
            Err(MeshError::InvalidState(_))
        ));
    }

    #[test]
    fn test_for_each_mutates_in_place() {
        let mut buffer = triangle();
        buffer
            .for_each::<f32>(|v, _| v[2] = 5.0)
            .unwrap();

        let z: Vec<f32> = buffer.elements::<f32>().unwrap().map(|v| v[2]).collect();
        assert_eq!(z, vec![5.0, 5.0, 5.0]);

        // restartable
        assert_eq!(buffer.elements::<f32>().unwrap().count(), 3);
    }

    #[test]
    fn test_for_each_offsets() {
        let mut buffer = triangle();
        let mut offsets = Vec::new();
        buffer.for_each::<f32>(|_, i| offsets.push(i)).unwrap();
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn test_elements_type_mismatch() {
        let buffer = triangle();
        assert!(matches!(buffer.elements::<u16>(), Err(MeshError::UnsupportedType(_))));
    }

    #[test]
    fn test_apply_transform_translates_points() {
        let mut buffer = triangle();
        buffer
            .apply_transform(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();

        assert_eq!(
            buffer.data().unwrap(),
            &BufferData::F32(vec![1.0, 2.0, 3.0, 2.0, 2.0, 3.0, 1.0, 3.0, 3.0])
        );
    }

    #[test]
    fn test_apply_transform_keeps_extra_components() {
        let mut buffer =
            TypedBuffer::vertex("tangents", BufferData::F32(vec![1.0, 0.0, 0.0, -1.0]), 4);
        buffer.apply_transform(&Mat4::from_scale(Vec3::splat(2.0))).unwrap();
        assert_eq!(buffer.data().unwrap(), &BufferData::F32(vec![2.0, 0.0, 0.0, -1.0]));
    }

    #[test]
    fn test_apply_transform_needs_three_components() {
        let mut buffer = TypedBuffer::vertex("coords", BufferData::F32(vec![0.0, 1.0]), 2);
        assert!(buffer.apply_transform(&Mat4::IDENTITY).is_err());
    }

    #[test]
    fn test_index_conversions() {
        let data = BufferData::from_indices(ElementType::U16, vec![1, 2, 70000]);
        assert_eq!(data, BufferData::U16(vec![1, 2, 70000u32 as u16]));
        assert_eq!(data.to_u32().as_ref(), &[1, 2, 4464]);
    }

    #[test]
    fn test_element_count_and_bytes() {
        let buffer = triangle();
        assert_eq!(buffer.len(), 9);
        assert_eq!(buffer.element_count(), 3);
        assert_eq!(buffer.byte_len(), 36);

        let index = TypedBuffer::index("lines", BufferData::U32(vec![0, 1]));
        assert_eq!(index.element_count(), 2);
        assert_eq!(index.spacing(), 0);
    }

    #[test]
    fn test_converted() {
        let data = BufferData::F64(vec![1.5, 2.0]);
        assert_eq!(data.converted(ElementType::F32), BufferData::F32(vec![1.5, 2.0]));
        assert_eq!(data.converted(ElementType::U8), BufferData::U8(vec![1, 2]));
        assert_eq!(data.to_f32().as_ref(), &[1.5, 2.0]);
    }
}
