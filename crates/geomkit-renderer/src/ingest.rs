//! Buffer ingestion
//!
//! Raw geometry arrives in a few shapes; each one is turned into
//! [`BufferData`] explicitly before it reaches a mesh.

use serde_json::Value;

use crate::buffer::{BufferData, ElementType, SharedBuffer};
use crate::{MeshError, MeshResult};

/// Raw data for one buffer
#[derive(Debug, Clone)]
pub enum RawInput {
    /// Plain flat numbers, converted to the stream's canonical element type
    Flat(Vec<f64>),
    /// One row per element, flattened in bounded chunks
    Nested(Vec<Vec<f64>>),
    /// Already typed storage, kept as is
    Typed(BufferData),
    /// Data of an existing buffer
    Existing(SharedBuffer),
}

impl RawInput {
    /// Resolve into typed storage.
    ///
    /// `Flat` and `Nested` inputs become `element_type`; `Typed` keeps its own
    /// type and `Existing` copies the source buffer's data.
    pub fn into_data(self, element_type: ElementType, chunk: usize) -> MeshResult<BufferData> {
        match self {
            Self::Flat(values) => Ok(BufferData::from_f64_slice(element_type, &values)),
            Self::Nested(rows) => {
                Ok(BufferData::from_f64_slice(element_type, &flatten(&rows, chunk)))
            }
            Self::Typed(data) => Ok(data),
            Self::Existing(buffer) => {
                let buffer = buffer.read();
                buffer.data().cloned().ok_or_else(|| {
                    MeshError::MissingData(format!("buffer '{}' has been freed", buffer.name()))
                })
            }
        }
    }

    /// Number of scalar components the input will produce
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(values) => values.len(),
            Self::Nested(rows) => rows.iter().map(Vec::len).sum(),
            Self::Typed(data) => data.len(),
            Self::Existing(buffer) => buffer.read().len(),
        }
    }

    /// Check if the input is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Represent the input as a JSON number array
    pub fn to_json(&self) -> Value {
        let values = match self {
            Self::Flat(values) => values.clone(),
            Self::Nested(rows) => flatten(rows, usize::MAX),
            Self::Typed(data) => data.to_f64_vec(),
            Self::Existing(buffer) => buffer
                .read()
                .data()
                .map(BufferData::to_f64_vec)
                .unwrap_or_default(),
        };
        Value::Array(values.into_iter().map(Value::from).collect())
    }
}

/// Concatenate rows, growing the output one chunk of rows at a time
pub fn flatten(rows: &[Vec<f64>], chunk: usize) -> Vec<f64> {
    let mut out = Vec::new();
    for block in rows.chunks(chunk.max(1)) {
        out.reserve(block.iter().map(Vec::len).sum());
        for row in block {
            out.extend_from_slice(row);
        }
    }
    out
}

impl From<Vec<f64>> for RawInput {
    fn from(values: Vec<f64>) -> Self {
        Self::Flat(values)
    }
}

impl From<Vec<Vec<f64>>> for RawInput {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        Self::Nested(rows)
    }
}

impl<const N: usize> From<Vec<[f32; N]>> for RawInput {
    fn from(rows: Vec<[f32; N]>) -> Self {
        Self::Nested(rows.iter().map(|r| r.iter().map(|&v| f64::from(v)).collect()).collect())
    }
}

impl<const N: usize> From<Vec<[u32; N]>> for RawInput {
    fn from(rows: Vec<[u32; N]>) -> Self {
        Self::Nested(rows.iter().map(|r| r.iter().map(|&v| f64::from(v)).collect()).collect())
    }
}

impl From<BufferData> for RawInput {
    fn from(data: BufferData) -> Self {
        Self::Typed(data)
    }
}

impl From<Vec<f32>> for RawInput {
    fn from(values: Vec<f32>) -> Self {
        Self::Typed(BufferData::F32(values))
    }
}

impl From<Vec<u16>> for RawInput {
    fn from(values: Vec<u16>) -> Self {
        Self::Typed(BufferData::U16(values))
    }
}

impl From<Vec<u32>> for RawInput {
    fn from(values: Vec<u32>) -> Self {
        Self::Typed(BufferData::U32(values))
    }
}

impl From<SharedBuffer> for RawInput {
    fn from(buffer: SharedBuffer) -> Self {
        Self::Existing(buffer)
    }
}

impl TryFrom<&Value> for RawInput {
    type Error = MeshError;

    /// Accepts `[1, 2, 3]` or `[[1, 2], [3, 4]]`
    fn try_from(value: &Value) -> MeshResult<Self> {
        let items = value.as_array().ok_or_else(|| {
            MeshError::InvalidState(format!("expected a number array, got {value}"))
        })?;

        if items.iter().all(Value::is_number) {
            return Ok(Self::Flat(items.iter().filter_map(Value::as_f64).collect()));
        }

        items
            .iter()
            .map(|row| {
                row.as_array()
                    .filter(|r| r.iter().all(Value::is_number))
                    .map(|r| r.iter().filter_map(Value::as_f64).collect())
                    .ok_or_else(|| {
                        MeshError::InvalidState(format!("expected a number row, got {row}"))
                    })
            })
            .collect::<MeshResult<Vec<Vec<f64>>>>()
            .map(Self::Nested)
    }
}

/// A configuration entry: buffer data or a plain property
#[derive(Debug, Clone)]
pub enum ConfigValue {
    /// Buffer data
    Buffer(RawInput),
    /// Free-form property
    Property(Value),
}

impl From<RawInput> for ConfigValue {
    fn from(raw: RawInput) -> Self {
        Self::Buffer(raw)
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        Self::Property(value)
    }
}

macro_rules! config_from_raw {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ConfigValue {
                fn from(input: $ty) -> Self {
                    Self::Buffer(RawInput::from(input))
                }
            }
        )*
    };
}

config_from_raw!(
    Vec<f64>,
    Vec<f32>,
    Vec<u16>,
    Vec<u32>,
    Vec<Vec<f64>>,
    Vec<[f32; 2]>,
    Vec<[f32; 3]>,
    Vec<[f32; 4]>,
    Vec<[u32; 2]>,
    Vec<[u32; 3]>,
    BufferData,
    SharedBuffer,
);

impl ConfigValue {
    /// Wrap a JSON property
    pub fn property(value: impl Into<Value>) -> Self {
        Self::Property(value.into())
    }

    /// Interpret as buffer data
    pub fn into_raw(self) -> MeshResult<RawInput> {
        match self {
            Self::Buffer(raw) => Ok(raw),
            Self::Property(value) => RawInput::try_from(&value),
        }
    }

    /// Interpret as a property value
    pub fn into_property(self) -> Value {
        match self {
            Self::Buffer(raw) => raw.to_json(),
            Self::Property(value) => value,
        }
    }
}
