use anyhow::Result;

use super::reflect::{ShaderReflection, UniformSlot};
use crate::error::{CompileError, UniformError};
use crate::uniforms::{UniformDescriptor, UniformFormat, UniformValue};

/// Buffer sizes are rounded up to this so every binding is a legal uniform
/// or storage buffer.
const BUFFER_ALIGNMENT: u64 = 16;

/// CPU shadow of a program's uniform buffers.
///
/// Values are encoded at their reflected offsets; buffers touched since the
/// last upload are flagged dirty.
#[derive(Clone, Debug)]
pub struct UniformTable {
    slots: Vec<UniformSlot>,
    buffers: Vec<Vec<u8>>,
    dirty: Vec<bool>,
}

impl UniformTable {
    pub fn new(reflection: &ShaderReflection) -> Self {
        let buffers: Vec<Vec<u8>> = reflection
            .bindings
            .iter()
            .map(|b| vec![0u8; padded_size(b.size) as usize])
            .collect();
        let dirty = vec![true; buffers.len()];

        Self {
            slots: reflection.uniforms.clone(),
            buffers,
            dirty,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&UniformSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }

    /// Every uniform with its current value, in declaration order.
    pub fn descriptors(&self) -> Vec<UniformDescriptor> {
        self.slots
            .iter()
            .map(|slot| {
                let mut descriptor = UniformDescriptor::new(slot.name.clone(), slot.format);
                if let Some(value) = self.value(&slot.name) {
                    descriptor.value = value;
                }
                descriptor
            })
            .collect()
    }

    pub fn set(&mut self, name: &str, value: &UniformValue) -> Result<(), UniformError> {
        let slot = self
            .slot(name)
            .ok_or_else(|| UniformError::Unknown(name.to_string()))?
            .clone();

        if let (UniformFormat::FloatArray(expected), UniformValue::FloatArray(values)) =
            (slot.format, value)
        {
            if values.len() != expected {
                return Err(UniformError::LengthMismatch {
                    name: name.to_string(),
                    expected,
                    actual: values.len(),
                });
            }
        }
        if !value.matches(slot.format) {
            return Err(UniformError::FormatMismatch {
                name: name.to_string(),
                expected: slot.format.to_string(),
                actual: value.format().to_string(),
            });
        }

        match value {
            UniformValue::Scalar(v) => self.write_bytes(&slot, 0, bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => self.write_bytes(&slot, 0, bytemuck::cast_slice(v)),
            UniformValue::Vec3(v) => self.write_bytes(&slot, 0, bytemuck::cast_slice(v)),
            UniformValue::Vec4(v) => self.write_bytes(&slot, 0, bytemuck::cast_slice(v)),
            UniformValue::Int(v) => self.write_bytes(&slot, 0, bytemuck::bytes_of(v)),
            UniformValue::FloatArray(values) => self.write_array(&slot, values),
        }
        Ok(())
    }

    /// Bulk write of a float array uniform. The whole array is written or
    /// nothing is.
    pub fn write_floats(&mut self, name: &str, data: &[f32]) -> Result<(), UniformError> {
        let slot = self
            .slot(name)
            .ok_or_else(|| UniformError::Unknown(name.to_string()))?
            .clone();

        match slot.format {
            UniformFormat::FloatArray(len) if len == data.len() => {
                self.write_array(&slot, data);
                Ok(())
            }
            UniformFormat::FloatArray(len) => Err(UniformError::LengthMismatch {
                name: name.to_string(),
                expected: len,
                actual: data.len(),
            }),
            other => Err(UniformError::FormatMismatch {
                name: name.to_string(),
                expected: other.to_string(),
                actual: UniformFormat::FloatArray(data.len()).to_string(),
            }),
        }
    }

    /// Decode the current value of a uniform from its buffer.
    pub fn value(&self, name: &str) -> Option<UniformValue> {
        let slot = self.slot(name)?;
        let bytes = &self.buffers[slot.buffer];
        let read_f32 = |offset: u32| -> f32 {
            let start = offset as usize;
            bytemuck::pod_read_unaligned(&bytes[start..start + 4])
        };
        let at = |i: u32| read_f32(slot.offset + i * 4);

        let value = match slot.format {
            UniformFormat::Float => UniformValue::Scalar(at(0)),
            UniformFormat::Vec2 => UniformValue::Vec2([at(0), at(1)]),
            UniformFormat::Vec3 => UniformValue::Vec3([at(0), at(1), at(2)]),
            UniformFormat::Vec4 => UniformValue::Vec4([at(0), at(1), at(2), at(3)]),
            UniformFormat::Int => {
                let start = slot.offset as usize;
                UniformValue::Int(bytemuck::pod_read_unaligned(&bytes[start..start + 4]))
            }
            UniformFormat::FloatArray(len) => UniformValue::FloatArray(
                (0..len as u32)
                    .map(|i| read_f32(slot.offset + i * slot.stride))
                    .collect(),
            ),
        };
        Some(value)
    }

    pub fn buffer(&self, index: usize) -> &[u8] {
        &self.buffers[index]
    }

    /// Indices of buffers changed since the last call.
    pub fn take_dirty(&mut self) -> Vec<usize> {
        let dirty: Vec<usize> = self
            .dirty
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| d.then_some(i))
            .collect();
        self.dirty.iter_mut().for_each(|d| *d = false);
        dirty
    }

    fn write_array(&mut self, slot: &UniformSlot, values: &[f32]) {
        for (i, value) in values.iter().enumerate() {
            self.write_bytes(slot, i as u32 * slot.stride, bytemuck::bytes_of(value));
        }
    }

    fn write_bytes(&mut self, slot: &UniformSlot, relative: u32, bytes: &[u8]) {
        let start = (slot.offset + relative) as usize;
        self.buffers[slot.buffer][start..start + bytes.len()].copy_from_slice(bytes);
        self.dirty[slot.buffer] = true;
    }
}

pub fn padded_size(size: u64) -> u64 {
    size.max(BUFFER_ALIGNMENT).div_ceil(BUFFER_ALIGNMENT) * BUFFER_ALIGNMENT
}

/// A compiled shader program: something that exposes its uniforms.
pub trait ShaderProgram {
    fn uniforms(&self) -> &UniformTable;
    fn uniforms_mut(&mut self) -> &mut UniformTable;
}

/// The graphics boundary: compile a vertex/fragment pair and draw it over
/// the full-screen triangle.
pub trait GraphicsContext {
    type Program: ShaderProgram;

    fn program(&self, vertex_src: &str, fragment_src: &str) -> Result<Self::Program, CompileError>;

    fn draw(&self, program: &mut Self::Program) -> Result<()>;
}
