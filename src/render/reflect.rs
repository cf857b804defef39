//! WGSL validation and uniform reflection.
//!
//! Every `var<uniform>` / `var<storage, read>` global with a binding becomes a
//! GPU buffer. Struct-typed globals expose each member as a named uniform;
//! other globals expose themselves.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{
    AddressSpace, ArraySize, Handle, Module, Scalar, ScalarKind, StorageAccess, Type, TypeInner,
    VectorSize,
};

use crate::error::{CompileError, ShaderStage};
use crate::uniforms::UniformFormat;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Uniform,
    Storage,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BufferBinding {
    pub group: u32,
    pub binding: u32,
    pub kind: BufferKind,
    /// Global variable name in the shader
    pub name: String,
    /// Byte size of the bound type
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformSlot {
    pub name: String,
    pub format: UniformFormat,
    /// Index into [`ShaderReflection::bindings`]
    pub buffer: usize,
    pub offset: u32,
    /// Element stride for arrays, component size otherwise
    pub stride: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShaderReflection {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub bindings: Vec<BufferBinding>,
    pub uniforms: Vec<UniformSlot>,
}

impl ShaderReflection {
    pub fn max_group(&self) -> Option<u32> {
        self.bindings.iter().map(|b| b.group).max()
    }
}

pub fn reflect(vertex_src: &str, fragment_src: &str) -> Result<ShaderReflection, CompileError> {
    let vertex = parse_module(vertex_src, ShaderStage::Vertex)?;
    let fragment = parse_module(fragment_src, ShaderStage::Fragment)?;

    let vertex_entry = entry_point(&vertex, naga::ShaderStage::Vertex)
        .ok_or_else(|| CompileError::new(ShaderStage::Vertex, "no @vertex entry point"))?;
    let fragment_entry = entry_point(&fragment, naga::ShaderStage::Fragment)
        .ok_or_else(|| CompileError::new(ShaderStage::Fragment, "no @fragment entry point"))?;

    let mut reflection = ShaderReflection {
        vertex_entry,
        fragment_entry,
        bindings: Vec::new(),
        uniforms: Vec::new(),
    };
    collect_bindings(&vertex, ShaderStage::Vertex, &mut reflection)?;
    collect_bindings(&fragment, ShaderStage::Fragment, &mut reflection)?;

    Ok(reflection)
}

fn parse_module(source: &str, stage: ShaderStage) -> Result<Module, CompileError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| CompileError::new(stage, e.emit_to_string(source)))?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| CompileError::new(stage, e.emit_to_string(source)))?;

    Ok(module)
}

fn entry_point(module: &Module, stage: naga::ShaderStage) -> Option<String> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage)
        .map(|ep| ep.name.clone())
}

fn collect_bindings(
    module: &Module,
    stage: ShaderStage,
    reflection: &mut ShaderReflection,
) -> Result<(), CompileError> {
    for (_, global) in module.global_variables.iter() {
        let Some(ref resource) = global.binding else {
            continue;
        };

        let kind = match global.space {
            AddressSpace::Uniform => BufferKind::Uniform,
            AddressSpace::Storage { access } if !access.contains(StorageAccess::STORE) => {
                BufferKind::Storage
            }
            AddressSpace::Storage { .. } => {
                return Err(CompileError::new(
                    stage,
                    "writable storage buffers are not supported; use var<storage, read>",
                ))
            }
            AddressSpace::Handle => {
                return Err(CompileError::new(stage, "textures and samplers are not supported"))
            }
            _ => continue,
        };

        let name = global
            .name
            .clone()
            .unwrap_or_else(|| format!("binding_{}_{}", resource.group, resource.binding));

        if is_runtime_sized(module, global.ty) {
            return Err(CompileError::new(
                stage,
                format!("'{}' is runtime-sized; declare a fixed array length", name),
            ));
        }

        let size = u64::from(module.types[global.ty].inner.size(module.to_ctx()));
        let slots = binding_slots(module, &name, global.ty);

        let existing = reflection
            .bindings
            .iter()
            .position(|b| b.group == resource.group && b.binding == resource.binding);
        if let Some(index) = existing {
            let same_layout = reflection.bindings[index].kind == kind
                && reflection.bindings[index].size == size
                && reflection
                    .uniforms
                    .iter()
                    .filter(|u| u.buffer == index)
                    .map(|u| (u.name.as_str(), u.format, u.offset))
                    .eq(slots.iter().map(|(n, f, o, _)| (n.as_str(), *f, *o)));
            if !same_layout {
                return Err(CompileError::new(
                    ShaderStage::Pipeline,
                    format!(
                        "@group({}) @binding({}) is declared differently in the vertex and fragment shaders",
                        resource.group, resource.binding
                    ),
                ));
            }
            continue;
        }

        let index = reflection.bindings.len();
        reflection.bindings.push(BufferBinding {
            group: resource.group,
            binding: resource.binding,
            kind,
            name,
            size,
        });

        for (slot_name, format, offset, stride) in slots {
            if reflection.uniforms.iter().any(|u| u.name == slot_name) {
                return Err(CompileError::new(
                    stage,
                    format!("uniform '{}' is declared in more than one binding", slot_name),
                ));
            }
            reflection.uniforms.push(UniformSlot {
                name: slot_name,
                format,
                buffer: index,
                offset,
                stride,
            });
        }
    }

    Ok(())
}

fn is_runtime_sized(module: &Module, ty: Handle<Type>) -> bool {
    match &module.types[ty].inner {
        TypeInner::Array { size: ArraySize::Dynamic, .. } => true,
        TypeInner::Struct { members, .. } => members
            .last()
            .is_some_and(|m| is_runtime_sized(module, m.ty)),
        _ => false,
    }
}

fn binding_slots(
    module: &Module,
    global_name: &str,
    ty: Handle<Type>,
) -> Vec<(String, UniformFormat, u32, u32)> {
    match &module.types[ty].inner {
        TypeInner::Struct { members, .. } => members
            .iter()
            .filter_map(|member| {
                let name = member.name.clone()?;
                match classify(module, member.ty) {
                    Some((format, stride)) => Some((name, format, member.offset, stride)),
                    None => {
                        log::debug!("Member '{}' has an unsupported type, not exposed", name);
                        None
                    }
                }
            })
            .collect(),
        _ => classify(module, ty)
            .map(|(format, stride)| (global_name.to_string(), format, 0, stride))
            .into_iter()
            .collect(),
    }
}

const F32: Scalar = Scalar {
    kind: ScalarKind::Float,
    width: 4,
};
const I32: Scalar = Scalar {
    kind: ScalarKind::Sint,
    width: 4,
};

fn classify(module: &Module, ty: Handle<Type>) -> Option<(UniformFormat, u32)> {
    match module.types[ty].inner {
        TypeInner::Scalar(scalar) if scalar == F32 => Some((UniformFormat::Float, 4)),
        TypeInner::Scalar(scalar) if scalar == I32 => Some((UniformFormat::Int, 4)),
        TypeInner::Vector { size, scalar } if scalar == F32 => {
            let format = match size {
                VectorSize::Bi => UniformFormat::Vec2,
                VectorSize::Tri => UniformFormat::Vec3,
                VectorSize::Quad => UniformFormat::Vec4,
            };
            Some((format, 4))
        }
        TypeInner::Array {
            base,
            size: ArraySize::Constant(len),
            stride,
        } if matches!(module.types[base].inner, TypeInner::Scalar(s) if s == F32) => {
            Some((UniformFormat::FloatArray(len.get() as usize), stride))
        }
        _ => None,
    }
}
