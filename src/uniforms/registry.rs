use serde::{Deserialize, Serialize};

use super::value::{UniformFormat, UniformValue};
use crate::error::UniformError;

pub const TIME_UNIFORM: &str = "rTime";
pub const FRAME_TIME_UNIFORM: &str = "rFrameTime";
pub const AUDIO_RMS_UNIFORM: &str = "rAudioRMS";
pub const AUDIO_SPECTRUM_UNIFORM: &str = "rAudioFFT";

/// Uniforms fed by the engine every frame; never user-editable.
pub const RESERVED_UNIFORMS: [&str; 4] = [
    TIME_UNIFORM,
    FRAME_TIME_UNIFORM,
    AUDIO_RMS_UNIFORM,
    AUDIO_SPECTRUM_UNIFORM,
];

pub const DEFAULT_MIN_VALUE: f32 = 0.0;
pub const DEFAULT_MAX_VALUE: f32 = 1.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformDescriptor {
    pub name: String,
    pub format: UniformFormat,
    pub value: UniformValue,
    /// Slider bounds chosen by the user
    pub min_value: f32,
    pub max_value: f32,
}

impl UniformDescriptor {
    /// Descriptor as first seen in a shader: zero value, default range.
    pub fn new(name: impl Into<String>, format: UniformFormat) -> Self {
        Self {
            name: name.into(),
            format,
            value: format.default_value(),
            min_value: DEFAULT_MIN_VALUE,
            max_value: DEFAULT_MAX_VALUE,
        }
    }
}

/// Merge a freshly reflected uniform list with the previous one by name.
///
/// Output follows `new_uniforms` order and drops reserved names. A uniform
/// seen before keeps its value and range; if its declared format changed the
/// value is reset to the new default (the range is kept). Unseen uniforms get
/// the reflected value and the default 0..1 range.
pub fn reconcile(
    new_uniforms: &[UniformDescriptor],
    previous: &[UniformDescriptor],
    reserved_names: &[&str],
) -> Vec<UniformDescriptor> {
    let mut fields: Vec<UniformDescriptor> = Vec::with_capacity(new_uniforms.len());

    for uniform in new_uniforms {
        if reserved_names.contains(&uniform.name.as_str()) {
            continue;
        }
        if fields.iter().any(|f| f.name == uniform.name) {
            continue;
        }

        let field = match previous.iter().find(|p| p.name == uniform.name) {
            Some(prev) => {
                let value = if prev.format == uniform.format && prev.value.matches(uniform.format) {
                    prev.value.clone()
                } else {
                    log::debug!(
                        "Uniform '{}' changed format {} -> {}, resetting value",
                        uniform.name,
                        prev.format,
                        uniform.format
                    );
                    uniform.format.default_value()
                };
                UniformDescriptor {
                    name: uniform.name.clone(),
                    format: uniform.format,
                    value,
                    min_value: prev.min_value,
                    max_value: prev.max_value,
                }
            }
            None => UniformDescriptor {
                name: uniform.name.clone(),
                format: uniform.format,
                value: uniform.value.clone(),
                min_value: DEFAULT_MIN_VALUE,
                max_value: DEFAULT_MAX_VALUE,
            },
        };
        fields.push(field);
    }

    fields
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_UNIFORMS.contains(&name)
}

/// The user-editable uniform fields of a project.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniformRegistry {
    fields: Vec<UniformDescriptor>,
}

impl UniformRegistry {
    pub fn new(fields: Vec<UniformDescriptor>) -> Self {
        // reconciling against itself drops reserved and duplicate names
        let fields = reconcile(&fields, &fields, &RESERVED_UNIFORMS);
        Self { fields }
    }

    pub fn fields(&self) -> &[UniformDescriptor] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&UniformDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Replace the field set with the uniforms of a newly compiled program.
    pub fn apply_reflection(&mut self, reflected: &[UniformDescriptor]) {
        self.fields = reconcile(reflected, &self.fields, &RESERVED_UNIFORMS);
        log::debug!("Uniform registry now holds {} fields", self.fields.len());
    }

    pub fn set_value(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        let field = self.field_mut(name)?;
        if !value.matches(field.format) {
            return Err(UniformError::FormatMismatch {
                name: name.to_string(),
                expected: field.format.to_string(),
                actual: value.format().to_string(),
            });
        }
        field.value = value;
        Ok(())
    }

    pub fn set_range(&mut self, name: &str, min: f32, max: f32) -> Result<(), UniformError> {
        if min > max {
            return Err(UniformError::InvalidRange {
                name: name.to_string(),
                min,
                max,
            });
        }
        let field = self.field_mut(name)?;
        field.min_value = min;
        field.max_value = max;
        Ok(())
    }

    fn field_mut(&mut self, name: &str) -> Result<&mut UniformDescriptor, UniformError> {
        if is_reserved(name) {
            return Err(UniformError::Reserved(name.to_string()));
        }
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| UniformError::Unknown(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value: f32, min: f32, max: f32) -> UniformDescriptor {
        UniformDescriptor {
            name: name.to_string(),
            format: UniformFormat::Float,
            value: UniformValue::Scalar(value),
            min_value: min,
            max_value: max,
        }
    }

    #[test]
    fn reconcile_preserves_value_and_range() {
        let previous = vec![field("a", 0.7, 0.1, 0.9)];
        let reflected = vec![UniformDescriptor::new("a", UniformFormat::Float)];

        let fields = reconcile(&reflected, &previous, &RESERVED_UNIFORMS);
        assert_eq!(fields, vec![field("a", 0.7, 0.1, 0.9)]);
    }

    #[test]
    fn reconcile_unknown_name_gets_defaults() {
        let reflected = vec![UniformDescriptor::new("b", UniformFormat::Float)];
        let fields = reconcile(&reflected, &[], &RESERVED_UNIFORMS);

        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].value, UniformValue::Scalar(0.0));
        assert_eq!(fields[0].min_value, 0.0);
        assert_eq!(fields[0].max_value, 1.0);
    }

    #[test]
    fn reconcile_never_exposes_reserved_names() {
        let previous: Vec<_> = RESERVED_UNIFORMS
            .iter()
            .map(|name| field(name, 0.5, -1.0, 2.0))
            .collect();
        let mut reflected: Vec<_> = RESERVED_UNIFORMS
            .iter()
            .map(|name| UniformDescriptor::new(*name, UniformFormat::Float))
            .collect();
        reflected.push(UniformDescriptor::new("uUser", UniformFormat::Float));

        let fields = reconcile(&reflected, &previous, &RESERVED_UNIFORMS);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "uUser");
    }

    #[test]
    fn reconcile_follows_new_declaration_order() {
        let previous = vec![field("z", 0.2, 0.0, 1.0), field("a", 0.3, 0.0, 1.0)];
        let reflected = vec![
            UniformDescriptor::new("a", UniformFormat::Float),
            UniformDescriptor::new("m", UniformFormat::Vec2),
            UniformDescriptor::new("z", UniformFormat::Float),
        ];

        let names: Vec<_> = reconcile(&reflected, &previous, &RESERVED_UNIFORMS)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a", "m", "z"]);
    }

    #[test]
    fn reconcile_drops_names_missing_from_new_program() {
        let previous = vec![field("gone", 0.4, 0.0, 1.0)];
        let reflected = vec![UniformDescriptor::new("kept", UniformFormat::Float)];
        let fields = reconcile(&reflected, &previous, &RESERVED_UNIFORMS);
        assert!(fields.iter().all(|f| f.name != "gone"));
    }

    #[test]
    fn reconcile_resets_value_on_format_change() {
        let previous = vec![field("tint", 0.8, -2.0, 2.0)];
        let reflected = vec![UniformDescriptor::new("tint", UniformFormat::Vec3)];

        let fields = reconcile(&reflected, &previous, &RESERVED_UNIFORMS);
        assert_eq!(fields[0].format, UniformFormat::Vec3);
        assert_eq!(fields[0].value, UniformValue::Vec3([0.0; 3]));
        assert_eq!(fields[0].min_value, -2.0);
        assert_eq!(fields[0].max_value, 2.0);
    }

    #[test]
    fn reconcile_keeps_first_of_duplicate_names() {
        let reflected = vec![
            UniformDescriptor::new("dup", UniformFormat::Float),
            UniformDescriptor::new("dup", UniformFormat::Vec4),
        ];
        let fields = reconcile(&reflected, &[], &RESERVED_UNIFORMS);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].format, UniformFormat::Float);
    }

    #[test]
    fn registry_survives_recompile_cycle() {
        let mut registry = UniformRegistry::default();
        registry.apply_reflection(&[
            UniformDescriptor::new(TIME_UNIFORM, UniformFormat::Float),
            UniformDescriptor::new("uTimeScale", UniformFormat::Float),
        ]);
        assert_eq!(registry.fields().len(), 1);

        registry.set_value("uTimeScale", UniformValue::Scalar(2.5)).unwrap();
        registry.set_range("uTimeScale", 0.0, 5.0).unwrap();

        registry.apply_reflection(&[
            UniformDescriptor::new("uTimeScale", UniformFormat::Float),
            UniformDescriptor::new("uGlow", UniformFormat::Float),
        ]);
        let scale = registry.get("uTimeScale").unwrap();
        assert_eq!(scale.value, UniformValue::Scalar(2.5));
        assert_eq!(scale.max_value, 5.0);
        assert_eq!(registry.get("uGlow").unwrap().max_value, 1.0);
    }

    #[test]
    fn registry_rejects_bad_edits() {
        let mut registry = UniformRegistry::new(vec![field("a", 0.0, 0.0, 1.0)]);

        assert_eq!(
            registry.set_value(TIME_UNIFORM, UniformValue::Scalar(1.0)),
            Err(UniformError::Reserved(TIME_UNIFORM.to_string()))
        );
        assert_eq!(
            registry.set_value("missing", UniformValue::Scalar(1.0)),
            Err(UniformError::Unknown("missing".to_string()))
        );
        assert!(matches!(
            registry.set_value("a", UniformValue::Vec2([1.0, 2.0])),
            Err(UniformError::FormatMismatch { .. })
        ));
        assert!(matches!(
            registry.set_range("a", 2.0, 1.0),
            Err(UniformError::InvalidRange { .. })
        ));
        assert_eq!(registry.get("a").unwrap().value, UniformValue::Scalar(0.0));
    }

    #[test]
    fn registry_new_filters_reserved_fields() {
        let registry = UniformRegistry::new(vec![
            field(AUDIO_RMS_UNIFORM, 0.1, 0.0, 1.0),
            field("uSpeed", 0.4, 0.0, 3.0),
        ]);
        assert_eq!(registry.fields(), &[field("uSpeed", 0.4, 0.0, 3.0)]);
    }
}
