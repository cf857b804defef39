use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Shape of a shader uniform. Serialized with the short tags used in
/// project files ("1f", "3f", "1i", "512f[]").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UniformFormat {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    FloatArray(usize),
}

impl UniformFormat {
    /// Number of scalar components.
    pub fn components(&self) -> usize {
        match self {
            UniformFormat::Float | UniformFormat::Int => 1,
            UniformFormat::Vec2 => 2,
            UniformFormat::Vec3 => 3,
            UniformFormat::Vec4 => 4,
            UniformFormat::FloatArray(len) => *len,
        }
    }

    pub fn default_value(&self) -> UniformValue {
        match self {
            UniformFormat::Float => UniformValue::Scalar(0.0),
            UniformFormat::Vec2 => UniformValue::Vec2([0.0; 2]),
            UniformFormat::Vec3 => UniformValue::Vec3([0.0; 3]),
            UniformFormat::Vec4 => UniformValue::Vec4([0.0; 4]),
            UniformFormat::Int => UniformValue::Int(0),
            UniformFormat::FloatArray(len) => UniformValue::FloatArray(vec![0.0; *len]),
        }
    }
}

impl fmt::Display for UniformFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformFormat::Float => f.write_str("1f"),
            UniformFormat::Vec2 => f.write_str("2f"),
            UniformFormat::Vec3 => f.write_str("3f"),
            UniformFormat::Vec4 => f.write_str("4f"),
            UniformFormat::Int => f.write_str("1i"),
            UniformFormat::FloatArray(len) => write!(f, "{}f[]", len),
        }
    }
}

impl FromStr for UniformFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1f" => Ok(UniformFormat::Float),
            "2f" => Ok(UniformFormat::Vec2),
            "3f" => Ok(UniformFormat::Vec3),
            "4f" => Ok(UniformFormat::Vec4),
            "1i" => Ok(UniformFormat::Int),
            other => other
                .strip_suffix("f[]")
                .and_then(|len| len.parse().ok())
                .map(UniformFormat::FloatArray)
                .ok_or_else(|| format!("unknown uniform format '{}'", other)),
        }
    }
}

impl TryFrom<String> for UniformFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UniformFormat> for String {
    fn from(format: UniformFormat) -> Self {
        format.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniformValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    FloatArray(Vec<f32>),
}

impl UniformValue {
    pub fn format(&self) -> UniformFormat {
        match self {
            UniformValue::Scalar(_) => UniformFormat::Float,
            UniformValue::Vec2(_) => UniformFormat::Vec2,
            UniformValue::Vec3(_) => UniformFormat::Vec3,
            UniformValue::Vec4(_) => UniformFormat::Vec4,
            UniformValue::Int(_) => UniformFormat::Int,
            UniformValue::FloatArray(values) => UniformFormat::FloatArray(values.len()),
        }
    }

    pub fn matches(&self, format: UniformFormat) -> bool {
        self.format() == format
    }

    /// Build a value of `format` from plain components, as typed on the
    /// command line. Returns `None` when the count does not fit the shape.
    pub fn from_components(format: UniformFormat, components: &[f32]) -> Option<Self> {
        if components.len() != format.components() {
            return None;
        }
        let value = match format {
            UniformFormat::Float => UniformValue::Scalar(components[0]),
            UniformFormat::Vec2 => UniformValue::Vec2([components[0], components[1]]),
            UniformFormat::Vec3 => {
                UniformValue::Vec3([components[0], components[1], components[2]])
            }
            UniformFormat::Vec4 => UniformValue::Vec4([
                components[0],
                components[1],
                components[2],
                components[3],
            ]),
            UniformFormat::Int => UniformValue::Int(components[0].round() as i32),
            UniformFormat::FloatArray(_) => UniformValue::FloatArray(components.to_vec()),
        };
        Some(value)
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformValue::Scalar(v) => write!(f, "{}", v),
            UniformValue::Vec2(v) => write!(f, "{:?}", v),
            UniformValue::Vec3(v) => write!(f, "{:?}", v),
            UniformValue::Vec4(v) => write!(f, "{:?}", v),
            UniformValue::Int(v) => write!(f, "{}", v),
            UniformValue::FloatArray(v) => write!(f, "[{} floats]", v.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tags_parse_back() {
        for format in [
            UniformFormat::Float,
            UniformFormat::Vec2,
            UniformFormat::Vec3,
            UniformFormat::Vec4,
            UniformFormat::Int,
            UniformFormat::FloatArray(512),
        ] {
            assert_eq!(format.to_string().parse::<UniformFormat>(), Ok(format));
        }
        assert!("5f".parse::<UniformFormat>().is_err());
        assert!("xf[]".parse::<UniformFormat>().is_err());
    }

    #[test]
    fn default_value_matches_format() {
        let format = UniformFormat::FloatArray(8);
        let value = format.default_value();
        assert!(value.matches(format));
        assert_eq!(value, UniformValue::FloatArray(vec![0.0; 8]));
        assert_eq!(UniformFormat::Vec3.default_value(), UniformValue::Vec3([0.0; 3]));
    }

    #[test]
    fn from_components_checks_shape() {
        assert_eq!(
            UniformValue::from_components(UniformFormat::Vec2, &[0.5, 1.0]),
            Some(UniformValue::Vec2([0.5, 1.0]))
        );
        assert_eq!(
            UniformValue::from_components(UniformFormat::Int, &[2.6]),
            Some(UniformValue::Int(3))
        );
        assert_eq!(UniformValue::from_components(UniformFormat::Vec3, &[1.0]), None);
    }

    #[test]
    fn format_serializes_as_tag() {
        let json = serde_json::to_string(&UniformFormat::Vec4).unwrap();
        assert_eq!(json, "\"4f\"");
        let parsed: UniformFormat = serde_json::from_str("\"16f[]\"").unwrap();
        assert_eq!(parsed, UniformFormat::FloatArray(16));
    }
}
