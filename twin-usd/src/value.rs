//! Attribute value types.

use glam::{Vec2, Vec3};

/// Declared type of an attribute, as spelled in USDA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Float,
    Double,
    Token,
    String,
    Asset,
    Float2,
    Float3,
    Color3f,
    Point3f,
    Normal3f,
    IntArray,
    FloatArray,
    TokenArray,
    Float3Array,
    Color3fArray,
    Point3fArray,
    Normal3fArray,
    TexCoord2fArray,
}

impl ValueType {
    pub fn type_name(self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Token => "token",
            ValueType::String => "string",
            ValueType::Asset => "asset",
            ValueType::Float2 => "float2",
            ValueType::Float3 => "float3",
            ValueType::Color3f => "color3f",
            ValueType::Point3f => "point3f",
            ValueType::Normal3f => "normal3f",
            ValueType::IntArray => "int[]",
            ValueType::FloatArray => "float[]",
            ValueType::TokenArray => "token[]",
            ValueType::Float3Array => "float3[]",
            ValueType::Color3fArray => "color3f[]",
            ValueType::Point3fArray => "point3f[]",
            ValueType::Normal3fArray => "normal3f[]",
            ValueType::TexCoord2fArray => "texCoord2f[]",
        }
    }

    /// Whether `value` can be stored in an attribute of this type.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueType::Int, Value::Int(_))
                | (ValueType::Float, Value::Float(_))
                | (ValueType::Double, Value::Double(_))
                | (ValueType::Token, Value::Token(_))
                | (ValueType::String, Value::String(_))
                | (ValueType::Asset, Value::Asset(_))
                | (ValueType::Float2, Value::Vec2(_))
                | (
                    ValueType::Float3 | ValueType::Color3f | ValueType::Point3f | ValueType::Normal3f,
                    Value::Vec3(_)
                )
                | (ValueType::IntArray, Value::IntArray(_))
                | (ValueType::FloatArray, Value::FloatArray(_))
                | (ValueType::TokenArray, Value::TokenArray(_))
                | (ValueType::TexCoord2fArray, Value::Vec2Array(_))
                | (
                    ValueType::Float3Array
                        | ValueType::Color3fArray
                        | ValueType::Point3fArray
                        | ValueType::Normal3fArray,
                    Value::Vec3Array(_)
                )
        )
    }
}

/// A concrete attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Double(f64),
    Token(String),
    String(String),
    Asset(String),
    Vec2(Vec2),
    Vec3(Vec3),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    TokenArray(Vec<String>),
    Vec2Array(Vec<Vec2>),
    Vec3Array(Vec<Vec3>),
}

impl Value {
    pub fn token(token: impl Into<String>) -> Self {
        Value::Token(token.into())
    }

    pub fn asset(path: impl Into<String>) -> Self {
        Value::Asset(path.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Token(_) => "token",
            Value::String(_) => "string",
            Value::Asset(_) => "asset",
            Value::Vec2(_) => "vec2",
            Value::Vec3(_) => "vec3",
            Value::IntArray(_) => "int array",
            Value::FloatArray(_) => "float array",
            Value::TokenArray(_) => "token array",
            Value::Vec2Array(_) => "vec2 array",
            Value::Vec3Array(_) => "vec3 array",
        }
    }
}
