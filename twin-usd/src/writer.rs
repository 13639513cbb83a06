//! USDA text export.

use crate::path::SdfPath;
use crate::stage::{Attribute, PrimSpec, Property, Relationship, Stage, Variability};
use crate::value::Value;
use glam::{Vec2, Vec3};
use std::fmt::Write as _;

const INDENT: &str = "    ";

/// Fixed-precision real formatting: six decimals, trailing zeros trimmed,
/// negative zero folded to `0`.
pub fn format_real(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut s = format!("{value:.6}");
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

fn real(value: f32) -> String {
    format_real(value as f64)
}

fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn vec2(v: Vec2) -> String {
    format!("({}, {})", real(v.x), real(v.y))
}

fn vec3(v: Vec3) -> String {
    format!("({}, {}, {})", real(v.x), real(v.y), real(v.z))
}

fn list<T>(items: &[T], f: impl Fn(&T) -> String) -> String {
    format!("[{}]", items.iter().map(f).collect::<Vec<_>>().join(", "))
}

fn value(v: &Value) -> String {
    match v {
        Value::Int(i) => i.to_string(),
        Value::Float(f) => real(*f),
        Value::Double(d) => format_real(*d),
        Value::Token(t) | Value::String(t) => quoted(t),
        Value::Asset(a) => format!("@{a}@"),
        Value::Vec2(v) => vec2(*v),
        Value::Vec3(v) => vec3(*v),
        Value::IntArray(items) => list(items, |i| i.to_string()),
        Value::FloatArray(items) => list(items, |f| real(*f)),
        Value::TokenArray(items) => list(items, |t| quoted(t)),
        Value::Vec2Array(items) => list(items, |v| vec2(*v)),
        Value::Vec3Array(items) => list(items, |v| vec3(*v)),
    }
}

pub(crate) fn write_stage(stage: &Stage) -> String {
    let meta = stage.metadata();
    let mut out = String::from("#usda 1.0\n(\n");
    if let Some(name) = &meta.default_prim {
        let _ = writeln!(out, "{INDENT}defaultPrim = {}", quoted(name));
    }
    if let Some(doc) = &meta.doc {
        let _ = writeln!(out, "{INDENT}doc = {}", quoted(doc));
    }
    if let Some(end) = meta.end_time_code {
        let _ = writeln!(out, "{INDENT}endTimeCode = {}", format_real(end));
    }
    let _ = writeln!(out, "{INDENT}metersPerUnit = {}", format_real(meta.meters_per_unit));
    if let Some(start) = meta.start_time_code {
        let _ = writeln!(out, "{INDENT}startTimeCode = {}", format_real(start));
    }
    let _ = writeln!(
        out,
        "{INDENT}timeCodesPerSecond = {}",
        format_real(meta.time_codes_per_second)
    );
    let _ = writeln!(out, "{INDENT}upAxis = {}", quoted(meta.up_axis.token()));
    out.push_str(")\n");

    for root in stage.root_prims() {
        out.push('\n');
        write_prim(stage, root, 0, &mut out);
    }
    out
}

fn write_prim(stage: &Stage, path: &SdfPath, depth: usize, out: &mut String) {
    let Some(prim) = stage.prim(path) else {
        return;
    };
    let pad = INDENT.repeat(depth);
    let _ = write!(out, "{pad}def {} {}", prim.type_name(), quoted(path.name()));
    write_prim_metadata(prim, &pad, out);
    let _ = writeln!(out, "\n{pad}{{");

    let inner = INDENT.repeat(depth + 1);
    let mut wrote_any = false;
    for property in prim.properties() {
        match property {
            Property::Attribute(attr) => write_attribute(attr, &inner, out),
            Property::Relationship(rel) => write_relationship(rel, &inner, out),
        }
        wrote_any = true;
    }
    for child in prim.children() {
        if wrote_any {
            out.push('\n');
        }
        write_prim(stage, child, depth + 1, out);
        wrote_any = true;
    }
    let _ = writeln!(out, "{pad}}}");
}

fn write_prim_metadata(prim: &PrimSpec, pad: &str, out: &mut String) {
    if prim.api_schemas().is_empty() {
        return;
    }
    out.push_str(" (\n");
    let _ = writeln!(
        out,
        "{pad}{INDENT}prepend apiSchemas = {}",
        list(prim.api_schemas(), |s| quoted(s))
    );
    let _ = write!(out, "{pad})");
}

fn write_attribute(attr: &Attribute, pad: &str, out: &mut String) {
    let uniform = match attr.variability() {
        Variability::Uniform => "uniform ",
        Variability::Varying => "",
    };
    let decl = format!("{uniform}{} {}", attr.value_type().type_name(), attr.name());

    if let Some(source) = attr.connection() {
        let _ = writeln!(out, "{pad}{decl}.connect = <{source}>");
        return;
    }
    if attr.has_time_samples() {
        let _ = writeln!(out, "{pad}{decl}.timeSamples = {{");
        for (time, sample) in attr.time_samples() {
            let _ = writeln!(out, "{pad}{INDENT}{}: {},", format_real(time), value(sample));
        }
        let _ = writeln!(out, "{pad}}}");
        return;
    }
    match attr.default_value() {
        Some(v) => {
            let _ = write!(out, "{pad}{decl} = {}", value(v));
        }
        None => {
            let _ = write!(out, "{pad}{decl}");
        }
    }
    if let Some(interpolation) = attr.interpolation() {
        let _ = write!(
            out,
            " (\n{pad}{INDENT}interpolation = {}\n{pad})",
            quoted(interpolation.token())
        );
    }
    out.push('\n');
}

fn write_relationship(rel: &Relationship, pad: &str, out: &mut String) {
    let targets = match rel.targets() {
        [single] => format!("<{single}>"),
        many => list(many, |t| format!("<{t}>")),
    };
    let _ = writeln!(out, "{pad}rel {} = {}", rel.name(), targets);
}
