//! PCD frame loading on top of `pcd_rs`.
//!
//! Any layout `pcd_rs` decodes (`ascii` or `binary`) is accepted as long as
//! it has `x`, `y` and `z` fields.  An optional `rgb` (or `rgba`) field
//! becomes the packed point colour; a float colour is reinterpreted
//! bit-for-bit, as PCL writes it.

use std::io::BufRead;
use std::path::Path;

use pcd_rs::{DynReader, DynRecord, Field};
use pickplace_types::{PointCloud, PointXYZRGB};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PcdError {
    #[error("PCD read error: {0}")]
    Read(String),

    #[error("PCD has no `{0}` field")]
    MissingField(&'static str),

    #[error("PCD field `{0}` holds no value")]
    EmptyField(&'static str),
}

fn read_error(e: impl std::fmt::Display) -> PcdError {
    PcdError::Read(e.to_string())
}

/// Positions of the fields used by [`PointXYZRGB`] within a record.
#[derive(Debug, Clone, Copy)]
struct Layout {
    x: usize,
    y: usize,
    z: usize,
    rgb: Option<usize>,
}

impl Layout {
    fn from_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<Self, PcdError> {
        let names: Vec<&str> = names.collect();
        let find = |name: &str| names.iter().position(|n| *n == name);
        Ok(Self {
            x: find("x").ok_or(PcdError::MissingField("x"))?,
            y: find("y").ok_or(PcdError::MissingField("y"))?,
            z: find("z").ok_or(PcdError::MissingField("z"))?,
            rgb: find("rgb").or_else(|| find("rgba")),
        })
    }

    fn point(&self, record: &DynRecord) -> Result<PointXYZRGB, PcdError> {
        let fields = &record.0;
        let coord = |index: usize, name: &'static str| {
            fields.get(index).and_then(scalar).ok_or(PcdError::EmptyField(name))
        };
        let mut point = PointXYZRGB::new(coord(self.x, "x")?, coord(self.y, "y")?, coord(self.z, "z")?);
        if let Some(index) = self.rgb {
            let rgb = fields.get(index).and_then(packed_rgb).ok_or(PcdError::EmptyField("rgb"))?;
            point.rgb = Some(rgb);
        }
        Ok(point)
    }
}

/// First value of a field as `f32`.
fn scalar(field: &Field) -> Option<f32> {
    match field {
        Field::F32(v) => v.first().copied(),
        Field::F64(v) => v.first().map(|x| *x as f32),
        Field::I8(v) => v.first().map(|x| *x as f32),
        Field::I16(v) => v.first().map(|x| *x as f32),
        Field::I32(v) => v.first().map(|x| *x as f32),
        Field::U8(v) => v.first().map(|x| *x as f32),
        Field::U16(v) => v.first().map(|x| *x as f32),
        Field::U32(v) => v.first().map(|x| *x as f32),
    }
}

/// `0x00RRGGBB` from a float-packed or integer colour field.
fn packed_rgb(field: &Field) -> Option<u32> {
    let raw = match field {
        Field::F32(v) => v.first().map(|x| x.to_bits()),
        Field::U32(v) => v.first().copied(),
        Field::I32(v) => v.first().map(|x| *x as u32),
        _ => None,
    }?;
    Some(raw & 0x00FF_FFFF)
}

fn collect<R>(reader: DynReader<R>) -> Result<PointCloud, PcdError>
where
    R: BufRead,
{
    let layout = Layout::from_names(reader.meta().field_defs.iter().map(|def| def.name.as_str()))?;
    let mut points = Vec::new();
    for record in reader {
        points.push(layout.point(&record.map_err(read_error)?)?);
    }
    Ok(PointCloud::new(points))
}

pub fn read_pcd(path: &Path) -> Result<PointCloud, PcdError> {
    collect(DynReader::open(path).map_err(read_error)?)
}

pub fn parse_pcd<R: BufRead>(source: R) -> Result<PointCloud, PcdError> {
    collect(DynReader::from_reader(source).map_err(read_error)?)
}
