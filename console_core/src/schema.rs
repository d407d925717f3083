//! Runtime schema decoder for `.../Records` lines.
//!
//! An Interpretation message announces a comma separated header. The decoder
//! resolves, once per layer, the column of every field the layer's display
//! type consumes and picks how records are placed on the map.

use std::fmt;

use console_proto::DisplayType;
use thiserror::Error;

use crate::geo::{destination, LatLng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Identifier,
    Latitude,
    Longitude,
    OriginLatitude,
    OriginLongitude,
    Range,
    Azimuth,
    Speed,
    Bearing,
    Type,
    Info,
    Intensity,
}

impl Field {
    const COUNT: usize = 12;

    fn slot(self) -> usize {
        self as usize
    }

    /// Header columns are matched by prefix, so `Range_m` resolves `Range`.
    pub fn header_prefix(self) -> &'static str {
        match self {
            Field::Identifier => "Identifier",
            Field::Latitude => "Latitude",
            Field::Longitude => "Longitude",
            Field::OriginLatitude => "Origin_Latitude",
            Field::OriginLongitude => "Origin_Longitude",
            Field::Range => "Range",
            Field::Azimuth => "Azimuth",
            Field::Speed => "Speed",
            Field::Bearing => "Bearing",
            Field::Type => "Type",
            Field::Info => "Info",
            Field::Intensity => "Intensity",
        }
    }

    /// Fields a layer of `display` reads from its records.
    pub fn consumed_by(display: DisplayType) -> &'static [Field] {
        use Field::*;
        match display {
            DisplayType::HeatMap => &[
                Intensity,
                Latitude,
                Longitude,
                OriginLatitude,
                OriginLongitude,
                Range,
                Azimuth,
            ],
            DisplayType::Plot => &[
                Type,
                Latitude,
                Longitude,
                OriginLatitude,
                OriginLongitude,
                Range,
                Azimuth,
            ],
            DisplayType::Strobe => &[
                Identifier,
                Latitude,
                Longitude,
                OriginLatitude,
                OriginLongitude,
                Azimuth,
                Range,
                Type,
            ],
            DisplayType::Track => &[
                Identifier,
                Latitude,
                Longitude,
                OriginLatitude,
                OriginLongitude,
                Azimuth,
                Range,
                Speed,
                Bearing,
                Type,
                Info,
            ],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_prefix())
    }
}

/// How a record's map position is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoMode {
    /// Record carries `Latitude` and `Longitude`.
    Absolute,
    /// Range and azimuth from the origin carried in the record.
    RelativeToDeclaredOrigin,
    /// Range and azimuth from the owning chain's sensor origin.
    RelativeToSensorOrigin,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("record line is empty")]
    Empty,
    #[error("field {0} is not declared in the schema")]
    Undeclared(Field),
    #[error("record has {len} columns, field {field} expects column {index}")]
    Short {
        field: Field,
        index: usize,
        len: usize,
    },
    #[error("field {field} holds {value:?}, expected a number")]
    NotANumber { field: Field, value: String },
    #[error("classification {0} is not declared")]
    UnknownClassification(String),
}

/// Decoded field-index map of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    display: DisplayType,
    indices: [Option<usize>; Field::COUNT],
    geo_mode: GeoMode,
}

impl RecordSchema {
    pub fn decode(header: &str, display: DisplayType) -> Self {
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();
        let mut indices = [None; Field::COUNT];
        for &field in Field::consumed_by(display) {
            indices[field.slot()] = columns
                .iter()
                .position(|column| column.starts_with(field.header_prefix()));
        }

        let has = |field: Field| indices[field.slot()].is_some();
        let geo_mode = if has(Field::Latitude) && has(Field::Longitude) {
            GeoMode::Absolute
        } else if has(Field::OriginLatitude) && has(Field::OriginLongitude) {
            GeoMode::RelativeToDeclaredOrigin
        } else {
            GeoMode::RelativeToSensorOrigin
        };

        Self {
            display,
            indices,
            geo_mode,
        }
    }

    pub fn display(&self) -> DisplayType {
        self.display
    }

    pub fn geo_mode(&self) -> GeoMode {
        self.geo_mode
    }

    /// Column of `field`, `None` when the header does not declare it.
    pub fn index(&self, field: Field) -> Option<usize> {
        self.indices[field.slot()]
    }

    pub fn has(&self, field: Field) -> bool {
        self.index(field).is_some()
    }

    pub fn split<'a>(&self, line: &'a str) -> Result<Record<'a, '_>, RecordError> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return Err(RecordError::Empty);
        }
        Ok(Record {
            schema: self,
            columns: line.split(',').collect(),
        })
    }
}

/// One split record line read through its schema.
#[derive(Debug)]
pub struct Record<'a, 's> {
    schema: &'s RecordSchema,
    columns: Vec<&'a str>,
}

/// Resolved geometry of a record: where it was observed from and where it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub origin: LatLng,
    pub position: LatLng,
}

impl<'a> Record<'a, '_> {
    pub fn text(&self, field: Field) -> Result<&'a str, RecordError> {
        let index = self
            .schema
            .index(field)
            .ok_or(RecordError::Undeclared(field))?;
        self.columns
            .get(index)
            .copied()
            .map(str::trim)
            .ok_or(RecordError::Short {
                field,
                index,
                len: self.columns.len(),
            })
    }

    /// Text with one layer of surrounding double quotes removed.
    pub fn unquoted(&self, field: Field) -> Result<&'a str, RecordError> {
        let raw = self.text(field)?;
        Ok(raw
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(raw))
    }

    pub fn number(&self, field: Field) -> Result<f64, RecordError> {
        let raw = self.text(field)?;
        raw.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| RecordError::NotANumber {
                field,
                value: raw.to_string(),
            })
    }

    pub fn optional_number(&self, field: Field) -> Result<Option<f64>, RecordError> {
        if !self.schema.has(field) {
            return Ok(None);
        }
        self.number(field).map(Some)
    }

    /// Classification index; an undeclared `Type` column means class 0.
    pub fn classification(&self, declared: usize) -> Result<usize, RecordError> {
        if !self.schema.has(Field::Type) {
            return if declared > 0 {
                Ok(0)
            } else {
                Err(RecordError::UnknownClassification("0".to_string()))
            };
        }
        let raw = self.text(Field::Type)?;
        match raw.parse::<usize>() {
            Ok(class) if class < declared => Ok(class),
            _ => Err(RecordError::UnknownClassification(raw.to_string())),
        }
    }

    /// Resolve the record's geometry according to the schema's [`GeoMode`].
    pub fn placement(&self, sensor_origin: LatLng) -> Result<Placement, RecordError> {
        match self.schema.geo_mode() {
            GeoMode::Absolute => {
                let position =
                    LatLng::new(self.number(Field::Latitude)?, self.number(Field::Longitude)?);
                let origin = if self.schema.has(Field::OriginLatitude)
                    && self.schema.has(Field::OriginLongitude)
                {
                    LatLng::new(
                        self.number(Field::OriginLatitude)?,
                        self.number(Field::OriginLongitude)?,
                    )
                } else {
                    sensor_origin
                };
                Ok(Placement { origin, position })
            }
            GeoMode::RelativeToDeclaredOrigin => {
                let origin = LatLng::new(
                    self.number(Field::OriginLatitude)?,
                    self.number(Field::OriginLongitude)?,
                );
                self.project(origin)
            }
            GeoMode::RelativeToSensorOrigin => self.project(sensor_origin),
        }
    }

    fn project(&self, origin: LatLng) -> Result<Placement, RecordError> {
        let azimuth = self.number(Field::Azimuth)?;
        let range = self.number(Field::Range)?;
        Ok(Placement {
            origin,
            position: destination(origin, azimuth, range),
        })
    }
}
