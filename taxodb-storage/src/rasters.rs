//! Presence/absence raster distributions
//!
//! A raster covers the globe in an equirectangular grid of `columns` pixels
//! along the equator and `columns / 2` rows. Only non-zero pixels are kept,
//! sorted by row then column.

use crate::dependent::{DependentRecord, DependentStore};
use crate::error::StoreError;
use crate::index::extern_index::parse_externs;
use crate::taxonomy::TaxonomyStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use taxodb_core::types::lookup;
use taxodb_core::{ExternId, KeyValue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterSource {
    #[default]
    Unknown,
    Expert,
    Field,
    Literature,
    Model,
}

impl RasterSource {
    pub fn name(&self) -> &'static str {
        match self {
            RasterSource::Unknown => "unknown",
            RasterSource::Expert => "expert",
            RasterSource::Field => "field",
            RasterSource::Literature => "literature",
            RasterSource::Model => "model",
        }
    }

    fn is_unknown(&self) -> bool {
        *self == RasterSource::Unknown
    }
}

impl fmt::Display for RasterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RasterSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "unknown" => Ok(RasterSource::Unknown),
            "expert" => Ok(RasterSource::Expert),
            "field" => Ok(RasterSource::Field),
            "literature" => Ok(RasterSource::Literature),
            "model" => Ok(RasterSource::Model),
            other => Err(format!("unknown raster source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    pub value: u32,
}

impl FromStr for Pixel {
    type Err = String;

    /// `"x,y,value"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, value] = *parts.as_slice() else {
            return Err("expecting \"x,y,value\"".to_string());
        };
        let num = |v: &str| {
            v.parse::<u32>()
                .map_err(|_| format!("bad pixel component {:?}", v))
        };
        Ok(Pixel {
            x: num(x)?,
            y: num(y)?,
            value: num(value)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RasDistro {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub taxon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dataset: String,
    #[serde(default, skip_serializing_if = "RasterSource::is_unknown")]
    pub source: RasterSource,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference: String,
    #[serde(default)]
    pub columns: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pixels: Vec<Pixel>,
    #[serde(default, rename = "extern", skip_serializing_if = "Vec::is_empty")]
    pub externs: Vec<ExternId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl RasDistro {
    pub fn new(taxon: impl Into<String>, columns: u32) -> Self {
        Self {
            taxon: taxon.into(),
            columns,
            ..Default::default()
        }
    }

    pub fn rows(&self) -> u32 {
        self.columns / 2
    }

    /// Value at a cell, 0 when absent
    pub fn value(&self, x: u32, y: u32) -> u32 {
        self.pixels
            .binary_search_by_key(&(y, x), |p| (p.y, p.x))
            .map(|i| self.pixels[i].value)
            .unwrap_or(0)
    }

    /// Set a cell; a zero value clears it
    pub fn set_pixel(&mut self, pixel: Pixel) {
        match self
            .pixels
            .binary_search_by_key(&(pixel.y, pixel.x), |p| (p.y, p.x))
        {
            Ok(i) if pixel.value == 0 => {
                self.pixels.remove(i);
            }
            Ok(i) => self.pixels[i].value = pixel.value,
            Err(_) if pixel.value == 0 => {}
            Err(i) => self.pixels.insert(i, pixel),
        }
    }
}

impl DependentRecord for RasDistro {
    const KIND: &'static str = "raster";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn taxon(&self) -> &str {
        &self.taxon
    }

    fn set_taxon(&mut self, taxon: String) {
        self.taxon = taxon;
    }

    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn set_dataset(&mut self, dataset: String) {
        self.dataset = dataset;
    }

    fn externs(&self) -> &[ExternId] {
        &self.externs
    }

    fn externs_mut(&mut self) -> &mut Vec<ExternId> {
        &mut self.externs
    }

    fn set_field(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        match key {
            "source" => {
                self.source = value
                    .parse()
                    .map_err(|e: String| StoreError::invalid(key, value, e))?
            }
            "reference" => self.reference = value.trim().to_string(),
            "columns" => {
                self.columns = value
                    .trim()
                    .parse()
                    .map_err(|_| StoreError::invalid(key, value, "expecting a pixel count"))?
            }
            "pixel" => {
                let pixel: Pixel = value
                    .parse()
                    .map_err(|e: String| StoreError::invalid(key, value, e))?;
                if pixel.x >= self.columns || pixel.y >= self.rows() {
                    return Err(StoreError::invalid(key, value, "pixel outside the raster"));
                }
                self.set_pixel(pixel);
            }
            "comment" => self.comment = value.to_string(),
            other => return Err(StoreError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let mut raster = RasDistro::default();
        // pixels are bounds-checked against the grid size
        let (size, rest): (Vec<&KeyValue>, Vec<&KeyValue>) =
            pairs.iter().partition(|kv| kv.key == "columns");
        for kv in size.into_iter().chain(rest) {
            match kv.key.as_str() {
                "id" | "extern" => {}
                "taxon" => raster.taxon = kv.value.trim().to_string(),
                "dataset" => raster.dataset = kv.value.trim().to_string(),
                key => raster.set_field(key, &kv.value)?,
            }
        }
        raster.externs = parse_externs(
            pairs
                .iter()
                .filter(|kv| kv.key == "extern")
                .map(|kv| kv.value.as_str()),
        )?;
        Ok(raster)
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.columns == 0 {
            return Err(StoreError::MissingField("columns"));
        }
        if let Some(p) = self
            .pixels
            .iter()
            .find(|p| p.x >= self.columns || p.y >= self.rows())
        {
            return Err(StoreError::invalid(
                "columns",
                &self.columns.to_string(),
                format!("pixel {},{} outside the raster", p.x, p.y),
            ));
        }
        Ok(())
    }
}

pub type RasterStore = DependentStore<RasDistro>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasterQuery {
    pub taxon: Option<String>,
    pub descendants: bool,
    pub dataset: Option<String>,
    pub source: Option<RasterSource>,
    pub columns: Option<u32>,
}

impl RasterQuery {
    pub fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let mut query = RasterQuery::default();
        if let Some(taxon) = lookup(pairs, "parent") {
            query.taxon = Some(taxon.trim().to_string());
            query.descendants = true;
        } else if let Some(taxon) = lookup(pairs, "taxon") {
            query.taxon = Some(taxon.trim().to_string());
        }
        query.dataset = lookup(pairs, "dataset").map(|d| d.trim().to_string());
        query.source = lookup(pairs, "source")
            .map(|s| {
                s.parse::<RasterSource>()
                    .map_err(|e| StoreError::invalid("source", s, e))
            })
            .transpose()?;
        query.columns = lookup(pairs, "columns")
            .map(|c| {
                c.trim()
                    .parse::<u32>()
                    .map_err(|_| StoreError::invalid("columns", c, "expecting a pixel count"))
            })
            .transpose()?;
        Ok(query)
    }

    pub fn matches(&self, raster: &RasDistro) -> bool {
        self.dataset.as_deref().map_or(true, |d| raster.dataset == d)
            && self.source.map_or(true, |s| raster.source == s)
            && self.columns.map_or(true, |c| raster.columns == c)
    }
}

impl DependentStore<RasDistro> {
    pub fn list(
        &self,
        query: &RasterQuery,
        taxonomy: &TaxonomyStore,
    ) -> Result<Vec<RasDistro>, StoreError> {
        let scope = query.taxon.as_deref().map(|t| (t, query.descendants));
        self.select(scope, taxonomy, |r| query.matches(r))
    }
}
