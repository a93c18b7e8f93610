/// Specimen records: collection metadata, geography and georeference
use crate::dependent::{DependentRecord, DependentStore};
use crate::error::StoreError;
use crate::index::extern_index::parse_externs;
use crate::taxonomy::TaxonomyStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use taxodb_core::types::lookup;
use taxodb_core::{ExternId, KeyValue};

/// Basis of record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    #[default]
    Unknown,
    Preserved,
    Fossil,
    Observation,
    Machine,
}

impl Basis {
    pub fn name(&self) -> &'static str {
        match self {
            Basis::Unknown => "unknown",
            Basis::Preserved => "preserved",
            Basis::Fossil => "fossil",
            Basis::Observation => "observation",
            Basis::Machine => "machine",
        }
    }

    fn is_unknown(&self) -> bool {
        *self == Basis::Unknown
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Basis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "unknown" => Ok(Basis::Unknown),
            "preserved" => Ok(Basis::Preserved),
            "fossil" => Ok(Basis::Fossil),
            "observation" => Ok(Basis::Observation),
            "machine" => Ok(Basis::Machine),
            other => Err(format!("unknown basis of record: {}", other)),
        }
    }
}

/// A point georeference in decimal degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Georef {
    pub lat: f64,
    pub lon: f64,
    /// Radius in meters; 0 when unknown
    #[serde(default, skip_serializing_if = "is_zero")]
    pub uncertainty: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Georef {
    /// Parse `"lat,lon"`
    pub fn parse_point(value: &str) -> Result<(f64, f64), String> {
        let (lat, lon) = value
            .split_once(',')
            .ok_or_else(|| "expecting \"lat,lon\"".to_string())?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| format!("bad latitude {:?}", lat.trim()))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| format!("bad longitude {:?}", lon.trim()))?;
        if !(-90.0..=90.0).contains(&lat) {
            return Err(format!("latitude {} out of range", lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(format!("longitude {} out of range", lon));
        }
        Ok((lat, lon))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Specimen {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub taxon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dataset: String,
    #[serde(default, skip_serializing_if = "Basis::is_unknown")]
    pub basis: Basis,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub catalog: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collector: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub determiner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub county: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub locality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub georef: Option<Georef>,
    #[serde(default, rename = "extern", skip_serializing_if = "Vec::is_empty")]
    pub externs: Vec<ExternId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl Specimen {
    pub fn new(taxon: impl Into<String>) -> Self {
        Self {
            taxon: taxon.into(),
            ..Default::default()
        }
    }

    fn georef_mut(&mut self, key: &str, value: &str) -> Result<&mut Georef, StoreError> {
        self.georef
            .as_mut()
            .ok_or_else(|| StoreError::invalid(key, value, "specimen without georeference"))
    }
}

fn parse_date(value: &str) -> Result<String, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|e| StoreError::invalid("date", value, e.to_string()))
}

fn parse_country(value: &str) -> Result<String, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }
    if value.len() != 2 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(StoreError::invalid("country", value, "expecting a two-letter code"));
    }
    Ok(value.to_ascii_uppercase())
}

impl DependentRecord for Specimen {
    const KIND: &'static str = "specimen";

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
            "basis" => {
                self.basis = value
                    .parse()
                    .map_err(|e: String| StoreError::invalid(key, value, e))?
            }
            "catalog" => self.catalog = value.trim().to_string(),
            "collector" => self.collector = value.trim().to_string(),
            "date" => self.date = parse_date(value)?,
            "determiner" => self.determiner = value.trim().to_string(),
            "country" => self.country = parse_country(value)?,
            "state" => self.state = value.trim().to_string(),
            "county" => self.county = value.trim().to_string(),
            "locality" => self.locality = value.trim().to_string(),
            "latlon" => {
                if value.trim().is_empty() {
                    self.georef = None;
                } else {
                    let (lat, lon) =
                        Georef::parse_point(value).map_err(|e| StoreError::invalid(key, value, e))?;
                    match self.georef.as_mut() {
                        Some(georef) => {
                            georef.lat = lat;
                            georef.lon = lon;
                        }
                        None => {
                            self.georef = Some(Georef {
                                lat,
                                lon,
                                uncertainty: 0,
                                source: String::new(),
                            })
                        }
                    }
                }
            }
            "uncertainty" => {
                let meters: u32 = value
                    .trim()
                    .parse()
                    .map_err(|_| StoreError::invalid(key, value, "expecting meters"))?;
                self.georef_mut(key, value)?.uncertainty = meters;
            }
            "georef-source" => self.georef_mut(key, value)?.source = value.trim().to_string(),
            "comment" => self.comment = value.to_string(),
            other => return Err(StoreError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let mut specimen = Specimen::default();
        // the point goes first so uncertainty and source have a georef
        let (points, rest): (Vec<&KeyValue>, Vec<&KeyValue>) =
            pairs.iter().partition(|kv| kv.key == "latlon");
        for kv in points.into_iter().chain(rest) {
            match kv.key.as_str() {
                "id" | "extern" => {}
                "taxon" => specimen.taxon = kv.value.trim().to_string(),
                "dataset" => specimen.dataset = kv.value.trim().to_string(),
                key => specimen.set_field(key, &kv.value)?,
            }
        }
        specimen.externs = parse_externs(
            pairs
                .iter()
                .filter(|kv| kv.key == "extern")
                .map(|kv| kv.value.as_str()),
        )?;
        Ok(specimen)
    }
}

pub type SpecimenStore = DependentStore<Specimen>;

/// List filter for specimens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecimenQuery {
    pub taxon: Option<String>,
    /// Include the descendants of `taxon`
    pub descendants: bool,
    pub dataset: Option<String>,
    pub georef: Option<bool>,
    pub country: Option<String>,
}

impl SpecimenQuery {
    pub fn from_pairs(pairs: &[KeyValue]) -> Result<Self, StoreError> {
        let mut query = SpecimenQuery::default();
        if let Some(taxon) = lookup(pairs, "parent") {
            query.taxon = Some(taxon.trim().to_string());
            query.descendants = true;
        } else if let Some(taxon) = lookup(pairs, "taxon") {
            query.taxon = Some(taxon.trim().to_string());
        }
        query.dataset = lookup(pairs, "dataset").map(|d| d.trim().to_string());
        query.georef = lookup(pairs, "georef")
            .map(|v| {
                v.trim()
                    .parse::<bool>()
                    .map_err(|_| StoreError::invalid("georef", v, "expecting true or false"))
            })
            .transpose()?;
        query.country = lookup(pairs, "country").map(parse_country).transpose()?;
        Ok(query)
    }

    pub fn matches(&self, specimen: &Specimen) -> bool {
        self.dataset.as_deref().map_or(true, |d| specimen.dataset == d)
            && self.georef.map_or(true, |g| specimen.georef.is_some() == g)
            && self.country.as_deref().map_or(true, |c| specimen.country == c)
    }
}

impl DependentStore<Specimen> {
    pub fn list(
        &self,
        query: &SpecimenQuery,
        taxonomy: &TaxonomyStore,
    ) -> Result<Vec<Specimen>, StoreError> {
        let scope = query.taxon.as_deref().map(|t| (t, query.descendants));
        self.select(scope, taxonomy, |s| query.matches(s))
    }
}
