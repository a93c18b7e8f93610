/// Linnean ranks used by the taxonomy
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Taxonomic rank. More inclusive ranks compare smaller; `Unranked` sorts
/// first but never takes part in hierarchy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    #[default]
    Unranked,
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    pub const ALL: [Rank; 8] = [
        Rank::Unranked,
        Rank::Kingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Family,
        Rank::Genus,
        Rank::Species,
    ];

    pub fn is_ranked(&self) -> bool {
        *self != Rank::Unranked
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unranked => "unranked",
            Self::Kingdom => "kingdom",
            Self::Phylum => "phylum",
            Self::Class => "class",
            Self::Order => "order",
            Self::Family => "family",
            Self::Genus => "genus",
            Self::Species => "species",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Rank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "unranked" => Ok(Self::Unranked),
            "kingdom" => Ok(Self::Kingdom),
            "phylum" | "division" => Ok(Self::Phylum),
            "class" => Ok(Self::Class),
            "order" => Ok(Self::Order),
            "family" => Ok(Self::Family),
            "genus" => Ok(Self::Genus),
            "species" => Ok(Self::Species),
            other => Err(format!("unknown rank: {}", other)),
        }
    }
}
