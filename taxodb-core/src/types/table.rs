/// Table names understood by the wire protocol
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Taxonomy,
    Specimens,
    Datasets,
    #[serde(rename = "rasdistros")]
    RasDistros,
    Trees,
    Nodes,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Taxonomy,
        Table::Specimens,
        Table::Datasets,
        Table::RasDistros,
        Table::Trees,
        Table::Nodes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Taxonomy => "taxonomy",
            Self::Specimens => "specimens",
            Self::Datasets => "datasets",
            Self::RasDistros => "rasdistros",
            Self::Trees => "trees",
            Self::Nodes => "nodes",
        }
    }

    /// Name of the file the table is persisted to
    pub fn file_name(&self) -> String {
        format!("{}.jsonl", self.name())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown table: {}", s))
    }
}
