/// External-service identifiers (`service:id`)
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An alias binding a local record to an id in an external service,
/// e.g. `gbif:5219173`. The service part is stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternId {
    service: String,
    id: String,
}

impl ExternId {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parse a `service:id` value where the id may be empty. An empty id is
    /// how a `Set` request asks for the service's alias to be removed.
    pub fn parse_edit(s: &str) -> Result<(String, Option<String>), String> {
        let (service, id) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid extern id {:?}: expected service:id", s))?;
        let service = service.trim().to_lowercase();
        if service.is_empty() {
            return Err(format!("invalid extern id {:?}: empty service", s));
        }
        let id = id.trim();
        Ok((service, (!id.is_empty()).then(|| id.to_string())))
    }

    /// True when the string looks like an alias rather than a numeric id
    pub fn is_alias(s: &str) -> bool {
        s.contains(':')
    }
}

impl FromStr for ExternId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::parse_edit(s)? {
            (service, Some(id)) => Ok(Self { service, id }),
            (_, None) => Err(format!("invalid extern id {:?}: empty id", s)),
        }
    }
}

impl TryFrom<String> for ExternId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExternId> for String {
    fn from(value: ExternId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ExternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extern() {
        let ext: ExternId = "GBIF:5219173".parse().unwrap();
        assert_eq!(ext.service(), "gbif");
        assert_eq!(ext.id(), "5219173");
        assert_eq!(ext.to_string(), "gbif:5219173");
    }

    #[test]
    fn test_invalid_extern() {
        assert!("5219173".parse::<ExternId>().is_err());
        assert!(":12".parse::<ExternId>().is_err());
        assert!("gbif:".parse::<ExternId>().is_err());
    }

    #[test]
    fn test_parse_edit_removal() {
        assert_eq!(
            ExternId::parse_edit("ncbi:").unwrap(),
            ("ncbi".to_string(), None)
        );
    }

    #[test]
    fn test_serde_as_string() {
        let ext: ExternId = "inat:48484".parse().unwrap();
        let json = serde_json::to_string(&ext).unwrap();
        assert_eq!(json, "\"inat:48484\"");
        let back: ExternId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ext);
    }
}
