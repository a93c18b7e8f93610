/// `service:id` alias -> local record id
use crate::error::StoreError;
use std::collections::HashMap;
use taxodb_core::ExternId;

#[derive(Debug, Default, Clone)]
pub struct ExternIndex {
    aliases: HashMap<ExternId, String>,
}

impl ExternIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local id bound to an alias string such as `gbif:5219173`
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        let ext: ExternId = alias.parse().ok()?;
        self.aliases.get(&ext).map(String::as_str)
    }

    /// Check that a fresh record may claim all of `aliases`: at most one
    /// alias per service and none already bound elsewhere
    pub fn check_new(&self, aliases: &[ExternId]) -> Result<(), StoreError> {
        for (i, ext) in aliases.iter().enumerate() {
            if aliases[..i].iter().any(|e| e.service() == ext.service()) {
                return Err(StoreError::invalid(
                    "extern",
                    &ext.to_string(),
                    format!("service {} given twice", ext.service()),
                ));
            }
            if let Some(owner) = self.aliases.get(ext) {
                return Err(StoreError::DuplicateExtern {
                    alias: ext.to_string(),
                    owner: owner.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn bind(&mut self, owner: &str, aliases: &[ExternId]) {
        for ext in aliases {
            self.aliases.insert(ext.clone(), owner.to_string());
        }
    }

    pub fn unbind(&mut self, aliases: &[ExternId]) {
        for ext in aliases {
            self.aliases.remove(ext);
        }
    }

    /// Apply a `service:id` edit to the alias list of `owner`. A new id
    /// replaces the service's previous alias, an empty id removes it.
    pub fn edit(
        &mut self,
        owner: &str,
        aliases: &mut Vec<ExternId>,
        value: &str,
    ) -> Result<(), StoreError> {
        let (service, id) =
            ExternId::parse_edit(value).map_err(|e| StoreError::invalid("extern", value, e))?;

        let replacement = match id {
            Some(id) => {
                let ext: ExternId = format!("{}:{}", service, id)
                    .parse()
                    .map_err(|e: String| StoreError::invalid("extern", value, e))?;
                if let Some(current) = self.aliases.get(&ext) {
                    if current != owner {
                        return Err(StoreError::DuplicateExtern {
                            alias: ext.to_string(),
                            owner: current.clone(),
                        });
                    }
                }
                Some(ext)
            }
            None => None,
        };

        if let Some(pos) = aliases.iter().position(|e| e.service() == service) {
            let old = aliases.remove(pos);
            self.aliases.remove(&old);
        }
        if let Some(ext) = replacement {
            self.aliases.insert(ext.clone(), owner.to_string());
            aliases.push(ext);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Parse every `extern` value of an add request
pub fn parse_externs<'a>(
    values: impl Iterator<Item = &'a str>,
) -> Result<Vec<ExternId>, StoreError> {
    values
        .map(|v| v.parse().map_err(|e: String| StoreError::invalid("extern", v, e)))
        .collect()
}

/// Drop aliases that collide with already bound ones (used while loading)
pub fn retain_free(index: &ExternIndex, aliases: &mut Vec<ExternId>) -> Vec<ExternId> {
    let mut dropped = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    aliases.retain(|ext| {
        let keep = !index.aliases.contains_key(ext) && !seen.iter().any(|s| s == ext.service());
        if keep {
            seen.push(ext.service().to_string());
        } else {
            dropped.push(ext.clone());
        }
        keep
    });
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(s: &str) -> ExternId {
        s.parse().unwrap()
    }

    #[test]
    fn test_bind_and_resolve() {
        let mut index = ExternIndex::new();
        index.bind("3", &[ext("gbif:5219173"), ext("ncbi:9615")]);
        assert_eq!(index.resolve("gbif:5219173"), Some("3"));
        assert_eq!(index.resolve("NCBI:9615"), Some("3"));
        assert_eq!(index.resolve("inat:1"), None);
        assert_eq!(index.resolve("17"), None);
    }

    #[test]
    fn test_check_new_rejects_taken_alias() {
        let mut index = ExternIndex::new();
        index.bind("3", &[ext("gbif:1")]);
        let err = index.check_new(&[ext("gbif:1")]).unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateExtern {
                alias: "gbif:1".to_string(),
                owner: "3".to_string()
            }
        );
        assert!(index.check_new(&[ext("gbif:2"), ext("gbif:3")]).is_err());
        assert!(index.check_new(&[ext("gbif:2"), ext("ncbi:3")]).is_ok());
    }

    #[test]
    fn test_edit_replaces_and_removes() {
        let mut index = ExternIndex::new();
        let mut aliases = vec![ext("gbif:1")];
        index.bind("3", &aliases);

        index.edit("3", &mut aliases, "gbif:2").unwrap();
        assert_eq!(aliases, vec![ext("gbif:2")]);
        assert_eq!(index.resolve("gbif:1"), None);
        assert_eq!(index.resolve("gbif:2"), Some("3"));

        index.edit("3", &mut aliases, "gbif:").unwrap();
        assert!(aliases.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_edit_rejects_foreign_alias() {
        let mut index = ExternIndex::new();
        index.bind("4", &[ext("gbif:9")]);
        let mut aliases = Vec::new();
        assert!(index.edit("3", &mut aliases, "gbif:9").is_err());
        assert!(aliases.is_empty());
        assert!(index.edit("3", &mut aliases, "no-colon").is_err());
    }
}
