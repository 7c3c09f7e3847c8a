//! Tuning profiles
//!
//! A profile maps a backing device UUID, a cache set UUID, or `all` to the
//! tunables applied to matching devices:
//!
//! ```toml
//! [all]
//! sequential_cutoff = "16k"
//!
//! [cf85e0c3-cb0a-4c99-a003-b629adb0be0b]
//! sequential_cutoff = 8192
//! writeback_percent = 20
//! ```

use crate::error::{BcacheError, BcacheResult};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// Section name applied to devices without a dedicated section
pub const ALL: &str = "all";

/// Tunable name to value
pub type TunableValues = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningProfile {
    sections: BTreeMap<String, TunableValues>,
}

impl Default for TuningProfile {
    fn default() -> Self {
        let mut all = TunableValues::new();
        all.insert("sequential_cutoff".to_string(), "4194304".to_string());
        all.insert("writeback_percent".to_string(), "10".to_string());

        let mut sections = BTreeMap::new();
        sections.insert(ALL.to_string(), all);
        Self { sections }
    }
}

impl TuningProfile {
    /// Load a profile file; sections it defines replace the defaults
    pub async fn load(path: &Path) -> BcacheResult<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| BcacheError::io(format!("reading tuning profile {}", path.display()), e))?;

        Self::parse(&content).map_err(|reason| BcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse profile text on top of the defaults
    pub fn parse(content: &str) -> Result<Self, String> {
        let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
        let mut profile = Self::default();

        for (key, section) in table {
            let section = section
                .as_table()
                .ok_or_else(|| format!("[{}] must be a table of tunables", key))?;

            let mut values = TunableValues::new();
            for (name, value) in section {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    other => {
                        return Err(format!(
                            "{}.{} must be a string or number, got {}",
                            key,
                            name,
                            other.type_str()
                        ))
                    }
                };
                values.insert(name.clone(), value);
            }
            profile.sections.insert(key, values);
        }

        Ok(profile)
    }

    /// Pick the section for a device: backing UUID, then cache set UUID, then `all`
    pub fn section_for(
        &self,
        backing_uuid: Option<&str>,
        cache_set_uuid: Option<&str>,
    ) -> Option<&TunableValues> {
        backing_uuid
            .and_then(|uuid| self.sections.get(uuid))
            .or_else(|| cache_set_uuid.and_then(|uuid| self.sections.get(uuid)))
            .or_else(|| self.sections.get(ALL))
    }
}
