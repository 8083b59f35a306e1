use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level shader manifest: the shared stages and every fragment program.
#[derive(Debug, Deserialize)]
pub struct LibraryManifest {
    pub vertex: String,
    pub prelude: String,
    pub programs: Vec<ProgramManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramManifest {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub fragment: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamDef>,
}

impl ProgramManifest {
    /// Manifest for a fragment found on disk with no manifest entry.
    pub fn bare(name: &str, fragment: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            description: String::new(),
            fragment: fragment.to_string(),
            parameters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamDef {
    #[serde(rename = "type")]
    pub param_type: String,
    pub default: serde_json::Value,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl ParamDef {
    /// Clamp a numeric value into the declared range.
    pub fn clamp(&self, v: f64) -> f64 {
        let v = self.min.map_or(v, |min| v.max(min));
        self.max.map_or(v, |max| v.min(max))
    }
}
