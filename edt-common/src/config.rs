//! TOML-backed configuration loaders for the three external collaborators:
//! the grid, the rescuer catalog, and the emergency-type catalog.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::ConfigError;
use crate::limits::{MAX_RESCUER_TYPES, MAX_TWINS};
use crate::types::{EmergencyRequirement, EmergencyType, RescuerType};

/// `{queue_name, width, height}` — the simulated grid's geometry.
#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    pub queue_name: String,
    pub width: i32,
    pub height: i32,
}

impl GridConfig {
    /// Whether `(x, y)` falls on this grid.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (0..=self.height).contains(&x) && (0..=self.width).contains(&y)
    }
}

pub fn load_grid_config(path: impl AsRef<Path>) -> Result<GridConfig, ConfigError> {
    load_toml(path)
}

/// One line of the rescuer catalog: `{name, count, speed, base_x, base_y}`.
#[derive(Debug, Clone, Deserialize)]
struct RescuerTypeEntry {
    name: String,
    count: u32,
    speed: u32,
    base_x: i32,
    base_y: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct RescuerCatalogFile {
    #[serde(rename = "rescuer")]
    rescuers: Vec<RescuerTypeEntry>,
}

/// The fully materialized rescuer catalog: immutable types plus the dense
/// `(type_idx, x, y)` seed for every digital twin to be created, ids assigned
/// 1-based in catalog order (matching `parse_rescuers.c`'s `global_twin_id`).
#[derive(Debug, Clone)]
pub struct RescuerCatalog {
    pub types: Vec<Arc<RescuerType>>,
    /// `(type_idx, base_x, base_y)` for each twin, in dense-id order.
    pub twin_seeds: Vec<(usize, i32, i32)>,
}

impl RescuerCatalog {
    pub fn type_index(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|t| &*t.name == name)
    }
}

pub fn load_rescuer_catalog(path: impl AsRef<Path>) -> Result<RescuerCatalog, ConfigError> {
    let path_str = path.as_ref().display().to_string();
    let file: RescuerCatalogFile = load_toml(&path)?;

    if file.rescuers.len() > MAX_RESCUER_TYPES {
        return Err(ConfigError::TooManyRescuerTypes {
            path: path_str,
            count: file.rescuers.len(),
            limit: MAX_RESCUER_TYPES,
        });
    }

    let mut types = Vec::with_capacity(file.rescuers.len());
    let mut twin_seeds = Vec::new();
    for (idx, entry) in file.rescuers.iter().enumerate() {
        types.push(Arc::new(RescuerType {
            name: Arc::from(entry.name.as_str()),
            speed: entry.speed,
            base_x: entry.base_x,
            base_y: entry.base_y,
        }));
        for _ in 0..entry.count {
            twin_seeds.push((idx, entry.base_x, entry.base_y));
        }
    }

    if twin_seeds.len() > MAX_TWINS {
        return Err(ConfigError::TooManyTwins {
            path: path_str,
            count: twin_seeds.len(),
            limit: MAX_TWINS,
        });
    }

    Ok(RescuerCatalog { types, twin_seeds })
}

/// One requirement line in an emergency type definition.
#[derive(Debug, Clone, Deserialize)]
struct RequirementEntry {
    #[serde(rename = "type")]
    type_name: String,
    count: u32,
    manage_seconds: i64,
}

/// One emergency type in the catalog.
#[derive(Debug, Clone, Deserialize)]
struct EmergencyTypeEntry {
    name: String,
    priority: u8,
    #[serde(rename = "requirement", default)]
    requirements: Vec<RequirementEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmergencyCatalogFile {
    #[serde(rename = "emergency")]
    emergencies: Vec<EmergencyTypeEntry>,
}

/// Loads the emergency-type catalog, cross-referencing every requirement's
/// rescuer type name against `rescuers`, exactly as `parse_emergency_types.c`
/// resolves `rescuer_request_t::type` pointers against the rescuer catalog.
pub fn load_emergency_catalog(
    path: impl AsRef<Path>,
    rescuers: &RescuerCatalog,
) -> Result<Vec<EmergencyType>, ConfigError> {
    let path_str = path.as_ref().display().to_string();
    let file: EmergencyCatalogFile = load_toml(&path)?;

    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (idx, t) in rescuers.types.iter().enumerate() {
        by_name.insert(&t.name, idx);
    }

    let mut out = Vec::with_capacity(file.emergencies.len());
    for entry in &file.emergencies {
        let mut requirements = Vec::with_capacity(entry.requirements.len());
        for req in &entry.requirements {
            let Some(&type_idx) = by_name.get(req.type_name.as_str()) else {
                return Err(ConfigError::UnknownRescuerType {
                    path: path_str.clone(),
                    name: req.type_name.clone(),
                });
            };
            requirements.push(EmergencyRequirement {
                type_idx,
                type_name: rescuers.types[type_idx].name.clone(),
                required_count: req.count,
                time_to_manage_secs: req.manage_seconds,
            });
        }
        out.push(EmergencyType {
            name: Arc::from(entry.name.as_str()),
            priority: entry.priority,
            requirements,
        });
    }
    Ok(out)
}

fn load_toml<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path_ref = path.as_ref();
    let path_str = path_ref.display().to_string();
    let contents = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
        path: path_str.clone(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Toml {
        path: path_str,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_grid_config() {
        let f = write_temp("queue_name = \"emergenze\"\nwidth = 100\nheight = 100\n");
        let grid = load_grid_config(f.path()).unwrap();
        assert_eq!(grid.queue_name, "emergenze");
        assert!(grid.contains(30, 40));
        assert!(!grid.contains(-1, 40));
        assert!(!grid.contains(30, 200));
    }

    #[test]
    fn loads_rescuer_catalog_with_dense_ids() {
        let f = write_temp(
            "[[rescuer]]\nname = \"Medic\"\ncount = 2\nspeed = 10\nbase_x = 0\nbase_y = 0\n",
        );
        let catalog = load_rescuer_catalog(f.path()).unwrap();
        assert_eq!(catalog.types.len(), 1);
        assert_eq!(catalog.twin_seeds.len(), 2);
        assert_eq!(catalog.twin_seeds[0].0, 0);
    }

    #[test]
    fn rejects_emergency_type_with_unknown_rescuer() {
        let rescuers = write_temp(
            "[[rescuer]]\nname = \"Medic\"\ncount = 1\nspeed = 10\nbase_x = 0\nbase_y = 0\n",
        );
        let catalog = load_rescuer_catalog(rescuers.path()).unwrap();
        let emergencies = write_temp(
            "[[emergency]]\nname = \"Rash\"\npriority = 1\n[[emergency.requirement]]\ntype = \"Firefighter\"\ncount = 1\nmanage_seconds = 3\n",
        );
        let err = load_emergency_catalog(emergencies.path(), &catalog).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRescuerType { .. }));
    }

    #[test]
    fn loads_emergency_catalog() {
        let rescuers = write_temp(
            "[[rescuer]]\nname = \"Medic\"\ncount = 1\nspeed = 10\nbase_x = 0\nbase_y = 0\n",
        );
        let catalog = load_rescuer_catalog(rescuers.path()).unwrap();
        let emergencies = write_temp(
            "[[emergency]]\nname = \"Rash\"\npriority = 1\n[[emergency.requirement]]\ntype = \"Medic\"\ncount = 3\nmanage_seconds = 3\n",
        );
        let types = load_emergency_catalog(emergencies.path(), &catalog).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].requirements[0].required_count, 3);
    }
}
