// src/catalog.rs
//
// Pedestrian route catalog.
//
// Loaded once per run and treated as immutable. Routing decisions only ever
// reference catalog entries by id, so ids must be unique and every path must
// have at least two finite points.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{read_to_string, PipelineError};
use crate::types::{GeoPoint, Route};

pub const LUMEN_FIELD: GeoPoint = [47.5952, -122.3316];

/// Ordered, validated route catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCatalog {
    routes: Vec<Route>,
}

impl RouteCatalog {
    /// One route per built-in corridor, from the stadium outward.
    pub fn builtin() -> Self {
        let route = |corridor: &str, label: &str, to: GeoPoint| Route {
            id: format!("route_{corridor}"),
            label: label.to_string(),
            corridor: corridor.to_string(),
            path: vec![LUMEN_FIELD, to],
        };
        Self {
            routes: vec![
                route("stadium_1st_ave", "Stadium Station via 1st Ave S", [47.5980, -122.3300]),
                route("king_street", "King Street Station", [47.5990, -122.3280]),
                route("royal_brougham", "Royal Brougham Way", [47.5942, -122.3295]),
                route("4th_ave_s", "4th Ave S northbound", [47.5995, -122.3340]),
                route("occidental_ave", "Occidental Ave promenade", [47.5960, -122.3335]),
                route("s_atlantic_st", "S Atlantic St to SODO", [47.5910, -122.3290]),
            ],
        }
    }

    pub fn new(routes: Vec<Route>) -> Result<Self, PipelineError> {
        let catalog = Self { routes };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a JSON array of `{id, label, corridor, path}` objects.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let contents = read_to_string(path)?;
        let routes: Vec<Route> = serde_json::from_str(&contents).map_err(|e| PipelineError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::new(routes)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut seen = HashSet::new();
        for (i, r) in self.routes.iter().enumerate() {
            if r.id.trim().is_empty() {
                return Err(PipelineError::invalid(format!("routes[{i}].id"), "id cannot be empty"));
            }
            if !seen.insert(r.id.as_str()) {
                return Err(PipelineError::invalid(
                    format!("routes[{i}].id"),
                    format!("duplicate route id '{}'", r.id),
                ));
            }
            if r.path.len() < 2 {
                return Err(PipelineError::invalid(
                    format!("{}.path", r.id),
                    "path needs at least two points",
                ));
            }
            if r.path.iter().flatten().any(|c| !c.is_finite()) {
                return Err(PipelineError::invalid(
                    format!("{}.path", r.id),
                    "coordinates must be finite",
                ));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_validates() {
        let c = RouteCatalog::builtin();
        c.validate().unwrap();
        assert_eq!(c.len(), 6);
        assert_eq!(c.routes()[0].id, "route_stadium_1st_ave");
        assert!(c.contains("route_king_street"));
        assert!(!c.contains("route_westlake"));
    }

    #[test]
    fn single_point_path_rejected() {
        let mut routes = RouteCatalog::builtin().routes().to_vec();
        routes[2].path.truncate(1);
        assert!(RouteCatalog::new(routes).is_err());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut routes = RouteCatalog::builtin().routes().to_vec();
        routes[1].id = routes[0].id.clone();
        assert!(RouteCatalog::new(routes).is_err());
    }

    #[test]
    fn loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        let json = serde_json::to_string(RouteCatalog::builtin().routes()).unwrap();
        std::fs::write(&path, json).unwrap();
        let c = RouteCatalog::from_json_file(&path).unwrap();
        assert_eq!(c, RouteCatalog::builtin());
    }
}
