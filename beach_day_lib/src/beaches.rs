use std::{cmp::Ordering, collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::beach_day_error::BeachDayError;

/// Largest window a single search returns.
pub const MAX_SEARCH_RESULTS: usize = 500;

/// Accepts strings, numbers or null for a catalog attribute.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) => Some(value),
        serde_json::Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct BeachAttributes {
    #[serde(default, deserialize_with = "lenient_string")]
    beach_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    beach_county: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    beach_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    beach_tribe_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    beach_len_in_mi: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    beach_access: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    start_latitude_measure: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    end_latitude_measure: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    start_longitude_measure: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    end_longitude_measure: Option<String>,
}

fn parse_measure(measure: &Option<String>) -> Option<f64> {
    measure
        .as_deref()
        .and_then(|measure| measure.trim().parse::<f64>().ok())
        .filter(|measure| measure.is_finite())
}

/// Midpoint when both ends are known, else whichever end is.
fn midpoint(start: Option<f64>, end: Option<f64>) -> Option<f64> {
    match (start, end) {
        (Some(start), Some(end)) => Some((start + end) / 2.0),
        (start, end) => start.or(end),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BeachInfo {
    pub beach_name: String,
    pub beach_county: String,
    pub beach_state: String,
    pub beach_tribe: String,
    pub beach_length: Option<f64>,
    pub beach_access: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<&BeachAttributes> for BeachInfo {
    fn from(attributes: &BeachAttributes) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        BeachInfo {
            beach_name: text(&attributes.beach_name),
            beach_county: text(&attributes.beach_county),
            beach_state: text(&attributes.beach_state),
            beach_tribe: text(&attributes.beach_tribe_code),
            beach_length: parse_measure(&attributes.beach_len_in_mi),
            beach_access: text(&attributes.beach_access),
            latitude: midpoint(
                parse_measure(&attributes.start_latitude_measure),
                parse_measure(&attributes.end_latitude_measure),
            ),
            longitude: midpoint(
                parse_measure(&attributes.start_longitude_measure),
                parse_measure(&attributes.end_longitude_measure),
            ),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub order: Vec<String>,
    pub result: BTreeMap<String, BeachInfo>,
}

/// The EPA beach attributes, keyed by beach id.
#[derive(Debug, Clone, Default)]
pub struct BeachCatalog {
    beaches: BTreeMap<String, BeachInfo>,
}

impl BeachCatalog {
    pub fn load(path: Option<&Path>) -> anyhow::Result<BeachCatalog> {
        let Some(path) = path else {
            tracing::warn!("no beach data configured, beach lookups will find nothing");
            return Ok(BeachCatalog::default());
        };
        if !path.exists() {
            tracing::warn!("beach data {} not found, catalog is empty", path.display());
            return Ok(BeachCatalog::default());
        }
        let catalog = BeachCatalog::from_json(&fs::read_to_string(path)?)?;
        tracing::info!("loaded {} beaches from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> anyhow::Result<BeachCatalog> {
        let raw: BTreeMap<String, BeachAttributes> = serde_json::from_str(json)?;
        Ok(BeachCatalog {
            beaches: raw
                .iter()
                .map(|(id, attributes)| (id.clone(), BeachInfo::from(attributes)))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.beaches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beaches.is_empty()
    }

    pub fn beach_info(&self, id: &str) -> Result<BeachInfo, BeachDayError> {
        self.beaches
            .get(id)
            .cloned()
            .ok_or(BeachDayError::BeachNotFound)
    }

    /// Beaches nearest to (`latitude`, `longitude`) in degrees, windowed to
    /// `[start, stop)`. Beaches without coordinates sort last.
    pub fn search(&self, latitude: f64, longitude: f64, start: usize, stop: usize) -> SearchResult {
        let distance = |info: &BeachInfo| match (info.latitude, info.longitude) {
            (Some(lat), Some(lon)) => ((lat - latitude).powi(2) + (lon - longitude).powi(2)).sqrt(),
            _ => f64::INFINITY,
        };
        let mut ranked: Vec<(f64, &String)> = self
            .beaches
            .iter()
            .map(|(id, info)| (distance(info), id))
            .collect();
        ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let stop = stop.min(start.saturating_add(MAX_SEARCH_RESULTS));
        let order: Vec<String> = ranked
            .into_iter()
            .skip(start)
            .take(stop.saturating_sub(start))
            .map(|(_, id)| id.clone())
            .collect();
        let result = order
            .iter()
            .filter_map(|id| self.beaches.get(id).map(|info| (id.clone(), info.clone())))
            .collect();
        SearchResult { order, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CATALOG: &str = r#"{
        "CA1": {
            "BEACH_NAME": "Carmel",
            "BEACH_COUNTY": "Monterey",
            "BEACH_STATE": "CA",
            "BEACH_LEN_IN_MI": "1.2",
            "BEACH_ACCESS": "Public",
            "START_LATITUDE_MEASURE": "36.0",
            "END_LATITUDE_MEASURE": "37.0",
            "START_LONGITUDE_MEASURE": "-121.0",
            "END_LONGITUDE_MEASURE": ""
        },
        "FL2": {
            "BEACH_NAME": "Siesta",
            "BEACH_STATE": "FL",
            "BEACH_LEN_IN_MI": 3,
            "START_LATITUDE_MEASURE": 27.2,
            "START_LONGITUDE_MEASURE": -82.5
        },
        "XX3": {
            "BEACH_NAME": "Nowhere",
            "START_LATITUDE_MEASURE": "unknown",
            "BEACH_TRIBE_CODE": null
        },
        "OR4": {
            "BEACH_NAME": "Cannon",
            "END_LATITUDE_MEASURE": "45.9",
            "END_LONGITUDE_MEASURE": "-123.9"
        }
    }"#;

    fn catalog() -> BeachCatalog {
        BeachCatalog::from_json(CATALOG).unwrap()
    }

    #[test]
    fn search_returns_at_most_five_hundred() {
        let beaches: serde_json::Map<String, serde_json::Value> = (0..600)
            .map(|index| {
                (
                    format!("B{index}"),
                    serde_json::json!({
                        "BEACH_NAME": format!("Beach {index}"),
                        "START_LATITUDE_MEASURE": index as f64 / 100.0,
                        "START_LONGITUDE_MEASURE": 0.0
                    }),
                )
            })
            .collect();
        let catalog =
            BeachCatalog::from_json(&serde_json::Value::Object(beaches).to_string()).unwrap();

        let found = catalog.search(0.0, 0.0, 0, 1000);
        assert_eq!(found.order.len(), MAX_SEARCH_RESULTS);
        assert_eq!(found.result.len(), MAX_SEARCH_RESULTS);
        assert_eq!(found.order[0], "B0");
        assert_eq!(found.order[MAX_SEARCH_RESULTS - 1], "B499");

        let tail = catalog.search(0.0, 0.0, 550, usize::MAX);
        assert_eq!(tail.order.len(), 50);
    }

    #[test]
    fn beach_info_fields() {
        let info = catalog().beach_info("CA1").unwrap();
        assert_eq!(
            info,
            BeachInfo {
                beach_name: "Carmel".to_owned(),
                beach_county: "Monterey".to_owned(),
                beach_state: "CA".to_owned(),
                beach_tribe: String::new(),
                beach_length: Some(1.2),
                beach_access: "Public".to_owned(),
                latitude: Some(36.5),
                longitude: Some(-121.0),
            }
        );
        assert_eq!(catalog().beach_info("FL2").unwrap().beach_length, Some(3.0));
    }

    #[test]
    fn end_only_coordinates() {
        let info = catalog().beach_info("OR4").unwrap();
        assert_eq!(info.latitude, Some(45.9));
        assert_eq!(info.longitude, Some(-123.9));
    }

    #[test]
    fn unknown_beaches() {
        assert_eq!(
            catalog().beach_info("ZZ9"),
            Err(BeachDayError::BeachNotFound)
        );
    }

    #[test]
    fn search_orders_by_distance() {
        let found = catalog().search(36.6, -121.9, 0, 10);
        assert_eq!(found.order, ["CA1", "OR4", "FL2", "XX3"]);
        assert_eq!(found.result.len(), 4);
    }

    #[test]
    fn search_windows() {
        let found = catalog().search(27.0, -82.0, 1, 3);
        assert_eq!(found.order, ["CA1", "OR4"]);
        assert!(catalog().search(0.0, 0.0, 3, 1).order.is_empty());
        assert!(catalog().search(0.0, 0.0, 10, 20).order.is_empty());
    }

    #[test]
    fn missing_catalog_is_empty() {
        assert!(BeachCatalog::load(None).unwrap().is_empty());
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("beach_attributes.json");
        assert!(BeachCatalog::load(Some(&missing)).unwrap().is_empty());
    }
}
