//! Address candidates returned by the geocoding proxy

use serde::{Deserialize, Deserializer, Serialize};

/// Resolved coordinates for a candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

/// Coordinates as the geocoder sends them; either axis may be missing
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct RawPosition {
    lat: Option<f64>,
    lng: Option<f64>,
}

/// A single address suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressCandidate {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub zip: String,
    #[serde(default, deserialize_with = "complete_position")]
    pub position: Option<Position>,
}

impl AddressCandidate {
    pub fn new(address: &str, city: &str, state: &str, zip: &str) -> Self {
        Self {
            id: String::new(),
            address: address.to_string(),
            display_name: format!("{}, {}, {} {}", address, city, state, zip),
            city: city.to_string(),
            state: state.to_string(),
            zip: zip.to_string(),
            position: None,
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn with_position(mut self, lat: f64, lng: f64) -> Self {
        self.position = Some(Position { lat, lng });
        self
    }

    /// Text shown in a suggestion list
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.address
        } else {
            &self.display_name
        }
    }
}

/// Ids and zips come back as strings from some geocoders and numbers from others
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}

/// A position only counts when both coordinates are present
fn complete_position<'de, D>(deserializer: D) -> Result<Option<Position>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawPosition>::deserialize(deserializer)?;
    Ok(raw.and_then(|p| match (p.lat, p.lng) {
        (Some(lat), Some(lng)) => Some(Position { lat, lng }),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_camel_case() {
        let json = r#"{
            "id": 42,
            "address": "742 Evergreen Terrace",
            "displayName": "742 Evergreen Terrace, Springfield, IL 62704",
            "city": "Springfield",
            "state": "IL",
            "zip": "62704",
            "position": {"lat": 39.78, "lng": -89.65}
        }"#;
        let c: AddressCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.id, "42");
        assert_eq!(c.display_name, "742 Evergreen Terrace, Springfield, IL 62704");
        assert_eq!(c.position, Some(Position { lat: 39.78, lng: -89.65 }));
    }

    #[test]
    fn test_partial_position_is_dropped() {
        let json = r#"{"address": "1 A St", "position": {"lat": 1.0}}"#;
        let c: AddressCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.position, None);
        assert_eq!(c.id, "");
    }

    #[test]
    fn test_numeric_zip() {
        let c: AddressCandidate = serde_json::from_str(r#"{"zip": 30301}"#).unwrap();
        assert_eq!(c.zip, "30301");
    }

    #[test]
    fn test_label_falls_back_to_address() {
        let c = AddressCandidate::new("1 A St", "X", "Y", "1").with_display_name("");
        assert_eq!(c.label(), "1 A St");
    }
}
