//! Quote context handed to a form when it opens
//!
//! The originating quote's stops decide which city/state/zip each address
//! field is held to. The context is read once when the form opens and
//! written once when it closes; nothing else touches the file.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info};

use crate::candidate::AddressCandidate;
use crate::constraint::LocationConstraint;
use crate::field::FieldKind;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to access context file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid context: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Role of a stop on the quote
///
/// The API sends this as a name on some endpoints and as a number on
/// others; both decode here and anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    Origin,
    Destination,
    Pickup,
    Delivery,
}

impl StopKind {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(StopKind::Origin),
            1 => Some(StopKind::Destination),
            2 => Some(StopKind::Pickup),
            3 => Some(StopKind::Delivery),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "origin" => Some(StopKind::Origin),
            "destination" => Some(StopKind::Destination),
            "pickup" | "extra-pickup" | "extra_pickup" => Some(StopKind::Pickup),
            "delivery" | "extra-delivery" | "extra_delivery" => Some(StopKind::Delivery),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StopKind::Origin => "origin",
            StopKind::Destination => "destination",
            StopKind::Pickup => "pickup",
            StopKind::Delivery => "delivery",
        }
    }

    pub fn for_field(field: FieldKind) -> Self {
        match field {
            FieldKind::Origin => StopKind::Origin,
            FieldKind::Destination => StopKind::Destination,
            FieldKind::ExtraPickup => StopKind::Pickup,
            FieldKind::ExtraDelivery => StopKind::Delivery,
        }
    }

    /// The form field this stop constrains
    pub fn field(&self) -> FieldKind {
        match self {
            StopKind::Origin => FieldKind::Origin,
            StopKind::Destination => FieldKind::Destination,
            StopKind::Pickup => FieldKind::ExtraPickup,
            StopKind::Delivery => FieldKind::ExtraDelivery,
        }
    }
}

impl fmt::Display for StopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for StopKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for StopKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StopKindVisitor;

        impl Visitor<'_> for StopKindVisitor {
            type Value = StopKind;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a stop kind name or code 0-3")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StopKind, E> {
                StopKind::from_name(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<StopKind, E> {
                StopKind::from_code(v)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<StopKind, E> {
                u64::try_from(v)
                    .ok()
                    .and_then(StopKind::from_code)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
            }
        }

        deserializer.deserialize_any(StopKindVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteStop {
    pub kind: StopKind,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    /// Address accepted on the form for this stop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<AddressCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteContext {
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub stops: Vec<QuoteStop>,
}

impl QuoteContext {
    pub fn from_json(text: &str) -> Result<Self, ContextError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ContextError> {
        let text = fs::read_to_string(path).map_err(|source| ContextError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let context = Self::from_json(&text)?;
        info!(quote = ?context.quote_id, stops = context.stops.len(), "quote context loaded");
        Ok(context)
    }

    pub fn save(&self, path: &Path) -> Result<(), ContextError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ContextError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "quote context saved");
        Ok(())
    }

    /// Constraint for a field, from the first stop of the matching kind
    pub fn constraint_for(&self, field: FieldKind) -> LocationConstraint {
        self.stops
            .iter()
            .find(|stop| stop.kind.field() == field)
            .map(|stop| LocationConstraint {
                city: stop.city.clone(),
                state: stop.state.clone(),
                zip: stop.zip.clone(),
            })
            .unwrap_or_default()
    }

    /// Remember the accepted address on the stop backing `field`
    pub fn record_verified(&mut self, field: FieldKind, candidate: AddressCandidate) {
        match self.stops.iter_mut().find(|stop| stop.kind.field() == field) {
            Some(stop) => stop.verified = Some(candidate),
            None => self.stops.push(QuoteStop {
                kind: StopKind::for_field(field),
                city: Some(candidate.city.clone()),
                state: Some(candidate.state.clone()),
                zip: Some(candidate.zip.clone()),
                verified: Some(candidate),
            }),
        }
    }
}
