//! Location constraints derived from the originating quote or order

use serde::{Deserialize, Serialize};

use crate::candidate::AddressCandidate;

/// Expected city/state/zip for an address field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationConstraint {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

impl LocationConstraint {
    pub fn new(city: Option<&str>, state: Option<&str>, zip: Option<&str>) -> Self {
        Self {
            city: city.map(String::from),
            state: state.map(String::from),
            zip: zip.map(String::from),
        }
    }

    /// No location recorded yet
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn is_blank(&self) -> bool {
        non_blank(&self.city).is_none()
            && non_blank(&self.state).is_none()
            && non_blank(&self.zip).is_none()
    }

    /// Whether a single candidate satisfies every non-blank field
    pub fn admits(&self, candidate: &AddressCandidate) -> bool {
        if let Some(city) = non_blank(&self.city) {
            if !same_text(city, &candidate.city) {
                return false;
            }
        }
        if let Some(state) = non_blank(&self.state) {
            if !same_text(state, &candidate.state) {
                return false;
            }
        }
        if let Some(zip) = non_blank(&self.zip) {
            if zip != candidate.zip {
                return false;
            }
        }
        true
    }
}

fn same_text(expected: &str, actual: &str) -> bool {
    expected.to_lowercase() == actual.trim().to_lowercase()
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Keep the candidates that satisfy the constraint, in their original order
pub fn filter(candidates: Vec<AddressCandidate>, constraint: &LocationConstraint) -> Vec<AddressCandidate> {
    if constraint.is_blank() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|c| constraint.admits(c))
        .collect()
}
