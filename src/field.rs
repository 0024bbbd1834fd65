//! A single address field on a quote or order form
//!
//! Owns the typed text, the structured city/state/zip parts, the constraint
//! inherited from the originating quote, and the verification state. All
//! methods are synchronous except [`AddressField::verify`]; the session
//! event loop uses the `begin_*`/`finish_*` halves so it can run lookups
//! on separate tasks.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::{AddressCandidate, Position};
use crate::constraint::{self, LocationConstraint};
use crate::lookup::{AddressLookup, LookupError};
use crate::verify::{self, Decision, VerificationState};

/// Which address slot on the form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Origin,
    Destination,
    ExtraPickup,
    ExtraDelivery,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Origin => write!(f, "origin"),
            FieldKind::Destination => write!(f, "destination"),
            FieldKind::ExtraPickup => write!(f, "extra-pickup"),
            FieldKind::ExtraDelivery => write!(f, "extra-delivery"),
        }
    }
}

/// How the lookup query is built from the field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryMode {
    /// Send the typed text as-is
    #[default]
    Raw,
    /// Send "{address}, {city}, {state} {zip}"
    Composed,
}

/// Structured parts edited next to the street address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParts {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
}

impl AddressParts {
    pub fn new(city: &str, state: &str, zip: &str) -> Self {
        Self {
            city: city.to_string(),
            state: state.to_string(),
            zip: zip.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.city.trim().is_empty() && self.state.trim().is_empty() && self.zip.trim().is_empty()
    }
}

/// Build "{address}, {city}, {state} {zip}", skipping empty parts
pub fn compose_query(address: &str, parts: &AddressParts) -> String {
    let state_zip = [parts.state.trim(), parts.zip.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    [address.trim(), parts.city.trim(), state_zip.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything a form reads back from a field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSnapshot {
    pub kind: FieldKind,
    pub text: String,
    pub verified: Option<bool>,
    pub message: String,
    pub top_suggestion: Option<AddressCandidate>,
    pub selected: Option<AddressCandidate>,
    pub resolved_position: Option<Position>,
    pub suggestions: Vec<AddressCandidate>,
    pub show_suggestions: bool,
    pub rate_limited: bool,
}

pub struct AddressField {
    kind: FieldKind,
    text: String,
    parts: AddressParts,
    constraint: LocationConstraint,
    mode: QueryMode,
    min_chars: usize,
    state: VerificationState,
    suggestions: Vec<AddressCandidate>,
    show_suggestions: bool,
    rate_limited: bool,
}

impl AddressField {
    pub fn new(kind: FieldKind, constraint: LocationConstraint) -> Self {
        Self {
            kind,
            text: String::new(),
            parts: AddressParts::default(),
            constraint,
            mode: QueryMode::default(),
            min_chars: 3,
            state: VerificationState::new(),
            suggestions: Vec::new(),
            show_suggestions: false,
            rate_limited: false,
        }
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> &VerificationState {
        &self.state
    }

    pub fn suggestions(&self) -> &[AddressCandidate] {
        &self.suggestions
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            kind: self.kind,
            text: self.text.clone(),
            verified: self.state.verified,
            message: self.state.message.clone(),
            top_suggestion: self.state.top_suggestion.clone(),
            selected: self.state.selected.clone(),
            resolved_position: self.state.resolved_position,
            suggestions: self.suggestions.clone(),
            show_suggestions: self.show_suggestions,
            rate_limited: self.rate_limited,
        }
    }

    /// The query sent to the geocoder for the current field contents
    pub fn query(&self) -> String {
        match self.mode {
            QueryMode::Raw => self.text.trim().to_string(),
            QueryMode::Composed => compose_query(&self.text, &self.parts),
        }
    }

    /// Record a keystroke. Returns the typeahead query to debounce, if any.
    pub fn on_input(&mut self, text: &str) -> Option<String> {
        if text != self.text {
            self.text = text.to_string();

            // The accepted address no longer matches what is typed
            if self.state.is_verified() {
                debug!(field = %self.kind, "edit after verification, clearing");
                self.state.reset();
            }
        }

        if verify::long_enough(text, self.min_chars) {
            Some(text.trim().to_string())
        } else {
            self.clear_suggestions();
            None
        }
    }

    /// Record a city/state/zip edit. Returns the refresh query to debounce, if any.
    pub fn set_parts(&mut self, parts: AddressParts) -> Option<String> {
        if parts == self.parts {
            return None;
        }
        self.parts = parts;
        if verify::long_enough(&self.text, self.min_chars) {
            Some(compose_query(&self.text, &self.parts))
        } else {
            None
        }
    }

    /// Start an explicit verify. Returns the query to look up, or `None`
    /// when the input was rejected locally.
    pub fn begin_verify(&mut self) -> Option<String> {
        if !verify::long_enough(&self.text, self.min_chars) {
            self.state.apply(Decision::TooShort);
            return None;
        }
        Some(self.query())
    }

    /// Finish an explicit verify with the lookup result
    pub fn finish_verify(&mut self, result: Result<Vec<AddressCandidate>, LookupError>) {
        self.note_rate_limit(&result);
        let decision = verify::decide(&self.text, &self.constraint, result);
        debug!(field = %self.kind, ?decision, "verify");
        if matches!(decision, Decision::Verified(_)) {
            self.clear_suggestions();
        }
        self.state.apply(decision);
    }

    /// Apply a background refresh as a hint
    pub fn finish_hint(&mut self, result: Result<Vec<AddressCandidate>, LookupError>) {
        self.note_rate_limit(&result);
        let decision = verify::decide(&self.text, &self.constraint, result);
        self.state.apply_hint(decision);
    }

    /// Replace the suggestion list with typeahead results
    pub fn finish_suggestions(&mut self, result: Result<Vec<AddressCandidate>, LookupError>) {
        self.note_rate_limit(&result);
        match result {
            Ok(candidates) => {
                self.suggestions = constraint::filter(candidates, &self.constraint);
                self.show_suggestions = !self.suggestions.is_empty();
            }
            Err(_) => self.clear_suggestions(),
        }
    }

    /// Mark the field rate limited without issuing a lookup
    pub fn reject_rate_limited(&mut self) {
        self.rate_limited = true;
        self.state.apply(Decision::RateLimited);
    }

    /// Follow the lookup's own rate-limit window
    pub fn set_rate_limited(&mut self, limited: bool) {
        self.rate_limited = limited;
    }

    /// Explicit pick from the dropdown or the top suggestion
    pub fn select_suggestion(&mut self, candidate: AddressCandidate) {
        debug!(field = %self.kind, label = candidate.label(), "suggestion selected");
        self.text = candidate.address.clone();
        if !candidate.city.is_empty() || !candidate.state.is_empty() || !candidate.zip.is_empty() {
            self.parts = AddressParts::new(&candidate.city, &candidate.state, &candidate.zip);
        }
        self.clear_suggestions();
        self.state.select(candidate);
    }

    /// Pick the n-th entry of the current suggestion list
    pub fn select_index(&mut self, index: usize) -> bool {
        match self.suggestions.get(index).cloned() {
            Some(candidate) => {
                self.select_suggestion(candidate);
                true
            }
            None => false,
        }
    }

    /// Accept the top suggestion shown after a failed verify
    pub fn accept_top_suggestion(&mut self) -> bool {
        match self.state.top_suggestion.clone() {
            Some(candidate) => {
                self.select_suggestion(candidate);
                true
            }
            None => false,
        }
    }

    /// Look up and verify in one step
    pub async fn verify<L: AddressLookup>(&mut self, lookup: &L) -> &VerificationState {
        let Some(query) = self.begin_verify() else {
            return &self.state;
        };
        if lookup.is_rate_limited() {
            self.reject_rate_limited();
            return &self.state;
        }
        let result = lookup.search(&query).await;
        self.finish_verify(result);
        &self.state
    }

    fn clear_suggestions(&mut self) {
        self.suggestions.clear();
        self.show_suggestions = false;
    }

    fn note_rate_limit(&mut self, result: &Result<Vec<AddressCandidate>, LookupError>) {
        self.rate_limited = matches!(result, Err(e) if e.is_rate_limited());
    }
}
