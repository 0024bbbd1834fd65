//! Verification decisions and the per-field verification state
//!
//! [`decide`] turns a lookup result into a [`Decision`]; the state then
//! applies it either explicitly (the user pressed Verify) or silently (a
//! field edit refreshed the hint). Explicit application may flip
//! `verified`; silent application only ever touches `top_suggestion`.

use serde::Serialize;

use crate::candidate::{AddressCandidate, Position};
use crate::constraint::{self, LocationConstraint};
use crate::lookup::LookupError;
use crate::matching;

pub const MSG_TOO_SHORT: &str = "Enter at least 3 characters to verify";
pub const MSG_NO_MATCH: &str = "No match found";
pub const MSG_NO_MATCH_LOCATION: &str = "No match found for the quote location";
pub const MSG_VERIFIED: &str = "Address verified";
pub const MSG_NEEDS_REVIEW: &str = "Address not verified (closest match shown)";
pub const MSG_LOOKUP_FAILED: &str = "Unable to verify address";
pub const MSG_RATE_LIMITED: &str = "Address lookup is rate limited, try again shortly";

/// Outcome of one verification attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Input too short, no lookup made
    TooShort,
    /// Lookup succeeded but nothing survived the constraint filter
    NoMatch { constrained: bool },
    /// Top candidate contains every typed token
    Verified(AddressCandidate),
    /// Top candidate is only a suggestion
    NeedsReview(AddressCandidate),
    /// Transport or decode failure
    LookupFailed,
    /// Geocoder asked us to back off
    RateLimited,
}

/// True when the trimmed input is long enough to look up
pub fn long_enough(address: &str, min_chars: usize) -> bool {
    address.trim().chars().count() >= min_chars
}

/// Decide the outcome of a lookup for `address` under `constraint`
pub fn decide(
    address: &str,
    constraint: &LocationConstraint,
    result: Result<Vec<AddressCandidate>, LookupError>,
) -> Decision {
    let candidates = match result {
        Ok(candidates) => candidates,
        Err(e) if e.is_rate_limited() => return Decision::RateLimited,
        Err(_) => return Decision::LookupFailed,
    };

    let Some(top) = constraint::filter(candidates, constraint).into_iter().next() else {
        return Decision::NoMatch {
            constrained: !constraint.is_blank(),
        };
    };

    if matching::matches_candidate(address, &top) {
        Decision::Verified(top)
    } else {
        Decision::NeedsReview(top)
    }
}

/// UI-facing verification state for one address field
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationState {
    pub verified: Option<bool>,
    pub message: String,
    pub top_suggestion: Option<AddressCandidate>,
    pub selected: Option<AddressCandidate>,
    pub resolved_position: Option<Position>,
}

impl VerificationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_verified(&self) -> bool {
        self.verified == Some(true)
    }

    /// Apply the outcome of an explicit verify
    pub fn apply(&mut self, decision: Decision) {
        match decision {
            Decision::TooShort => self.fail(MSG_TOO_SHORT, None),
            Decision::NoMatch { constrained } => {
                let msg = if constrained {
                    MSG_NO_MATCH_LOCATION
                } else {
                    MSG_NO_MATCH
                };
                self.fail(msg, None);
            }
            Decision::Verified(top) => self.accept(top),
            Decision::NeedsReview(top) => self.fail(MSG_NEEDS_REVIEW, Some(top)),
            Decision::LookupFailed => self.fail(MSG_LOOKUP_FAILED, None),
            Decision::RateLimited => self.fail(MSG_RATE_LIMITED, None),
        }
    }

    /// Apply the outcome of a background refresh as a hint only
    pub fn apply_hint(&mut self, decision: Decision) {
        if self.is_verified() {
            return;
        }
        match decision {
            Decision::Verified(top) | Decision::NeedsReview(top) => {
                self.top_suggestion = Some(top);
            }
            Decision::NoMatch { .. } => self.top_suggestion = None,
            Decision::TooShort | Decision::LookupFailed | Decision::RateLimited => {}
        }
    }

    /// The user picked a candidate; accept it without matching
    pub fn select(&mut self, candidate: AddressCandidate) {
        self.accept(candidate);
    }

    /// Forget any previous attempt
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn accept(&mut self, candidate: AddressCandidate) {
        if let Some(position) = candidate.position {
            self.resolved_position = Some(position);
        }
        self.verified = Some(true);
        self.message = MSG_VERIFIED.to_string();
        self.top_suggestion = None;
        self.selected = Some(candidate);
    }

    fn fail(&mut self, message: &str, top: Option<AddressCandidate>) {
        self.verified = Some(false);
        self.message = message.to_string();
        self.top_suggestion = top;
        self.selected = None;
    }
}
