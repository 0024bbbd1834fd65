//! Address verification for quote and order forms
//!
//! Each address field on a form (origin, destination, extra pickup, extra
//! delivery) is checked against a geocoding proxy before the quote is
//! accepted. The pieces, leaves first:
//!
//! - [`matching`]: tokenizer and token-subset matcher
//! - [`constraint`]: city/state/zip filter inherited from the quote
//! - [`verify`]: verification decisions and per-field state
//! - [`debounce`]: quiet-interval debouncing for live edits
//! - [`lookup`] and [`cache`]: the geocoder client and its result cache
//! - [`field`] and [`session`]: the per-field matcher and its event loop
//! - [`context`]: quote stops that produce each field's constraint

pub mod cache;
pub mod candidate;
pub mod config;
pub mod constraint;
pub mod context;
pub mod debounce;
pub mod field;
pub mod lookup;
pub mod matching;
pub mod session;
pub mod verify;

pub use candidate::{AddressCandidate, Position};
pub use constraint::LocationConstraint;
pub use field::{AddressField, AddressParts, FieldKind, FieldSnapshot, QueryMode};
pub use lookup::{AddressLookup, HttpLookup, LookupError};
pub use session::{FieldCommand, FieldEvent, FieldSession};
pub use verify::{Decision, VerificationState};
