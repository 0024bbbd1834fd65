//! In-memory geocoder for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use addrverify::{AddressCandidate, AddressLookup, LookupError};

#[derive(Default)]
pub struct FakeGeocoder {
    responses: Mutex<HashMap<String, (Duration, Vec<AddressCandidate>)>>,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
    rate_limited: AtomicBool,
}

impl FakeGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, query: &str, candidates: Vec<AddressCandidate>) -> Self {
        self.respond_after(query, Duration::ZERO, candidates)
    }

    pub fn respond_after(self, query: &str, delay: Duration, candidates: Vec<AddressCandidate>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(query.to_string(), (delay, candidates));
        self
    }

    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_rate_limited(&self, limited: bool) {
        self.rate_limited.store(limited, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl AddressLookup for FakeGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<AddressCandidate>, LookupError> {
        self.calls.lock().unwrap().push(query.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(LookupError::Status(503));
        }
        let response = self.responses.lock().unwrap().get(query).cloned();
        match response {
            Some((delay, candidates)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(candidates)
            }
            None => Ok(Vec::new()),
        }
    }

    fn is_rate_limited(&self) -> bool {
        self.rate_limited.load(Ordering::SeqCst)
    }
}

pub fn evergreen_springfield() -> AddressCandidate {
    AddressCandidate::new("742 Evergreen Terrace", "Springfield", "IL", "62704")
        .with_display_name("742 Evergreen Terrace, Springfield, IL 62704")
        .with_position(39.7817, -89.6501)
}

pub fn evergreen_shelbyville() -> AddressCandidate {
    AddressCandidate::new("742 Evergreen Ter", "Shelbyville", "IL", "62565")
        .with_display_name("742 Evergreen Ter, Shelbyville, IL 62565")
}
