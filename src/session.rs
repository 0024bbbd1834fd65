//! Field session - drives one address field from form commands
//!
//! Runs on a single task. Keystrokes and city/state/zip edits are debounced,
//! lookups run on spawned tasks, and replies come back over a channel.
//! Every lookup carries a sequence number; a reply older than the last one
//! applied for the same purpose is dropped so slow responses cannot
//! overwrite fresher state. Editing the text, or picking a suggestion,
//! retires whatever is still in flight.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::candidate::AddressCandidate;
use crate::config::DebounceConfig;
use crate::debounce::Debouncer;
use crate::field::{AddressField, AddressParts, FieldSnapshot};
use crate::lookup::{AddressLookup, LookupError};

pub enum FieldCommand {
    /// Address text changed
    Input(String),
    /// City/state/zip changed
    Parts(AddressParts),
    Verify,
    Select(AddressCandidate),
    SelectIndex(usize),
    AcceptTopSuggestion,
    Close,
}

#[derive(Clone, Debug)]
pub enum FieldEvent {
    Updated(FieldSnapshot),
    LookupStarted { query: String },
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Purpose {
    Verify,
    Hint,
    Typeahead,
}

struct LookupReply {
    seq: u64,
    purpose: Purpose,
    result: Result<Vec<AddressCandidate>, LookupError>,
}

pub struct FieldSession<L> {
    field: AddressField,
    lookup: Arc<L>,
    typeahead: Debouncer,
    refresh: Debouncer,
    next_seq: u64,
    applied: HashMap<Purpose, u64>,
    reply_tx: mpsc::UnboundedSender<LookupReply>,
    reply_rx: mpsc::UnboundedReceiver<LookupReply>,
    event_tx: mpsc::UnboundedSender<FieldEvent>,
}

impl<L: AddressLookup + 'static> FieldSession<L> {
    pub fn new(
        field: AddressField,
        lookup: Arc<L>,
        debounce: &DebounceConfig,
        event_tx: mpsc::UnboundedSender<FieldEvent>,
    ) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        Self {
            field,
            lookup,
            typeahead: Debouncer::new(debounce.typeahead()),
            refresh: Debouncer::new(debounce.refresh()),
            next_seq: 0,
            applied: HashMap::new(),
            reply_tx,
            reply_rx,
            event_tx,
        }
    }

    /// Spawn the session on its own task
    pub fn spawn(self) -> (flume::Sender<FieldCommand>, JoinHandle<AddressField>) {
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let handle = tokio::spawn(self.run(cmd_rx));
        (cmd_tx, handle)
    }

    /// Process commands until `Close` or the sender is dropped, then hand the field back
    pub async fn run(mut self, cmd_rx: flume::Receiver<FieldCommand>) -> AddressField {
        info!(field = %self.field.kind(), "field session started");
        self.emit();

        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv_async() => match cmd {
                    Ok(FieldCommand::Close) | Err(_) => break,
                    Ok(cmd) => self.handle(cmd),
                },

                Some(reply) = self.reply_rx.recv() => self.apply_reply(reply),

                _ = self.typeahead.settled(), if self.typeahead.is_pending() => {
                    if let Some(query) = self.typeahead.take_ready() {
                        self.issue(Purpose::Typeahead, query);
                    }
                }

                _ = self.refresh.settled(), if self.refresh.is_pending() => {
                    if let Some(query) = self.refresh.take_ready() {
                        self.issue(Purpose::Hint, query);
                    }
                }
            }
        }

        info!(field = %self.field.kind(), "field session closed");
        let _ = self.event_tx.send(FieldEvent::Closed);
        self.field
    }

    fn handle(&mut self, cmd: FieldCommand) {
        match cmd {
            FieldCommand::Input(text) => {
                if text != self.field.text() {
                    // Replies for the old text must not land on the new one
                    self.mark_stale(&[Purpose::Verify, Purpose::Hint]);
                }
                match self.field.on_input(&text) {
                    Some(query) => self.typeahead.push(query),
                    None => self.typeahead.cancel(),
                }
            }
            FieldCommand::Parts(parts) => {
                if let Some(query) = self.field.set_parts(parts) {
                    self.refresh.push(query);
                }
            }
            FieldCommand::Verify => {
                self.refresh.cancel();
                match self.field.begin_verify() {
                    Some(query) => self.issue(Purpose::Verify, query),
                    None => debug!(field = %self.field.kind(), "verify rejected locally"),
                }
            }
            FieldCommand::Select(candidate) => {
                self.field.select_suggestion(candidate);
                self.after_selection();
            }
            FieldCommand::SelectIndex(index) => {
                if self.field.select_index(index) {
                    self.after_selection();
                }
            }
            FieldCommand::AcceptTopSuggestion => {
                if self.field.accept_top_suggestion() {
                    self.after_selection();
                }
            }
            FieldCommand::Close => {}
        }
        self.emit();
    }

    /// A pick settles the field; anything still in flight is now stale
    fn after_selection(&mut self) {
        self.typeahead.cancel();
        self.refresh.cancel();
        self.mark_stale(&[Purpose::Verify, Purpose::Hint, Purpose::Typeahead]);
    }

    /// Drop every reply already in flight for these purposes
    fn mark_stale(&mut self, purposes: &[Purpose]) {
        for purpose in purposes {
            self.applied.insert(*purpose, self.next_seq + 1);
        }
    }

    fn issue(&mut self, purpose: Purpose, query: String) {
        if self.lookup.is_rate_limited() {
            debug!(field = %self.field.kind(), ?purpose, "skipping lookup while rate limited");
            if purpose == Purpose::Verify {
                self.field.reject_rate_limited();
                self.emit();
            }
            return;
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let lookup = Arc::clone(&self.lookup);
        let reply_tx = self.reply_tx.clone();
        let _ = self.event_tx.send(FieldEvent::LookupStarted {
            query: query.clone(),
        });
        debug!(field = %self.field.kind(), seq, ?purpose, query = %query, "lookup issued");

        tokio::spawn(async move {
            let result = lookup.search(&query).await;
            let _ = reply_tx.send(LookupReply {
                seq,
                purpose,
                result,
            });
        });
    }

    fn apply_reply(&mut self, reply: LookupReply) {
        let last = self.applied.entry(reply.purpose).or_default();
        if reply.seq < *last {
            debug!(seq = reply.seq, last = *last, purpose = ?reply.purpose, "discarding stale reply");
            return;
        }
        *last = reply.seq;

        match reply.purpose {
            Purpose::Verify => {
                self.field.finish_verify(reply.result);
                if self.field.state().is_verified() {
                    self.typeahead.cancel();
                    self.mark_stale(&[Purpose::Typeahead]);
                }
            }
            Purpose::Hint => self.field.finish_hint(reply.result),
            Purpose::Typeahead => self.field.finish_suggestions(reply.result),
        }
        self.emit();
    }

    fn emit(&mut self) {
        self.field.set_rate_limited(self.lookup.is_rate_limited());
        let _ = self
            .event_tx
            .send(FieldEvent::Updated(self.field.snapshot()));
    }
}
