//! In-process mailbox fake for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use msgcenter_api::{Credentials, Error, Listing, MailboxApi, MessageId, Mutation, RemoteMessage, Result};
use tokio::sync::Semaphore;

/// What the next list call returns.
#[derive(Debug, Clone)]
pub enum ListReply {
    Listing(Listing),
    Unauthorized,
    Transient,
}

/// How mutation calls are answered.
#[derive(Debug, Clone)]
pub enum AckMode {
    All,
    Only(Vec<MessageId>),
    Reject,
    /// Rejects any request naming one of these IDs.
    RejectAny(Vec<MessageId>),
    Transient,
}

#[derive(Debug)]
pub struct FakeApi {
    replies: Mutex<VecDeque<ListReply>>,
    fallback: Mutex<ListReply>,
    ack: Mutex<AckMode>,
    ack_for: Mutex<HashMap<Mutation, AckMode>>,
    gate: Option<Arc<Semaphore>>,
    mutation_gate: Mutex<Option<(Mutation, Arc<Semaphore>)>>,
    pub list_calls: AtomicUsize,
    pub seen_since: Mutex<Vec<Option<String>>>,
    pub mutations: Mutex<Vec<(Mutation, Vec<MessageId>)>>,
}

impl FakeApi {
    pub fn new(listing: Listing) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(ListReply::Listing(listing)),
            ack: Mutex::new(AckMode::All),
            ack_for: Mutex::new(HashMap::new()),
            gate: None,
            mutation_gate: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            seen_since: Mutex::new(Vec::new()),
            mutations: Mutex::new(Vec::new()),
        }
    }

    /// List calls wait for a permit on `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_listing(&self, listing: Listing) {
        *self.fallback.lock().unwrap() = ListReply::Listing(listing);
    }

    pub fn push_reply(&self, reply: ListReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Answers every mutation with `mode`, dropping per-mutation overrides.
    pub fn set_ack(&self, mode: AckMode) {
        *self.ack.lock().unwrap() = mode;
        self.ack_for.lock().unwrap().clear();
    }

    pub fn set_ack_for(&self, mutation: Mutation, mode: AckMode) {
        self.ack_for.lock().unwrap().insert(mutation, mode);
    }

    /// Calls for `mutation` are logged, then wait for a permit on `gate`.
    pub fn gate_mutation(&self, mutation: Mutation, gate: Arc<Semaphore>) {
        *self.mutation_gate.lock().unwrap() = Some((mutation, gate));
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_log(&self) -> Vec<(Mutation, Vec<MessageId>)> {
        self.mutations.lock().unwrap().clone()
    }

    async fn mutate(&self, mutation: Mutation, ids: &[MessageId]) -> Result<Vec<MessageId>> {
        self.mutations.lock().unwrap().push((mutation, ids.to_vec()));
        let gate = self
            .mutation_gate
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(gated, _)| *gated == mutation)
            .map(|(_, gate)| Arc::clone(gate));
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let mode = self
            .ack_for
            .lock()
            .unwrap()
            .get(&mutation)
            .cloned()
            .unwrap_or_else(|| self.ack.lock().unwrap().clone());
        let rejected = Error::Rejected {
            status: 400,
            body: "unknown message".to_string(),
        };
        match mode {
            AckMode::All => Ok(ids.to_vec()),
            AckMode::Only(only) => Ok(ids.iter().filter(|id| only.contains(id)).cloned().collect()),
            AckMode::Reject => Err(rejected),
            AckMode::RejectAny(refused) if ids.iter().any(|id| refused.contains(id)) => Err(rejected),
            AckMode::RejectAny(_) => Ok(ids.to_vec()),
            AckMode::Transient => Err(Error::Transient("connection reset".to_string())),
        }
    }
}

impl MailboxApi for FakeApi {
    async fn list_messages(&self, _credentials: &Credentials, since: Option<&str>) -> Result<Listing> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_since.lock().unwrap().push(since.map(str::to_string));
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        match reply {
            ListReply::Listing(listing) => Ok(listing),
            ListReply::Unauthorized => Err(Error::Unauthorized { status: 401 }),
            ListReply::Transient => Err(Error::Transient("service unavailable".to_string())),
        }
    }

    async fn mark_read(&self, _credentials: &Credentials, ids: &[MessageId]) -> Result<Vec<MessageId>> {
        self.mutate(Mutation::MarkRead, ids).await
    }

    async fn delete(&self, _credentials: &Credentials, ids: &[MessageId]) -> Result<Vec<MessageId>> {
        self.mutate(Mutation::Delete, ids).await
    }
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 24, 10, minute, 0).unwrap()
}

pub fn remote(id: &str, minute: u32) -> RemoteMessage {
    RemoteMessage {
        id: MessageId::from(id),
        created_at: at(minute),
        expires_at: None,
        is_read: false,
        is_deleted: false,
        body_ref: format!("https://inbox.example.com/body/{id}"),
        title: Some(format!("Message {id}")),
        extra: std::collections::BTreeMap::new(),
    }
}

pub fn full(messages: Vec<RemoteMessage>) -> Listing {
    Listing::full(messages, None)
}

pub fn credentials(user: &str) -> Credentials {
    Credentials::new(user, "secret", "channel-1")
}
