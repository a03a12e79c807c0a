#![allow(dead_code)]

pub mod mock_server;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use spoolmail_delivery::{Session, Transport};
use spoolmail_smtp::{ClientError, Response};
use spoolmail_store::{EmailRecord, Filter, MemoryQueueStore, NewEmail, QueueStore, StoreError};

/// How the scripted relay answers one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Accept,
    /// Refuse with this status code
    Code(u16),
    Timeout,
    ConnectionLost,
}

impl Reply {
    fn into_result(self) -> Result<Response, ClientError> {
        match self {
            Self::Accept => Ok(Response::new(250, vec!["OK".to_string()])),
            Self::Code(code) => Err(ClientError::from_reply(Response::new(
                code,
                vec!["scripted".to_string()],
            ))),
            Self::Timeout => Err(ClientError::Timeout("DATA")),
            Self::ConnectionLost => Err(ClientError::ConnectionClosed),
        }
    }
}

/// What the engine asked the relay to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    Send(String),
    Reset,
    Close,
}

#[derive(Default)]
struct Script {
    opens: VecDeque<Reply>,
    sends: VecDeque<Reply>,
    events: Vec<Event>,
}

/// In-process relay answering from a script; accepts everything once the
/// script runs out
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next session opens with `replies`
    pub fn opens(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.lock().unwrap().opens.extend(replies);
        self
    }

    /// Answer the next sends with `replies`
    pub fn sends(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.lock().unwrap().sends.extend(replies);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.script.lock().unwrap().events.clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    fn record(&self, event: Event) {
        self.script.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self) -> Result<Box<dyn Session>, ClientError> {
        self.record(Event::Open);
        let reply = self.script.lock().unwrap().opens.pop_front();
        reply.unwrap_or(Reply::Accept).into_result()?;
        Ok(Box::new(ScriptedSession {
            transport: self.clone(),
        }))
    }
}

struct ScriptedSession {
    transport: ScriptedTransport,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn send(
        &mut self,
        _message: &str,
        _from: &str,
        to: &str,
    ) -> Result<Response, ClientError> {
        self.transport.record(Event::Send(to.to_string()));
        let reply = self.transport.script.lock().unwrap().sends.pop_front();
        reply.unwrap_or(Reply::Accept).into_result()
    }

    async fn reset(&mut self) -> Result<(), ClientError> {
        self.transport.record(Event::Reset);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), ClientError> {
        self.transport.record(Event::Close);
        Ok(())
    }
}

/// `user{n}@example.com`
pub fn recipient(n: usize) -> String {
    format!("user{n}@example.com")
}

/// A store holding `count` fresh emails addressed to `recipient(1..=count)`
pub async fn seeded_store(count: usize) -> Arc<MemoryQueueStore> {
    let store = Arc::new(MemoryQueueStore::new());
    for n in 1..=count {
        store
            .create(NewEmail {
                mail: format!("From: sender@example.com\r\nTo: {}\r\n\r\nHello\r\n", recipient(n)),
                from_address: "sender@example.com".to_string(),
                to_address: recipient(n),
                created_on: chrono::Utc::now().timestamp(),
            })
            .await
            .unwrap();
    }
    store
}

pub async fn all(store: &MemoryQueueStore) -> Vec<EmailRecord> {
    store
        .find(&Filter::All, None)
        .await
        .unwrap()
}

/// Memory store whose writes can be made to fail, remembering which ids the
/// engine tried to save
#[derive(Debug, Clone)]
pub struct FlakyStore {
    inner: MemoryQueueStore,
    failing_save: bool,
    failing_destroy: bool,
    saved: Arc<Mutex<Vec<i64>>>,
}

impl FlakyStore {
    /// Share the records of `inner`
    pub fn new(inner: &MemoryQueueStore) -> Self {
        Self {
            inner: inner.clone(),
            failing_save: false,
            failing_destroy: false,
            saved: Arc::default(),
        }
    }

    pub const fn failing_save(mut self) -> Self {
        self.failing_save = true;
        self
    }

    pub const fn failing_destroy(mut self) -> Self {
        self.failing_destroy = true;
        self
    }

    /// Ids passed to `save`, whether or not it failed
    pub fn saved(&self) -> Vec<i64> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueStore for FlakyStore {
    async fn create(&self, email: NewEmail) -> spoolmail_store::Result<EmailRecord> {
        self.inner.create(email).await
    }

    async fn find(
        &self,
        filter: &Filter,
        limit: Option<usize>,
    ) -> spoolmail_store::Result<Vec<EmailRecord>> {
        self.inner.find(filter, limit).await
    }

    async fn destroy_all(&self, filter: &Filter) -> spoolmail_store::Result<Vec<EmailRecord>> {
        self.inner.destroy_all(filter).await
    }

    async fn destroy(&self, email: &EmailRecord) -> spoolmail_store::Result<()> {
        if self.failing_destroy {
            return Err(StoreError::Internal("disk full".to_string()));
        }
        self.inner.destroy(email).await
    }

    async fn save(&self, email: &EmailRecord) -> spoolmail_store::Result<()> {
        self.saved.lock().unwrap().push(email.id);
        if self.failing_save {
            return Err(StoreError::Internal("database is locked".to_string()));
        }
        self.inner.save(email).await
    }
}
