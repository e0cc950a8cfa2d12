//! Job kind -> handler table.
//!
//! Payloads are decoded before the handler future is built, so a bad payload
//! is reported as [`DispatchError::InvalidPayload`] instead of a handler failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::model::JobKind;

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

type BoxedHandler<D> =
    Box<dyn Fn(&str, Arc<D>) -> Result<HandlerFuture, serde_json::Error> + Send + Sync>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown job kind: {0}")]
    UnknownKind(String),
    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub struct JobRegistry<D> {
    handlers: HashMap<JobKind, BoxedHandler<D>>,
}

impl<D> Default for JobRegistry<D> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<D: Send + Sync + 'static> JobRegistry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`; the payload is decoded as `P`.
    pub fn register<P, F, Fut>(&mut self, kind: JobKind, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, Arc<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler<D> = Box::new(
            move |payload: &str, deps: Arc<D>| -> Result<HandlerFuture, serde_json::Error> {
                let decoded: P = serde_json::from_str(payload)?;
                let fut: HandlerFuture = Box::pin(handler(decoded, deps));
                Ok(fut)
            },
        );
        self.handlers.insert(kind, boxed);
    }

    pub fn is_registered(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Resolve and decode a stored job into a runnable future.
    pub fn prepare(
        &self,
        kind: &str,
        payload: &str,
        deps: Arc<D>,
    ) -> Result<HandlerFuture, DispatchError> {
        let job_kind =
            JobKind::parse_kind(kind).ok_or_else(|| DispatchError::UnknownKind(kind.to_string()))?;
        let handler = self
            .handlers
            .get(&job_kind)
            .ok_or_else(|| DispatchError::UnknownKind(kind.to_string()))?;
        handler(payload, deps).map_err(|source| DispatchError::InvalidPayload {
            kind: job_kind.as_str(),
            source,
        })
    }
}
