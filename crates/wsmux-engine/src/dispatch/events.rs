use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use wsmux_core::error::Result;
use wsmux_core::protocol::events::{ON_ANY_EVENT, ON_NATIVE_MESSAGE};
use wsmux_core::Message;

use crate::conn::NSConn;

/// `Ok(Some(body))` replies on the same namespace/room/event; `Ok(None)`
/// replies nothing (an empty ack for asks).
pub type HandlerResult = Result<Option<Bytes>>;

pub type Handler = Arc<dyn Fn(NSConn, Message) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Reply helper for handlers.
pub fn reply(body: impl Into<Bytes>) -> HandlerResult {
    Ok(Some(body.into()))
}

/// Event name -> handler for one namespace.
#[derive(Clone, Default)]
pub struct Events {
    handlers: HashMap<String, Handler>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn on<F, Fut>(mut self, event: impl Into<String>, f: F) -> Self
    where
        F: Fn(NSConn, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert(event, f);
        self
    }

    pub fn insert<F, Fut>(&mut self, event: impl Into<String>, f: F)
    where
        F: Fn(NSConn, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ns, msg| f(ns, msg).boxed());
        self.handlers.insert(event.into(), handler);
    }

    pub fn has(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `msg.event`: exact match, then `_OnAnyEvent`,
    /// otherwise nothing happens.
    pub async fn fire(&self, ns: NSConn, msg: Message) -> HandlerResult {
        let handler = self
            .handlers
            .get(&msg.event)
            .or_else(|| self.handlers.get(ON_ANY_EVENT))
            .cloned();
        match handler {
            Some(h) => h(ns, msg).await,
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for Events {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Events").field("events", &names).finish()
    }
}

/// Namespace -> events. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct Namespaces {
    inner: Arc<HashMap<String, Arc<Events>>>,
}

impl Namespaces {
    pub fn builder() -> NamespacesBuilder {
        NamespacesBuilder::default()
    }

    pub fn get(&self, namespace: &str) -> Option<Arc<Events>> {
        self.inner.get(namespace).cloned()
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.inner.contains_key(namespace)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.keys().cloned().collect();
        names.sort();
        names
    }

    /// Raw frames are accepted when the empty namespace handles
    /// `_OnNativeMessage`.
    pub fn allows_native(&self) -> bool {
        self.inner
            .get("")
            .is_some_and(|events| events.has(ON_NATIVE_MESSAGE))
    }

    /// Only the native namespace is registered; the connection-ID
    /// acknowledgement is skipped for such tables.
    pub fn only_native(&self) -> bool {
        self.inner.len() == 1 && self.allows_native()
    }
}

#[derive(Default)]
pub struct NamespacesBuilder {
    map: HashMap<String, Events>,
}

impl NamespacesBuilder {
    /// Register (or replace) a whole namespace.
    pub fn namespace(mut self, name: impl Into<String>, events: Events) -> Self {
        self.map.insert(name.into(), events);
        self
    }

    /// Register a single handler, creating the namespace on first use.
    pub fn on<F, Fut>(mut self, namespace: impl Into<String>, event: impl Into<String>, f: F) -> Self
    where
        F: Fn(NSConn, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.map.entry(namespace.into()).or_default().insert(event, f);
        self
    }

    pub fn build(self) -> Namespaces {
        Namespaces {
            inner: Arc::new(
                self.map
                    .into_iter()
                    .map(|(name, events)| (name, Arc::new(events)))
                    .collect(),
            ),
        }
    }
}
