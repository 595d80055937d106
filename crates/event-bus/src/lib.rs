//! Lightweight event bus for progress streaming.
//!
//! Publishing is synchronous and never blocks, so the bus can be driven from
//! async tasks and plain threads alike. Subscribers receive a
//! `broadcast::Receiver`, which supports both `recv().await` and
//! `blocking_recv()`.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("bus closed")]
    Closed,
}

pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Publish an event; returns the number of subscribers that will see it.
    /// Publishing with no subscribers is not an error.
    fn publish(&self, event: E) -> usize;

    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Simple in-memory bus backed by a tokio broadcast channel.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("event published without subscribers");
                0
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Bus that drops everything; used when nobody listens.
pub struct NullBus;

impl<E> EventBus<E> for NullBus
where
    E: Event,
{
    fn publish(&self, _event: E) -> usize {
        0
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        let (sender, receiver) = broadcast::channel(1);
        drop(sender);
        receiver
    }
}

/// Materialise an mpsc receiver from a bus subscription so callers can
/// await events without handling broadcast lag semantics directly.
///
/// Must be called from within a tokio runtime.
pub fn to_mpsc<E>(bus: Arc<dyn EventBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "mpsc bridge lagged behind bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}

/// Drain whatever is currently buffered on a receiver without waiting.
pub fn drain<E>(rx: &mut broadcast::Receiver<E>) -> Result<Vec<E>, BusError>
where
    E: Event,
{
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Empty) => return Ok(out),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(broadcast::error::TryRecvError::Closed) => {
                return if out.is_empty() {
                    Err(BusError::Closed)
                } else {
                    Ok(out)
                };
            }
        }
    }
}
