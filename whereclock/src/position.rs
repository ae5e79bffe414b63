//! Position streams.
//!
//! A [`PositionSource`] hands out independent subscriptions; each one is an
//! unbounded channel of samples in delivery order. Dropping the receiver
//! cancels the subscription.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use whereclock_core::{GpsPoint, PositionError, PositionSample};

pub trait PositionSource: Send + Sync {
    fn subscribe(&self) -> UnboundedReceiver<PositionSample>;
}

/// Fan-out feed: every pushed sample goes to every live subscriber.
/// Platform glue pushes fixes in; tests push them by hand.
#[derive(Debug, Clone, Default)]
pub struct PositionFeed {
    subscribers: Arc<Mutex<Vec<UnboundedSender<PositionSample>>>>,
}

impl PositionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: PositionSample) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(sample).is_ok());
    }

    pub fn push_fix(&self, latitude: f64, longitude: f64) {
        self.push(Ok(GpsPoint::new(latitude, longitude)));
    }

    pub fn push_error(&self, error: PositionError) {
        self.push(Err(error));
    }

    /// Live subscriptions, after pruning closed ones on the last push.
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UnboundedSender<PositionSample>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PositionSource for PositionFeed {
    fn subscribe(&self) -> UnboundedReceiver<PositionSample> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock();
        subscribers.push(tx);
        debug!("[PositionFeed] {} subscribers", subscribers.len());
        rx
    }
}
