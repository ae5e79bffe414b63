//! Foreground/background messaging and the system surfaces the worker
//! drives.
//!
//! A foreground session connects a [`NotificationBridge`] to the worker.
//! The bridge sends `show-alarm` when the zone is entered and receives
//! `stop-alarm` when the user presses "stop" on the notification. Every
//! message travels over tokio mpsc channels, so delivery is FIFO per
//! channel and no state is shared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use whereclock_core::{BridgeMessage, NotificationRequest};

use crate::error::NotifyError;
use crate::worker::WorkerHandle;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one connected foreground context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// System notification surface.
pub trait Notifier: Send {
    fn show(&mut self, request: &NotificationRequest) -> Result<(), NotifyError>;
    /// Dismiss the notification with `tag`, if shown.
    fn close(&mut self, tag: &str);
}

/// Window management for notification clicks.
pub trait WindowHost: Send {
    /// Bring a client's window to the front. Returns false if it is gone.
    fn focus(&mut self, client: ClientId) -> bool;
    fn open(&mut self, url: &str);
}

/// Connected foreground clients, in connection order.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Vec<(ClientId, UnboundedSender<BridgeMessage>)>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, client: ClientId, sender: UnboundedSender<BridgeMessage>) {
        self.clients.retain(|(id, _)| *id != client);
        self.clients.push((client, sender));
    }

    pub fn disconnect(&mut self, client: ClientId) {
        self.clients.retain(|(id, _)| *id != client);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn first(&self) -> Option<ClientId> {
        self.clients.first().map(|(id, _)| *id)
    }

    /// Send to every client, dropping those whose receiver is gone.
    /// Returns how many received the message.
    pub fn broadcast(&mut self, message: BridgeMessage) -> usize {
        self.clients.retain(|(id, tx)| {
            let delivered = tx.send(message).is_ok();
            if !delivered {
                debug!("[ClientRegistry] Pruned closed client {:?}", id);
            }
            delivered
        });
        self.clients.len()
    }
}

/// Foreground end of the bridge.
#[derive(Debug)]
pub struct NotificationBridge {
    client: ClientId,
    worker: WorkerHandle,
    inbox: UnboundedReceiver<BridgeMessage>,
}

impl NotificationBridge {
    /// Register a new client with the worker.
    pub fn connect(worker: &WorkerHandle) -> Self {
        let client = ClientId::next();
        let (tx, inbox) = mpsc::unbounded_channel();
        if worker.connect(client, tx).is_err() {
            warn!("[NotificationBridge] Worker not running; client {:?} will not receive messages", client);
        }
        Self {
            client,
            worker: worker.clone(),
            inbox,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client
    }

    /// Ask the worker to raise the alarm notification. Fire-and-forget.
    pub fn notify(&self) {
        if self.worker.post(self.client, BridgeMessage::ShowAlarm).is_err() {
            warn!("[NotificationBridge] Worker not running; alarm notification dropped");
        }
    }

    /// Next message from the worker. `None` once the worker is gone.
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.inbox.recv().await
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        let _ = self.worker.disconnect(self.client);
    }
}

/// What a [`MemoryNotifier`] or [`MemoryWindowHost`] was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Show(NotificationRequest),
    Close(String),
    Focus(ClientId),
    Open(String),
}

#[derive(Debug, Clone, Default)]
struct CallLog(Arc<Mutex<Vec<SurfaceCall>>>);

impl CallLog {
    fn lock(&self) -> MutexGuard<'_, Vec<SurfaceCall>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Notifier that records calls instead of showing anything. Clones share
/// the log.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    calls: CallLog,
    denied: bool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose permission was refused.
    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }

    pub fn shown(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Show(_)))
            .count()
    }
}

impl Notifier for MemoryNotifier {
    fn show(&mut self, request: &NotificationRequest) -> Result<(), NotifyError> {
        if self.denied {
            return Err(NotifyError::PermissionDenied);
        }
        self.calls.lock().push(SurfaceCall::Show(request.clone()));
        Ok(())
    }

    fn close(&mut self, tag: &str) {
        self.calls.lock().push(SurfaceCall::Close(tag.to_string()));
    }
}

/// Window host that records calls. `focus` succeeds for any client unless
/// built with [`MemoryWindowHost::without_windows`].
#[derive(Debug, Clone)]
pub struct MemoryWindowHost {
    calls: CallLog,
    has_windows: bool,
}

impl Default for MemoryWindowHost {
    fn default() -> Self {
        Self {
            calls: CallLog::default(),
            has_windows: true,
        }
    }
}

impl MemoryWindowHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_windows() -> Self {
        Self {
            has_windows: false,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }
}

impl WindowHost for MemoryWindowHost {
    fn focus(&mut self, client: ClientId) -> bool {
        if self.has_windows {
            self.calls.lock().push(SurfaceCall::Focus(client));
        }
        self.has_windows
    }

    fn open(&mut self, url: &str) {
        self.calls.lock().push(SurfaceCall::Open(url.to_string()));
    }
}
