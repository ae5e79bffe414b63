//! The background worker.
//!
//! A single tokio task owns the caches, the notifier and the connected
//! clients, and handles [`WorkerEvent`]s in arrival order. Network round
//! trips (fetch misses and shell downloads) are parked in a
//! `FuturesUnordered` polled next to the inbox, so bridge messages and
//! notification clicks never wait behind a slow server. Their results come
//! back to the loop, which is the only place the cache storage is touched.
//!
//! Other contexts talk to the worker through a cloneable [`WorkerHandle`].
//! The task ends once every handle is dropped and in-flight requests have
//! been answered.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use whereclock_core::protocol::ALARM_NOTIFICATION_TAG;
use whereclock_core::{BridgeMessage, NotificationInteraction, NotificationRequest};

use crate::bridge::{ClientId, ClientRegistry, Notifier, WindowHost};
use crate::cache::CacheStorage;
use crate::config::AppConfig;
use crate::error::{AppError, NetworkError, NotifyError, Result};
use crate::http::{Network, Request, Response};
use crate::router::FetchRouter;

/// URL opened when a notification is clicked and no window is open.
pub const APP_ROOT: &str = "/";

#[derive(Debug)]
pub enum WorkerEvent {
    Install {
        reply: oneshot::Sender<Result<usize>>,
    },
    Activate {
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
    Fetch {
        request: Request,
        reply: oneshot::Sender<Result<Response>>,
    },
    Message {
        from: ClientId,
        message: BridgeMessage,
    },
    Notification(NotificationInteraction),
    Connect {
        client: ClientId,
        sender: UnboundedSender<BridgeMessage>,
    },
    Disconnect(ClientId),
}

#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
    fn send(&self, event: WorkerEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| AppError::WorkerGone)
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> WorkerEvent) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| AppError::WorkerGone)?
    }

    /// Download and store the app shell.
    pub async fn install(&self) -> Result<usize> {
        self.call(|reply| WorkerEvent::Install { reply }).await
    }

    /// Remove caches left behind by older shell versions.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.call(|reply| WorkerEvent::Activate { reply }).await
    }

    /// Answer an intercepted request.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        self.call(|reply| WorkerEvent::Fetch { request, reply }).await
    }

    pub fn post(&self, from: ClientId, message: BridgeMessage) -> Result<()> {
        self.send(WorkerEvent::Message { from, message })
    }

    /// Report a click or action on the alarm notification.
    pub fn notification_interaction(&self, interaction: NotificationInteraction) -> Result<()> {
        self.send(WorkerEvent::Notification(interaction))
    }

    pub fn connect(&self, client: ClientId, sender: UnboundedSender<BridgeMessage>) -> Result<()> {
        self.send(WorkerEvent::Connect { client, sender })
    }

    pub fn disconnect(&self, client: ClientId) -> Result<()> {
        self.send(WorkerEvent::Disconnect(client))
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// A network round trip that has finished and needs the loop to finish it.
enum Landed {
    Fetch {
        request: Request,
        reply: oneshot::Sender<Result<Response>>,
        outcome: std::result::Result<Response, NetworkError>,
    },
    Install {
        reply: oneshot::Sender<Result<usize>>,
        outcome: Result<Vec<(String, Response)>>,
    },
}

pub struct Worker<N> {
    router: FetchRouter,
    network: Arc<N>,
    notifier: Box<dyn Notifier>,
    windows: Box<dyn WindowHost>,
    clients: ClientRegistry,
    inbox: UnboundedReceiver<WorkerEvent>,
    in_flight: FuturesUnordered<BoxFuture<'static, Landed>>,
}

impl<N: Network + 'static> Worker<N> {
    /// Spawn the worker task on the current runtime.
    pub fn spawn(
        router: FetchRouter,
        network: N,
        notifier: Box<dyn Notifier>,
        windows: Box<dyn WindowHost>,
    ) -> (WorkerHandle, JoinHandle<()>) {
        crate::init_logging();
        let (tx, inbox) = mpsc::unbounded_channel();
        let worker = Self {
            router,
            network: Arc::new(network),
            notifier,
            windows,
            clients: ClientRegistry::new(),
            inbox,
            in_flight: FuturesUnordered::new(),
        };
        let task = tokio::spawn(worker.run());
        (WorkerHandle { tx }, task)
    }

    /// Open the cache database named in `config` and spawn.
    pub fn start(
        config: &AppConfig,
        network: N,
        notifier: Box<dyn Notifier>,
        windows: Box<dyn WindowHost>,
    ) -> Result<(WorkerHandle, JoinHandle<()>)> {
        let storage = CacheStorage::new(&config.db_path)?;
        let router = FetchRouter::new(config, storage)?;
        Ok(Self::spawn(router, network, notifier, windows))
    }

    async fn run(mut self) {
        info!("[Worker] Started");
        let mut open = true;
        loop {
            tokio::select! {
                Some(landed) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.land(landed);
                }
                event = self.inbox.recv(), if open => match event {
                    Some(event) => self.handle(event),
                    None => open = false,
                },
                else => break,
            }
        }
        info!("[Worker] Stopped");
    }

    fn handle(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Install { reply } => {
                let shell = self.router.shell().clone();
                let network = Arc::clone(&self.network);
                self.in_flight.push(
                    async move {
                        let outcome = shell.download(network.as_ref()).await;
                        Landed::Install { reply, outcome }
                    }
                    .boxed(),
                );
            }
            WorkerEvent::Activate { reply } => {
                let _ = reply.send(self.router.activate());
            }
            WorkerEvent::Fetch { request, reply } => match self.router.lookup(&request) {
                Ok(Some(cached)) => {
                    let _ = reply.send(Ok(cached));
                }
                Ok(None) => {
                    let network = Arc::clone(&self.network);
                    self.in_flight.push(
                        async move {
                            let outcome = network.fetch(&request).await;
                            Landed::Fetch { request, reply, outcome }
                        }
                        .boxed(),
                    );
                }
                Err(e) => {
                    warn!("[Worker] cache lookup for {} failed: {}", request.url, e);
                    let _ = reply.send(Err(e));
                }
            },
            WorkerEvent::Message { from, message } => self.on_message(from, message),
            WorkerEvent::Notification(interaction) => self.on_interaction(interaction),
            WorkerEvent::Connect { client, sender } => {
                self.clients.connect(client, sender);
                debug!("[Worker] Client {:?} connected ({} total)", client, self.clients.len());
            }
            WorkerEvent::Disconnect(client) => self.clients.disconnect(client),
        }
    }

    fn land(&mut self, landed: Landed) {
        match landed {
            Landed::Fetch {
                request,
                reply,
                outcome,
            } => {
                let result = self.router.complete(&request, outcome);
                if let Err(e) = &result {
                    debug!("[Worker] fetch {} failed: {}", request.url, e);
                }
                let _ = reply.send(result);
            }
            Landed::Install { reply, outcome } => {
                let result = outcome.and_then(|entries| self.router.commit_install(&entries));
                let _ = reply.send(result);
            }
        }
    }

    fn on_message(&mut self, from: ClientId, message: BridgeMessage) {
        match message {
            BridgeMessage::ShowAlarm => match self.notifier.show(&NotificationRequest::alarm()) {
                Ok(()) => info!("[Worker] Alarm notification shown for {:?}", from),
                Err(NotifyError::PermissionDenied) => {
                    warn!("[Worker] Notification permission denied; alarm not shown")
                }
                Err(e) => warn!("[Worker] {}", e),
            },
            BridgeMessage::StopAlarm => {
                debug!("[Worker] Ignoring stop-alarm from client {:?}", from);
            }
        }
    }

    fn on_interaction(&mut self, interaction: NotificationInteraction) {
        self.notifier.close(ALARM_NOTIFICATION_TAG);

        if interaction.is_stop() {
            let delivered = self.clients.broadcast(BridgeMessage::StopAlarm);
            info!("[Worker] Stop pressed; notified {} clients", delivered);
            return;
        }

        let focused = self
            .clients
            .first()
            .is_some_and(|client| self.windows.focus(client));
        if !focused {
            self.windows.open(APP_ROOT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{MemoryNotifier, MemoryWindowHost, NotificationBridge, SurfaceCall};
    use crate::http::MemoryNetwork;
    use std::time::Duration;
    use tokio::time::Instant;
    use whereclock_core::protocol::STOP_ACTION;

    fn spawn(notifier: MemoryNotifier, windows: MemoryWindowHost) -> WorkerHandle {
        let router = FetchRouter::new(&AppConfig::default(), CacheStorage::in_memory().unwrap()).unwrap();
        let (handle, _task) = Worker::spawn(router, MemoryNetwork::new(), Box::new(notifier), Box::new(windows));
        handle
    }

    #[tokio::test]
    async fn test_show_alarm_raises_notification() {
        let notifier = MemoryNotifier::new();
        let worker = spawn(notifier.clone(), MemoryWindowHost::new());
        let bridge = NotificationBridge::connect(&worker);

        bridge.notify();
        bridge.notify();
        // Round-trip through the inbox so both messages are handled
        worker.activate().await.unwrap();

        assert_eq!(notifier.shown(), 2);
        match &notifier.calls()[0] {
            SurfaceCall::Show(n) => {
                assert_eq!(n.tag, ALARM_NOTIFICATION_TAG);
                assert_eq!(n.vibrate, vec![300, 100, 300]);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permission_denied_is_not_fatal() {
        let worker = spawn(MemoryNotifier::denied(), MemoryWindowHost::new());
        let bridge = NotificationBridge::connect(&worker);
        bridge.notify();
        assert!(worker.activate().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_action_broadcasts() {
        let notifier = MemoryNotifier::new();
        let worker = spawn(notifier.clone(), MemoryWindowHost::new());
        let mut a = NotificationBridge::connect(&worker);
        let mut b = NotificationBridge::connect(&worker);

        worker
            .notification_interaction(NotificationInteraction::Action(STOP_ACTION.to_string()))
            .unwrap();

        assert_eq!(a.recv().await, Some(BridgeMessage::StopAlarm));
        assert_eq!(b.recv().await, Some(BridgeMessage::StopAlarm));
        assert_eq!(
            notifier.calls(),
            vec![SurfaceCall::Close(ALARM_NOTIFICATION_TAG.to_string())]
        );
    }

    #[tokio::test]
    async fn test_click_focuses_first_client() {
        let windows = MemoryWindowHost::new();
        let worker = spawn(MemoryNotifier::new(), windows.clone());
        let bridge = NotificationBridge::connect(&worker);

        worker.notification_interaction(NotificationInteraction::Click).unwrap();
        worker.activate().await.unwrap();

        assert_eq!(windows.calls(), vec![SurfaceCall::Focus(bridge.client_id())]);
    }

    #[tokio::test]
    async fn test_click_without_clients_opens_app() {
        let windows = MemoryWindowHost::new();
        let worker = spawn(MemoryNotifier::new(), windows.clone());

        worker.notification_interaction(NotificationInteraction::Click).unwrap();
        worker.activate().await.unwrap();

        assert_eq!(windows.calls(), vec![SurfaceCall::Open(APP_ROOT.to_string())]);
    }

    /// Answers every request, but only after `delay`.
    struct SlowNetwork {
        delay: Duration,
    }

    impl Network for SlowNetwork {
        async fn fetch(&self, _request: &Request) -> std::result::Result<Response, NetworkError> {
            tokio::time::sleep(self.delay).await;
            Ok(Response::ok("late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_does_not_delay_notification() {
        let notifier = MemoryNotifier::new();
        let router = FetchRouter::new(&AppConfig::default(), CacheStorage::in_memory().unwrap()).unwrap();
        let (worker, _task) = Worker::spawn(
            router,
            SlowNetwork {
                delay: Duration::from_secs(30),
            },
            Box::new(notifier.clone()),
            Box::new(MemoryWindowHost::new()),
        );
        let bridge = NotificationBridge::connect(&worker);
        let start = Instant::now();

        let fetcher = worker.clone();
        let tile = tokio::spawn(async move {
            let request = Request::get("https://a.tile.openstreetmap.org/9/1/1.png".parse().unwrap());
            fetcher.fetch(request).await
        });
        // Let the fetch reach the inbox first
        tokio::task::yield_now().await;

        bridge.notify();
        worker.activate().await.unwrap();
        assert_eq!(notifier.shown(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!tile.is_finished());

        // The tile still arrives, and is cached for next time
        assert_eq!(tile.await.unwrap().unwrap().body, b"late");
        assert!(start.elapsed() >= Duration::from_secs(30));
        let again = Instant::now();
        let request = Request::get("https://a.tile.openstreetmap.org/9/1/1.png".parse().unwrap());
        assert_eq!(worker.fetch(request).await.unwrap().body, b"late");
        assert!(again.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stops_when_handles_dropped() {
        let router = FetchRouter::new(&AppConfig::default(), CacheStorage::in_memory().unwrap()).unwrap();
        let (handle, task) = Worker::spawn(
            router,
            MemoryNetwork::new(),
            Box::new(MemoryNotifier::new()),
            Box::new(MemoryWindowHost::new()),
        );
        drop(handle);
        task.await.unwrap();
    }
}
