//! Single-owner store task.
//!
//! The [`AggregationStore`] lives on one tokio task. Every merge and every
//! read is a [`StoreCommand`] sent over an mpsc channel and runs to completion
//! on that task, so merges never interleave and reads always see a whole merge.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{ReqlensError, Result};
use crate::query::RecordQuery;

use super::event::TelemetryEvent;
use super::store::{AggregationStore, ChangeNotification, MergeOutcome};

/// Default depth of the command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 4096;

type StoreJob = Box<dyn FnOnce(&mut AggregationStore) + Send>;

enum StoreCommand {
    Merge {
        event: TelemetryEvent,
        respond: Option<oneshot::Sender<MergeOutcome>>,
    },
    Run(StoreJob),
}

/// Owns the store and drains commands until every handle is dropped.
pub struct StoreService {
    store: AggregationStore,
    commands: mpsc::Receiver<StoreCommand>,
}

impl StoreService {
    /// Spawn the service task and return a handle to it.
    pub fn spawn(store: AggregationStore, command_capacity: usize) -> (StoreHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(command_capacity.max(1));
        let handle = StoreHandle {
            commands: tx,
            notifier: store.notifier(),
        };
        let service = StoreService { store, commands: rx };
        let task = tokio::spawn(service.run());
        (handle, task)
    }

    async fn run(mut self) {
        info!("Store service started");
        while let Some(command) = self.commands.recv().await {
            match command {
                StoreCommand::Merge { event, respond } => {
                    let outcome = self.store.merge_event(event);
                    if let Some(respond) = respond {
                        let _ = respond.send(outcome);
                    }
                }
                StoreCommand::Run(job) => job(&mut self.store),
            }
        }
        debug!(records = self.store.len(), "Store service stopped");
    }
}

/// Cloneable handle to the store task.
#[derive(Clone)]
pub struct StoreHandle {
    commands: mpsc::Sender<StoreCommand>,
    notifier: broadcast::Sender<ChangeNotification>,
}

impl StoreHandle {
    /// Merge an event and wait for the outcome.
    pub async fn merge(&self, event: TelemetryEvent) -> Result<MergeOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::Merge {
            event,
            respond: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| ReqlensError::store_unavailable())
    }

    /// Queue an event without waiting for the merge.
    ///
    /// Events submitted from one task are merged in submission order.
    pub async fn submit(&self, event: TelemetryEvent) -> Result<()> {
        self.send(StoreCommand::Merge { event, respond: None }).await
    }

    /// Run `f` against the store on the service task.
    pub async fn with_store<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut AggregationStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: StoreJob = Box::new(move |store| {
            let _ = tx.send(f(store));
        });
        self.send(StoreCommand::Run(job)).await?;
        rx.await.map_err(|_| ReqlensError::store_unavailable())
    }

    /// Run a read-only projection.
    pub async fn read<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(RecordQuery<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.with_store(move |store| f(RecordQuery::new(store))).await
    }

    pub async fn hide(&self, request_id: impl Into<String>) -> Result<bool> {
        let request_id = request_id.into();
        self.with_store(move |store| store.hide(&request_id)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.with_store(|store| store.clear()).await
    }

    pub async fn len(&self) -> Result<usize> {
        self.with_store(|store| store.len()).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notifier.subscribe()
    }

    async fn send(&self, command: StoreCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ReqlensError::store_unavailable())
    }
}
