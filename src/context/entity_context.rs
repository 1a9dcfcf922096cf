use log::{debug, warn};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::codec::{Entity, Patch, PatchMode};
use crate::error::{Error, Result};
use crate::model::Id;
use crate::store::EntityCollection;

/// Lifecycle of an editing session.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextState {
    Uninitialized,
    /// Connected, waiting for the first committed value.
    Loading,
    /// Has a committed value (possibly `None` for a record not yet created).
    Ready,
    /// The initial value could not be loaded.
    LoadFailed(Error),
    Destroyed,
}

/// Where a context gets its initial committed value from.
pub enum ContextSource<E> {
    /// A known value; `None` starts a session for a record to be created.
    Value(Option<E>),
    /// Load by id through the collection.
    Fetch(Id),
    /// Every received value replaces the committed one, e.g. on route changes.
    Stream(mpsc::Receiver<Option<E>>),
}

pub(crate) type PatchBuilder<E> =
    Box<dyn FnOnce(Option<&E>) -> Result<<E as Entity>::Patch> + Send>;

/// Runs on the commit worker after a successful write, before the new value
/// is published to observers.
pub(crate) type SettleHook<E> = Box<dyn FnOnce(&E) + Send>;

struct CommitJob<E: Entity> {
    build: PatchBuilder<E>,
    settle: Option<SettleHook<E>>,
    reply: oneshot::Sender<Result<E>>,
}

struct Shared<E> {
    committed: watch::Sender<Option<E>>,
    state: watch::Sender<ContextState>,
    /// Held across every destroyed check that is followed by a publish, and
    /// by `destroy` while it flips the state.
    publish: Mutex<()>,
}

impl<E: Entity> Shared<E> {
    fn is_destroyed(&self) -> bool {
        matches!(*self.state.borrow(), ContextState::Destroyed)
    }

    /// Error for a commit that never got an answer from the worker.
    fn lifecycle_error(&self) -> Error {
        match *self.state.borrow() {
            ContextState::Destroyed => Error::Destroyed,
            _ => Error::NotConnected,
        }
    }

    fn resolve(&self, value: Option<E>) {
        let _publish = self.publish.lock();
        if self.is_destroyed() {
            return;
        }
        self.committed.send_replace(value);
        self.state.send_if_modified(|state| {
            if *state == ContextState::Ready {
                false
            } else {
                *state = ContextState::Ready;
                true
            }
        });
    }

    async fn wait_ready(&self) -> Result<Option<E>> {
        let mut state = self.state.subscribe();
        let settled = state
            .wait_for(|s| !matches!(s, ContextState::Uninitialized | ContextState::Loading))
            .await
            .map_err(|_| Error::Destroyed)?
            .clone();

        match settled {
            ContextState::Ready => Ok(self.committed.borrow().clone()),
            ContextState::LoadFailed(err) => Err(err),
            ContextState::Destroyed => Err(Error::Destroyed),
            ContextState::Uninitialized | ContextState::Loading => Err(Error::NotConnected),
        }
    }
}

struct Session<E: Entity> {
    commits: mpsc::UnboundedSender<CommitJob<E>>,
    worker: JoinHandle<()>,
    source: Option<JoinHandle<()>>,
}

impl<E: Entity> Session<E> {
    fn abort(self) {
        self.worker.abort();
        if let Some(source) = self.source {
            source.abort();
        }
    }
}

/// Result of a queued commit.
pub struct CommitTicket<E: Entity> {
    queued: Result<oneshot::Receiver<Result<E>>>,
    shared: Arc<Shared<E>>,
}

impl<E: Entity> CommitTicket<E> {
    pub async fn outcome(self) -> Result<E> {
        let reply = self.queued?;
        match reply.await {
            Ok(result) => result,
            // The worker went away with the job, i.e. the session ended
            Err(_) => Err(self.shared.lifecycle_error()),
        }
    }
}

/// One editing session over a single entity.
///
/// Holds the committed value (the last known persisted record, or `None`
/// before creation) and applies commits one at a time, in the order they
/// were issued. A failed commit changes nothing.
pub struct EntityContext<E: Entity> {
    collection: Arc<EntityCollection<E>>,
    shared: Arc<Shared<E>>,
    session: Mutex<Option<Session<E>>>,
}

impl<E: Entity> EntityContext<E> {
    pub fn new(collection: Arc<EntityCollection<E>>) -> Self {
        let (committed, _) = watch::channel(None);
        let (state, _) = watch::channel(ContextState::Uninitialized);
        Self {
            collection,
            shared: Arc::new(Shared {
                committed,
                state,
                publish: Mutex::new(()),
            }),
            session: Mutex::new(None),
        }
    }

    pub fn collection(&self) -> &Arc<EntityCollection<E>> {
        &self.collection
    }

    pub fn state(&self) -> ContextState {
        self.shared.state.borrow().clone()
    }

    /// Observe the committed value. New receivers see the latest value
    /// immediately.
    pub fn committed(&self) -> watch::Receiver<Option<E>> {
        self.shared.committed.subscribe()
    }

    pub fn current(&self) -> Option<E> {
        self.shared.committed.borrow().clone()
    }

    /// Start the session from `source`. A context is connected at most once
    /// until it is disconnected.
    pub fn connect(&self, source: ContextSource<E>) -> Result<()> {
        let mut session = self.session.lock();
        match self.state() {
            ContextState::Uninitialized => {}
            ContextState::Destroyed => return Err(Error::Destroyed),
            _ => return Err(Error::AlreadyConnected),
        }
        self.shared.state.send_replace(ContextState::Loading);

        let (commits, jobs) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_commits(
            Arc::clone(&self.collection),
            Arc::clone(&self.shared),
            jobs,
        ));

        let source = match source {
            ContextSource::Value(value) => {
                self.shared.resolve(value);
                None
            }
            ContextSource::Fetch(id) => {
                let collection = Arc::clone(&self.collection);
                let shared = Arc::clone(&self.shared);
                Some(tokio::spawn(async move {
                    match collection.fetch(id).await {
                        Ok(entity) => shared.resolve(Some(entity)),
                        Err(err) => {
                            warn!("loading {} {} failed: {}", E::NAME, id, err);
                            let _publish = shared.publish.lock();
                            if !shared.is_destroyed() {
                                shared.state.send_replace(ContextState::LoadFailed(err));
                            }
                        }
                    }
                }))
            }
            ContextSource::Stream(mut values) => {
                let shared = Arc::clone(&self.shared);
                Some(tokio::spawn(async move {
                    while let Some(value) = values.recv().await {
                        shared.resolve(value);
                    }
                }))
            }
        };

        *session = Some(Session {
            commits,
            worker,
            source,
        });
        Ok(())
    }

    /// End the session without destroying the context. Queued commits are
    /// dropped; the committed value is kept.
    pub fn disconnect(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.abort();
        }
        self.shared.state.send_if_modified(|state| match state {
            ContextState::Destroyed | ContextState::Uninitialized => false,
            _ => {
                *state = ContextState::Uninitialized;
                true
            }
        });
    }

    /// Terminal. Pending loads are cancelled and commits resolving after this
    /// point are never applied.
    pub fn destroy(&self) {
        {
            let _publish = self.shared.publish.lock();
            self.shared.state.send_replace(ContextState::Destroyed);
        }
        let session = self.session.lock().take();
        if let Some(session) = session {
            debug!("destroying {} context", E::NAME);
            session.abort();
        }
    }

    /// Wait for the first committed value.
    pub async fn ready(&self) -> Result<Option<E>> {
        if self.state() == ContextState::Uninitialized {
            return Err(Error::NotConnected);
        }
        self.shared.wait_ready().await
    }

    /// Create the record if nothing is committed yet, otherwise update it.
    ///
    /// The write is queued when this is called, so commits issued back to back
    /// reach the backend in call order.
    pub fn commit(&self, patch: E::Patch) -> impl Future<Output = Result<E>> + Send + 'static {
        self.commit_with(move |_| Ok(patch))
    }

    /// Like [`commit`](Self::commit), but the patch is built from the
    /// committed value current when the write is issued.
    pub fn commit_with<F>(&self, build: F) -> impl Future<Output = Result<E>> + Send + 'static
    where
        F: FnOnce(Option<&E>) -> Result<E::Patch> + Send + 'static,
    {
        self.enqueue(Box::new(build), None).outcome()
    }

    pub(crate) fn enqueue(
        &self,
        build: PatchBuilder<E>,
        settle: Option<SettleHook<E>>,
    ) -> CommitTicket<E> {
        let (reply, outcome) = oneshot::channel();
        let queued = match self.session.lock().as_ref() {
            Some(session) => session
                .commits
                .send(CommitJob {
                    build,
                    settle,
                    reply,
                })
                .map(|_| outcome)
                .map_err(|_| self.shared.lifecycle_error()),
            None => Err(self.shared.lifecycle_error()),
        };

        CommitTicket {
            queued,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Entity> Drop for EntityContext<E> {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn run_commits<E: Entity>(
    collection: Arc<EntityCollection<E>>,
    shared: Arc<Shared<E>>,
    mut jobs: mpsc::UnboundedReceiver<CommitJob<E>>,
) {
    while let Some(job) = jobs.recv().await {
        let result = apply(&collection, &shared, job.build, job.settle).await;
        let _ = job.reply.send(result);
    }
}

async fn apply<E: Entity>(
    collection: &EntityCollection<E>,
    shared: &Shared<E>,
    build: PatchBuilder<E>,
    settle: Option<SettleHook<E>>,
) -> Result<E> {
    let base = shared.wait_ready().await?;
    let patch = build(base.as_ref())?;

    let written = match &base {
        None => {
            patch.validate(PatchMode::Create)?;
            debug!("creating {}", E::NAME);
            collection.service().create(&patch).await
        }
        Some(current) => {
            patch.validate(PatchMode::Update)?;
            debug!("updating {} {}", E::NAME, current.id());
            collection.service().update(current.id(), &patch).await
        }
    };

    let entity = match written {
        Ok(entity) => entity,
        Err(err) => {
            warn!("commit of {} failed: {}", E::NAME, err);
            return Err(err);
        }
    };

    let _publish = shared.publish.lock();
    if shared.is_destroyed() {
        debug!("dropping {} {} committed after destroy", E::NAME, entity.id());
        return Err(Error::Destroyed);
    }

    collection.put(entity.clone());
    if let Some(settle) = settle {
        settle(&entity);
    }
    shared.committed.send_replace(Some(entity.clone()));
    Ok(entity)
}
