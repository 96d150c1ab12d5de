use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::{sync::Semaphore, task::JoinHandle};

use crate::error::{EkidenError, EkidenResult};

/// Cooperative cancellation flag shared between a load and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A blocking unit of work that can be resumed after a failure.
pub trait Loadable: Send + 'static {
    /// Performs the load. Failures may be retried by calling `load` again.
    fn load(&mut self) -> EkidenResult<()>;

    fn cancel_flag(&self) -> CancelFlag;

    /// Asks a running load to stop at its next check.
    fn cancel_load(&self) {
        self.cancel_flag().cancel();
    }
}

/// Runs loadables on blocking threads, a bounded number at a time.
pub struct Loader {
    concurrency: NonZeroU32,
    permits: Arc<Semaphore>,
    started: Arc<AtomicUsize>,
}

impl Loader {
    pub fn new(concurrency: NonZeroU32) -> Self {
        Self {
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency.get() as usize)),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::new()
    }

    pub fn concurrency(&self) -> NonZeroU32 {
        self.concurrency
    }

    /// Starts loading in the background.
    ///
    /// The load waits for a free permit before it runs. Must be called from
    /// within a tokio runtime.
    pub fn start_loading<L>(&self, mut loadable: L) -> LoadTask<L>
    where
        L: Loadable,
    {
        let cancel = loadable.cancel_flag();
        let permits = self.permits.clone();
        let sequence = self.started.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::spawn(async move {
            // The semaphore is never closed.
            let permit = permits.acquire_owned().await.ok();

            tracing::debug!(sequence, "Load started");
            let (loadable, result) = tokio::task::spawn_blocking(move || {
                let result = loadable.load();
                (loadable, result)
            })
            .await?;
            // The permit only limits concurrent loads.
            drop(permit);

            match &result {
                Ok(()) => tracing::debug!(sequence, "Load finished"),
                Err(e) => tracing::warn!(sequence, retryable = e.is_retryable(), "Load failed: {e}"),
            }
            Ok::<_, EkidenError>((loadable, result))
        });

        LoadTask { cancel, handle }
    }
}

impl Default for Loader {
    fn default() -> Self {
        LoaderBuilder::new().build()
    }
}

pub struct LoaderBuilder {
    concurrency: NonZeroU32,
}

impl Default for LoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderBuilder {
    pub fn new() -> Self {
        Self {
            concurrency: NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
        }
    }

    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn build(self) -> Loader {
        tracing::info!("Loading with {} thread(s).", self.concurrency.get());
        Loader::new(self.concurrency)
    }
}

/// Handle to a started load.
pub struct LoadTask<L> {
    cancel: CancelFlag,
    handle: JoinHandle<EkidenResult<(L, EkidenResult<()>)>>,
}

impl<L> LoadTask<L> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the load and hands the loadable back with its result.
    ///
    /// A canceled load that returned normally reports
    /// [`EkidenError::Canceled`].
    pub async fn join(self) -> EkidenResult<(L, EkidenResult<()>)> {
        let (loadable, result) = self.handle.await??;
        let result = match result {
            Ok(()) if self.cancel.is_canceled() => Err(EkidenError::Canceled),
            result => result,
        };
        Ok((loadable, result))
    }
}
