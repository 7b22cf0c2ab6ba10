//! Per-track load state shared with the front-end.
//!
//! Each load pass takes a new generation number. Only the newest pass may
//! publish, so a superseded pass finishes quietly without touching state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{CatalogError, Result};
use crate::proposals::activity::ChangeEvent;
use crate::proposals::collect::Progress;
use crate::proposals::types::DocumentRecord;
use crate::proposals::{ProposalSource, Track};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading {
        progress: Progress,
    },
    Ready {
        records: Arc<Vec<DocumentRecord>>,
        /// Documents dropped from this pass.
        failed: usize,
    },
    Failed {
        message: String,
    },
}

impl LoadState {
    pub fn records(&self) -> Option<&Arc<Vec<DocumentRecord>>> {
        match self {
            LoadState::Ready { records, .. } => Some(records),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }
}

#[derive(Clone)]
pub struct CatalogHandle {
    source: ProposalSource,
    state: Arc<watch::Sender<LoadState>>,
    generation: Arc<AtomicU64>,
}

impl CatalogHandle {
    pub fn new(source: ProposalSource) -> Self {
        let (tx, _rx) = watch::channel(LoadState::Idle);
        Self {
            source,
            state: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn track(&self) -> Track {
        self.source.track()
    }

    pub fn source(&self) -> &ProposalSource {
        &self.source
    }

    pub fn current(&self) -> LoadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Load from cache or upstream.
    pub async fn load(&self) -> LoadState {
        self.run(false).await
    }

    /// Drop the cached tree and collection, then load from upstream.
    pub async fn reload(&self) -> LoadState {
        self.run(true).await
    }

    /// Records of the current pass. Starts a load when nothing is ready and
    /// joins the running pass otherwise; only `reload` supersedes a pass.
    pub async fn ensure_loaded(&self) -> Result<Arc<Vec<DocumentRecord>>> {
        if let Some(records) = self.current().records() {
            return Ok(records.clone());
        }
        let state = match self.claim() {
            Some(generation) => self.drive(generation, false).await,
            None => self.settle().await,
        };
        match state {
            LoadState::Ready { records, .. } => Ok(records),
            LoadState::Failed { message } => Err(CatalogError::Unavailable {
                track: self.track().to_string(),
                message,
            }),
            other => Err(CatalogError::Unavailable {
                track: self.track().to_string(),
                message: format!("load ended in {:?}", other),
            }),
        }
    }

    /// Recently changed documents of this track. Never fails.
    pub async fn recent(&self, limit: usize) -> Vec<ChangeEvent> {
        self.source.find_recently_changed(limit).await
    }

    async fn run(&self, refresh: bool) -> LoadState {
        let generation = self.begin();
        self.publish(
            generation,
            LoadState::Loading {
                progress: Progress::default(),
            },
        );
        self.drive(generation, refresh).await
    }

    /// Starts a pass when none is running or ready. The check and the
    /// `Loading` publish happen under the channel lock.
    fn claim(&self) -> Option<u64> {
        let mut claimed = None;
        self.state.send_if_modified(|current| {
            if !matches!(current, LoadState::Idle | LoadState::Failed { .. }) {
                return false;
            }
            claimed = Some(self.begin());
            *current = LoadState::Loading {
                progress: Progress::default(),
            };
            true
        });
        claimed
    }

    /// Returns this pass's final state, or the newer pass's final state when
    /// this one was superseded.
    async fn drive(&self, generation: u64, refresh: bool) -> LoadState {
        let track = self.track();
        let on_progress = |progress: Progress| {
            self.publish(generation, LoadState::Loading { progress });
        };
        let result = if refresh {
            self.source.reload(on_progress).await
        } else {
            self.source.load(on_progress).await
        };

        let state = match result {
            Ok(report) => {
                info!(
                    track = %track,
                    generation,
                    count = report.records.len(),
                    failed = report.failures.len(),
                    from_cache = report.from_cache,
                    "catalog ready"
                );
                LoadState::Ready {
                    records: Arc::new(report.records),
                    failed: report.failures.len(),
                }
            }
            Err(e) => LoadState::Failed {
                message: e.to_string(),
            },
        };
        if self.publish(generation, state.clone()) {
            state
        } else {
            self.settle().await
        }
    }

    /// Waits until no pass is running.
    async fn settle(&self) -> LoadState {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|state| !state.is_loading()).await {
            Ok(state) => state.clone(),
            Err(_) => self.current(),
        };
        settled
    }

    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// False when a newer pass has started since `generation` began.
    fn publish(&self, generation: u64, state: LoadState) -> bool {
        let published = self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = state;
            true
        });
        if !published {
            debug!(track = %self.track(), generation, "discarding superseded load result");
        }
        published
    }
}
