//! Stage advances are applied to the session immediately and handed to this
//! outbox. A background worker drains it against the write port, retrying
//! with exponential backoff. The presentation layer reads per-fact write
//! status and receives a notice when a write is given up on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ProgressWritePort, SessionActivityPort};
use crate::fluency::config::OutboxConfig;
use crate::fluency::fact::FactId;
use crate::fluency::transition::AdvanceRequest;

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum WriteStatus {
    Pending { attempts: u32 },
    Confirmed,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteTicket {
    pub id: u64,
    pub user_id: String,
    pub fact_id: FactId,
}

/// Non-blocking notice for the learner. Play continues regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressNotice {
    MayNotHaveSaved {
        user_id: String,
        fact_id: FactId,
        error: String,
        at: DateTime<Utc>,
    },
}

impl ProgressNotice {
    pub fn user_id(&self) -> &str {
        match self {
            Self::MayNotHaveSaved { user_id, .. } => user_id,
        }
    }
}

/// Notices for one learner only. Other learners' notices on the shared
/// channel are skipped.
pub struct LearnerNotices {
    user_id: String,
    rx: broadcast::Receiver<ProgressNotice>,
}

impl LearnerNotices {
    pub async fn recv(&mut self) -> Result<ProgressNotice, broadcast::error::RecvError> {
        loop {
            let notice = self.rx.recv().await?;
            if notice.user_id() == self.user_id {
                return Ok(notice);
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<ProgressNotice, broadcast::error::TryRecvError> {
        loop {
            let notice = self.rx.try_recv()?;
            if notice.user_id() == self.user_id {
                return Ok(notice);
            }
        }
    }
}

enum Command {
    Write {
        ticket: WriteTicket,
        request: AdvanceRequest,
    },
    Shutdown,
}

type StatusKey = (String, FactId);

fn key(user_id: &str, fact_id: &FactId) -> StatusKey {
    (user_id.to_string(), fact_id.clone())
}

struct Shared {
    // (learner, fact) -> (latest ticket id, status of that ticket)
    statuses: Mutex<HashMap<StatusKey, (u64, WriteStatus)>>,
    notices: broadcast::Sender<ProgressNotice>,
    next_ticket: AtomicU64,
}

impl Shared {
    fn set(&self, ticket: &WriteTicket, status: WriteStatus) {
        let key = key(&ticket.user_id, &ticket.fact_id);
        let mut statuses = self.statuses.lock();
        // a newer ticket for the same learner and fact owns the slot
        let superseded = statuses
            .get(&key)
            .is_some_and(|(latest, _)| *latest > ticket.id);
        if !superseded {
            statuses.insert(key, (ticket.id, status));
        }
    }

    fn fail(&self, ticket: &WriteTicket, request: &AdvanceRequest, error: String) {
        warn!(
            user_id = %request.user_id,
            fact_id = %request.fact_id,
            target = %request.to,
            error = %error,
            "progress write failed, progress may not have saved"
        );
        self.set(ticket, WriteStatus::Failed { error: error.clone() });
        // no subscribers is fine
        let _ = self.notices.send(ProgressNotice::MayNotHaveSaved {
            user_id: request.user_id.clone(),
            fact_id: request.fact_id.clone(),
            error,
            at: Utc::now(),
        });
    }
}

#[derive(Clone)]
pub struct OutboxHandle {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl OutboxHandle {
    /// Queues the durable write and returns immediately.
    pub fn enqueue(&self, request: AdvanceRequest) -> WriteTicket {
        let ticket = WriteTicket {
            id: self.shared.next_ticket.fetch_add(1, Ordering::Relaxed),
            user_id: request.user_id.clone(),
            fact_id: request.fact_id.clone(),
        };
        self.shared.set(&ticket, WriteStatus::Pending { attempts: 0 });

        let command = Command::Write {
            ticket: ticket.clone(),
            request,
        };
        if let Err(mpsc::error::SendError(command)) = self.tx.send(command) {
            if let Command::Write { ticket, request } = command {
                self.shared.fail(&ticket, &request, "progress outbox is closed".to_string());
            }
        }
        ticket
    }

    pub fn status(&self, user_id: &str, fact_id: &FactId) -> Option<WriteStatus> {
        self.shared
            .statuses
            .lock()
            .get(&key(user_id, fact_id))
            .map(|(_, status)| status.clone())
    }

    /// Every write status held for one learner.
    pub fn snapshot(&self, user_id: &str) -> HashMap<FactId, WriteStatus> {
        self.shared
            .statuses
            .lock()
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|((_, fact_id), (_, status))| (fact_id.clone(), status.clone()))
            .collect()
    }

    /// Drops a learner's confirmed and failed statuses. Pending writes keep
    /// their slot. Returns how many entries were removed.
    pub fn forget_settled(&self, user_id: &str) -> usize {
        let mut statuses = self.shared.statuses.lock();
        let before = statuses.len();
        statuses.retain(|(user, _), (_, status)| {
            user != user_id || matches!(status, WriteStatus::Pending { .. })
        });
        before - statuses.len()
    }

    pub fn outstanding(&self) -> usize {
        self.shared
            .statuses
            .lock()
            .values()
            .filter(|(_, status)| matches!(status, WriteStatus::Pending { .. }))
            .count()
    }

    /// Notices for every learner on this outbox.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<ProgressNotice> {
        self.shared.notices.subscribe()
    }

    pub fn subscribe_learner(&self, user_id: impl Into<String>) -> LearnerNotices {
        LearnerNotices {
            user_id: user_id.into(),
            rx: self.shared.notices.subscribe(),
        }
    }
}

pub struct OutboxWorker {
    tx: mpsc::UnboundedSender<Command>,
    join: JoinHandle<()>,
}

impl OutboxWorker {
    /// Stops accepting writes, delivers everything already queued, then exits.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Err(err) = self.join.await {
            warn!(error = %err, "progress outbox worker ended abnormally");
        }
    }
}

pub struct ProgressOutbox;

impl ProgressOutbox {
    /// Starts the drain worker on the current tokio runtime.
    pub fn spawn(
        writer: Arc<dyn ProgressWritePort>,
        activity: Option<Arc<dyn SessionActivityPort>>,
        config: OutboxConfig,
    ) -> (OutboxHandle, OutboxWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let shared = Arc::new(Shared {
            statuses: Mutex::new(HashMap::new()),
            notices,
            next_ticket: AtomicU64::new(1),
        });

        let join = tokio::spawn(run(rx, writer, activity, config, Arc::clone(&shared)));

        (
            OutboxHandle {
                tx: tx.clone(),
                shared,
            },
            OutboxWorker { tx, join },
        )
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    writer: Arc<dyn ProgressWritePort>,
    activity: Option<Arc<dyn SessionActivityPort>>,
    config: OutboxConfig,
    shared: Arc<Shared>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write { ticket, request } => {
                deliver(&ticket, &request, writer.as_ref(), activity.as_deref(), &config, &shared)
                    .await;
            }
            Command::Shutdown => {
                // later sends fail fast; queued writes still drain
                rx.close();
            }
        }
    }
    debug!("progress outbox drained");
}

async fn deliver(
    ticket: &WriteTicket,
    request: &AdvanceRequest,
    writer: &dyn ProgressWritePort,
    activity: Option<&dyn SessionActivityPort>,
    config: &OutboxConfig,
    shared: &Shared,
) {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        shared.set(ticket, WriteStatus::Pending { attempts: attempt });

        match writer
            .advance_stage(&request.user_id, &request.fact_id, request.to)
            .await
        {
            Ok(()) => {
                shared.set(ticket, WriteStatus::Confirmed);
                info!(
                    user_id = %request.user_id,
                    fact_id = %request.fact_id,
                    stage = %request.to,
                    attempt,
                    "stage advance saved"
                );
                if let Some(activity) = activity {
                    let tracked = HashMap::from([(request.to, vec![request.fact_id.clone()])]);
                    if let Err(err) = activity
                        .record_stage_entry(&request.user_id, request.to, Some(tracked))
                        .await
                    {
                        debug!(error = %err, "stage entry not recorded");
                    }
                }
                return;
            }
            Err(err) if attempt < config.max_attempts => {
                let delay = config.backoff(attempt);
                warn!(
                    fact_id = %request.fact_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "progress write failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                shared.fail(ticket, request, err.to_string());
                return;
            }
        }
    }
}
