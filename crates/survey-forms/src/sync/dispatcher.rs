use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};

use super::crm::CrmAccounts;
use super::sheets::SheetsGateway;
use super::{CrmObjectType, MappedAnswer};
use crate::forms::domain::FormId;

/// Explicit CRM object to update instead of resolving a contact by email.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmTarget {
    pub object_type: CrmObjectType,
    pub object_id: String,
}

/// One accepted submission to forward.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub form_id: FormId,
    pub email: String,
    pub answers: Vec<MappedAnswer>,
    pub account: String,
    pub target: Option<CrmTarget>,
}

#[derive(Debug, Clone)]
pub struct SheetDestination {
    pub gateway: Arc<dyn SheetsGateway>,
    pub spreadsheet_id: String,
    pub range: String,
}

/// Where jobs are sent. Missing accounts or sheets are skipped quietly.
#[derive(Debug, Clone, Default)]
pub struct SyncTargets {
    pub crm: Arc<CrmAccounts>,
    pub sheets: Option<SheetDestination>,
}

/// Background worker forwarding jobs without blocking the submitter.
///
/// `dispatch` only enqueues. Each job is spawned onto a `JoinSet` owned by the
/// worker, and `shutdown` closes the queue then waits for in-flight jobs.
#[derive(Debug)]
pub struct SyncDispatcher {
    sender: Mutex<Option<UnboundedSender<SyncJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncDispatcher {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(targets: SyncTargets) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(Arc::new(targets), receiver));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// A dispatcher that drops every job; used when no runtime wiring is wanted.
    pub fn disabled() -> Self {
        Self {
            sender: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    fn sender(&self) -> MutexGuard<'_, Option<UnboundedSender<SyncJob>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(&self, job: SyncJob) {
        let sender = self.sender();
        let Some(sender) = sender.as_ref() else {
            tracing::debug!(form_id = %job.form_id, "sync disabled, job dropped");
            return;
        };
        if let Err(err) = sender.send(job) {
            tracing::warn!(form_id = %err.0.form_id, "sync worker gone, job dropped");
        }
    }

    pub async fn shutdown(&self) {
        self.sender().take();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "sync worker panicked");
            }
        }
    }
}

async fn run_worker(targets: Arc<SyncTargets>, mut receiver: UnboundedReceiver<SyncJob>) {
    let mut running = JoinSet::new();
    loop {
        tokio::select! {
            job = receiver.recv() => match job {
                Some(job) => {
                    running.spawn(process_job(targets.clone(), job));
                }
                None => break,
            },
            Some(finished) = running.join_next(), if !running.is_empty() => {
                log_join(finished);
            }
        }
    }

    while let Some(finished) = running.join_next().await {
        log_join(finished);
    }
    tracing::debug!("sync worker drained");
}

fn log_join(finished: Result<(), tokio::task::JoinError>) {
    if let Err(err) = finished {
        tracing::error!(error = %err, "sync job aborted");
    }
}

async fn process_job(targets: Arc<SyncTargets>, job: SyncJob) {
    if job.answers.is_empty() {
        tracing::debug!(form_id = %job.form_id, "no mapped answers, nothing to sync");
        return;
    }
    tokio::join!(sync_crm(&targets, &job), sync_sheet(&targets, &job));
}

async fn sync_crm(targets: &SyncTargets, job: &SyncJob) {
    let Some(gateway) = targets.crm.get(&job.account) else {
        tracing::debug!(account = %job.account, "crm account not configured, skipping");
        return;
    };

    let (object_type, object_id) = match &job.target {
        Some(target) => (target.object_type, target.object_id.clone()),
        None => match gateway.find_or_create_contact(&job.email).await {
            Ok(id) => (CrmObjectType::Contact, id),
            Err(err) => {
                tracing::warn!(
                    account = %job.account,
                    form_id = %job.form_id,
                    error = %err,
                    "crm contact resolution failed"
                );
                return;
            }
        },
    };

    let properties: BTreeMap<String, String> = job
        .answers
        .iter()
        .map(|answer| (answer.property.clone(), answer.flattened()))
        .collect();

    match gateway
        .update_properties(object_type, &object_id, &properties)
        .await
    {
        Ok(()) => tracing::info!(
            account = %job.account,
            form_id = %job.form_id,
            object_type = object_type.api_path(),
            properties = properties.len(),
            "crm sync complete"
        ),
        Err(err) => tracing::warn!(
            account = %job.account,
            form_id = %job.form_id,
            error = %err,
            "crm sync failed"
        ),
    }
}

async fn sync_sheet(targets: &SyncTargets, job: &SyncJob) {
    let Some(sheet) = &targets.sheets else {
        return;
    };

    let row: Vec<String> = std::iter::once(job.email.clone())
        .chain(job.answers.iter().map(MappedAnswer::flattened))
        .collect();

    if let Err(err) = sheet
        .gateway
        .append_row(&sheet.spreadsheet_id, &sheet.range, row)
        .await
    {
        tracing::warn!(form_id = %job.form_id, error = %err, "sheet sync failed");
    }
}
