//! Queue worker
//!
//! Single task draining the [`PrintQueue`]: one job at a time, a fixed
//! pause between jobs, retry decisions delegated to the queue.

use shared::PrintEvent;
use shared::models::{PrintJob, PrinterEndpoint};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::queue::PrintQueue;
use crate::connection::ConnectionManager;
use crate::error::{HubResult, PrintHubError};
use crate::templates::render;

/// Lookup of a job's target printer
pub trait EndpointResolver: Send + Sync {
    fn resolve_endpoint(&self, printer_id: &str) -> HubResult<PrinterEndpoint>;
}

/// Serializes physical printing between the worker and synchronous prints
pub type PrintLock = Arc<Mutex<()>>;

/// Render a document for an endpoint and write it through the pool
pub(crate) async fn print_to(
    connections: &ConnectionManager,
    endpoint: &PrinterEndpoint,
    document: &shared::models::Document,
) -> HubResult<()> {
    if !endpoint.enabled {
        return Err(PrintHubError::Configuration(format!(
            "printer '{}' is disabled",
            endpoint.name
        )));
    }
    let bytes = render(document, &endpoint.profile)?;
    let mut conn = connections.get_connection(endpoint).await?;
    conn.write_all(&bytes).await?;
    debug!(
        addr = %conn.address(),
        connection_id = conn.connection_id(),
        bytes = bytes.len(),
        "Document sent"
    );
    Ok(())
}

pub struct PrintWorker {
    queue: Arc<PrintQueue>,
    connections: Arc<ConnectionManager>,
    resolver: Arc<dyn EndpointResolver>,
    print_lock: PrintLock,
    events: broadcast::Sender<PrintEvent>,
}

impl PrintWorker {
    pub fn new(
        queue: Arc<PrintQueue>,
        connections: Arc<ConnectionManager>,
        resolver: Arc<dyn EndpointResolver>,
        print_lock: PrintLock,
        events: broadcast::Sender<PrintEvent>,
    ) -> Self {
        Self {
            queue,
            connections,
            resolver,
            print_lock,
            events,
        }
    }

    /// Run until shutdown
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Print queue worker started");
        let pause = self.queue.config().job_pause;

        loop {
            let Some(job) = self.queue.next_job() else {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Print queue worker received shutdown signal");
                        break;
                    }
                    _ = self.queue.wait_for_work() => continue,
                }
            };

            // the job in hand always finishes, so the printer never gets half a ticket
            self.process(job).await;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Print queue worker received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Print one job and report the outcome to the queue
    #[instrument(skip(self, job), fields(job_id = %job.id, printer_id = %job.printer_id))]
    pub async fn process(&self, job: PrintJob) {
        let _guard = self.print_lock.lock().await;
        let attempt = job.retries + 1;
        let _ = self.events.send(PrintEvent::PrintStarted {
            job_id: job.id.clone(),
            printer_id: job.printer_id.clone(),
            attempt,
        });

        let result = match self.resolver.resolve_endpoint(&job.printer_id) {
            Ok(endpoint) => {
                let result = print_to(&self.connections, &endpoint, &job.document).await;
                if let Err(e) = &result
                    && e.is_connection()
                {
                    // next attempt starts from a fresh socket
                    self.connections
                        .invalidate(&endpoint.host, endpoint.port)
                        .await;
                }
                result
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.queue.complete(&job.id);
                info!(attempt, "Job printed");
                let _ = self.events.send(PrintEvent::PrintCompleted {
                    job_id: job.id,
                    printer_id: job.printer_id,
                });
            }
            Err(e) => {
                let retryable = e.is_connection();
                let error = e.to_string();
                let Some(outcome) = self.queue.fail(&job.id, &error, retryable) else {
                    return;
                };
                warn!(
                    attempt,
                    will_retry = outcome.will_retry,
                    error = %error,
                    "Job failed"
                );
                let _ = self.events.send(PrintEvent::PrintFailed {
                    job_id: job.id,
                    printer_id: job.printer_id,
                    error: outcome.job.last_error.unwrap_or(error),
                    will_retry: outcome.will_retry,
                    status: outcome.job.status,
                });
            }
        }
    }
}
