//! Print hub facade
//!
//! Composition root of the crate: owns the registry, the connection pool,
//! the queue and its worker, the discovery scanner and the settings, and
//! exposes the operations the point-of-sale front end calls.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use shared::PrintEvent;
use shared::models::{
    BillData, ConnectionState, DiscoveredEndpoint, Document, JobStatus, KitchenItem,
    KitchenOrderData, PrintJob, PrinterEndpoint, PrinterInput, PrinterRole, PrinterUpdate,
    Priority, ReceiptData,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use ticket_printer::Transport;

use crate::connection::{ConnectionConfig, ConnectionManager, PoolStatistics};
use crate::core::{BackgroundTasks, Config, Settings, TaskKind};
use crate::discovery::{
    DiscoveryScanner, NetworkStatus, ProgressCallback, ScanOptions, ScanReport,
    SystemNetworkStatus,
};
use crate::error::{HubResult, PrintHubError};
use crate::queue::worker::print_to;
use crate::queue::{PrintLock, PrintQueue, PrintWorker, QueueConfig, QueueSnapshot, QueueStats};
use crate::registry::PrinterRegistry;
use crate::storage::KvStore;
use crate::templates::{Template, Templates, TestPageData};

/// Interval between two status checks in [`PrintHub::wait_for_completion`]
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(500);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-call print options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintOptions {
    /// Override the document's own priority
    pub priority: Option<Priority>,
    /// Print on this printer instead of the role's printer
    pub printer_id: Option<String>,
    /// Bypass the queue and print now
    #[serde(default)]
    pub force: bool,
}

impl PrintOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn on_printer(printer_id: impl Into<String>) -> Self {
        Self {
            printer_id: Some(printer_id.into()),
            ..Self::default()
        }
    }
}

/// Result of submitting one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintSubmission {
    /// Queue job id, or the document id for a forced print
    pub job_id: String,
    pub printer_id: String,
    pub title: String,
    /// `pending` when queued, `completed` when printed synchronously
    pub status: JobStatus,
}

impl PrintSubmission {
    fn queued(job: &PrintJob) -> Self {
        Self {
            job_id: job.id.clone(),
            printer_id: job.printer_id.clone(),
            title: job.document.title().to_string(),
            status: job.status,
        }
    }
}

/// Event subscription; dropping it keeps the callback running,
/// [`Subscription::unsubscribe`] stops it
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

pub struct PrintHub {
    config: Config,
    store: Arc<dyn KvStore>,
    events: broadcast::Sender<PrintEvent>,
    registry: Arc<PrinterRegistry>,
    connections: Arc<ConnectionManager>,
    queue: Arc<PrintQueue>,
    scanner: DiscoveryScanner,
    templates: Templates,
    settings: RwLock<Settings>,
    print_lock: PrintLock,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl PrintHub {
    /// Hub with the configured transport and the OS network status
    pub fn new(config: Config, store: Arc<dyn KvStore>) -> HubResult<Self> {
        let transport = config.transport.select();
        Self::with_parts(config, store, transport, Arc::new(SystemNetworkStatus))
    }

    /// Hub with explicit collaborators
    pub fn with_parts(
        config: Config,
        store: Arc<dyn KvStore>,
        transport: Arc<dyn Transport>,
        network: Arc<dyn NetworkStatus>,
    ) -> HubResult<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let settings = Settings::load(store.as_ref())?;
        let registry = Arc::new(PrinterRegistry::load(store.clone(), events.clone())?);
        let connections = Arc::new(ConnectionManager::new(
            transport,
            ConnectionConfig::from(&config),
            events.clone(),
        ));
        connections.set_health_check_enabled(settings.health_check_enabled);
        let queue = Arc::new(PrintQueue::load(
            QueueConfig::from(&config),
            store.clone(),
            events.clone(),
        )?);
        let scanner = DiscoveryScanner::new(connections.clone(), network, events.clone());

        info!(
            printers = registry.list().len(),
            pending_jobs = queue.len(),
            transport = %connections.transport().kind(),
            "Print hub initialized"
        );

        Ok(Self {
            templates: Templates::new(config.timezone),
            config,
            store,
            events,
            registry,
            connections,
            queue,
            scanner,
            settings: RwLock::new(settings),
            print_lock: Arc::new(tokio::sync::Mutex::new(())),
            tasks: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========== Lifecycle ==========

    /// Spawn the queue worker, the health loop and the registry sync
    /// listener. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut slot = self.tasks.lock();
        if slot.is_some() {
            debug!("Print hub already started");
            return;
        }

        let mut tasks = BackgroundTasks::new();
        let shutdown = tasks.shutdown_token();

        let worker = PrintWorker::new(
            self.queue.clone(),
            self.connections.clone(),
            self.registry.clone(),
            self.print_lock.clone(),
            self.events.clone(),
        );
        tasks.spawn("print_worker", TaskKind::Worker, worker.run(shutdown.clone()));

        tasks.spawn(
            "connection_health",
            TaskKind::Periodic,
            self.connections.clone().run_health_loop(shutdown.clone()),
        );

        tasks.spawn(
            "registry_sync",
            TaskKind::Listener,
            sync_registry(self.registry.clone(), self.events.subscribe(), shutdown),
        );

        info!(tasks = tasks.len(), "Print hub started");
        *slot = Some(tasks);
    }

    /// Stop background tasks, any running scan, and close every connection
    pub async fn shutdown(&self) {
        self.scanner.stop_scan();
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }
        self.connections.shutdown().await;
        info!("Print hub stopped");
    }

    /// Background tasks that exited while the hub is running
    pub fn stalled_tasks(&self) -> usize {
        self.tasks
            .lock()
            .as_ref()
            .map_or(0, BackgroundTasks::check_health)
    }

    /// App went to background: pause health checks
    pub fn on_background(&self) {
        self.connections.suspend();
    }

    /// App came back: resume health checks and re-validate connections now
    pub async fn on_foreground(&self) {
        self.connections.resume().await;
    }

    // ========== Events ==========

    pub fn events(&self) -> broadcast::Receiver<PrintEvent> {
        self.events.subscribe()
    }

    /// Call `callback` for every event, on a separate task
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PrintEvent) + Send + Sync + 'static,
    {
        let mut rx = self.events.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event subscriber lagging, events skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }

    // ========== Printer registry ==========

    pub fn add_printer(&self, input: PrinterInput) -> HubResult<PrinterEndpoint> {
        self.registry.add(input)
    }

    /// Update a printer; a changed address drops the old pooled connection
    pub async fn update_printer(
        &self,
        id: &str,
        update: PrinterUpdate,
    ) -> HubResult<PrinterEndpoint> {
        let (before, after) = self.registry.update(id, update)?;
        if before.address() != after.address() || (before.enabled && !after.enabled) {
            self.connections.remove(&before.host, before.port).await;
        }
        Ok(after)
    }

    pub async fn remove_printer(&self, id: &str) -> HubResult<PrinterEndpoint> {
        let removed = self.registry.remove(id)?;
        self.connections.remove(&removed.host, removed.port).await;
        Ok(removed)
    }

    pub fn list_printers(&self) -> Vec<PrinterEndpoint> {
        self.registry.list()
    }

    pub fn get_printer(&self, id: &str) -> HubResult<PrinterEndpoint> {
        self.registry.get(id)
    }

    pub fn set_default_printer(&self, id: &str, role: PrinterRole) -> HubResult<PrinterEndpoint> {
        self.registry.set_default(id, role)
    }

    pub fn resolve_role(&self, role: PrinterRole) -> Option<PrinterEndpoint> {
        self.registry.resolve_role(role)
    }

    pub fn pool_statistics(&self) -> PoolStatistics {
        self.connections.statistics()
    }

    // ========== Printing ==========

    pub async fn print_receipt(
        &self,
        data: &ReceiptData,
        options: PrintOptions,
    ) -> HubResult<PrintSubmission> {
        let document = self.templates.receipt.generate(data);
        let printer = self.target(&options, PrinterRole::Cashier)?;
        self.submit(document, &printer, &options).await
    }

    pub async fn print_bill(
        &self,
        data: &BillData,
        options: PrintOptions,
    ) -> HubResult<PrintSubmission> {
        let document = self.templates.bill.generate(data);
        let printer = self.target(&options, PrinterRole::Cashier)?;
        self.submit(document, &printer, &options).await
    }

    /// Print a kitchen order, split by destination.
    ///
    /// Each item's category is routed to a role, each role to a printer;
    /// one ticket is produced per printer with only its items. With an
    /// explicit printer the whole order goes there.
    pub async fn print_kitchen_order(
        &self,
        data: &KitchenOrderData,
        options: PrintOptions,
    ) -> HubResult<Vec<PrintSubmission>> {
        if options.printer_id.is_some() {
            let printer = self.target(&options, PrinterRole::Kitchen)?;
            let document = self.templates.kitchen.generate(data);
            return Ok(vec![self.submit(document, &printer, &options).await?]);
        }

        let plan = self.plan_kitchen_order(data)?;
        if options.force {
            let mut submissions = Vec::with_capacity(plan.len());
            for (printer, items) in plan {
                let document = self.templates.kitchen.generate(&data.with_items(items));
                submissions.push(self.submit(document, &printer, &options).await?);
            }
            return Ok(submissions);
        }

        // every station gets its ticket, or none does
        let batch: Vec<(Document, String)> = plan
            .into_iter()
            .map(|(printer, items)| {
                let document = self.templates.kitchen.generate(&data.with_items(items));
                (with_priority(document, &options), printer.id)
            })
            .collect();
        let jobs = self.queue.enqueue_all(batch)?;
        Ok(jobs.iter().map(PrintSubmission::queued).collect())
    }

    /// Items of an order grouped by the printer they go to, in role order
    pub fn plan_kitchen_order(
        &self,
        data: &KitchenOrderData,
    ) -> HubResult<Vec<(PrinterEndpoint, Vec<KitchenItem>)>> {
        let settings = self.settings.read().clone();
        let mut by_role: BTreeMap<PrinterRole, Vec<KitchenItem>> = BTreeMap::new();
        for item in &data.items {
            let role = settings.route_category(item.category.as_deref());
            by_role.entry(role).or_default().push(item.clone());
        }

        let mut plan: Vec<(PrinterEndpoint, Vec<KitchenItem>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (role, items) in by_role {
            let printer = self.registry.resolve_with_fallback(role)?;
            debug!(role = %role, printer_id = %printer.id, items = items.len(), "Kitchen items routed");
            match index.get(&printer.id) {
                Some(at) => plan[*at].1.extend(items),
                None => {
                    index.insert(printer.id.clone(), plan.len());
                    plan.push((printer, items));
                }
            }
        }
        Ok(plan)
    }

    /// Print a document now, bypassing the queue
    #[instrument(skip(self, document), fields(title = %document.title()))]
    pub async fn force_print(&self, document: &Document, printer_id: &str) -> HubResult<()> {
        let printer = self.registry.get(printer_id)?;
        let _guard = self.print_lock.lock().await;
        match print_to(&self.connections, &printer, document).await {
            Ok(()) => {
                info!(printer_id = %printer_id, "Document printed directly");
                self.registry.record_print(printer_id);
                Ok(())
            }
            Err(e) => {
                warn!(printer_id = %printer_id, error = %e, "Direct print failed");
                self.registry.record_error(printer_id, &e.to_string());
                if e.is_connection() {
                    self.connections.invalidate(&printer.host, printer.port).await;
                }
                Err(e)
            }
        }
    }

    /// Print the calibration page on a printer, synchronously
    pub async fn test_printer(&self, printer_id: &str) -> HubResult<()> {
        let printer = self.registry.get(printer_id)?;
        let document = self.templates.test_page.generate(&TestPageData {
            printer,
            printed_at: chrono::Utc::now(),
        });
        self.force_print(&document, printer_id).await
    }

    /// Poll a job until it reaches a terminal status
    pub async fn wait_for_completion(&self, job_id: &str, timeout: Duration) -> HubResult<JobStatus> {
        let wait = async {
            let mut ticker = tokio::time::interval(COMPLETION_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let Some(job) = self.queue.job(job_id) else {
                    return Err(PrintHubError::JobNotFound(job_id.to_string()));
                };
                if job.status.is_terminal() {
                    return Ok(job.status);
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            PrintHubError::Timeout(format!("job {} not finished after {:?}", job_id, timeout))
        })?
    }

    // ========== Queue control ==========

    pub fn retry_job(&self, job_id: &str) -> HubResult<PrintJob> {
        self.queue.retry_job(job_id)
    }

    pub fn cancel_job(&self, job_id: &str) -> HubResult<PrintJob> {
        self.queue.cancel_job(job_id, Some("cancelled by user"))
    }

    pub fn dismiss_failed(&self, job_id: &str) -> HubResult<PrintJob> {
        self.queue.dismiss_failed(job_id)
    }

    pub fn clear_failed(&self) -> usize {
        self.queue.clear_failed()
    }

    pub fn clear_queue(&self) -> usize {
        self.queue.clear()
    }

    pub fn job(&self, job_id: &str) -> Option<PrintJob> {
        self.queue.job(job_id)
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    // ========== Discovery ==========

    pub async fn discover_printers(
        &self,
        options: ScanOptions,
        on_progress: Option<&ProgressCallback>,
    ) -> HubResult<ScanReport> {
        self.scanner.scan(options, on_progress).await
    }

    pub fn stop_discovery(&self) -> bool {
        self.scanner.stop_scan()
    }

    pub fn is_discovering(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Register a discovered printer. An address already configured returns
    /// the existing printer unchanged; the first printer of a role becomes
    /// its default.
    pub fn promote_discovered(
        &self,
        found: &DiscoveredEndpoint,
        name: Option<&str>,
        role: PrinterRole,
    ) -> HubResult<PrinterEndpoint> {
        if let Some(existing) = self.registry.find_by_address(&found.host, found.port) {
            debug!(printer_id = %existing.id, "Discovered printer already configured");
            return Ok(existing);
        }
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| found.suggested_name());
        let mut input = PrinterInput::new(name, found.host.clone(), role);
        input.port = found.port;
        input.is_default = self.registry.resolve_role(role).is_none();
        self.registry.add(input)
    }

    // ========== Settings ==========

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Edit and persist the settings
    pub fn update_settings<F>(&self, edit: F) -> HubResult<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let updated = {
            let mut settings = self.settings.write();
            let mut draft = settings.clone();
            edit(&mut draft);
            draft.save(self.store.as_ref())?;
            *settings = draft.clone();
            draft
        };
        self.connections
            .set_health_check_enabled(updated.health_check_enabled);
        info!("Settings updated");
        Ok(updated)
    }

    pub fn set_category_mapping(
        &self,
        mapping: BTreeMap<String, PrinterRole>,
    ) -> HubResult<Settings> {
        self.update_settings(|settings| settings.set_category_mapping(mapping))
    }

    // ========== Internals ==========

    fn target(&self, options: &PrintOptions, role: PrinterRole) -> HubResult<PrinterEndpoint> {
        match &options.printer_id {
            Some(id) => self.registry.get(id),
            None => self.registry.resolve_with_fallback(role),
        }
    }

    async fn submit(
        &self,
        document: Document,
        printer: &PrinterEndpoint,
        options: &PrintOptions,
    ) -> HubResult<PrintSubmission> {
        let document = with_priority(document, options);
        let title = document.title().to_string();

        if options.force {
            self.force_print(&document, &printer.id).await?;
            return Ok(PrintSubmission {
                job_id: document.id().to_string(),
                printer_id: printer.id.clone(),
                title,
                status: JobStatus::Completed,
            });
        }

        let job = self.queue.enqueue(document, &printer.id)?;
        Ok(PrintSubmission::queued(&job))
    }
}

fn with_priority(document: Document, options: &PrintOptions) -> Document {
    match options.priority {
        Some(priority) => document.with_priority(priority),
        None => document,
    }
}

/// Keep endpoint runtime fields current from pool and print events
async fn sync_registry(
    registry: Arc<PrinterRegistry>,
    mut rx: broadcast::Receiver<PrintEvent>,
    shutdown: CancellationToken,
) {
    info!("Registry sync listener started");
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Registry sync listener received shutdown signal");
                break;
            }
            event = rx.recv() => event,
        };

        match event {
            Ok(PrintEvent::PrinterConnected { address }) => {
                registry.record_connection(&address, ConnectionState::Connected, None);
            }
            Ok(PrintEvent::PrinterDisconnected {
                address,
                state,
                reason,
            }) => {
                registry.record_connection(&address, state, reason.as_deref());
            }
            Ok(PrintEvent::PrintCompleted { printer_id, .. }) => {
                registry.record_print(&printer_id);
            }
            Ok(PrintEvent::PrintFailed {
                printer_id, error, ..
            }) => {
                registry.record_error(&printer_id, &error);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Registry sync lagging, events skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
