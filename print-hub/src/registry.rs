//! Printer registry
//!
//! Configured endpoints, persisted as one JSON list. Every mutation keeps
//! at most one default printer per role and is written through to the
//! store before returning.

use chrono::Utc;
use parking_lot::RwLock;
use shared::PrintEvent;
use shared::models::{
    ConnectionState, PrinterEndpoint, PrinterInput, PrinterRole, PrinterUpdate,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{HubResult, PrintHubError};
use crate::queue::EndpointResolver;
use crate::storage::{KvStore, PRINTERS_KEY, load_json, save_json};
use crate::utils::validation::{normalize_address, validate_name, validate_port};

/// Roles tried, in order, when a role has no printer
pub const FALLBACK_ROLES: [PrinterRole; 2] = [PrinterRole::Kitchen, PrinterRole::General];

/// Clear `is_default` on every other endpoint of `role`
fn keep_single_default(printers: &mut [PrinterEndpoint], keep_id: &str, role: PrinterRole) {
    for printer in printers
        .iter_mut()
        .filter(|p| p.role == role && p.id != keep_id && p.is_default)
    {
        debug!(printer_id = %printer.id, role = %role, "Default flag moved to another printer");
        printer.is_default = false;
        printer.updated_at = Utc::now();
    }
}

/// Repair a list loaded from storage: the first default of each role wins
fn repair_defaults(printers: &mut [PrinterEndpoint]) -> bool {
    let mut repaired = false;
    for role in PrinterRole::ALL {
        let mut seen = false;
        for printer in printers.iter_mut().filter(|p| p.role == role && p.is_default) {
            if seen {
                printer.is_default = false;
                repaired = true;
            }
            seen = true;
        }
    }
    repaired
}

/// Role resolution: enabled default, first enabled, then any default or
/// the first printer of the role
fn resolve_in(printers: &[PrinterEndpoint], role: PrinterRole) -> Option<&PrinterEndpoint> {
    let of_role = || printers.iter().filter(move |p| p.role == role);
    of_role()
        .find(|p| p.is_default && p.enabled)
        .or_else(|| of_role().find(|p| p.enabled))
        .or_else(|| of_role().find(|p| p.is_default))
        .or_else(|| of_role().next())
}

pub struct PrinterRegistry {
    printers: RwLock<Vec<PrinterEndpoint>>,
    store: Arc<dyn KvStore>,
    events: broadcast::Sender<PrintEvent>,
}

impl PrinterRegistry {
    /// Registry restored from the store
    pub fn load(store: Arc<dyn KvStore>, events: broadcast::Sender<PrintEvent>) -> HubResult<Self> {
        let mut printers: Vec<PrinterEndpoint> =
            load_json(store.as_ref(), PRINTERS_KEY)?.unwrap_or_default();
        let repaired = repair_defaults(&mut printers);
        info!(count = printers.len(), "Printer registry loaded");

        let registry = Self {
            printers: RwLock::new(printers),
            store,
            events,
        };
        if repaired {
            warn!("Duplicate default printers found in storage, repaired");
            registry.persist(&registry.printers.read())?;
        }
        Ok(registry)
    }

    // ========== Queries ==========

    pub fn list(&self) -> Vec<PrinterEndpoint> {
        self.printers.read().clone()
    }

    pub fn get(&self, id: &str) -> HubResult<PrinterEndpoint> {
        self.printers
            .read()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| PrintHubError::PrinterNotFound(id.to_string()))
    }

    pub fn find_by_address(&self, host: &str, port: u16) -> Option<PrinterEndpoint> {
        self.printers
            .read()
            .iter()
            .find(|p| p.host == host && p.port == port)
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.printers.read().is_empty()
    }

    /// Printer used for a role, if the role has any
    pub fn resolve_role(&self, role: PrinterRole) -> Option<PrinterEndpoint> {
        resolve_in(&self.printers.read(), role).cloned()
    }

    /// Printer used for a role, falling back to kitchen then general
    pub fn resolve_with_fallback(&self, role: PrinterRole) -> HubResult<PrinterEndpoint> {
        let printers = self.printers.read();
        std::iter::once(role)
            .chain(FALLBACK_ROLES)
            .find_map(|r| resolve_in(&printers, r))
            .cloned()
            .ok_or(PrintHubError::NoPrinterForRole(role))
    }

    // ========== Mutations ==========

    pub fn add(&self, input: PrinterInput) -> HubResult<PrinterEndpoint> {
        validate_name(&input.name)?;
        validate_port(input.port)?;
        let host = normalize_address(&input.host)?;

        let endpoint = PrinterEndpoint::from_input(PrinterInput {
            name: input.name.trim().to_string(),
            host,
            ..input
        });
        {
            let mut printers = self.printers.write();
            if endpoint.is_default {
                keep_single_default(&mut printers, &endpoint.id, endpoint.role);
            }
            printers.push(endpoint.clone());
            self.persist(&printers)?;
        }
        info!(
            printer_id = %endpoint.id,
            name = %endpoint.name,
            addr = %endpoint.address(),
            role = %endpoint.role,
            "Printer added"
        );
        self.changed();
        Ok(endpoint)
    }

    /// Apply a partial update; returns the endpoint before and after
    pub fn update(
        &self,
        id: &str,
        update: PrinterUpdate,
    ) -> HubResult<(PrinterEndpoint, PrinterEndpoint)> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(port) = update.port {
            validate_port(port)?;
        }
        let host = update.host.as_deref().map(normalize_address).transpose()?;

        let (before, after) = {
            let mut printers = self.printers.write();
            let index = printers
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| PrintHubError::PrinterNotFound(id.to_string()))?;
            let before = printers[index].clone();

            let printer = &mut printers[index];
            if let Some(name) = update.name {
                printer.name = name.trim().to_string();
            }
            if let Some(host) = host {
                printer.host = host;
            }
            if let Some(port) = update.port {
                printer.port = port;
            }
            if let Some(profile) = update.profile {
                printer.profile = profile;
            }
            if let Some(role) = update.role {
                printer.role = role;
            }
            if let Some(is_default) = update.is_default {
                printer.is_default = is_default;
            }
            if let Some(enabled) = update.enabled {
                printer.enabled = enabled;
            }
            if printer.host != before.host || printer.port != before.port {
                printer.last_state = ConnectionState::Unconnected;
                printer.last_error = None;
            }
            printer.updated_at = Utc::now();
            let after = printer.clone();

            if after.is_default {
                keep_single_default(&mut printers, &after.id, after.role);
            }
            self.persist(&printers)?;
            (before, after)
        };
        info!(printer_id = %id, name = %after.name, "Printer updated");
        self.changed();
        Ok((before, after))
    }

    /// Remove a printer. If it was its role's default, the first enabled
    /// remaining printer of the role takes over.
    pub fn remove(&self, id: &str) -> HubResult<PrinterEndpoint> {
        let removed = {
            let mut printers = self.printers.write();
            let index = printers
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| PrintHubError::PrinterNotFound(id.to_string()))?;
            let removed = printers.remove(index);

            if removed.is_default {
                let successor = printers
                    .iter()
                    .position(|p| p.role == removed.role && p.enabled)
                    .or_else(|| printers.iter().position(|p| p.role == removed.role));
                if let Some(successor) = successor {
                    let printer = &mut printers[successor];
                    printer.is_default = true;
                    printer.updated_at = Utc::now();
                    info!(
                        printer_id = %printer.id,
                        role = %printer.role,
                        "Printer promoted to default"
                    );
                }
            }
            self.persist(&printers)?;
            removed
        };
        info!(printer_id = %id, name = %removed.name, "Printer removed");
        self.changed();
        Ok(removed)
    }

    /// Make a printer the default of a role; it is moved to that role
    pub fn set_default(&self, id: &str, role: PrinterRole) -> HubResult<PrinterEndpoint> {
        let endpoint = {
            let mut printers = self.printers.write();
            let printer = printers
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| PrintHubError::PrinterNotFound(id.to_string()))?;
            printer.role = role;
            printer.is_default = true;
            printer.updated_at = Utc::now();
            let endpoint = printer.clone();

            keep_single_default(&mut printers, id, role);
            self.persist(&printers)?;
            endpoint
        };
        info!(printer_id = %id, role = %role, "Default printer set");
        self.changed();
        Ok(endpoint)
    }

    // ========== Runtime state ==========

    /// Record a connection state change observed on `address`
    pub fn record_connection(&self, address: &str, state: ConnectionState, error: Option<&str>) {
        let mut printers = self.printers.write();
        let mut touched = false;
        for printer in printers.iter_mut().filter(|p| p.address() == address) {
            if state.is_usable() {
                printer.last_seen_at = Some(Utc::now());
                printer.last_error = None;
            } else if let Some(error) = error {
                printer.last_error = Some(error.to_string());
            }
            printer.last_state = state;
            touched = true;
        }
        if touched && let Err(e) = self.persist(&printers) {
            warn!(error = %e, "Failed to persist printer state");
        }
    }

    /// Record a completed print on a printer
    pub fn record_print(&self, id: &str) {
        let mut printers = self.printers.write();
        let Some(printer) = printers.iter_mut().find(|p| p.id == id) else {
            return;
        };
        let now = Utc::now();
        printer.last_print_at = Some(now);
        printer.last_seen_at = Some(now);
        printer.last_error = None;
        if let Err(e) = self.persist(&printers) {
            warn!(error = %e, "Failed to persist printer state");
        }
    }

    /// Record a print failure on a printer
    pub fn record_error(&self, id: &str, error: &str) {
        let mut printers = self.printers.write();
        let Some(printer) = printers.iter_mut().find(|p| p.id == id) else {
            return;
        };
        printer.last_error = Some(error.to_string());
        if let Err(e) = self.persist(&printers) {
            warn!(error = %e, "Failed to persist printer state");
        }
    }

    // ========== Internals ==========

    fn persist(&self, printers: &[PrinterEndpoint]) -> HubResult<()> {
        save_json(self.store.as_ref(), PRINTERS_KEY, printers)?;
        Ok(())
    }

    fn changed(&self) {
        let _ = self.events.send(PrintEvent::PrintersChanged);
    }
}

impl EndpointResolver for PrinterRegistry {
    fn resolve_endpoint(&self, printer_id: &str) -> HubResult<PrinterEndpoint> {
        self.get(printer_id)
    }
}
