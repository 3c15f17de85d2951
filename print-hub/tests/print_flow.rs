//! End-to-end printing against loopback fake printers

use chrono::Utc;
use parking_lot::Mutex;
use print_hub::discovery::StaticNetworkStatus;
use print_hub::{Config, KvStore, MemoryStore, PrintHub, PrintOptions, RedbStore};
use rust_decimal::Decimal;
use shared::PrintEvent;
use shared::models::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use ticket_printer::TransportKind;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// Accepts connections on loopback and records every byte received
struct FakePrinter {
    port: u16,
    received: Arc<Mutex<Vec<u8>>>,
}

impl FakePrinter {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let sink = sink.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => sink.lock().extend_from_slice(&buf[..n]),
                        }
                    }
                });
            }
        });
        Self { port, received }
    }

    fn contains(&self, needle: &str) -> bool {
        let received = self.received.lock();
        received
            .windows(needle.len())
            .any(|window| window == needle.as_bytes())
    }

    /// Wait until `needle` shows up in the received bytes
    async fn wait_for(&self, needle: &str) -> bool {
        for _ in 0..40 {
            if self.contains(needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }
}

fn test_config() -> Config {
    Config {
        transport: TransportKind::Socket,
        connect_timeout_ms: 500,
        queue_job_pause_ms: 10,
        queue_max_retries: 1,
        ..Config::default()
    }
}

fn hub_with(store: Arc<dyn KvStore>) -> PrintHub {
    PrintHub::with_parts(
        test_config(),
        store,
        TransportKind::Socket.select(),
        Arc::new(StaticNetworkStatus(None)),
    )
    .unwrap()
}

fn local_printer(name: &str, port: u16, role: PrinterRole) -> PrinterInput {
    let mut input = PrinterInput::new(name, "127.0.0.1", role);
    input.port = port;
    input
}

fn receipt() -> ReceiptData {
    ReceiptData {
        store: StoreInfo {
            name: "Chez Paul".into(),
            address: "12 rue des Lilas".into(),
            tax_id: None,
            phone: None,
            footer: None,
        },
        order_number: "1042".into(),
        table: Some("12".into()),
        cashier: None,
        issued_at: Utc::now(),
        items: vec![LineItem::new("Croque monsieur", 1, Decimal::new(950, 2))],
        subtotal: Decimal::new(950, 2),
        discount: None,
        taxes: vec![],
        total: Decimal::new(950, 2),
        tenders: vec![Tender {
            method: TenderMethod::Card,
            amount: Decimal::new(950, 2),
        }],
        change: None,
        qr_payload: None,
        barcode: None,
    }
}

fn kitchen_order() -> KitchenOrderData {
    KitchenOrderData {
        order_number: "77".into(),
        table: Some("3".into()),
        server: None,
        ordered_at: Utc::now(),
        items: vec![
            KitchenItem::new("Steak", 1, Some("Plats")),
            KitchenItem::new("Coca", 2, Some("Boissons")),
            KitchenItem::new("Tartare", 1, Some("Plats")),
        ],
        urgent: false,
        note: None,
    }
}

#[tokio::test]
async fn test_queued_receipt_is_printed() {
    let printer = FakePrinter::start().await;
    let hub = hub_with(Arc::new(MemoryStore::new()));
    let endpoint = hub
        .add_printer(local_printer("Caisse", printer.port, PrinterRole::Cashier))
        .unwrap();
    hub.start();

    let submission = hub
        .print_receipt(&receipt(), PrintOptions::default())
        .await
        .unwrap();
    assert_eq!(submission.printer_id, endpoint.id);
    assert_eq!(submission.status, JobStatus::Pending);

    let status = hub
        .wait_for_completion(&submission.job_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert!(printer.wait_for("Chez Paul").await);
    assert!(printer.contains("Croque monsieur"));

    // registry picks up the print through the event listener
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(hub.get_printer(&endpoint.id).unwrap().last_print_at.is_some());
    assert_eq!(hub.queue_stats().completed, 1);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_kitchen_order_fans_out_per_station() {
    let kitchen = FakePrinter::start().await;
    let bar = FakePrinter::start().await;
    let hub = hub_with(Arc::new(MemoryStore::new()));
    hub.add_printer(local_printer("Cuisine", kitchen.port, PrinterRole::Kitchen))
        .unwrap();
    hub.add_printer(local_printer("Bar", bar.port, PrinterRole::Bar))
        .unwrap();
    hub.set_category_mapping(BTreeMap::from([
        ("Boissons".to_string(), PrinterRole::Bar),
        ("Plats".to_string(), PrinterRole::Kitchen),
    ]))
    .unwrap();
    hub.start();

    let submissions = hub
        .print_kitchen_order(&kitchen_order(), PrintOptions::default())
        .await
        .unwrap();
    assert_eq!(submissions.len(), 2);
    for submission in &submissions {
        let status = hub
            .wait_for_completion(&submission.job_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Completed);
    }

    assert!(kitchen.wait_for("Tartare").await);
    assert!(kitchen.contains("Steak"));
    assert!(!kitchen.contains("Coca"));
    assert!(bar.wait_for("Coca").await);
    assert!(!bar.contains("Steak"));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_printer_fails_after_retries() {
    // grab a free port, then close it
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let hub = hub_with(Arc::new(MemoryStore::new()));
    hub.add_printer(local_printer("Caisse", port, PrinterRole::Cashier))
        .unwrap();
    let mut events = hub.events();
    hub.start();

    let submission = hub
        .print_receipt(&receipt(), PrintOptions::default())
        .await
        .unwrap();
    let status = hub
        .wait_for_completion(&submission.job_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Failed);

    let job = hub.job(&submission.job_id).unwrap();
    assert!(
        job.last_error
            .as_deref()
            .is_some_and(|e| e.starts_with("retry exhausted"))
    );
    assert_eq!(hub.queue_snapshot().failed.len(), 1);

    let mut retry_flags = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PrintEvent::PrintFailed { will_retry, .. } = event {
            retry_flags.push(will_retry);
        }
    }
    assert_eq!(retry_flags, vec![true, false]);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_forced_print_bypasses_queue() {
    let printer = FakePrinter::start().await;
    let hub = hub_with(Arc::new(MemoryStore::new()));
    hub.add_printer(local_printer("Caisse", printer.port, PrinterRole::Cashier))
        .unwrap();

    let submission = hub
        .print_receipt(&receipt(), PrintOptions::forced())
        .await
        .unwrap();
    assert_eq!(submission.status, JobStatus::Completed);
    assert!(printer.wait_for("Chez Paul").await);
    assert!(hub.queue_snapshot().pending.is_empty());

    hub.shutdown().await;
}

#[tokio::test]
async fn test_queue_and_printers_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("print-hub.redb");

    let printer_id = {
        let store = Arc::new(RedbStore::open(&db_path).unwrap());
        let hub = hub_with(store);
        let printer = hub
            .add_printer(local_printer("Caisse", 9100, PrinterRole::Cashier))
            .unwrap();
        hub.print_receipt(&receipt(), PrintOptions::default())
            .await
            .unwrap();
        hub.print_bill(
            &BillData {
                store: receipt().store,
                table: Some("12".into()),
                guests: Some(2),
                issued_at: Utc::now(),
                items: receipt().items,
                subtotal: Decimal::new(950, 2),
                discount: None,
                taxes: vec![],
                total: Decimal::new(950, 2),
            },
            PrintOptions::default(),
        )
        .await
        .unwrap();
        printer.id
    };

    let store = Arc::new(RedbStore::open(&db_path).unwrap());
    let hub = hub_with(store);
    let printers = hub.list_printers();
    assert_eq!(printers.len(), 1);
    assert_eq!(printers[0].id, printer_id);
    assert_eq!(printers[0].port, 9100);

    let pending = hub.queue_snapshot().pending;
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|job| job.status == JobStatus::Pending));
}
