//! Grant, persist, restore and schedule across crates.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use permissions::endowments::{self, Endowment, CRONJOB_CAVEAT};
use permissions::{Caveat, PermissionController, SpecificationRegistry};
use scheduler::{CronjobHandler, CronjobService, MonotonicClock, SYSTEM_ORIGIN};
use serde_json::{json, Map, Value};
use storage::PermissionDb;
use tokio::sync::mpsc;

struct Channel(mpsc::UnboundedSender<(String, String, Map<String, Value>)>);

impl CronjobHandler for Channel {
    async fn deliver(
        &self,
        plugin: &str,
        origin: &str,
        request: Map<String, Value>,
    ) -> scheduler::Result<()> {
        self.0
            .send((plugin.to_string(), origin.to_string(), request))
            .map_err(|e| scheduler::Error::Delivery(e.to_string()))
    }
}

fn registry() -> SpecificationRegistry {
    let mut registry = SpecificationRegistry::new();
    for spec in endowments::all_endowment_specifications() {
        registry.register(spec).unwrap();
    }
    registry
}

fn start() -> DateTime<Utc> {
    "2030-06-01T12:00:00Z".parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn restored_grants_drive_the_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("permissions.db");

    {
        let db = PermissionDb::open(&path).unwrap();
        let controller = PermissionController::new(registry()).with_persistence(db);
        controller
            .grant(
                "npm:weather",
                Endowment::Cronjob.target_key(),
                Some(vec![Caveat::new(
                    CRONJOB_CAVEAT,
                    json!({ "jobs": [
                        { "expression": "*/30 * * * * *", "request": { "method": "refresh" } }
                    ] }),
                )]),
            )
            .unwrap();
        controller
            .grant("npm:weather", Endowment::NetworkAccess.target_key(), None)
            .unwrap();
    }

    let controller = Arc::new(PermissionController::new(registry()));
    let restored = controller
        .restore(PermissionDb::open(&path).unwrap().load_all().unwrap())
        .unwrap();
    assert_eq!(restored, 2);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let service = CronjobService::with_clock(
        controller.clone(),
        Channel(tx),
        MonotonicClock::starting_at(start()),
    );
    assert_eq!(service.register("npm:weather").unwrap(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let mut deliveries = Vec::new();
    while let Ok(delivery) = rx.try_recv() {
        deliveries.push(delivery);
    }
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries.iter().all(|(plugin, origin, request)| {
        plugin == "npm:weather"
            && origin == SYSTEM_ORIGIN
            && request.get("method") == Some(&json!("refresh"))
    }));

    controller
        .revoke("npm:weather", Endowment::Cronjob.target_key())
        .unwrap();
    service.unregister("npm:weather");
    assert_eq!(service.register("npm:weather").unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn unregister_right_after_a_firing_prevents_the_next_one() {
    let controller = Arc::new(PermissionController::new(registry()));
    controller
        .grant(
            "npm:ticker",
            Endowment::Cronjob.target_key(),
            Some(vec![Caveat::new(
                CRONJOB_CAVEAT,
                json!({ "jobs": [{ "expression": "* * * * * *", "request": {} }] }),
            )]),
        )
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let service = CronjobService::with_clock(
        controller,
        Channel(tx),
        MonotonicClock::starting_at(start()),
    );
    service.register("npm:ticker").unwrap();

    // Wake on the first delivery and cancel immediately.
    let first = rx.recv().await.unwrap();
    assert_eq!(first.0, "npm:ticker");
    assert!(service.unregister("npm:ticker"));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(service.armed_timers(), 0);
}
