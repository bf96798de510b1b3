//! Event bus tests: delivery rules and fault containment

use proxy_panel::module::api::events::{Event, EventBus, WILDCARD};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn recorder(bus: &EventBus, event_type: &str) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(event_type, move |event| {
        sink.lock().unwrap().push(event.event_type.clone());
        Ok(())
    });
    seen
}

#[test]
fn test_failing_handler_does_not_block_others() {
    let bus = EventBus::new();
    bus.subscribe("site.created", |_| Err(anyhow::anyhow!("disk full")));
    let seen = recorder(&bus, "site.created");

    bus.publish(Event::new("site.created", "sites"));

    assert_eq!(*seen.lock().unwrap(), vec!["site.created"]);
}

#[test]
fn test_panicking_handler_is_contained() {
    let bus = EventBus::new();
    bus.subscribe("site.created", |_| panic!("handler bug"));
    let seen = recorder(&bus, WILDCARD);

    bus.publish(Event::new("site.created", "sites"));
    bus.publish(Event::new("site.created", "sites"));

    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn test_wildcard_receives_everything_typed_only_its_type() {
    let bus = EventBus::new();
    let all = recorder(&bus, WILDCARD);
    let created = recorder(&bus, "site.created");

    bus.publish(Event::new("site.created", "sites"));
    bus.publish(Event::new("site.deleted", "sites"));
    bus.publish(Event::new("proxy.reloaded", "core"));

    assert_eq!(
        *all.lock().unwrap(),
        vec!["site.created", "site.deleted", "proxy.reloaded"]
    );
    assert_eq!(*created.lock().unwrap(), vec!["site.created"]);
}

#[test]
fn test_typed_handlers_run_before_wildcard() {
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&order);
    bus.subscribe(WILDCARD, move |_| {
        sink.lock().unwrap().push("wildcard");
        Ok(())
    });
    let sink = Arc::clone(&order);
    bus.subscribe("deploy.finished", move |_| {
        sink.lock().unwrap().push("typed");
        Ok(())
    });

    bus.publish(Event::new("deploy.finished", "deploy"));
    assert_eq!(*order.lock().unwrap(), vec!["typed", "wildcard"]);
}

#[test]
fn test_subscribe_during_dispatch_misses_inflight_event() {
    let bus = Arc::new(EventBus::new());
    let late_calls = Arc::new(AtomicUsize::new(0));

    let inner_bus = Arc::clone(&bus);
    let counter = Arc::clone(&late_calls);
    bus.subscribe("tick", move |_| {
        let counter = Arc::clone(&counter);
        inner_bus.subscribe("tick", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Ok(())
    });

    bus.publish(Event::new("tick", "test"));
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    bus.publish(Event::new("tick", "test"));
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_timestamp_filled_only_when_unset() {
    let bus = EventBus::new();
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stamps);
    bus.subscribe(WILDCARD, move |event| {
        sink.lock().unwrap().push(event.timestamp);
        Ok(())
    });

    bus.publish(Event::new("a", "test"));
    let mut preset = Event::new("b", "test");
    preset.timestamp = 42;
    bus.publish(preset);

    let stamps = stamps.lock().unwrap();
    assert!(stamps[0] > 0);
    assert_eq!(stamps[1], 42);
}

#[test]
fn test_publish_without_subscribers() {
    let bus = EventBus::new();
    bus.publish(Event::new("nobody.listens", "test").with("n", 1));
    assert_eq!(bus.handler_count("nobody.listens"), 0);
}
