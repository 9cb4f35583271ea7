//! End-to-end tests: raw payloads through ingest, store and queries

use std::sync::Arc;
use std::thread;
use wifi_presence_agent::classifier::{Classifier, DeviceType};
use wifi_presence_agent::config::ClassifierConfig;
use wifi_presence_agent::ingest::{FilterPolicy, IngestWorker, Ingestor, Normalizer};
use wifi_presence_agent::query::{QueryService, SeriesMode, Timeframe};
use wifi_presence_agent::store::{DeviceObservation, PresenceStore, SharedStore};

const NOW: i64 = 1_700_000_000;

fn pipeline(filter: FilterPolicy) -> (Ingestor, SharedStore) {
    let store = PresenceStore::new(1_000, 1_000).shared();
    let normalizer = Normalizer::new(Arc::new(Classifier::builtin()), filter);
    (Ingestor::new(normalizer, store.clone()), store)
}

#[test]
fn test_list_and_object_payloads() {
    let (ingestor, store) = pipeline(FilterPolicy::disabled());

    let list = format!(
        r#"[{{"m":"00:1E:C2:00:00:01","r":-60,"t":{NOW}}},{{"m":"24:0a:c4:00:00:02","r":-75,"t":{NOW}}}]"#
    );
    let report = ingestor.handle_payload(list.as_bytes());
    assert_eq!(report.received, 2);
    assert_eq!(report.kept, 2);

    let object = format!(r#"{{"t":{},"d":[{{"m":"00:1e:c2:00:00:01","s":-48}}]}}"#, NOW + 30);
    ingestor.handle_payload(object.as_bytes());

    let phone = store.get_device("00:1e:c2:00:00:01").expect("phone tracked");
    assert_eq!(phone.occurrence_count, 2);
    assert_eq!(phone.first_seen, NOW);
    assert_eq!(phone.last_seen, NOW + 30);
    assert_eq!(phone.best_rssi, -48);
    assert_eq!(phone.latest_rssi, -48);
    assert_eq!(phone.device_type, DeviceType::Smartphone);

    let sensor = store.get_device("24:0a:c4:00:00:02").expect("sensor tracked");
    assert_eq!(sensor.device_type, DeviceType::Iot);

    let stats = store.get_statistics();
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.timestamps_count, 2);
    assert_eq!(stats.peak_snapshot_count, 2);
    assert_eq!(stats.last_snapshot_count, 1);
}

#[test]
fn test_malformed_payloads_still_count_as_messages() {
    let (ingestor, store) = pipeline(FilterPolicy::disabled());

    let payloads: [&[u8]; 4] = [b"not json", b"", b"42", b"{\"d\": 7}"];
    for payload in payloads {
        let report = ingestor.handle_payload(payload);
        assert_eq!(report.kept, 0);
    }

    let stats = store.get_statistics();
    assert_eq!(stats.total_messages, 4);
    assert_eq!(stats.current_devices, 0);
    assert_eq!(stats.timestamps_count, 0);
    assert!(stats.first_message_time.is_some());
}

#[test]
fn test_filtering_drops_disallowed_types() {
    let (ingestor, store) = pipeline(FilterPolicy::allow([DeviceType::Smartphone]));

    let payload = format!(
        r#"[{{"m":"00:1e:c2:00:00:01","r":-60,"t":{NOW}}},{{"m":"24:0a:c4:00:00:02","r":-60,"t":{NOW}}}]"#
    );
    let report = ingestor.handle_payload(payload.as_bytes());
    assert_eq!(report.received, 2);
    assert_eq!(report.kept, 1);

    assert_eq!(store.get_unique_devices_count(), 1);
    assert!(store.get_device("24:0a:c4:00:00:02").is_none());
}

#[test]
fn test_queries_over_ingested_data() {
    let (ingestor, store) = pipeline(FilterPolicy::disabled());
    let query = QueryService::new(store);

    for (i, offset) in [0, 300, 600].iter().enumerate() {
        let payload = format!(
            r#"{{"t":{},"d":[{{"m":"aa:00:00:00:00:0{}","r":-60}},{{"m":"aa:00:00:00:00:ff","r":-61}}]}}"#,
            NOW + offset,
            i
        );
        ingestor.handle_payload(payload.as_bytes());
    }

    let count = query.period_count_at(Timeframe::OneHour, NOW + 600).unwrap();
    assert_eq!(count.count, 4);

    let series = query
        .timeseries_at(Timeframe::OneHour, SeriesMode::Snapshots, NOW + 600)
        .unwrap();
    assert_eq!(series.points.len(), 3);
    assert!(series.points.iter().all(|p| p.count == 2));

    let realtime = query.realtime_at(NOW + 600).unwrap();
    assert_eq!(realtime.unique_devices, 2);

    let summary = query.summary().unwrap();
    assert_eq!(summary.peak_all_time, 2);
    assert_eq!(summary.total_unique, 4);
}

#[test]
fn test_worker_drains_queue_on_shutdown() {
    let (ingestor, store) = pipeline(FilterPolicy::disabled());
    let (sender, worker) = IngestWorker::spawn(ingestor, 64);

    for i in 0..20 {
        let payload = format!(r#"[{{"m":"bb:00:00:00:00:{i:02x}","r":-60,"t":{NOW}}}]"#);
        sender.submit_blocking(payload.into_bytes()).unwrap();
    }

    assert_eq!(worker.shutdown(), 20);
    assert_eq!(store.get_statistics().total_messages, 20);
    assert_eq!(store.get_unique_devices_count(), 20);
}

#[test]
fn test_concurrent_writers_and_readers() {
    let store = PresenceStore::new(50, 100).shared();

    let writers: Vec<_> = (0..4u8)
        .map(|w| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..100u8 {
                    let mac = format!("{w:02x}:00:00:00:00:{i:02x}");
                    store.add(&[DeviceObservation::new(mac, -60, NOW + i64::from(i))]);
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let stats = store.get_statistics();
                    assert!(stats.current_devices <= 50);
                    assert!(stats.timestamps_count <= 100);
                    let devices = store.get_devices(None);
                    assert!(devices.len() <= 50);
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().expect("thread panicked");
    }

    let stats = store.get_statistics();
    assert_eq!(stats.total_messages, 400);
    assert_eq!(stats.total_devices, 400);
    assert_eq!(stats.current_devices, 50);
    assert_eq!(stats.timestamps_count, 100);
}

#[test]
fn test_registry_file_classifies_unlisted_prefix() {
    let dir = std::env::temp_dir().join(format!("wifi-presence-registry-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("oui.txt");
    std::fs::write(&path, "# excerpt\n70-B3-D5   (hex)\t\tGarmin International\n").unwrap();

    // Not part of the built-in excerpt.
    let mac = "70:b3:d5:12:34:56";
    assert_eq!(Classifier::builtin().classify(mac, -60, None).vendor, None);

    let config = ClassifierConfig {
        oui_file: Some(path),
    };
    let classifier = Classifier::from_config(&config).expect("registry loads");
    let store = PresenceStore::new(100, 100).shared();
    let ingestor = Ingestor::new(
        Normalizer::new(Arc::new(classifier), FilterPolicy::disabled()),
        store.clone(),
    );

    let payload = format!(r#"[{{"m":"{mac}","r":-60,"t":{NOW}}}]"#);
    ingestor.handle_payload(payload.as_bytes());

    let device = store.get_device(mac).expect("device tracked");
    assert_eq!(device.vendor.as_deref(), Some("Garmin"));
    assert_eq!(device.device_type, DeviceType::Smartwatch);
    assert_eq!(device.device_brand.as_deref(), Some("garmin"));

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_far_future_timestamp_does_not_wedge_queries() {
    let (ingestor, store) = pipeline(FilterPolicy::disabled());
    let query = QueryService::new(store.clone());

    ingestor.handle_payload(br#"[{"m":"00:1e:c2:aa:bb:cc","r":-60,"t":9223372036854775807}]"#);

    let count = query.period_count(Timeframe::OneHour).unwrap();
    assert_eq!(count.end_ts, i64::MAX);
    assert_eq!(count.count, 1);

    for timeframe in Timeframe::all() {
        let series = query.timeseries(timeframe, SeriesMode::Presence).unwrap();
        let max_points = timeframe.duration_secs() / timeframe.presence_bucket_secs() + 1;
        assert!(series.points.len() as i64 <= max_points);
    }

    // Writers are not blocked afterwards.
    ingestor.handle_payload(format!(r#"[{{"m":"00:1e:c2:00:00:01","r":-60,"t":{NOW}}}]"#).as_bytes());
    assert_eq!(store.get_unique_devices_count(), 2);
}
