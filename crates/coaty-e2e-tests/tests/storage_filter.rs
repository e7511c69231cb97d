//! End-to-end filter containment scenario: objects stored through
//! `coaty-storage`'s `MemoryAdapter` are retrieved using a
//! `coaty-model` context filter, matched by `coaty-filter`.

use coaty_model::{Condition, ContextFilter, FilterOperator};
use coaty_storage::{MemoryAdapter, NoSqlStorageAdapter};

fn device(id: &str, fleet: &str, battery_pct: i64) -> serde_json::Value {
    serde_json::json!({
        "objectId": id,
        "coreType": "Device",
        "objectType": "fleet.device",
        "name": id,
        "fleet": fleet,
        "batteryPct": battery_pct,
    })
}

#[tokio::test]
async fn find_returns_only_objects_matching_the_filter() {
    let adapter = MemoryAdapter::new();
    adapter.put("devices", device("rpi-001", "north", 80)).await.unwrap();
    adapter.put("devices", device("rpi-002", "north", 15)).await.unwrap();
    adapter.put("devices", device("rpi-003", "south", 60)).await.unwrap();

    let filter = ContextFilter {
        condition: Some(Condition::single("fleet", FilterOperator::Equals(serde_json::json!("north")))),
        ..Default::default()
    };

    let mut matched = Vec::new();
    let iterator = adapter.find("devices", &filter).await.unwrap();
    iterator
        .for_each(&mut |object| {
            matched.push(object["objectId"].as_str().unwrap().to_string());
            true
        })
        .await;
    matched.sort();

    assert_eq!(matched, vec!["rpi-001", "rpi-002"]);
}

#[tokio::test]
async fn find_combines_conditions_and_low_battery_alerting() {
    let adapter = MemoryAdapter::new();
    adapter.put("devices", device("rpi-001", "north", 80)).await.unwrap();
    adapter.put("devices", device("rpi-002", "north", 15)).await.unwrap();
    adapter.put("devices", device("rpi-003", "south", 10)).await.unwrap();

    let filter = ContextFilter {
        condition: Some(Condition::And(vec![
            Condition::single("fleet", FilterOperator::Equals(serde_json::json!("north"))),
            Condition::single("batteryPct", FilterOperator::LessThan(serde_json::json!(20))),
        ])),
        ..Default::default()
    };

    let mut matched = Vec::new();
    let iterator = adapter.find("devices", &filter).await.unwrap();
    iterator
        .for_each(&mut |object| {
            matched.push(object["objectId"].as_str().unwrap().to_string());
            true
        })
        .await;

    assert_eq!(matched, vec!["rpi-002"]);
}
