//! End-to-end Channel and Discover/Resolve scenarios across two
//! independent containers sharing one broker.

mod helpers;

use std::time::Duration;

use coaty_model::{CoatyObject, CoreType, DiscoverData};
use tokio_stream::StreamExt;

use helpers::TwoContainerHarness;

#[tokio::test]
async fn channel_publish_is_observed_by_the_other_container() {
    let harness = TwoContainerHarness::new().await;

    let mut stream = harness.b.observe_channel("telemetry").await;
    let task = CoatyObject::new(CoreType::Task, "pump-status");
    harness.a.publish_channel("telemetry", &task).await.unwrap();

    let received = stream.next().await.expect("channel event should arrive");
    assert_eq!(received.data.object_id, task.object_id);
}

#[tokio::test]
async fn channel_with_different_id_is_not_observed() {
    let harness = TwoContainerHarness::new().await;

    let mut stream = harness.b.observe_channel("other").await;
    let task = CoatyObject::new(CoreType::Task, "pump-status");
    harness.a.publish_channel("telemetry", &task).await.unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
    assert!(result.is_err(), "unrelated channel id must not receive the event");
}

#[tokio::test]
async fn discover_by_object_id_resolves_exactly_once() {
    let harness = TwoContainerHarness::new().await;

    let target = CoatyObject::new(CoreType::Task, "pump-status");
    let target_id = target.object_id;

    let mut requests = harness.b.observe_discover().await;
    let responder = tokio::spawn(async move {
        let request = requests.next().await.expect("discover request should arrive");
        assert_eq!(request.event.data.object_id, Some(target_id));
        request.resolve(target.clone()).await.unwrap();
        // A second resolve on the same request must fail.
        assert!(request.resolve(target).await.is_err());
    });

    let mut resolves = harness
        .a
        .publish_discover(DiscoverData::by_object_id(target_id))
        .await
        .unwrap()
        .with_timeout(Duration::from_secs(5));

    let resolved = resolves.next().await.expect("resolve event should arrive");
    assert_eq!(resolved.data.object_id, target_id);

    responder.await.unwrap();
}

#[tokio::test]
async fn discover_with_no_responder_times_out() {
    let harness = TwoContainerHarness::new().await;

    let mut resolves = harness
        .a
        .publish_discover(DiscoverData::by_object_id(uuid::Uuid::new_v4()))
        .await
        .unwrap()
        .with_timeout(Duration::from_millis(100));

    assert!(resolves.next().await.is_none(), "unanswered discover should end the stream on timeout");
    let _ = &harness.b;
}
