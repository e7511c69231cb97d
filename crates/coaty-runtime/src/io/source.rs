//! IO Source controller: per-source backpressure regulation (spec §4.4).

use std::time::Duration;

use coaty_communication::{Channel, CommunicationManager, IoState, IoValuePayload};
use coaty_model::{IoSource, UpdateStrategy};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

/// What the regulator decided to do with the incoming value.
enum Regulation {
    PassThrough,
    Sample(Duration),
    Throttle(Duration),
}

fn regulate(strategy: UpdateStrategy, rate: Option<u64>) -> Regulation {
    let effective = if strategy == UpdateStrategy::Default { UpdateStrategy::Sample } else { strategy };
    match (effective, rate) {
        (UpdateStrategy::None, _) => Regulation::PassThrough,
        (_, None) | (_, Some(0)) => Regulation::PassThrough,
        (UpdateStrategy::Sample, Some(ms)) => Regulation::Sample(Duration::from_millis(ms)),
        (UpdateStrategy::Throttle, Some(ms)) => Regulation::Throttle(Duration::from_millis(ms)),
        (UpdateStrategy::Default, _) => unreachable!("Default is normalized to Sample above"),
    }
}

/// Accepts `publish` calls from application code and forwards them to the
/// wire through a rate regulator selected by the source's `updateStrategy`
/// and its currently-negotiated cumulative rate. The regulator is rebuilt
/// (any scheduled emission cancelled) whenever the rate or association
/// state changes, driven by `CommunicationManager::observe_io_state`.
pub struct IoSourceController {
    source_id: Uuid,
    input_tx: mpsc::UnboundedSender<IoValuePayload>,
}

impl IoSourceController {
    pub fn new<C: Channel>(source: &IoSource, manager: CommunicationManager<C>) -> Self {
        let source_id = source.base.object_id;
        let io_state = manager.observe_io_state(&source_id.to_string());
        let strategy = source.update_strategy;
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_regulator(manager, source_id, strategy, input_rx, io_state));
        Self { source_id, input_tx }
    }

    pub fn source_id(&self) -> Uuid {
        self.source_id
    }

    /// Submit a fresh value. Caller owns the value at this point, so there
    /// is nothing left to alias by the time it reaches the regulator — the
    /// deep-clone-before-send spec step is satisfied by `publish` taking
    /// the payload by value rather than by reference.
    pub fn publish(&self, value: IoValuePayload) {
        let _ = self.input_tx.send(value);
    }
}

async fn run_regulator<C: Channel>(
    manager: CommunicationManager<C>,
    source_id: Uuid,
    strategy: UpdateStrategy,
    mut inputs: mpsc::UnboundedReceiver<IoValuePayload>,
    mut io_state: watch::Receiver<IoState>,
) {
    let mut pending: Option<IoValuePayload> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let sleep_until_deadline = match deadline {
            Some(when) => tokio::time::sleep_until(when),
            None => tokio::time::sleep_until(Instant::now() + Duration::from_secs(60 * 60 * 24)),
        };
        tokio::pin!(sleep_until_deadline);

        tokio::select! {
            changed = io_state.changed() => {
                if changed.is_err() {
                    return;
                }
                deadline = None;
                if !io_state.borrow().has_associations {
                    pending = None;
                }
            }
            maybe_value = inputs.recv() => {
                let Some(value) = maybe_value else { return };
                let state = *io_state.borrow();
                if !state.has_associations {
                    continue;
                }
                match regulate(strategy, state.update_rate) {
                    Regulation::PassThrough => {
                        deadline = None;
                        pending = None;
                        let _ = manager.publish_io_value(source_id, value).await;
                    }
                    Regulation::Sample(rate) => {
                        pending = Some(value);
                        if deadline.is_none() {
                            deadline = Some(Instant::now() + rate);
                        }
                    }
                    Regulation::Throttle(rate) => {
                        pending = Some(value);
                        deadline = Some(Instant::now() + rate);
                    }
                }
            }
            () = &mut sleep_until_deadline, if deadline.is_some() => {
                if let Some(value) = pending.take() {
                    let _ = manager.publish_io_value(source_id, value).await;
                }
                match regulate(strategy, io_state.borrow().update_rate) {
                    Regulation::Sample(rate) => deadline = Some(Instant::now() + rate),
                    _ => deadline = None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coaty_communication::{CommunicationManager, CommunicationOptions, MockBroker};
    use coaty_model::Identity;

    fn test_source(strategy: UpdateStrategy, rate: Option<u64>) -> IoSource {
        let mut source = IoSource::new("s", "temp");
        source.update_strategy = strategy;
        source.io.update_rate = rate;
        source
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_while_unassociated() {
        let broker = MockBroker::new();
        let manager = CommunicationManager::new(broker.connect(), Identity::new("agent"), CommunicationOptions::default());
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();

        let source = test_source(UpdateStrategy::None, None);
        let controller = IoSourceController::new(&source, manager.clone());
        controller.publish(IoValuePayload::Json(serde_json::json!(1)));
        tokio::time::advance(Duration::from_millis(10)).await;

        assert!(tokio::time::timeout(Duration::from_millis(5), bridge_rx.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn none_strategy_passes_through_every_value() {
        let broker = MockBroker::new();
        let manager = CommunicationManager::new(broker.connect(), Identity::new("agent"), CommunicationOptions::default());
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();

        let source = test_source(UpdateStrategy::None, Some(100));
        let controller = IoSourceController::new(&source, manager.clone());
        manager.set_io_state(&controller.source_id().to_string(), IoState { has_associations: true, update_rate: Some(100) });
        tokio::time::advance(Duration::from_millis(1)).await;

        controller.publish(IoValuePayload::Json(serde_json::json!(1)));
        controller.publish(IoValuePayload::Json(serde_json::json!(2)));
        tokio::time::advance(Duration::from_millis(1)).await;

        for _ in 0..2 {
            tokio::time::timeout(Duration::from_millis(10), bridge_rx.recv())
                .await
                .expect("should not time out")
                .expect("channel should not be closed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sample_emits_at_most_once_per_interval() {
        let broker = MockBroker::new();
        let manager = CommunicationManager::new(broker.connect(), Identity::new("agent"), CommunicationOptions::default());
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();

        let source = test_source(UpdateStrategy::Sample, Some(100));
        let controller = IoSourceController::new(&source, manager.clone());
        manager.set_io_state(&controller.source_id().to_string(), IoState { has_associations: true, update_rate: Some(100) });
        tokio::time::advance(Duration::from_millis(1)).await;

        for i in 0..100u32 {
            controller.publish(IoValuePayload::Json(serde_json::json!(i)));
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        tokio::time::advance(Duration::from_millis(200)).await;

        let mut count = 0;
        while tokio::time::timeout(Duration::from_millis(1), bridge_rx.recv()).await.is_ok() {
            count += 1;
        }
        // 100 values over ~1000ms at R=100ms: ceil(1000/100)+1 = 11.
        assert!(count <= 11, "expected at most 11 emissions, got {count}");
        assert!(count >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_emits_the_last_value_once_after_quiescence() {
        let broker = MockBroker::new();
        let manager = CommunicationManager::new(broker.connect(), Identity::new("agent"), CommunicationOptions::default());
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();

        let source = test_source(UpdateStrategy::Throttle, Some(100));
        let controller = IoSourceController::new(&source, manager.clone());
        manager.set_io_state(&controller.source_id().to_string(), IoState { has_associations: true, update_rate: Some(100) });
        tokio::time::advance(Duration::from_millis(1)).await;

        controller.publish(IoValuePayload::Json(serde_json::json!(1)));
        tokio::time::advance(Duration::from_millis(30)).await;
        controller.publish(IoValuePayload::Json(serde_json::json!(2)));
        tokio::time::advance(Duration::from_millis(30)).await;
        controller.publish(IoValuePayload::Json(serde_json::json!(3)));

        // no emission yet -- still within the quiescence window
        assert!(tokio::time::timeout(Duration::from_millis(5), bridge_rx.recv()).await.is_err());

        tokio::time::advance(Duration::from_millis(150)).await;
        let (_, payload) = tokio::time::timeout(Duration::from_millis(10), bridge_rx.recv())
            .await
            .expect("should emit after quiescence")
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, serde_json::json!(3));

        assert!(tokio::time::timeout(Duration::from_millis(5), bridge_rx.recv()).await.is_err());
    }
}
