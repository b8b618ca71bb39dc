#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::{
    AgentFrame, AgentLink, AgentMailbox, BackpressureController, BusMessage, ConnectionRegistry,
    DeliveryCoordinator, DeliveryError, DeliveryHandler, Dispatch, Topic, TopicConfig,
};
use db::{DbConfig, repositories::JobRepository};
use label_core::{DeliveryEvent, DeliveryState, JobId, WireJob};
use tokio::sync::broadcast;

struct Harness {
    topic: Topic,
    coordinator: DeliveryCoordinator,
    registry: Arc<ConnectionRegistry>,
}

async fn setup() -> Result<Harness, Box<dyn Error>> {
    let db = db::init(DbConfig::memory()).await?;
    let jobs = JobRepository::new(db);

    let config = TopicConfig::new("jobs")
        .with_poll_interval(Duration::from_millis(10))
        .with_requeue_delay(Duration::from_millis(10));
    let mut topic = Topic::start(config).await?;
    let bus = topic.client();

    let (events, _) = broadcast::channel(64);
    let registry = Arc::new(
        ConnectionRegistry::new(Duration::from_secs(1))
            .with_backpressure(BackpressureController::new(bus.clone()))
            .with_events(events.clone()),
    );
    let coordinator = DeliveryCoordinator::new(jobs, bus, registry.clone(), events);
    topic
        .spawn_consumers(Arc::new(DeliveryHandler::new(coordinator.clone())))
        .await?;

    Ok(Harness {
        topic,
        coordinator,
        registry,
    })
}

async fn next_text(mailbox: &mut AgentMailbox) -> Option<String> {
    match tokio::time::timeout(Duration::from_secs(2), mailbox.next_frame()).await {
        Ok(Some(AgentFrame::Text(text))) => Some(text),
        _ => None,
    }
}

#[tokio::test]
async fn test_job_waits_for_first_agent() -> Result<(), Box<dyn Error>> {
    let harness = setup().await?;
    let bus = harness.coordinator.bus().clone();

    let job = harness.coordinator.submit("^XA^FDwaiting^FS^XZ").await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = bus.stats().await?;
    assert_eq!(stats.max_in_flight, 0);
    assert_eq!(stats.depth, 1);
    assert_eq!(stats.in_flight, 0);

    let (link, mut mailbox) = AgentLink::channel(8);
    harness.registry.add(link).await;

    let text = next_text(&mut mailbox).await.ok_or("no frame delivered")?;
    let wire: WireJob = serde_json::from_str(&text)?;
    assert_eq!(wire.id, job.id);
    assert_eq!(wire.print, "^XA^FDwaiting^FS^XZ");
    assert_eq!(wire.timestamp, job.created_at.timestamp());

    harness.topic.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_acknowledged_job_is_not_redispatched() -> Result<(), Box<dyn Error>> {
    let harness = setup().await?;
    let mut events = harness.coordinator.subscribe();

    let (link, mut mailbox) = AgentLink::channel(8);
    let connection_id = harness.registry.add(link).await;

    let job = harness.coordinator.submit("^XA^XZ").await?;
    let text = next_text(&mut mailbox).await.ok_or("no frame delivered")?;
    let wire: WireJob = serde_json::from_str(&text)?;

    let outcome = harness
        .coordinator
        .acknowledge(JobId::parse(&wire.ack())?, Some(connection_id))
        .await?;
    assert!(outcome.transitioned());
    assert_eq!(
        harness.coordinator.jobs().get(job.id).await?.state,
        DeliveryState::Printed
    );

    // Redelivery of the same reference.
    harness
        .coordinator
        .bus()
        .publish(job.reference().to_body())
        .await?;

    let mut suppressed = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(100), events.recv()).await {
            Ok(Ok(DeliveryEvent::DuplicateSuppressed { job_id, .. })) if job_id == job.id => {
                suppressed = true;
                break;
            }
            _ => {}
        }
    }
    assert!(suppressed);
    assert!(mailbox.frames.try_recv().is_err());

    harness.topic.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_second_acknowledgment_is_a_noop() -> Result<(), Box<dyn Error>> {
    let harness = setup().await?;
    let job = harness.coordinator.jobs().create("label").await?;

    let first = harness.coordinator.acknowledge(job.id, None).await?;
    let second = harness.coordinator.acknowledge(job.id, None).await?;

    assert!(first.transitioned());
    assert!(!second.transitioned());
    assert_eq!(first.job().printed_at, second.job().printed_at);

    harness.topic.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_acknowledging_unknown_job_fails() -> Result<(), Box<dyn Error>> {
    let harness = setup().await?;

    let result = harness.coordinator.acknowledge(JobId(9_999), None).await;
    assert!(matches!(
        result,
        Err(DeliveryError::Store(db::DbError::NotFound(_)))
    ));

    harness.topic.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_dispatch_drops_unusable_references() -> Result<(), Box<dyn Error>> {
    let harness = setup().await?;
    let (link, _mailbox) = AgentLink::channel(8);
    harness.registry.add(link).await;

    for body in ["", "   ", "not-a-number", "424242"] {
        let outcome = harness.coordinator.dispatch(&BusMessage::new(body)).await?;
        assert!(matches!(outcome, Dispatch::Dropped(_)), "{:?}", body);
    }

    harness.topic.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_dispatch_without_agents_requeues() -> Result<(), Box<dyn Error>> {
    let harness = setup().await?;
    let job = harness.coordinator.jobs().create("label").await?;

    let result = harness
        .coordinator
        .dispatch(&BusMessage::new(job.reference().to_body()))
        .await;
    assert!(matches!(result, Err(DeliveryError::NoAgents)));

    harness.topic.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_every_agent_receives_the_job() -> Result<(), Box<dyn Error>> {
    let harness = setup().await?;
    let (a, mut mailbox_a) = AgentLink::channel(8);
    let (b, mut mailbox_b) = AgentLink::channel(8);
    harness.registry.add(a).await;
    harness.registry.add(b).await;
    // Dispatch waits for each agent's writer, so read while it runs.
    let reader_a = tokio::spawn(async move { next_text(&mut mailbox_a).await });
    let reader_b = tokio::spawn(async move { next_text(&mut mailbox_b).await });

    let job = harness.coordinator.jobs().create("label").await?;
    let outcome = harness
        .coordinator
        .dispatch(&BusMessage::new(job.reference().to_body()))
        .await?;

    match outcome {
        Dispatch::Delivered { job_id, report } => {
            assert_eq!(job_id, job.id);
            assert_eq!(report.delivered.len(), 2);
        }
        other => panic!("unexpected dispatch outcome: {:?}", other),
    }
    assert!(reader_a.await?.is_some());
    assert!(reader_b.await?.is_some());

    harness.topic.shutdown().await;
    Ok(())
}
