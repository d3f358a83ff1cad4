//! Command service and aggregation worker wired together over in-memory
//! collaborators: commands publish, the worker folds, queries observe.

#![allow(clippy::unwrap_used)]

use chrono::Duration as ChronoDuration;
use job_postings::{
    EventBusJobPublisher, Job, JobAggregateEvent, JobAggregationWorker, JobId, JobOperationResult,
    JobService, JobView, JobViewReader, Money, PostingData, RecordedJobEvent, VendorId,
    ViewJobQueryService, WorkerError, WorkerSettings, replay,
};
use job_postings_core::environment::Clock;
use job_postings_core::event::Event;
use job_postings_core::projection::ProjectionCheckpoint;
use job_postings_testing::{
    FixedClock, InMemoryEventBus, InMemoryProjectionCheckpoint, InMemoryProjectionStore,
    SequentialIdGenerator, init_test_tracing, test_clock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const TOPIC: &str = "job-events";
const CHANGELOG: &str = "job-aggregates";

fn tutoring() -> PostingData {
    PostingData {
        title: "Tutoring".to_string(),
        description: "Math help".to_string(),
        latitude: 51.5,
        longitude: -1.1,
        payment: Money::from_cents(799),
    }
}

fn math_tutoring() -> PostingData {
    PostingData {
        title: "Math Tutoring".to_string(),
        ..tutoring()
    }
}

struct System {
    bus: InMemoryEventBus,
    store: Arc<InMemoryProjectionStore>,
    checkpoint: Arc<InMemoryProjectionCheckpoint>,
    clock: Arc<FixedClock>,
    reader: JobViewReader<InMemoryProjectionStore>,
    service: JobService,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<(JobAggregationWorker<InMemoryProjectionStore>, Result<(), WorkerError>)>,
}

fn settings() -> WorkerSettings {
    WorkerSettings {
        topic: TOPIC.to_string(),
        aggregate_topic: Some(CHANGELOG.to_string()),
        checkpoint_interval: 1,
        ..WorkerSettings::default()
    }
}

fn spawn(
    mut worker: JobAggregationWorker<InMemoryProjectionStore>,
) -> JoinHandle<(JobAggregationWorker<InMemoryProjectionStore>, Result<(), WorkerError>)> {
    tokio::spawn(async move {
        let result = worker.run().await;
        (worker, result)
    })
}

impl System {
    fn start() -> Self {
        init_test_tracing();

        let bus = InMemoryEventBus::new();
        let store = Arc::new(InMemoryProjectionStore::new());
        let checkpoint = Arc::new(InMemoryProjectionCheckpoint::new());
        let clock = Arc::new(test_clock());

        let (worker, shutdown) = JobAggregationWorker::new(
            JobView::new(Arc::clone(&store)),
            Arc::new(bus.clone()),
            Arc::clone(&checkpoint) as Arc<dyn ProjectionCheckpoint>,
            settings(),
        );
        let reader = worker.reader();

        let service = JobService::new(
            Arc::new(EventBusJobPublisher::new(
                Arc::new(bus.clone()),
                TOPIC,
                Duration::from_secs(1),
            )),
            Arc::new(ViewJobQueryService::new(reader.clone(), Duration::from_secs(1))),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(SequentialIdGenerator::default()),
        );

        Self {
            bus,
            store,
            checkpoint,
            clock,
            reader,
            service,
            shutdown,
            worker: spawn(worker),
        }
    }

    /// Wait until the view holds `expected` for `id`.
    async fn settled(&self, id: &JobId, expected: Option<&Job>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self.reader.get(id).await.unwrap().as_ref() == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Wait until the worker has folded everything published so far.
    async fn drained(&self) {
        let expected = i64::try_from(self.bus.published(TOPIC).len()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self
                    .checkpoint
                    .position("job-aggregates")
                    .and_then(|p| p.next_offset(TOPIC, 0))
                    == Some(expected)
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn history(&self, id: &JobId) -> Vec<RecordedJobEvent> {
        self.bus
            .published(TOPIC)
            .iter()
            .filter(|e| e.key == id.as_str())
            .map(|e| RecordedJobEvent::from_serialized(e).unwrap())
            .collect()
    }

    async fn stop(self) -> JobAggregationWorker<InMemoryProjectionStore> {
        self.shutdown.send(true).unwrap();
        let (worker, result) = self.worker.await.unwrap();
        result.unwrap();
        worker
    }
}

#[tokio::test]
async fn posting_lifecycle() {
    let system = System::start();
    let owner = VendorId::from("v1");

    // add
    let posted = system.service.add(owner.clone(), tutoring()).await.unwrap();
    assert_eq!(posted.vendor_id, owner);
    assert_eq!(posted.title, "Tutoring");
    assert_eq!(posted.description, "Math help");
    assert!((posted.latitude - 51.5).abs() < f64::EPSILON);
    assert!((posted.longitude + 1.1).abs() < f64::EPSILON);
    assert_eq!(posted.payment.to_string(), "7.99");
    assert_eq!(posted.modified_at, None);
    let id = posted.id.clone();
    system.settled(&id, Some(&posted)).await;

    // update by owner
    system.clock.advance(ChronoDuration::hours(1));
    let outcome = system.service.update(&id, &owner, math_tutoring()).await.unwrap();
    assert_eq!(outcome, JobOperationResult::Success);

    let folded = replay(&id, &system.history(&id)).unwrap();
    assert_eq!(folded.title, "Math Tutoring");
    assert_eq!(folded.created_at, posted.created_at);
    assert_eq!(folded.modified_at, Some(system.clock.now()));
    system.settled(&id, Some(&folded)).await;

    // update by someone else
    let before = system.bus.publish_count();
    let outcome = system
        .service
        .update(&id, &VendorId::from("v2"), tutoring())
        .await
        .unwrap();
    assert_eq!(outcome, JobOperationResult::Forbidden);
    assert_eq!(system.bus.publish_count(), before);

    // delete by owner
    let outcome = system.service.delete(&id, &owner).await.unwrap();
    assert_eq!(outcome, JobOperationResult::Success);
    system.settled(&id, None).await;

    // tombstoned looks like never existed
    let outcome = system.service.update(&id, &owner, tutoring()).await.unwrap();
    assert_eq!(outcome, JobOperationResult::NotFound);
    let outcome = system.service.delete(&id, &owner).await.unwrap();
    assert_eq!(outcome, JobOperationResult::NotFound);
    assert_eq!(system.history(&id).len(), 3);

    system.stop().await;
}

#[tokio::test]
async fn changelog_mirrors_each_fold() {
    let system = System::start();
    let owner = VendorId::from("v1");

    let posted = system.service.add(owner.clone(), tutoring()).await.unwrap();
    system.settled(&posted.id, Some(&posted)).await;
    system.service.delete(&posted.id, &owner).await.unwrap();
    system.settled(&posted.id, None).await;
    system.drained().await;

    let changelog: Vec<JobAggregateEvent> = system
        .bus
        .published(CHANGELOG)
        .iter()
        .map(|e| JobAggregateEvent::from_bytes(&e.data).unwrap())
        .collect();
    assert_eq!(
        changelog,
        vec![
            JobAggregateEvent::Aggregated { job: posted.clone() },
            JobAggregateEvent::Tombstoned { id: posted.id.clone() },
        ]
    );

    system.stop().await;
}

#[tokio::test]
async fn rebuild_refolds_the_same_view() {
    let system = System::start();
    let owner = VendorId::from("v1");

    let first = system.service.add(owner.clone(), tutoring()).await.unwrap();
    let second = system.service.add(owner.clone(), tutoring()).await.unwrap();
    system.clock.advance(ChronoDuration::minutes(10));
    system.settled(&first.id, Some(&first)).await;
    system.settled(&second.id, Some(&second)).await;
    system.service.update(&first.id, &owner, math_tutoring()).await.unwrap();
    system.service.delete(&second.id, &owner).await.unwrap();
    system.drained().await;

    let before = system.reader.get(&first.id).await.unwrap();
    assert_eq!(before.as_ref().map(|j| j.title.as_str()), Some("Math Tutoring"));
    assert_eq!(system.reader.get(&second.id).await.unwrap(), None);

    let bus = system.bus.clone();
    let store = Arc::clone(&system.store);
    let checkpoint = Arc::clone(&system.checkpoint);
    let reader = system.reader.clone();
    let worker = system.stop().await;

    worker.rebuild().await.unwrap();
    assert!(store.is_empty());
    assert!(checkpoint.position("job-aggregates").unwrap().is_beginning());

    // The reset checkpoint sends the next run back to the first record.
    let (worker, shutdown) = JobAggregationWorker::new(
        JobView::new(Arc::clone(&store)),
        Arc::new(bus.clone()),
        Arc::clone(&checkpoint) as Arc<dyn ProjectionCheckpoint>,
        WorkerSettings {
            aggregate_topic: None,
            ..settings()
        },
    );
    let handle = spawn(worker);

    tokio::time::timeout(Duration::from_secs(5), async {
        while reader.get(&first.id).await.unwrap() != before {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(reader.get(&second.id).await.unwrap(), None);
    assert_eq!(store.keys(), vec![first.id.to_string()]);

    shutdown.send(true).unwrap();
    handle.await.unwrap().1.unwrap();
}

#[tokio::test]
async fn read_after_write_may_lag_but_converges() {
    let system = System::start();
    let owner = VendorId::from("v1");

    let posted = system.service.add(owner.clone(), tutoring()).await.unwrap();
    system.settled(&posted.id, Some(&posted)).await;
    let found = system.service.find_by_id(&posted.id).await.unwrap();
    assert_eq!(found, Some(posted));

    system.stop().await;
}

#[tokio::test]
async fn restarted_worker_continues_from_its_cursor() {
    let system = System::start();
    let owner = VendorId::from("v1");

    let posted = system.service.add(owner.clone(), tutoring()).await.unwrap();
    system.settled(&posted.id, Some(&posted)).await;
    system.drained().await;

    let bus = system.bus.clone();
    let store = Arc::clone(&system.store);
    let checkpoint = Arc::clone(&system.checkpoint);
    let reader = system.reader.clone();
    let service = system.service.clone();
    system.stop().await;
    assert_eq!(bus.published(CHANGELOG).len(), 1);

    let (worker, shutdown) = JobAggregationWorker::new(
        JobView::new(Arc::clone(&store)),
        Arc::new(bus.clone()),
        Arc::clone(&checkpoint) as Arc<dyn ProjectionCheckpoint>,
        settings(),
    );
    let handle = spawn(worker);

    service.update(&posted.id, &owner, math_tutoring()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = reader.get(&posted.id).await.unwrap();
            if job.is_some_and(|j| j.title == "Math Tutoring") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    shutdown.send(true).unwrap();
    handle.await.unwrap().1.unwrap();

    // Only the new event was folded after the restart
    let changelog = bus.published(CHANGELOG);
    assert_eq!(changelog.len(), 2);
    assert_eq!(
        JobAggregateEvent::from_bytes(&changelog[1].data).unwrap(),
        JobAggregateEvent::Aggregated {
            job: reader.get(&posted.id).await.unwrap().unwrap()
        }
    );
    assert_eq!(
        checkpoint
            .position("job-aggregates")
            .and_then(|p| p.next_offset(TOPIC, 0)),
        Some(2)
    );
}
