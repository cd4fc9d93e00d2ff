//! End-to-end tests for the execution kernel: guard, cascade, executor,
//! reconciler, and the task service, wired against scripted fakes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use courier_bridge::Bridge;
use courier_channels::{
    ChannelError, CredentialCodec, Destination, DestinationKind, Messenger, MessengerFactory,
    Notifier,
};
use courier_core::config::BridgeConfig;
use courier_core::trigger::IntervalUnit;
use courier_dispatch::executor::execute_task;
use courier_dispatch::reconciler::reconcile_once;
use courier_dispatch::{cascade, ScheduleRequest, Services, TaskRequest, TaskService};
use courier_scheduler::SchedulerHandle;
use courier_store::{Store, TaskStatus};

/// Shared script driving every fake messenger the factory hands out.
#[derive(Default)]
struct Script {
    /// Destinations that raise an auth-revoked error when sent to.
    fail_auth: Vec<i64>,
    /// Destinations that raise a transient send error.
    fail_transient: Vec<i64>,
    /// The listing returned by `list_destinations`.
    destinations: Vec<Destination>,
    /// Every destination a send was attempted against, in order.
    sends: Mutex<Vec<i64>>,
}

struct FakeMessenger {
    script: Arc<Script>,
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn connect(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
    async fn is_authorized(&mut self) -> Result<bool, ChannelError> {
        Ok(true)
    }
    async fn send_text(&mut self, dest: i64, _text: &str) -> Result<(), ChannelError> {
        self.script.sends.lock().unwrap().push(dest);
        if self.script.fail_auth.contains(&dest) {
            return Err(ChannelError::AuthRevoked("key unregistered".into()));
        }
        if self.script.fail_transient.contains(&dest) {
            return Err(ChannelError::SendFailed("flood wait".into()));
        }
        Ok(())
    }
    async fn send_files(
        &mut self,
        dest: i64,
        _paths: &[String],
        caption: &str,
    ) -> Result<(), ChannelError> {
        self.send_text(dest, caption).await
    }
    async fn list_destinations(&mut self) -> Result<Vec<Destination>, ChannelError> {
        Ok(self.script.destinations.clone())
    }
}

struct FakeFactory {
    script: Arc<Script>,
}

impl MessengerFactory for FakeFactory {
    fn create(&self, credential: &str) -> Result<Box<dyn Messenger>, ChannelError> {
        assert_eq!(credential, "plain-credential", "decrypt must run first");
        Ok(Box::new(FakeMessenger {
            script: Arc::clone(&self.script),
        }))
    }
}

/// Reversible toy codec — enough to prove the core treats blobs as opaque.
struct RotCodec;

impl CredentialCodec for RotCodec {
    fn encrypt(&self, plaintext: &str) -> Result<String, ChannelError> {
        Ok(plaintext.chars().rev().collect())
    }
    fn decrypt(&self, blob: &str) -> Result<String, ChannelError> {
        Ok(blob.chars().rev().collect())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    lines: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, remote_id: i64, text: &str) -> Result<(), ChannelError> {
        self.lines.lock().unwrap().push((remote_id, text.to_string()));
        Ok(())
    }
}

struct Harness {
    svc: Services,
    script: Arc<Script>,
    notifier: Arc<RecordingNotifier>,
    identity_id: i64,
}

fn harness(script: Script) -> Harness {
    let dir = std::env::temp_dir().join(format!(
        "courier-dispatch-test-{}",
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let db_path = dir.join("courier.db");
    let db_path = db_path.to_str().unwrap();

    let store = Arc::new(Store::open(db_path).unwrap());
    let scheduler =
        SchedulerHandle::new(rusqlite::Connection::open(db_path).unwrap()).unwrap();

    let script = Arc::new(script);
    let factory = Arc::new(FakeFactory {
        script: Arc::clone(&script),
    });
    let bridge = Bridge::new(factory, &BridgeConfig::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let identity = store.create_identity(9000, None, Some("Ada"), None).unwrap();
    let codec = RotCodec;
    let blob = codec.encrypt("plain-credential").unwrap();
    store.set_credential(identity.id, &blob).unwrap();

    let svc = Services {
        store,
        scheduler,
        bridge,
        codec: Arc::new(RotCodec),
        notifier: Some(notifier.clone() as Arc<dyn Notifier>),
    };
    Harness {
        svc,
        script,
        notifier,
        identity_id: identity.id,
    }
}

fn service(h: &Harness) -> TaskService {
    TaskService::new(h.svc.clone(), tokio::runtime::Handle::current())
}

fn repeat_request(targets: Vec<i64>) -> TaskRequest {
    TaskRequest {
        name: Some("digest".into()),
        message: "hello".into(),
        attachments: vec![],
        targets,
        schedule: ScheduleRequest::Repeat {
            primary: 1,
            unit: IntervalUnit::Hours,
            extra_minutes: 0,
        },
        send_delay_secs: Some(0),
    }
}

#[tokio::test]
async fn successful_run_updates_counters_and_notifies() {
    let h = harness(Script::default());
    let svc = service(&h);
    let task = svc.create_task(h.identity_id, repeat_request(vec![10, 20])).unwrap();

    execute_task(&h.svc, &task.id).await.unwrap();

    let after = h.svc.store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(after.execution_count, 1);
    assert_eq!(after.success_count, 2);
    assert_eq!(after.failure_count, 0);
    assert!(!after.running);
    assert!(after.last_run.is_some());
    assert_eq!(*h.script.sends.lock().unwrap(), vec![10, 20]);

    // The detached notification task needs a beat to run.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let lines = h.notifier.lines.lock().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].0, 9000);
    assert!(lines[0].1.contains("run #1"));
    assert!(lines[0].1.contains("2/2"));
}

#[tokio::test]
async fn auth_revocation_mid_run_aborts_and_cascades() {
    let h = harness(Script {
        fail_auth: vec![3],
        ..Script::default()
    });
    let svc = service(&h);
    let victim = svc
        .create_task(h.identity_id, repeat_request(vec![1, 2, 3, 4, 5]))
        .unwrap();
    let sibling = svc.create_task(h.identity_id, repeat_request(vec![7])).unwrap();

    execute_task(&h.svc, &victim.id).await.unwrap();

    // Destinations 1–2 attempted, 3 attempted and failed, 4–5 never attempted.
    assert_eq!(*h.script.sends.lock().unwrap(), vec![1, 2, 3]);
    let after = h.svc.store.get_task(&victim.id).unwrap().unwrap();
    assert_eq!(after.success_count, 2);
    assert_eq!(after.failure_count, 3);
    assert_eq!(after.status, TaskStatus::Paused);
    assert!(after.next_run.is_none());
    assert!(!after.running);

    // The identity lost its credential; the sibling active task was paused.
    let identity = h.svc.store.get_identity(h.identity_id).unwrap().unwrap();
    assert!(identity.credential.is_none());
    assert!(!identity.authorized);
    let sibling_after = h.svc.store.get_task(&sibling.id).unwrap().unwrap();
    assert_eq!(sibling_after.status, TaskStatus::Paused);
    assert!(sibling_after.next_run.is_none());

    // Scheduler entries are gone for both tasks.
    assert!(h.svc.scheduler.get(&victim.id).unwrap().is_none());
    assert!(h.svc.scheduler.get(&sibling.id).unwrap().is_none());
}

#[tokio::test]
async fn invalidation_cascade_is_idempotent() {
    let h = harness(Script::default());
    let svc = service(&h);
    svc.create_task(h.identity_id, repeat_request(vec![1])).unwrap();

    let first = cascade::invalidate(&h.svc, h.identity_id).unwrap();
    assert_eq!(first, 1);
    let second = cascade::invalidate(&h.svc, h.identity_id).unwrap();
    assert_eq!(second, 0);

    let identity = h.svc.store.get_identity(h.identity_id).unwrap().unwrap();
    assert!(identity.credential.is_none());
    assert!(!identity.authorized);
}

#[tokio::test]
async fn guard_conflict_is_a_silent_skip() {
    let h = harness(Script::default());
    let svc = service(&h);
    let task = svc.create_task(h.identity_id, repeat_request(vec![10])).unwrap();

    // Another worker holds the latch.
    assert!(h.svc.store.try_begin_run(&task.id).unwrap());

    execute_task(&h.svc, &task.id).await.unwrap();
    // Nothing was sent and no execution was recorded.
    assert!(h.script.sends.lock().unwrap().is_empty());
    let after = h.svc.store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(after.execution_count, 0);
}

#[tokio::test]
async fn pause_then_resume_recomputes_next_run_from_now() {
    let h = harness(Script::default());
    let svc = service(&h);
    let task = svc.create_task(h.identity_id, repeat_request(vec![10])).unwrap();
    assert!(task.next_run.is_some());

    svc.pause_task(h.identity_id, &task.id).unwrap();
    let paused = h.svc.store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);
    assert!(paused.next_run.is_none());
    assert!(h.svc.scheduler.next_fire(&task.id).unwrap().is_none());

    let before = Utc::now();
    svc.resume_task(h.identity_id, &task.id).unwrap();
    let resumed = h.svc.store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(resumed.status, TaskStatus::Active);
    let next = chrono::DateTime::parse_from_rfc3339(resumed.next_run.as_deref().unwrap()).unwrap();
    // One full hour out from roughly now — not the stale pre-pause value.
    assert!(next.with_timezone(&Utc) >= before + chrono::Duration::seconds(3595));
    assert!(h.svc.scheduler.next_fire(&task.id).unwrap().is_some());
}

#[tokio::test]
async fn one_time_task_transitions_to_sent() {
    let h = harness(Script::default());
    let svc = service(&h);
    let task = svc
        .create_task(
            h.identity_id,
            TaskRequest {
                name: None,
                message: "once".into(),
                attachments: vec![],
                targets: vec![10],
                schedule: ScheduleRequest::Once {
                    at: Utc::now() - chrono::Duration::seconds(1),
                },
                send_delay_secs: Some(0),
            },
        )
        .unwrap();
    assert_eq!(task.status, TaskStatus::Scheduled);

    // The engine removes a one-time entry when it fires; mirror that here.
    h.svc.scheduler.remove(&task.id).unwrap();
    execute_task(&h.svc, &task.id).await.unwrap();

    let after = h.svc.store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Sent);
    assert!(after.next_run.is_none());
    assert_eq!(after.execution_count, 1);
}

#[tokio::test]
async fn create_task_deduplicates_targets() {
    let h = harness(Script::default());
    let svc = service(&h);
    let task = svc
        .create_task(h.identity_id, repeat_request(vec![5, 3, 5, 3, 9]))
        .unwrap();
    assert_eq!(task.targets, vec![5, 3, 9]);
}

#[tokio::test]
async fn reconciler_migrates_group_into_supergroup() {
    let h = harness(Script {
        destinations: vec![
            Destination {
                id: 100,
                name: "Foo".into(),
                kind: DestinationKind::Group,
                can_send: true,
            },
            Destination {
                id: 200,
                name: "Foo".into(),
                kind: DestinationKind::Supergroup,
                can_send: true,
            },
        ],
        ..Script::default()
    });
    let svc = service(&h);
    let task = svc
        .create_task(h.identity_id, repeat_request(vec![100, 300]))
        .unwrap();
    // The pre-migration binding exists from an earlier cycle.
    h.svc
        .store
        .upsert_binding(h.identity_id, 100, "Foo", "group")
        .unwrap();

    let identity = h.svc.store.get_identity(h.identity_id).unwrap().unwrap();
    let active = reconcile_once(&h.svc, &identity).await.unwrap();
    assert_eq!(active, 1);

    // Task now targets the winner, and only once.
    let after = h.svc.store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(after.targets, vec![200, 300]);
    assert!(!after.targets.contains(&100));

    // Binding 100 is hard-deleted; 200 exists and is active.
    assert!(h.svc.store.get_binding(h.identity_id, 100).unwrap().is_none());
    let winner = h.svc.store.get_binding(h.identity_id, 200).unwrap().unwrap();
    assert!(winner.active);
    assert_eq!(winner.kind, "supergroup");
}

#[tokio::test]
async fn reconciler_soft_deletes_vanished_bindings() {
    let h = harness(Script {
        destinations: vec![Destination {
            id: 1,
            name: "Still here".into(),
            kind: DestinationKind::Group,
            can_send: true,
        }],
        ..Script::default()
    });
    h.svc
        .store
        .upsert_binding(h.identity_id, 1, "Still here", "group")
        .unwrap();
    h.svc
        .store
        .upsert_binding(h.identity_id, 2, "Gone", "group")
        .unwrap();

    let identity = h.svc.store.get_identity(h.identity_id).unwrap().unwrap();
    reconcile_once(&h.svc, &identity).await.unwrap();

    let gone = h.svc.store.get_binding(h.identity_id, 2).unwrap().unwrap();
    assert!(!gone.active, "vanished binding should be soft-deleted, not removed");
    let here = h.svc.store.get_binding(h.identity_id, 1).unwrap().unwrap();
    assert!(here.active);
}

#[tokio::test]
async fn auth_status_cascades_on_dead_credential() {
    struct DeadAuthFactory;
    struct DeadAuthMessenger;

    #[async_trait]
    impl Messenger for DeadAuthMessenger {
        async fn connect(&mut self) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn is_authorized(&mut self) -> Result<bool, ChannelError> {
            Ok(false)
        }
        async fn send_text(&mut self, _: i64, _: &str) -> Result<(), ChannelError> {
            Err(ChannelError::AuthRevoked("dead".into()))
        }
        async fn send_files(&mut self, _: i64, _: &[String], _: &str) -> Result<(), ChannelError> {
            Err(ChannelError::AuthRevoked("dead".into()))
        }
        async fn list_destinations(&mut self) -> Result<Vec<Destination>, ChannelError> {
            Err(ChannelError::AuthRevoked("dead".into()))
        }
    }
    impl MessengerFactory for DeadAuthFactory {
        fn create(&self, _: &str) -> Result<Box<dyn Messenger>, ChannelError> {
            Ok(Box::new(DeadAuthMessenger))
        }
    }

    let h = harness(Script::default());
    // Swap in a bridge whose sessions always report unauthorized.
    let svc = Services {
        bridge: Bridge::new(Arc::new(DeadAuthFactory), &BridgeConfig::default()),
        ..h.svc.clone()
    };
    let service = TaskService::new(svc.clone(), tokio::runtime::Handle::current());

    let authorized = service.auth_status(h.identity_id).await.unwrap();
    assert!(!authorized);
    let identity = svc.store.get_identity(h.identity_id).unwrap().unwrap();
    assert!(identity.credential.is_none());
}
