//! Property-based tests using proptest.
//!
//! Random identity transitions interleaved with snapshot deliveries to
//! current and stale registrations verify that the list only ever holds the
//! bound identity's tasks, and that a listener registering at any point is
//! replayed exactly that list. Cancellation handles and subjects are checked
//! under arbitrary call sequences.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use tasksync::config::TaskListConfig;
use tasksync::reactive::{Subject, Subscription};
use tasksync::subscription::TaskSubscriptionManager;
use tasksync::types::{Document, FieldValue, Identity, TaskList};

use common::{snapshot, task_doc, ScriptedStore};

const USERS: [&str; 3] = ["alice", "bob", "carol"];

// ─── Arbitrary Strategies ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Step {
    /// Bind to `USERS[i]`, or to nobody.
    Bind(Option<usize>),
    /// Deliver the true result set to registration `i % listen_count`.
    Deliver(usize),
    /// Add a task for `USERS[i]` to the backing data.
    Write(usize),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        proptest::option::of(0..USERS.len()).prop_map(Step::Bind),
        (0usize..16).prop_map(Step::Deliver),
        (0..USERS.len()).prop_map(Step::Write),
    ]
}

fn matching(data: &[Document], owner: &FieldValue) -> Vec<Document> {
    data.iter()
        .filter(|d| d.get("userId") == Some(owner))
        .cloned()
        .collect()
}

// ─── Property Tests: Identity Scoping ───────────────────────────────────────

proptest! {
    /// Whatever the interleaving, the list holds only the bound identity's
    /// tasks, and after a fresh snapshot it holds exactly them.
    #[test]
    fn list_only_ever_holds_bound_identity_tasks(
        steps in prop::collection::vec(arb_step(), 1..40),
    ) {
        let store = ScriptedStore::new();
        let manager = TaskSubscriptionManager::new(store.clone(), TaskListConfig::default());
        let mut data: Vec<Document> = Vec::new();
        let mut bound: Option<&str> = None;
        let published = Arc::new(Mutex::new(Vec::<TaskList>::new()));
        let sink = Arc::clone(&published);
        let _reg = manager.on_change(move |list: &TaskList| sink.lock().push(list.clone()));

        for step in steps {
            match step {
                Step::Bind(user) => {
                    bound = user.map(|i| USERS[i]);
                    let identity = bound.map(|uid| Identity::new(uid, format!("{uid}@example.com")));
                    manager.bind(identity.as_ref());
                },
                Step::Deliver(i) => {
                    let count = store.listen_count();
                    if count > 0 {
                        let index = i % count;
                        let owner = store
                            .query(index)
                            .equality_value("userId")
                            .cloned()
                            .unwrap_or(FieldValue::Null);
                        store.deliver(index, snapshot(matching(&data, &owner)));
                    }
                },
                Step::Write(user) => {
                    let id = format!("t{}", data.len());
                    data.push(task_doc(&id, USERS[user], &id));
                },
            }

            let tasks = manager.tasks();
            match bound {
                None => prop_assert!(tasks.is_empty()),
                Some(uid) => prop_assert!(tasks.iter().all(|t| t.owner_id == uid)),
            }

            // A listener registering now is replayed exactly that list.
            let replayed = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&replayed);
            let late = manager.on_change(move |list: &TaskList| sink.lock().push(list.clone()));
            late.cancel();
            prop_assert_eq!(replayed.lock().clone(), vec![tasks]);
        }

        if let Some(uid) = bound {
            let latest = store.listen_count() - 1;
            store.deliver(latest, snapshot(matching(&data, &FieldValue::from(uid))));
            let expected: Vec<String> = data
                .iter()
                .filter(|d| d.get("userId").and_then(FieldValue::as_str) == Some(uid))
                .map(|d| d.id.clone())
                .collect();
            let actual: Vec<String> = manager
                .tasks()
                .iter()
                .map(|t| t.id.to_string())
                .collect();
            prop_assert_eq!(actual, expected);
        }
        prop_assert!(store.active_count() <= 1);

        // Every published list belongs to a single identity.
        for list in published.lock().iter() {
            let owners: std::collections::HashSet<&str> =
                list.iter().map(|t| t.owner_id.as_str()).collect();
            prop_assert!(owners.len() <= 1);
        }
    }
}

// ─── Property Tests: Cancellation ───────────────────────────────────────────

proptest! {
    /// Any number of cancels, from any number of clones, releases once.
    #[test]
    fn cancel_releases_exactly_once(cancels in 1usize..10, clones in 1usize..4) {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let handle = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let handles: Vec<Subscription> = (0..clones).map(|_| handle.clone()).collect();

        for i in 0..cancels {
            handles[i % clones].cancel();
        }

        prop_assert_eq!(released.load(Ordering::SeqCst), 1);
        prop_assert!(handles.iter().all(|h| !h.is_active()));
    }

    /// Values are delivered in emit order even when listeners emit
    /// re-entrantly.
    #[test]
    fn subject_preserves_order_under_reentrancy(values in prop::collection::vec(0u32..1000, 1..30)) {
        let subject: Subject<u32> = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let echo = subject.clone();
        let _reg = subject.subscribe(move |v: &u32| {
            sink.lock().push(*v);
            // Echo each even value once as value + 1 (odd, so no loop).
            if v % 2 == 0 {
                echo.emit(v + 1);
            }
        });

        for v in &values {
            subject.emit(*v);
        }

        let mut expected = Vec::new();
        for v in &values {
            expected.push(*v);
            if v % 2 == 0 {
                expected.push(v + 1);
            }
        }
        prop_assert_eq!(seen.lock().clone(), expected);
    }
}
