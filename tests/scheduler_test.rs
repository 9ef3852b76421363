use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use workpool::{BoxError, Pool, PoolConfig, Scheduler, WorkOptions};

fn pool() -> Arc<Pool> {
    Arc::new(Pool::new(PoolConfig::builder().max_threads(2).build().unwrap()).unwrap())
}

#[test]
fn test_delayed_never_fires_early() {
    let pool = pool();
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    let fired = Arc::new(parking_lot::Mutex::new(None::<Instant>));
    let fired_clone = fired.clone();
    let scheduled_at = Instant::now();

    scheduler
        .schedule_delayed(
            move || {
                *fired_clone.lock() = Some(Instant::now());
                Ok::<_, BoxError>(())
            },
            Duration::from_millis(100),
            WorkOptions::default(),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(500));
    let fired_at = fired.lock().expect("delayed work never fired");
    let elapsed = fired_at.duration_since(scheduled_at);
    assert!(elapsed >= Duration::from_millis(100), "fired early: {elapsed:?}");
}

#[test]
fn test_delayed_outcome_fetchable_from_pool() {
    let pool = pool();
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    let entry = scheduler
        .schedule_delayed(
            || Ok::<_, BoxError>("done".to_string()),
            Duration::from_millis(200),
            WorkOptions::default(),
        )
        .unwrap();

    // the entry carries its work item's ID from the moment it is scheduled
    let work_id = scheduler.target_work_id(entry).expect("entry is pending");

    let outcome = pool.fetch(work_id, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(outcome.into_value::<String>(), Some("done".into()));
}

#[test]
fn test_cancel_before_due_never_invokes() {
    let pool = pool();
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();

    let entry = scheduler
        .schedule_delayed(
            move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            },
            Duration::from_millis(100),
            WorkOptions::default(),
        )
        .unwrap();

    assert!(scheduler.cancel(entry));
    assert!(!scheduler.cancel(entry));

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_recurring_fires_exactly_max_runs() {
    let pool = pool();
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = runs.clone();

    scheduler
        .schedule_recurring(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            },
            Duration::from_millis(25),
            Some(4),
            WorkOptions::default(),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(800));
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert!(scheduler.active_ids().is_empty());
}

#[test]
fn test_overlapping_firings_do_not_serialize() {
    let pool = pool();
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let options = WorkOptions::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();

    // the first firing outlives its timeout; the second is instant and must
    // run concurrently on the other worker instead of queuing behind it
    scheduler
        .schedule_recurring(
            move || {
                if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::thread::sleep(Duration::from_millis(600));
                }
                Ok::<_, BoxError>(())
            },
            Duration::from_millis(50),
            Some(2),
            options,
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(1000));
    let stats = pool.stats();
    assert_eq!(stats.completed, 1, "instant firing must complete");
    assert_eq!(stats.timed_out, 1, "only the long firing may time out");
}

#[test]
fn test_recurring_fires_despite_full_queue() {
    let pool = Arc::new(
        Pool::new(
            PoolConfig::builder()
                .max_threads(1)
                .queue_limit(1)
                .start_suspended(true)
                .build()
                .unwrap(),
        )
        .unwrap(),
    );
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    // the only admission slot is taken; firings must not be lost at the gate
    pool.submit(|| Ok::<_, BoxError>(())).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = runs.clone();
    scheduler
        .schedule_recurring(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            },
            Duration::from_millis(30),
            Some(2),
            WorkOptions::default(),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(400));
    assert!(scheduler.active_ids().is_empty());

    pool.start();
    pool.wait_all(Some(Duration::from_secs(5))).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_recurring_produces_fresh_work_ids() {
    let pool = pool();
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    let entry = scheduler
        .schedule_recurring(
            || Ok::<_, BoxError>(()),
            Duration::from_millis(40),
            Some(3),
            WorkOptions::default(),
        )
        .unwrap();

    let mut seen = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Some(id) = scheduler.target_work_id(entry) {
            if !id.is_empty() && seen.last() != Some(&id) {
                seen.push(id);
            }
        } else {
            break; // entry removed after final firing
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(seen.len() >= 2, "expected multiple distinct work ids, saw {seen:?}");
    let mut deduped = seen.clone();
    deduped.dedup();
    assert_eq!(seen, deduped);
}

#[test]
fn test_recurring_cancel_stops_firings() {
    let pool = pool();
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = runs.clone();

    let entry = scheduler
        .schedule_recurring(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            },
            Duration::from_millis(30),
            None,
            WorkOptions::default(),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(200));
    assert!(scheduler.cancel(entry));
    let after_cancel = runs.load(Ordering::SeqCst);
    assert!(after_cancel >= 1);

    std::thread::sleep(Duration::from_millis(200));
    // at most one in-flight firing may land after cancel
    assert!(runs.load(Ordering::SeqCst) <= after_cancel + 1);
}

#[test]
fn test_many_entries_share_one_timer() {
    let pool = pool();
    let scheduler = Scheduler::new(pool.clone()).unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    for i in 0..10 {
        let count = count.clone();
        scheduler
            .schedule_delayed(
                move || {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                },
                Duration::from_millis(20 + i * 10),
                WorkOptions::default(),
            )
            .unwrap();
    }

    std::thread::sleep(Duration::from_millis(800));
    pool.wait_all(Some(Duration::from_secs(5))).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 10);
    assert!(scheduler.active_ids().is_empty());
}
