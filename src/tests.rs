/// End-to-end scenarios: host render loop, hooks, scheduler and executor together
use crate::{ComponentId, Engine, ManualExecutor, Priority, StateSetter, deps};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().push(entry.into());
}

fn counting_callback(count: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + 'static {
    let count = count.clone();
    move || {
        count.fetch_add(1, Ordering::Relaxed);
    }
}

// Simple host fixture: a counter component re-rendered by its own callback
struct CounterHost {
    engine: Engine,
    executor: ManualExecutor,
    id: ComponentId,
    seen: Arc<Mutex<Vec<i32>>>,
}

impl CounterHost {
    fn new() -> Self {
        let executor = ManualExecutor::new();
        Self {
            engine: Engine::new(executor.clone()),
            executor,
            id: ComponentId::new(),
            seen: Arc::default(),
        }
    }

    fn render(&self) -> StateSetter<i32> {
        render_counter(&self.engine, self.id, &self.seen)
    }
}

fn render_counter(
    engine: &Engine,
    id: ComponentId,
    seen: &Arc<Mutex<Vec<i32>>>,
) -> StateSetter<i32> {
    let rerender = {
        let engine = engine.downgrade();
        let seen = seen.clone();
        move || {
            if let Some(engine) = engine.upgrade() {
                render_counter(&engine, id, &seen);
            }
        }
    };
    let (count, set_count) = engine
        .render(id, rerender, || engine.use_state(|| 0))
        .unwrap();
    seen.lock().push(count);
    set_count
}

#[test]
fn counter_renders_zero_one_two() {
    let host = CounterHost::new();
    let set_count = host.render();

    set_count.update(|c| c + 1);
    host.executor.run_until_idle();
    set_count.update(|c| c + 1);
    host.executor.run_until_idle();

    assert_eq!(*host.seen.lock(), vec![0, 1, 2]);
    assert_eq!(host.engine.stats(host.id).unwrap().render_count, 3);
}

#[test]
fn updates_in_one_tick_collapse_into_one_callback() {
    let executor = ManualExecutor::new();
    let engine = Engine::new(executor.clone());
    let id = ComponentId::new();
    let calls = Arc::new(AtomicUsize::new(0));
    engine.render(id, counting_callback(&calls), || {});

    for _ in 0..5 {
        assert!(engine.schedule_update(id, Priority::Normal));
    }
    assert_eq!(executor.pending().frame, 1);

    executor.run_until_idle();
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn setter_batch_renders_once_with_the_last_value() {
    let host = CounterHost::new();
    let set_count = host.render();

    for n in 1..=5 {
        set_count.set(n);
    }
    host.executor.run_until_idle();

    assert_eq!(*host.seen.lock(), vec![0, 5]);
}

#[test]
fn immediate_work_scheduled_mid_flush_drains_before_flush_returns() {
    let engine = Engine::new(ManualExecutor::new());
    let order: Log = Arc::default();
    let urgent = ComponentId::new();
    let normal = ComponentId::new();
    let late = ComponentId::new();

    let log = order.clone();
    engine.render(urgent, move || push(&log, "urgent"), || {});
    let log = order.clone();
    engine.render(late, move || push(&log, "late"), || {});

    // The normal callback asks for an Immediate update of another component
    let log = order.clone();
    let handle = engine.downgrade();
    engine.render(
        normal,
        move || {
            push(&log, "normal");
            if let Some(engine) = handle.upgrade() {
                engine.schedule_update(urgent, Priority::Immediate);
            }
        },
        || {},
    );

    engine.schedule_update(normal, Priority::Normal);
    engine.schedule_update(late, Priority::Normal);
    engine.flush();

    // Immediate preempts the remaining Normal job
    assert_eq!(*order.lock(), vec!["normal", "urgent", "late"]);
    assert_eq!(engine.pending_jobs(), 0);
}

#[test]
fn ranks_drain_highest_first() {
    let engine = Engine::new(ManualExecutor::new());
    let order: Log = Arc::default();
    let mut ids = Vec::new();

    for priority in [
        Priority::Idle,
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Immediate,
    ] {
        let id = ComponentId::new();
        let log = order.clone();
        engine.render(id, move || push(&log, format!("{priority:?}")), || {});
        ids.push((id, priority));
    }
    for (id, priority) in ids {
        engine.schedule_update(id, priority);
    }
    engine.flush();

    assert_eq!(*order.lock(), vec!["Immediate", "High", "Normal", "Low", "Idle"]);
}

#[test]
fn changed_dependency_reruns_only_its_effects_in_slot_order() {
    let engine = Engine::new(ManualExecutor::new());
    let id = ComponentId::new();
    let log: Log = Arc::default();

    let render = |a: u32, b: u32| {
        engine.render(id, || {}, || {
            for (name, value) in [("first a", a), ("b", b), ("second a", a)] {
                let log = log.clone();
                engine
                    .use_effect(Some(deps![value]), move || {
                        push(&log, format!("run {name}={value}"));
                        let log = log.clone();
                        Some(move || push(&log, format!("cleanup {name}={value}")))
                    })
                    .unwrap();
            }
        });
        engine.flush();
    };

    render(1, 1);
    log.lock().clear();
    render(2, 1);

    assert_eq!(
        *log.lock(),
        vec!["cleanup first a=1", "run first a=2", "cleanup second a=1", "run second a=2"]
    );
}

#[test]
fn reducer_returning_the_same_state_never_calls_back() {
    let executor = ManualExecutor::new();
    let engine = Engine::new(executor.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    let (_, dispatch) = engine
        .render(ComponentId::new(), counting_callback(&calls), || {
            engine.use_reducer(|state: &Arc<Vec<u8>>, _: ()| state.clone(), Vec::new())
        })
        .unwrap();

    for _ in 0..3 {
        dispatch.dispatch(());
    }
    executor.run_until_idle();
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn unmount_runs_cleanups_once_in_order_and_silences_setters() {
    let executor = ManualExecutor::new();
    let engine = Engine::new(executor.clone());
    let id = ComponentId::new();
    let log: Log = Arc::default();
    let calls = Arc::new(AtomicUsize::new(0));

    let set = engine.render(id, counting_callback(&calls), || {
        let (_, set) = engine.use_state_value(0).unwrap();
        for name in ["first", "second"] {
            let log = log.clone();
            engine
                .use_effect(Some(deps![]), move || Some(move || push(&log, name)))
                .unwrap();
        }
        set
    });
    executor.run_until_idle();

    assert!(engine.unmount(id));
    assert!(!engine.unmount(id));
    assert_eq!(*log.lock(), vec!["first", "second"]);
    assert!(!engine.contains(id));

    assert!(!set.set(1));
    executor.run_until_idle();
    assert_eq!(calls.load(Ordering::Relaxed), 0);
    assert_eq!(*log.lock(), vec!["first", "second"]);
}

#[test]
fn unmount_drops_pending_work() {
    let engine = Engine::new(ManualExecutor::new());
    let id = ComponentId::new();
    let ran = Arc::new(AtomicUsize::new(0));

    let effect_ran = ran.clone();
    engine.render(id, counting_callback(&ran), || {
        engine
            .use_effect(None, move || {
                effect_ran.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
    });
    engine.schedule_update(id, Priority::High);

    engine.unmount(id);
    assert_eq!(engine.pending_jobs(), 0);
    assert_eq!(engine.flush(), 0);
    assert_eq!(ran.load(Ordering::Relaxed), 0);
}

#[test]
fn panicking_callback_does_not_stop_the_flush() {
    let engine = Engine::new(ManualExecutor::new());
    let bad = ComponentId::new();
    let good = ComponentId::new();
    let calls = Arc::new(AtomicUsize::new(0));

    // The panicking callback leaves a render pass open behind it
    let handle = engine.downgrade();
    engine.render(
        bad,
        move || {
            if let Some(engine) = handle.upgrade() {
                engine.enter(bad, || {});
            }
            panic!("render failed");
        },
        || {},
    );
    engine.render(good, counting_callback(&calls), || {});

    engine.schedule_update(bad, Priority::Normal);
    engine.schedule_update(good, Priority::Normal);
    assert_eq!(engine.flush(), 2);

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(engine.render_depth(), 0);
}

#[test]
fn nested_renders_resume_the_parent_cursor() {
    let engine = Engine::new(ManualExecutor::new());
    let parent = ComponentId::new();
    let child = ComponentId::new();

    let render_tree = || {
        engine.render(parent, || {}, || {
            let (before, _) = engine.use_state_value("parent first").unwrap();
            let child_value = engine.render(child, || {}, || {
                let (value, _) = engine.use_state_value("child").unwrap();
                engine.use_ref(|| 0_u8).unwrap();
                value
            });
            let (after, _) = engine.use_state_value("parent second").unwrap();
            (before, child_value, after)
        })
    };

    assert_eq!(render_tree(), ("parent first", "child", "parent second"));
    assert_eq!(render_tree(), ("parent first", "child", "parent second"));
    assert_eq!(engine.stats(parent).unwrap().hook_count, 2);
    assert_eq!(engine.stats(child).unwrap().hook_count, 2);
}

#[test]
fn layout_effects_complete_before_passive_effects() {
    let engine = Engine::new(ManualExecutor::new());
    let log: Log = Arc::default();

    for name in ["a", "b"] {
        let (passive, layout) = (log.clone(), log.clone());
        engine.render(ComponentId::new(), || {}, || {
            engine
                .use_effect(None, move || push(&passive, format!("passive {name}")))
                .unwrap();
            engine
                .use_layout_effect(None, move || push(&layout, format!("layout {name}")))
                .unwrap();
        });
    }
    engine.flush();

    assert_eq!(
        *log.lock(),
        vec!["layout a", "layout b", "passive a", "passive b"]
    );
}

#[test]
fn provider_reaches_subscribers_through_the_executor() {
    let executor = ManualExecutor::new();
    let engine = Engine::new(executor.clone());
    let locale = engine.create_context(String::from("en"));
    let reader = ComponentId::new();
    let other = ComponentId::new();
    let reader_calls = Arc::new(AtomicUsize::new(0));
    let other_calls = Arc::new(AtomicUsize::new(0));

    engine.render(reader, counting_callback(&reader_calls), || {
        engine.use_context(&locale).unwrap()
    });
    engine.render(other, counting_callback(&other_calls), || {});

    assert_eq!(engine.provide(&locale, String::from("fr")).unwrap(), 1);
    executor.run_until_idle();

    assert_eq!(reader_calls.load(Ordering::Relaxed), 1);
    assert_eq!(other_calls.load(Ordering::Relaxed), 0);
    let seen = engine.render(reader, || {}, || engine.use_context(&locale).unwrap());
    assert_eq!(seen, "fr");
}

#[test]
fn setters_from_other_threads_only_enqueue() {
    let host = CounterHost::new();
    let set_count = host.render();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let set_count = set_count.clone();
            std::thread::spawn(move || {
                set_count.update(|c| c + 1);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(host.seen.lock().len(), 1);

    host.executor.run_until_idle();
    assert_eq!(*host.seen.lock(), vec![0, 4]);
}

#[test]
fn racing_updates_from_many_threads_are_all_kept() {
    let host = CounterHost::new();
    let set_count = host.render();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let set_count = set_count.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    set_count.update(|c| {
                        std::thread::yield_now();
                        c + 1
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    host.executor.run_until_idle();
    assert_eq!(host.seen.lock().last(), Some(&4000));
}

#[test]
fn force_update_all_reaches_every_mounted_instance() {
    let executor = ManualExecutor::new();
    let engine = Engine::new(executor.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        engine.render(ComponentId::new(), counting_callback(&calls), || {});
    }

    assert_eq!(engine.force_update_all(), 3);
    executor.run_until_idle();
    assert_eq!(calls.load(Ordering::Relaxed), 3);
}

#[test]
fn reset_forgets_instances_but_keeps_contexts() {
    let engine = Engine::new(ManualExecutor::new());
    let flag = engine.create_context(false);
    let id = ComponentId::new();
    let cleaned = Arc::new(AtomicUsize::new(0));

    let counter = cleaned.clone();
    engine.render(id, || {}, || {
        engine.use_context(&flag).unwrap();
        engine
            .use_layout_effect(None, move || {
                Some(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
            })
            .unwrap();
    });
    engine.provide(&flag, true).unwrap();

    engine.reset();
    assert_eq!(engine.component_count(), 0);
    assert_eq!(engine.pending_jobs(), 0);
    assert_eq!(cleaned.load(Ordering::Relaxed), 0);
    assert_eq!(engine.subscriber_count(&flag).unwrap(), 0);
    assert!(engine.context_value(&flag).unwrap());
}
