//! Integration tests for streaming sessions driven through the workbench.
//!
//! Exercises: start/cancel/restart, progress ordering and monotonicity,
//! per-file content failures, the streaming writer lock, the wall-clock
//! guard, and commits landing in the revision store.

use std::sync::Barrier;
use std::time::Duration;

use scrivener_core::config::{CoreConfig, RevealConfig, SessionConfig};
use scrivener_core::types::{FileChange, OperationErrorKind, SessionStatus, StepStatus};
use scrivener_core::{EditError, EventReceiver, SessionError, SessionEvent, Workbench};

fn workbench(chars_per_tick: usize, tick_interval_ms: u64) -> Workbench {
    Workbench::new(CoreConfig {
        reveal: RevealConfig {
            chars_per_tick,
            tick_interval_ms,
            newline_extra_delay_ms: 15,
        },
        session: SessionConfig {
            settle_delay_ms: 30,
            max_duration_ms: None,
        },
        ..CoreConfig::default()
    })
    .unwrap()
}

fn drain(rx: &mut EventReceiver) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn overall_progress(events: &[SessionEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress { progress, .. } => Some(progress.overall_progress),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn two_file_session_reveals_in_order_and_reaches_full_progress() {
    let wb = workbench(5, 10);
    let mut rx = wb.subscribe();
    wb.start_streaming_session(vec![
        FileChange::create("a.ts", "line1\nline2").with_language("typescript"),
        FileChange::create("b.css", "body{}"),
    ])
    .unwrap();

    assert_eq!(wb.wait_until_settled().await, SessionStatus::Completed);
    let events = drain(&mut rx);

    let changed: Vec<(usize, String)> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::CurrentFileChanged { index, file_path, .. } => {
                Some((*index, file_path.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(changed, vec![(0, "a.ts".into()), (1, "b.css".into())]);

    let completed: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::FileCompleted { file_path, .. } => Some(file_path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec!["a.ts", "b.css"]);

    let progress = overall_progress(&events);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.last().copied(), Some(100.0));
    assert!(matches!(events.last(), Some(SessionEvent::Completed { .. })));

    // b.css may not begin before a.ts reports completion.
    let a_done = events
        .iter()
        .position(|e| matches!(e, SessionEvent::FileCompleted { index: 0, .. }))
        .unwrap();
    let b_start = events
        .iter()
        .position(|e| matches!(e, SessionEvent::CurrentFileChanged { index: 1, .. }))
        .unwrap();
    assert!(a_done < b_start);

    assert_eq!(wb.buffer("a.ts").as_deref(), Some("line1\nline2"));
    assert_eq!(wb.buffer("b.css").as_deref(), Some("body{}"));
    let session = wb.session().unwrap();
    assert_eq!(session.current_file_index, 1);
    assert!(session.completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn missing_content_is_recorded_and_skipped() {
    let wb = workbench(4, 10);
    let mut rx = wb.subscribe();
    let broken = FileChange {
        content: None,
        ..FileChange::create("mid.rs", "")
    };
    wb.start_streaming_session(vec![
        FileChange::create("first.rs", "fn first() {}\n"),
        broken,
        FileChange::create("last.rs", "fn last() {}\n"),
    ])
    .unwrap();

    assert_eq!(wb.wait_until_settled().await, SessionStatus::Completed);
    let events = drain(&mut rx);

    let errors = wb.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, OperationErrorKind::Content);
    assert_eq!(errors[0].file_path.as_deref(), Some("mid.rs"));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { error, .. } if error.file_path.as_deref() == Some("mid.rs"))));

    assert_eq!(wb.buffer("first.rs").as_deref(), Some("fn first() {}\n"));
    assert_eq!(wb.buffer("last.rs").as_deref(), Some("fn last() {}\n"));
    assert_eq!(wb.buffer("mid.rs").as_deref(), None);

    let steps: Vec<StepStatus> = wb
        .operation()
        .unwrap()
        .steps
        .iter()
        .map(|s| s.status)
        .collect();
    assert_eq!(steps, vec![StepStatus::Done, StepStatus::Failed, StepStatus::Done]);

    let progress = overall_progress(&events);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().copied(), Some(100.0));
}

#[tokio::test(start_paused = true)]
async fn cancel_halts_progress_and_never_resumes() {
    let wb = workbench(1, 10);
    let mut rx = wb.subscribe();
    wb.start_streaming_session(vec![
        FileChange::create("long.rs", "x".repeat(200)),
        FileChange::create("after.rs", "never"),
    ])
    .unwrap();

    tokio::time::sleep(Duration::from_millis(55)).await;
    assert!(wb.cancel_streaming_session());
    assert!(!wb.cancel_streaming_session());
    assert_eq!(wb.status(), SessionStatus::Cancelled);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let events = drain(&mut rx);
    let cancelled_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::Cancelled { .. }))
        .unwrap();
    assert_eq!(cancelled_at, events.len() - 1, "no events after cancellation");
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::FileCompleted { .. })));

    assert_eq!(wb.status(), SessionStatus::Cancelled);
    assert_eq!(wb.buffer("long.rs").as_deref(), Some(""));
    assert_eq!(wb.buffer("after.rs"), None);
    let steps = wb.operation().unwrap().steps;
    assert!(steps.iter().all(|s| s.status == StepStatus::Skipped));

    assert!(wb.dismiss_session());
    assert_eq!(wb.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_an_in_flight_session() {
    let wb = workbench(2, 10);
    let first = wb
        .start_streaming_session(vec![FileChange::create("old.rs", "y".repeat(100))])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(25)).await;

    assert_eq!(
        wb.start_streaming_session(vec![FileChange::create("new.rs", "z")]),
        Err(SessionError::AlreadyActive)
    );
    let second = wb
        .restart_streaming_session(vec![FileChange::create("new.rs", "fresh")])
        .unwrap();
    assert_ne!(first, second);

    assert_eq!(wb.wait_until_settled().await, SessionStatus::Completed);
    assert_eq!(wb.session().unwrap().id, second);
    assert_eq!(wb.buffer("new.rs").as_deref(), Some("fresh"));
    assert_eq!(wb.buffer("old.rs").as_deref(), Some(""));
    assert!(!wb.revisions("old.rs").is_empty());
}

#[test]
fn racing_restarts_each_replace_the_session() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let wb = workbench(1, 1);
    let barrier = Barrier::new(2);

    let mut outcomes = Vec::new();
    for round in 0..300 {
        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..2)
                .map(|worker| {
                    let (wb, barrier, handle) = (&wb, &barrier, runtime.handle());
                    scope.spawn(move || {
                        let _rt = handle.enter();
                        barrier.wait();
                        wb.restart_streaming_session(vec![FileChange::create(
                            format!("round{round}/worker{worker}.rs"),
                            "x".repeat(4096),
                        )])
                    })
                })
                .collect();
            for worker in workers {
                outcomes.push(worker.join().unwrap());
            }
        });
    }

    assert_eq!(outcomes.len(), 600);
    assert!(outcomes.iter().all(Result::is_ok), "{:?}", outcomes.iter().find(|r| r.is_err()));
    let settled = runtime.block_on(async {
        wb.cancel_streaming_session();
        wb.wait_until_settled().await
    });
    assert_eq!(settled, SessionStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn manual_edits_to_a_streaming_file_are_rejected() {
    let wb = workbench(3, 10);
    wb.commit_edit("app.rs", "// hand written\n").unwrap();
    wb.start_streaming_session(vec![FileChange::modify("app.rs", "fn generated() {}\n")])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(15)).await;
    assert_eq!(
        wb.commit_edit("app.rs", "clobber"),
        Err(EditError::FileBusy("app.rs".into()))
    );
    assert_eq!(wb.undo(), Err(EditError::FileBusy("app.rs".into())));
    let partial = wb.buffer("app.rs").unwrap();
    assert!("fn generated() {}\n".starts_with(&partial));
    assert!(!partial.is_empty());

    wb.wait_until_settled().await;
    assert_eq!(wb.buffer("app.rs").as_deref(), Some("fn generated() {}\n"));
    assert!(wb.can_undo());
    assert!(wb.undo().unwrap());
    assert_eq!(wb.buffer("app.rs").as_deref(), Some("// hand written\n"));
    assert!(wb.redo().unwrap());
    assert_eq!(wb.buffer("app.rs").as_deref(), Some("fn generated() {}\n"));
}

#[tokio::test(start_paused = true)]
async fn wall_clock_guard_cancels_an_overrunning_session() {
    let wb = Workbench::new(CoreConfig {
        reveal: RevealConfig {
            chars_per_tick: 1,
            tick_interval_ms: 100,
            newline_extra_delay_ms: 0,
        },
        session: SessionConfig {
            settle_delay_ms: 10,
            max_duration_ms: Some(250),
        },
        ..CoreConfig::default()
    })
    .unwrap();
    wb.start_streaming_session(vec![FileChange::create("slow.rs", "0123456789")])
        .unwrap();

    assert_eq!(wb.wait_until_settled().await, SessionStatus::Cancelled);
    let errors = wb.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, OperationErrorKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn completed_files_are_diffable() {
    let wb = workbench(8, 10);
    let base = wb.open_file("lib.rs", Some("pub fn a() {}\n"));
    wb.start_streaming_session(vec![FileChange::modify(
        "lib.rs",
        "pub fn a() {}\npub fn b() {}\n",
    )])
    .unwrap();
    wb.wait_until_settled().await;

    let head = wb.current_revision("lib.rs").unwrap();
    let preview = wb.request_diff_preview("lib.rs", base, head).unwrap();
    assert_eq!(preview.from_revision, base);
    assert_eq!(
        scrivener_core::diff::apply(preview.body.hunks()),
        "pub fn a() {}\npub fn b() {}\n"
    );
}

#[test]
fn zero_interval_fails_before_anything_runs() {
    let err = Workbench::new(CoreConfig {
        reveal: RevealConfig {
            chars_per_tick: 4,
            tick_interval_ms: 0,
            newline_extra_delay_ms: 0,
        },
        ..CoreConfig::default()
    })
    .err()
    .unwrap();
    assert_eq!(err, scrivener_core::ConfigError::ZeroTickInterval);
}
