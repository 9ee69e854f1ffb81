//! `callscribe load-test` — drive simulated sessions through the
//! in-process pipeline with the mock engine and report throughput.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use cs_crm::CrmRegistry;
use cs_domain::config::Config;
use cs_domain::types::{Meeting, MeetingStatus};
use cs_engines::mock::MockEngine;
use cs_platforms::PlatformRegistry;
use cs_sessions::{CallSessionConfig, SessionStatus};

use crate::state::AppState;

/// Run the load test. Returns `Ok(true)` when every session completed
/// with a transcript and a draft summary.
pub async fn run(config: Config, sessions: usize, chunks: usize) -> anyhow::Result<bool> {
    // Fast cadences: the load test measures the pipeline, not the
    // production polling intervals.
    let mut config = config;
    config.session.tick_interval_ms = 10;
    config.session.monitor_interval_s = 1;
    config.transcription.quality_check_interval_s = 1;

    let state = AppState::build(
        Arc::new(config),
        Arc::new(MockEngine::new()),
        PlatformRegistry::with_default_bots(),
        CrmRegistry::empty(),
        false,
    )?;

    println!("load test: {sessions} session(s) x {chunks} chunk(s)");
    let started = Instant::now();

    let mut tasks = Vec::new();
    for i in 0..sessions {
        let state = state.clone();
        tasks.push(tokio::spawn(async move { run_session(state, i, chunks).await }));
    }

    let mut failures = 0usize;
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("load test: session failed: {e}");
                failures += 1;
            }
            Err(e) => {
                eprintln!("load test: task panicked: {e}");
                failures += 1;
            }
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let total_chunks = sessions * chunks;
    println!(
        "load test: {} session(s) in {elapsed:.2}s ({:.1} chunks/s), {failures} failure(s)",
        sessions,
        total_chunks as f64 / elapsed.max(0.001),
    );
    Ok(failures == 0)
}

async fn run_session(state: AppState, index: usize, chunks: usize) -> anyhow::Result<()> {
    let meeting = Meeting {
        id: Uuid::new_v4(),
        calendar_event_id: format!("load_test_{index}_{}", Uuid::new_v4().simple()),
        lead_id: None,
        title: format!("Load test meeting {index}"),
        start_time: Utc::now(),
        end_time: Utc::now() + chrono::Duration::hours(1),
        attendees: Vec::new(),
        status: MeetingStatus::Scheduled,
    };
    let meeting_id = meeting.id;
    state.store.insert_meeting(meeting)?;

    let session = state.manager.start(CallSessionConfig::new(
        meeting_id,
        "https://meet.google.com/load-test",
        state.manager.defaults(),
    ))?;

    // Wait for the pipeline to reach TRANSCRIBING.
    let deadline = Instant::now() + Duration::from_secs(10);
    let tid = loop {
        if let Some(live) = state.manager.status(&session.session_id) {
            if live.status == SessionStatus::Transcribing {
                break live.transcription_session_id.expect("transcribing session has id");
            }
            if live.status.is_terminal() {
                anyhow::bail!("session {} ended early: {:?}", session.session_id, live.status);
            }
        }
        if Instant::now() > deadline {
            anyhow::bail!("session {} never reached transcribing", session.session_id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    for i in 0..chunks {
        state.transcription.process_audio_chunk(
            &tid,
            vec![0u8; 320],
            i as f64 * 2.0,
            2.0,
        )?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // Give the worker a moment to drain, then stop and verify.
    let drain_deadline = Instant::now() + Duration::from_secs(10);
    while state.transcription.transcript_chunks(&tid, None).is_empty()
        && Instant::now() < drain_deadline
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let summary = state.manager.stop(&session.session_id, "load_test").await?;
    anyhow::ensure!(
        summary.status == SessionStatus::Completed,
        "session ended {:?}",
        summary.status
    );
    anyhow::ensure!(summary.transcript_length > 0, "empty transcript");
    anyhow::ensure!(summary.draft_summary_id.is_some(), "no draft generated");
    Ok(())
}
