//! Streaming integration tests: concurrent sessions, the monotone-prefix
//! read guarantee, and merge behavior over live output.

use std::sync::Arc;
use std::time::Duration;

use cs_domain::config::TranscriptionConfig;
use cs_engines::mock::MockEngine;
use cs_transcription::chunks::merge_chunks;
use cs_transcription::TranscriptionService;

fn service(queue: usize) -> TranscriptionService {
    TranscriptionService::new(
        Arc::new(MockEngine::new()),
        TranscriptionConfig {
            max_chunk_queue_size: queue,
            error_threshold: 5,
            quality_check_interval_s: 1,
            chunk_duration_s: 2.0,
        },
    )
}

async fn wait_for<F: FnMut() -> bool>(mut cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn concurrent_sessions_stay_isolated() {
    let service = Arc::new(service(100));
    for i in 0..4 {
        service
            .start_session(&format!("s{i}"), &format!("stream_{i}"))
            .unwrap();
    }

    // Interleave pushes across all sessions.
    for round in 0..5 {
        for i in 0..4 {
            service
                .process_audio_chunk(
                    &format!("s{i}"),
                    vec![0u8; 300 + i],
                    round as f64 * 2.0,
                    2.0,
                )
                .unwrap();
        }
    }

    for i in 0..4 {
        let id = format!("s{i}");
        assert!(
            wait_for(
                || service.transcript_chunks(&id, None).len() == 5,
                Duration::from_secs(5)
            )
            .await,
            "session {id} should process exactly its own chunks"
        );
    }

    for i in 0..4 {
        let summary = service.stop_session(&format!("s{i}")).await.unwrap();
        assert_eq!(summary.total_chunks, 5);
        assert_eq!(summary.error_count, 0);
    }
    assert!(service.list_active().is_empty());
}

#[tokio::test]
async fn readers_observe_a_monotone_prefix() {
    let service = service(100);
    service.start_session("s1", "stream_1").unwrap();

    for i in 0..3 {
        service
            .process_audio_chunk("s1", vec![0u8; 300], i as f64 * 2.0, 2.0)
            .unwrap();
    }
    assert!(
        wait_for(
            || service.transcript_chunks("s1", None).len() == 3,
            Duration::from_secs(5)
        )
        .await
    );
    let earlier = service.transcript_chunks("s1", None);

    for i in 3..6 {
        service
            .process_audio_chunk("s1", vec![0u8; 300], i as f64 * 2.0, 2.0)
            .unwrap();
    }
    assert!(
        wait_for(
            || service.transcript_chunks("s1", None).len() == 6,
            Duration::from_secs(5)
        )
        .await
    );

    // Every chunk observed earlier appears unchanged, in the same
    // position, in the later read.
    let later = service.transcript_chunks("s1", None);
    for (old, new) in earlier.iter().zip(&later) {
        assert_eq!(old.chunk_id, new.chunk_id);
        assert_eq!(old.text, new.text);
        assert_eq!(old.confidence, new.confidence);
        assert!(old.is_final && new.is_final);
    }

    // The since-filter returns a suffix consistent with the full read.
    let suffix = service.transcript_chunks("s1", Some(6.0));
    assert_eq!(suffix.len(), 3);
    assert_eq!(suffix[0].chunk_id, later[3].chunk_id);

    service.stop_session("s1").await.unwrap();
}

#[tokio::test]
async fn stop_waits_for_workers_and_freezes_output() {
    let service = service(100);
    service.start_session("s1", "stream_1").unwrap();
    for i in 0..3 {
        service
            .process_audio_chunk("s1", vec![0u8; 300], i as f64 * 2.0, 2.0)
            .unwrap();
    }
    wait_for(
        || !service.transcript_chunks("s1", None).is_empty(),
        Duration::from_secs(5),
    )
    .await;

    let summary = service.stop_session("s1").await.unwrap();
    let frozen = service.transcript_chunks("s1", None);
    assert_eq!(frozen.len(), summary.total_chunks);

    // Producers are rejected after stop; the transcript never grows.
    assert!(service
        .process_audio_chunk("s1", vec![0u8; 300], 100.0, 2.0)
        .is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.transcript_chunks("s1", None).len(), frozen.len());
}

#[tokio::test]
async fn merging_live_output_collapses_single_speaker_runs() {
    let service = service(100);
    service.start_session("s1", "stream_1").unwrap();

    // Same audio shape -> same mock speaker for every chunk.
    for i in 0..4 {
        service
            .process_audio_chunk("s1", vec![0u8; 300], i as f64 * 2.0, 2.0)
            .unwrap();
    }
    assert!(
        wait_for(
            || service.transcript_chunks("s1", None).len() == 4,
            Duration::from_secs(5)
        )
        .await
    );

    let chunks = service.transcript_chunks("s1", None);
    let merged = merge_chunks(&chunks, 2.0);
    assert_eq!(merged.len(), 1);
    let full = service.full_transcript("s1");
    assert_eq!(merged[0].text, full);

    service.stop_session("s1").await.unwrap();
}
