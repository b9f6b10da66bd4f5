//! End-to-end range reads through the coordinator and the loopback producer.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use rangebridge::correlation::{CorrelationRegistry, TaskId};
use rangebridge::loopback::LoopbackProducer;
use rangebridge::{
    BridgeError, ElementRef, FileRef, ReadRequest, TransferConfig, TransferCoordinator,
    TransportMode,
};

const TEN_BYTES: &[u8] = b"0123456789";

fn coordinator_with(
    transport: TransportMode,
    content: &[u8],
) -> (TransferCoordinator, LoopbackProducer, FileRef) {
    let producer = LoopbackProducer::new();
    let file = producer.open_bytes("resource.bin", content.to_vec());
    let config = TransferConfig::default().with_transport(transport);
    let coordinator = TransferCoordinator::new(config, Arc::new(producer.clone()));
    (coordinator, producer, file)
}

// =============================================================================
// Encoded channel
// =============================================================================

#[tokio::test]
async fn test_encoded_read_returns_whole_resource() {
    let (coordinator, _, file) = coordinator_with(TransportMode::Marshalled, TEN_BYTES);
    let mut destination = vec![0u8; 10];

    let n = coordinator
        .read_range(ReadRequest::new(file, 0, 10, 0), &mut destination, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(n, 10);
    assert_eq!(destination, TEN_BYTES);
}

#[tokio::test]
async fn test_read_is_clamped_at_end_of_resource() {
    for transport in [TransportMode::Marshalled, TransportMode::Unmarshalled] {
        let (coordinator, _, file) = coordinator_with(transport, TEN_BYTES);
        let mut destination = vec![0u8; 10];

        let n = coordinator
            .read_range(
                ReadRequest::new(file, 8, 10, 0),
                &mut destination,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(n, 2, "{transport}");
        assert_eq!(&destination[..2], b"89");
    }
}

#[tokio::test]
async fn test_read_past_end_returns_zero() {
    let (coordinator, _, file) = coordinator_with(TransportMode::Unmarshalled, TEN_BYTES);
    let mut destination = vec![0u8; 4];

    let n = coordinator
        .read_range(ReadRequest::new(file, 50, 4, 0), &mut destination, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(n, 0);
}

// =============================================================================
// Shared-buffer verification and retry
// =============================================================================

#[tokio::test]
async fn test_matching_retry_still_fails_the_read() {
    let (coordinator, producer, file) = coordinator_with(TransportMode::Unmarshalled, TEN_BYTES);
    producer.corrupt_next_shared_reads(1);
    let mut destination = vec![0u8; 10];

    let err = coordinator
        .read_range(ReadRequest::new(file, 0, 10, 0), &mut destination, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_integrity());
    assert_eq!(
        err,
        BridgeError::TransferIntegrity {
            file,
            position: 0,
            count: 10,
            retry_matched: true,
        }
    );
    assert_eq!(producer.shared_dispatches(), 2);

    let metrics = coordinator.metrics();
    assert_eq!(metrics.retries, 1);
    assert_eq!(metrics.integrity_failures, 1);
    assert_eq!(metrics.reads_succeeded, 0);
    assert_eq!(coordinator.pool_stats().outstanding, 0);
}

#[tokio::test]
async fn test_mismatching_retry_fails_the_read() {
    let (coordinator, producer, file) = coordinator_with(TransportMode::Unmarshalled, TEN_BYTES);
    producer.corrupt_next_shared_reads(2);
    let mut destination = vec![0u8; 10];

    let err = coordinator
        .read_range(ReadRequest::new(file, 0, 10, 0), &mut destination, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BridgeError::TransferIntegrity {
            retry_matched: false,
            ..
        }
    ));
    assert_eq!(producer.shared_dispatches(), 2);
    assert_eq!(coordinator.metrics().integrity_mismatches, 2);
}

#[tokio::test]
async fn test_retry_state_does_not_leak_between_calls() {
    let (coordinator, producer, file) = coordinator_with(TransportMode::Unmarshalled, TEN_BYTES);
    producer.corrupt_next_shared_reads(1);
    let mut destination = vec![0u8; 10];
    let cancel = CancellationToken::new();

    let first = coordinator
        .read_range(ReadRequest::new(file, 0, 10, 0), &mut destination, &cancel)
        .await;
    assert!(first.is_err());

    let second = coordinator
        .read_range(ReadRequest::new(file, 0, 10, 0), &mut destination, &cancel)
        .await
        .unwrap();
    assert_eq!(second, 10);
    assert_eq!(destination, TEN_BYTES);
    assert_eq!(producer.shared_dispatches(), 3);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_reads_complete_out_of_order() {
    let producer = LoopbackProducer::new();
    let config = TransferConfig::default().with_transport(TransportMode::Unmarshalled);
    let coordinator = Arc::new(TransferCoordinator::new(config, Arc::new(producer.clone())));

    // Later files complete first.
    let files: Vec<(FileRef, Vec<u8>)> = (0..5u8)
        .map(|i| {
            let content = vec![b'a' + i; 3 + i as usize];
            let file = producer.open_bytes(format!("f{i}"), content.clone());
            producer.set_completion_delay(file, Duration::from_millis(50 - 10 * u64::from(i)));
            (file, content)
        })
        .collect();

    let reads = files.iter().map(|(file, content)| {
        let coordinator = Arc::clone(&coordinator);
        let file = *file;
        let expected = content.clone();
        async move {
            let mut destination = vec![0u8; 16];
            let n = coordinator
                .read_range(
                    ReadRequest::new(file, 0, 16, 0),
                    &mut destination,
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            assert_eq!(n as usize, expected.len());
            assert_eq!(&destination[..expected.len()], expected.as_slice());
        }
    });
    futures::future::join_all(reads).await;

    assert_eq!(coordinator.pending_completions(), 0);
    assert_eq!(coordinator.metrics().reads_succeeded, 5);
    assert_eq!(coordinator.pool_stats().outstanding, 0);
}

#[tokio::test]
async fn test_random_ranges_match_source() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut content = vec![0u8; 4096];
    rng.fill(content.as_mut_slice());

    let (coordinator, _, file) = coordinator_with(TransportMode::Unmarshalled, &content);
    let cancel = CancellationToken::new();

    for _ in 0..32 {
        let position = rng.random_range(0..4200u64);
        let count = rng.random_range(1..512u32);
        let offset = rng.random_range(0..64u64);
        let mut destination = vec![0u8; 600];

        let n = coordinator
            .read_range(ReadRequest::new(file, position, count, offset), &mut destination, &cancel)
            .await
            .unwrap();

        let start = (position as usize).min(content.len());
        let end = (start + count as usize).min(content.len());
        assert_eq!(n as usize, end - start);
        let offset = offset as usize;
        assert_eq!(&destination[offset..offset + n as usize], &content[start..end]);
    }
}

// =============================================================================
// Streams and readiness
// =============================================================================

#[tokio::test]
async fn test_stream_over_slow_starting_producer() {
    let producer = LoopbackProducer::new();
    producer.ready_after_polls(3);
    let element = ElementRef::new("file-input");
    producer.add_file(&element, "first.txt", b"first".to_vec());
    producer.add_file(&element, "second.txt", b"second file".to_vec());

    let config = TransferConfig::default()
        .with_transport(TransportMode::Unmarshalled)
        .with_readiness_polling(5, Duration::from_millis(1))
        .with_chunk_size(4);
    let coordinator = Arc::new(TransferCoordinator::new(config, Arc::new(producer.clone())));

    let mut stream = coordinator.open_read(&element, 1).await.unwrap();
    assert_eq!(stream.metadata().name, "second.txt");
    assert_eq!(stream.len(), 11);

    let out = stream.read_to_end(&CancellationToken::new()).await.unwrap();
    assert_eq!(out, b"second file");
    assert_eq!(producer.bootstrap_injections(), 1);

    let file = stream.file();
    stream.close().await.unwrap();
    assert!(!producer.is_open(file));
}

#[tokio::test]
async fn test_missing_index_is_a_transfer_error() {
    let producer = LoopbackProducer::new();
    let element = ElementRef::new("empty");
    let coordinator = Arc::new(TransferCoordinator::new(
        TransferConfig::default(),
        Arc::new(producer),
    ));

    let err = coordinator.open_read(&element, 0).await.err().unwrap();
    assert!(matches!(err, BridgeError::Transfer { .. }));
}

// =============================================================================
// Unknown completions
// =============================================================================

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_unknown_completion_is_logged_once_and_ignored() {
    let registry = Arc::new(CorrelationRegistry::new());
    let pending = registry.begin();
    let sink = rangebridge::correlation::CompletionSink::new(Arc::clone(&registry));

    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        sink.on_read_completed(TaskId(999), 4);
    });

    let output = String::from_utf8(log.0.lock().clone()).unwrap();
    assert_eq!(output.lines().count(), 1, "{output}");
    assert!(output.contains("999"));

    assert_eq!(registry.unknown_completions(), 1);
    assert_eq!(registry.pending_count(), 1);
    assert!(registry.is_pending(pending.id()));
}
