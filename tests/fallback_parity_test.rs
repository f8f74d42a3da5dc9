//! Fallback Path Tests
//!
//! Tests the degraded path:
//! - Network and fallback seals of the same batch share root and proofs
//! - Adapter errors and timeouts both end in a fallback commitment
//! - Pseudo-signatures can be re-derived by an auditor
//! - The logical clock advances once per fallback batch
//! - A failed fallback reaches the flushing caller, every record in the
//!   batch, the stats and shutdown

mod common;

use std::sync::Arc;
use std::time::Duration;

use sealbatch::{
    Compression, Commitment, EngineConfig, Error, FallbackCompressor, FlushOutcome, NetworkError,
    NetworkReceipt, OfflineAdapter,
};

async fn seal_all(engine: &sealbatch::Engine, records: &[sealbatch::Record]) -> sealbatch::CompressionResult {
    for record in records {
        engine.compress(record.clone(), false).await.unwrap();
    }
    match engine.flush_now().await.unwrap() {
        FlushOutcome::Sealed(result) => result,
        FlushOutcome::EmptyBatch => panic!("nothing was sealed"),
    }
}

/// Tests that only the signature differs between the two paths.
#[tokio::test]
async fn fallback_root_matches_network_root() {
    let records = common::numbered_records(7);

    let online = common::engine_with(common::size_only_config(10), common::ScriptedAdapter::accepting());
    let offline = common::engine_with(common::size_only_config(10), Arc::new(OfflineAdapter));

    let network = seal_all(&online, &records).await;
    let fallback = seal_all(&offline, &records).await;

    assert!(!network.commitment.is_fallback());
    assert!(fallback.commitment.is_fallback());
    assert_eq!(network.root(), fallback.root());
    assert_eq!(network.leaves, fallback.leaves);
    assert_eq!(network.proofs, fallback.proofs);
    assert_ne!(network.commitment.signature(), fallback.commitment.signature());
}

/// Tests that a rejected submission falls back and records the reason.
#[tokio::test]
async fn rejected_submission_falls_back() {
    let adapter = common::ScriptedAdapter::with_script(vec![Err(NetworkError::Rejected(
        "fee too low".to_string(),
    ))]);
    let engine = common::engine_with(common::size_only_config(10), adapter.clone());

    let first = seal_all(&engine, &common::numbered_records(2)).await;
    match &first.commitment {
        Commitment::Fallback { reason, .. } => assert!(reason.contains("fee too low")),
        other => panic!("expected fallback, got {:?}", other),
    }

    // Script exhausted: the next batch goes through the network.
    let second = seal_all(&engine, &common::numbered_records(2)).await;
    assert!(!second.commitment.is_fallback());

    let stats = engine.stats();
    assert_eq!(stats.fallback_commits, 1);
    assert_eq!(stats.network_commits, 1);
    assert!(stats.last_fallback_reason.unwrap().contains("fee too low"));
    // Never retried: one call per batch.
    assert_eq!(adapter.calls().len(), 2);
}

/// Tests that a submission exceeding submit_timeout falls back.
#[tokio::test]
async fn slow_submission_times_out_to_fallback() {
    let config = EngineConfig {
        submit_timeout: Duration::from_millis(30),
        ..common::size_only_config(10)
    };
    let engine = common::engine_with(config, common::SlowAdapter::new(Duration::from_secs(5)));

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        seal_all(&engine, &common::numbered_records(3)),
    )
    .await
    .expect("flush was not bounded by submit_timeout");

    match &result.commitment {
        Commitment::Fallback { reason, .. } => assert!(reason.contains("timed out after 30ms")),
        other => panic!("expected fallback, got {:?}", other),
    }
}

/// Tests that an auditor can re-derive each pseudo-signature.
#[tokio::test]
async fn pseudo_signatures_are_reproducible() {
    let config = EngineConfig {
        fallback_clock_start: 100,
        ..common::size_only_config(10)
    };
    let engine = common::engine_with(config, Arc::new(OfflineAdapter));

    let mut clocks = Vec::new();
    for round in 0..3 {
        let result = seal_all(&engine, &common::numbered_records(round + 1)).await;
        match result.commitment {
            Commitment::Fallback {
                root,
                pseudo_signature,
                logical_clock,
                leaf_count,
                ..
            } => {
                assert_eq!(leaf_count as usize, result.leaves.len());
                assert_eq!(
                    FallbackCompressor::recompute(&root, logical_clock, leaf_count),
                    pseudo_signature
                );
                clocks.push(logical_clock);
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }
    assert_eq!(clocks, vec![100, 101, 102]);
}

/// Tests that a single record's commitment is enough to re-check its
/// batch's pseudo-signature.
#[tokio::test]
async fn record_commitment_carries_pseudo_signature_inputs() {
    let engine = common::engine_with(common::size_only_config(10), Arc::new(OfflineAdapter));
    let records = common::numbered_records(3);

    let mut pending = Vec::new();
    for record in &records[..2] {
        pending.push(engine.compress(record.clone(), false).await.unwrap());
    }
    let last = engine
        .compress(records[2].clone(), true)
        .await
        .unwrap()
        .into_commitment()
        .await
        .unwrap();

    // Holder of one record, serialized and sent on.
    let wire = serde_json::to_string(&last.commitment).unwrap();
    let received: Commitment = serde_json::from_str(&wire).unwrap();
    assert!(received.verify_pseudo_signature());
    match &received {
        Commitment::Fallback { leaf_count, .. } => assert_eq!(*leaf_count, 3),
        other => panic!("expected fallback, got {:?}", other),
    }

    for compression in pending {
        let commitment = compression.into_commitment().await.unwrap();
        assert_eq!(commitment.commitment, last.commitment);
    }
}

/// Tests that an exhausted fallback clock fails the whole batch.
#[tokio::test]
async fn fallback_failure_reaches_every_record() {
    let config = EngineConfig {
        fallback_clock_start: u64::MAX - 1,
        ..common::size_only_config(10)
    };
    let engine = common::engine_with(config, Arc::new(OfflineAdapter));

    // Last usable clock value.
    let sealed = seal_all(&engine, &common::numbered_records(1)).await;
    assert!(sealed.commitment.verify_pseudo_signature());

    let mut pending = Vec::new();
    for record in common::numbered_records(2) {
        match engine.compress(record, false).await.unwrap() {
            Compression::Pending(p) => pending.push(p),
            Compression::Committed(_) => panic!("batched compress sealed immediately"),
        }
    }

    let err = engine.flush_now().await.unwrap_err();
    assert!(matches!(err, Error::FallbackFailure(ref reason) if reason.contains("clock exhausted")));
    for p in pending {
        assert_eq!(p.wait().await.unwrap_err(), err);
    }

    let stats = engine.stats();
    assert_eq!(stats.fallback_commits, 1);
    assert_eq!(stats.fallback_failures, 1);
    assert_eq!(stats.batches_sealed, 1);

    // Immediate mode surfaces the same error directly.
    let immediate = engine.compress(common::text_record("alice", 1), true).await.unwrap_err();
    assert_eq!(immediate, err);
    assert_eq!(engine.stats().fallback_failures, 2);

    // Shutdown drains the queue and reports the failure.
    let queued = match engine.compress(common::text_record("bob", 2), false).await.unwrap() {
        Compression::Pending(p) => p,
        Compression::Committed(_) => panic!("batched compress sealed immediately"),
    };
    assert_eq!(engine.shutdown().await.unwrap_err(), err);
    assert_eq!(queued.wait().await.unwrap_err(), err);
    assert_eq!(engine.stats().fallback_failures, 3);
    assert_eq!(engine.status().queue_size, 0);
}

/// Tests that network receipts carry through as the commitment signature.
#[tokio::test]
async fn network_signature_is_kept() {
    let adapter = common::ScriptedAdapter::with_script(vec![Ok(
        NetworkReceipt::new("5NetworkSig").with_tip_account("tip-a"),
    )]);
    let engine = common::engine_with(common::size_only_config(10), adapter);

    let result = seal_all(&engine, &common::numbered_records(1)).await;
    assert_eq!(
        result.commitment,
        Commitment::Network {
            root: result.leaves[0],
            signature: "5NetworkSig".to_string(),
        }
    );
}
