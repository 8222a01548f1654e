//! End-to-end protocol runs.

use std::time::Duration;

use qkd_protocol::{
    FatalKind, Phase, ProtocolEngine, QkdError, RunConfig, RunReport, Variant, cancel_pair,
};
use qkd_sim::{BellState, NoiseModel};

async fn run(config: RunConfig) -> RunReport {
    ProtocolEngine::new(config).unwrap().run().await
}

// ============================================================================
// BB84
// ============================================================================

#[tokio::test]
async fn test_bb84_structure() {
    let report = run(RunConfig::for_variant(Variant::Bb84)).await;
    let key = report.key().expect("run should complete");

    assert_eq!(report.rounds.len(), 16);
    for (i, round) in report.rounds.iter().enumerate() {
        assert_eq!(round.index(), i);
        assert!(round.is_completed());
    }

    assert!(key.sifted.len() <= 16);
    for &i in &key.sifted.indices {
        assert!(report.rounds[i].bases_match());
    }
    let matching = report.rounds.iter().filter(|r| r.bases_match()).count();
    assert_eq!(key.sifted.len(), matching);

    assert_eq!(key.estimate.sample_size, key.sifted.len() / 4);
    assert_eq!(key.final_key.len(), key.sifted.len() - key.estimate.sample_size);
    assert_eq!(key.final_key.mismatches(), 0);
    assert!(!key.eavesdropping_detected);
}

#[tokio::test]
async fn test_bb84_detects_full_interception() {
    for seed in [1, 2, 3, 4, 5] {
        let config = RunConfig {
            num_rounds: 1000,
            seed,
            sample_fraction: 0.5,
            detection_threshold: 0.1,
            eve_enabled: true,
            eve_intercept_probability: 1.0,
            ..RunConfig::default()
        };
        let report = run(config).await;
        let key = report.key().unwrap();
        assert!(key.estimate.sample_size > 150);
        assert!(
            key.estimate.rate > 0.15 && key.estimate.rate < 0.35,
            "seed {seed}: rate {}",
            key.estimate.rate
        );
        assert!(key.eavesdropping_detected);
        assert_eq!(report.diagnostics.intercepted_rounds, 1000);
    }
}

#[tokio::test]
async fn test_bb84_detects_interception_in_short_runs() {
    // A 100-round run sifts about 50 bits. At the default fraction of 0.25
    // only about 12 of them get compared, too few to flag a 25% error rate
    // reliably, so short runs compare the whole sifted key.
    let mut detected = 0;
    for seed in 0..20 {
        let config = RunConfig {
            num_rounds: 100,
            seed,
            sample_fraction: 1.0,
            detection_threshold: 0.1,
            eve_enabled: true,
            eve_intercept_probability: 1.0,
            ..RunConfig::default()
        };
        let report = run(config).await;
        let key = report.key().unwrap();
        assert_eq!(key.estimate.sample_size, key.sifted.len());
        if key.eavesdropping_detected {
            detected += 1;
        }
    }
    assert!(detected >= 18, "detected in {detected} of 20 runs");
}

#[tokio::test]
async fn test_bb84_sifts_about_half_the_rounds() {
    let config = RunConfig {
        num_rounds: 4000,
        ..RunConfig::default()
    };
    let report = run(config).await;
    let fraction = report.key().unwrap().sifted.len() as f64 / 4000.0;
    assert!((fraction - 0.5).abs() < 0.03, "sifted fraction {fraction}");
}

#[tokio::test]
async fn test_bb84_clean_channel_is_not_flagged() {
    for seed in [1, 2, 3] {
        let config = RunConfig {
            num_rounds: 1000,
            seed,
            sample_fraction: 0.5,
            ..RunConfig::default()
        };
        let key = run(config).await.key().unwrap().clone();
        assert_eq!(key.estimate.mismatches, 0);
        assert!(!key.eavesdropping_detected);
    }
}

#[tokio::test]
async fn test_bit_flip_noise_is_recorded() {
    let config = RunConfig {
        num_rounds: 200,
        noise: NoiseModel::BitFlip { p: 1.0 },
        ..RunConfig::default()
    };
    let report = run(config).await;
    assert_eq!(report.diagnostics.noise_events, 200);
    assert!(report.rounds.iter().all(|r| r.noise_applied().is_some()));

    // X flips rectilinear bits and leaves diagonal bits alone.
    let key = report.key().unwrap();
    for (i, &round) in key.sifted.indices.iter().enumerate() {
        let flipped = key.sifted.sender[i] != key.sifted.receiver[i];
        let rectilinear = report.rounds[round].sender_basis() == qkd_sim::Basis::Rectilinear;
        assert_eq!(flipped, rectilinear);
    }
}

#[tokio::test]
async fn test_error_correction_can_be_disabled() {
    let config = RunConfig {
        error_correction: false,
        ..RunConfig::default()
    };
    assert!(run(config).await.key().unwrap().corrected.is_none());

    let key = run(RunConfig::default()).await.key().unwrap().clone();
    let corrected = key.corrected.unwrap();
    assert_eq!(corrected.len(), key.final_key.len().div_ceil(3));
    assert_eq!(corrected.residual_mismatches, 0);
}

// ============================================================================
// B92 and E91
// ============================================================================

#[tokio::test]
async fn test_b92_keeps_only_conclusive_rounds() {
    let config = RunConfig {
        num_rounds: 2000,
        ..RunConfig::for_variant(Variant::B92)
    };
    let report = run(config).await;
    let key = report.key().unwrap();

    assert_eq!(key.sifted.mismatches(), 0);
    let fraction = key.sifted.len() as f64 / 2000.0;
    assert!(
        (0.2..0.3).contains(&fraction),
        "conclusive fraction {fraction}"
    );
    for &i in &key.sifted.indices {
        assert_eq!(report.rounds[i].receiver_outcome(), Some(qkd_sim::Bit::One));
    }
}

#[tokio::test]
async fn test_e91_keys_agree_for_both_bell_states() {
    for bell_state in [BellState::PhiPlus, BellState::PsiMinus] {
        let config = RunConfig {
            num_rounds: 400,
            bell_state,
            ..RunConfig::for_variant(Variant::E91)
        };
        let key = run(config).await.key().unwrap().clone();
        assert!(key.sifted.len() > 150, "{bell_state}: {}", key.sifted.len());
        assert_eq!(key.sifted.mismatches(), 0, "{bell_state}");
        assert!(!key.eavesdropping_detected);
    }
}

#[tokio::test]
async fn test_e91_detects_interception() {
    let config = RunConfig {
        num_rounds: 1000,
        sample_fraction: 0.5,
        eve_enabled: true,
        ..RunConfig::for_variant(Variant::E91)
    };
    let key = run(config).await.key().unwrap().clone();
    assert!(key.eavesdropping_detected, "rate {}", key.estimate.rate);
}

// ============================================================================
// Loss, cancellation and configuration
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_total_loss_drops_every_round() {
    let config = RunConfig {
        num_rounds: 20,
        loss_probability: 1.0,
        ..RunConfig::default()
    };
    let report = run(config).await;
    let key = report.key().expect("timeouts are not fatal");

    assert_eq!(report.diagnostics.dropped_rounds, (0..20).collect::<Vec<_>>());
    assert_eq!(report.diagnostics.completed_rounds, 0);
    assert_eq!(report.diagnostics.channel.lost, 20);
    assert!(report.rounds.iter().all(|r| r.receiver_outcome().is_none()));
    assert!(key.sifted.is_empty());
    assert_eq!(key.estimate.sample_size, 0);
    assert!(!key.eavesdropping_detected);
}

#[tokio::test(start_paused = true)]
async fn test_partial_loss_never_sifts_dropped_rounds() {
    let config = RunConfig {
        num_rounds: 200,
        loss_probability: 0.5,
        ..RunConfig::default()
    };
    let report = run(config).await;
    let key = report.key().unwrap();
    let dropped = &report.diagnostics.dropped_rounds;

    assert!(!dropped.is_empty());
    assert_eq!(report.diagnostics.completed_rounds + dropped.len(), 200);
    assert!(key.sifted.indices.iter().all(|i| !dropped.contains(i)));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let (handle, token) = cancel_pair();
    handle.cancel();
    let report = ProtocolEngine::new(RunConfig::default())
        .unwrap()
        .run_until_cancelled(token)
        .await;

    let failure = report.failure().unwrap();
    assert_eq!(failure.kind, FatalKind::Cancelled);
    assert_eq!(failure.phase, Phase::Idle);
    assert_eq!(failure.round, None);
    assert!(report.rounds.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_qubit() {
    let config = RunConfig {
        loss_probability: 1.0,
        receive_timeout_ms: 60_000,
        ..RunConfig::default()
    };
    let (handle, token) = cancel_pair();
    let engine = ProtocolEngine::new(config).unwrap();
    let task = tokio::spawn(engine.run_until_cancelled(token));

    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.cancel();
    let report = task.await.unwrap();

    let failure = report.failure().unwrap();
    assert_eq!(failure.kind, FatalKind::Cancelled);
    assert_eq!(failure.phase, Phase::Measuring);
    assert_eq!(failure.round, Some(0));
    assert!(!report.is_completed());
}

#[test]
fn test_invalid_config_is_rejected_before_running() {
    let config = RunConfig {
        sample_fraction: 1.5,
        ..RunConfig::default()
    };
    assert!(matches!(
        ProtocolEngine::new(config),
        Err(QkdError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_report_json_roundtrip() {
    let report = run(RunConfig {
        num_rounds: 32,
        eve_enabled: true,
        ..RunConfig::default()
    })
    .await;
    let json = serde_json::to_string(&report).unwrap();
    let back: RunReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.rounds, report.rounds);
    assert_eq!(back.diagnostics.dropped_rounds, report.diagnostics.dropped_rounds);
    assert_eq!(back.key().unwrap().final_key, report.key().unwrap().final_key);
    assert_eq!(back.key().unwrap().estimate.mismatches, report.key().unwrap().estimate.mismatches);
}

#[tokio::test]
async fn test_same_seed_same_key_for_every_variant() {
    for variant in Variant::ALL {
        let config = RunConfig {
            num_rounds: 128,
            ..RunConfig::for_variant(variant)
        };
        let a = run(config.clone()).await;
        let b = run(config).await;
        assert_eq!(a.key().unwrap().final_key, b.key().unwrap().final_key);
    }
}
