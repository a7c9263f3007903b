// Integration tests for Strata layered encryption

use proptest::prelude::*;

use strata::config::{EngineConfig, ModeThresholds};
use strata::crypto::kdf::KdfParams;
use strata::crypto::kyber::KeyPair;
use strata::crypto::signing::{SignatureAlgorithm, SigningKeyPair};
use strata::engine::envelope::RECORD_SIZE;
use strata::engine::{
    AlgorithmId, EngineError, EntropyBooster, KeyScheduler, MasterSecret, Mode, PipelineEngine,
};
use strata::signature;

const HEADER: usize = 3;

fn fast_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

/// Small thresholds so every mode is reachable with short payloads
fn compact_config() -> EngineConfig {
    EngineConfig {
        thresholds: ModeThresholds {
            hybrid_min: 16,
            super_min: 64,
        },
        kdf: fast_kdf(),
        ..EngineConfig::default()
    }
}

fn record_offset(index: usize) -> usize {
    HEADER + index * RECORD_SIZE
}

fn nonce_offset(index: usize) -> usize {
    record_offset(index) + 1
}

fn tag_offset(index: usize) -> usize {
    record_offset(index) + 1 + 12
}

fn len_offset(index: usize) -> usize {
    record_offset(index) + 1 + 12 + 16
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[test]
fn test_hello_is_single_layer() {
    let engine = PipelineEngine::new(EngineConfig {
        kdf: fast_kdf(),
        ..EngineConfig::default()
    })
    .unwrap();

    let sealed = engine.encrypt(b"hello", None).unwrap();
    let envelope = engine.inspect(&sealed).unwrap();

    assert_eq!(envelope.mode(), Mode::Classical);
    assert_eq!(envelope.layer_count(), 1);
    assert_eq!(engine.decrypt(&sealed, None).unwrap(), b"hello");
}

#[test]
fn test_all_modes_with_recipient() {
    let sender = PipelineEngine::new(compact_config()).unwrap();
    let receiver = PipelineEngine::new(compact_config()).unwrap();
    let keypair = KeyPair::generate().unwrap();

    for (len, mode, layers) in [
        (10, Mode::Classical, vec![AlgorithmId::Kyber1024Wrap]),
        (
            32,
            Mode::Hybrid,
            vec![AlgorithmId::Aes256Gcm, AlgorithmId::Kyber1024Wrap],
        ),
        (
            200,
            Mode::Super,
            vec![
                AlgorithmId::Aes256Gcm,
                AlgorithmId::BoostedChaCha20,
                AlgorithmId::Kyber1024Wrap,
            ],
        ),
    ] {
        let plaintext = payload(len);
        let sealed = sender.encrypt(&plaintext, Some(keypair.public_key())).unwrap();

        let envelope = receiver.inspect(&sealed).unwrap();
        assert_eq!(envelope.mode(), mode);
        let algorithms: Vec<_> = envelope.records().iter().map(|r| r.algorithm).collect();
        assert_eq!(algorithms, layers);

        assert_eq!(receiver.decrypt(&sealed, Some(&keypair)).unwrap(), plaintext);
    }
}

#[test]
fn test_one_megabyte_uses_super() {
    let engine = PipelineEngine::new(EngineConfig {
        kdf: fast_kdf(),
        booster_workers: 4,
        ..EngineConfig::default()
    })
    .unwrap();
    let keypair = KeyPair::generate().unwrap();

    let plaintext = payload(1_000_000);
    let sealed = engine.encrypt(&plaintext, Some(keypair.public_key())).unwrap();

    assert_eq!(sealed[1], Mode::Super.tag());
    assert_eq!(sealed[2], 3);
    assert_eq!(engine.decrypt(&sealed, Some(&keypair)).unwrap(), plaintext);
}

#[test]
fn test_all_modes_without_recipient() {
    let engine = PipelineEngine::new(compact_config()).unwrap();

    for (len, mode, layers) in [
        (10, Mode::Classical, vec![AlgorithmId::Aes256Gcm]),
        (
            32,
            Mode::Hybrid,
            vec![AlgorithmId::Aes256Gcm, AlgorithmId::LocalWrap],
        ),
        (
            100,
            Mode::Super,
            vec![
                AlgorithmId::Aes256Gcm,
                AlgorithmId::BoostedChaCha20,
                AlgorithmId::LocalWrap,
            ],
        ),
    ] {
        let plaintext = payload(len);
        let sealed = engine.encrypt(&plaintext, None).unwrap();

        let envelope = engine.inspect(&sealed).unwrap();
        assert_eq!(envelope.mode(), mode);
        let algorithms: Vec<_> = envelope.records().iter().map(|r| r.algorithm).collect();
        assert_eq!(algorithms, layers);

        assert_eq!(engine.decrypt(&sealed, None).unwrap(), plaintext);
    }
}

#[test]
fn test_one_megabyte_without_recipient() {
    let engine = PipelineEngine::new(EngineConfig {
        kdf: fast_kdf(),
        ..EngineConfig::default()
    })
    .unwrap();

    let plaintext = vec![7u8; 1_000_000];
    let sealed = engine.encrypt(&plaintext, None).unwrap();

    assert_eq!(sealed[1], Mode::Super.tag());
    assert_eq!(sealed[2], 3);
    assert_eq!(engine.decrypt(&sealed, None).unwrap(), plaintext);

    // Only the holder of the local secret can open it
    let stranger = PipelineEngine::new(EngineConfig {
        kdf: fast_kdf(),
        ..EngineConfig::default()
    })
    .unwrap();
    assert!(matches!(
        stranger.decrypt(&sealed, None),
        Err(EngineError::AuthenticationFailure { layer: 2 })
    ));
}

#[test]
fn test_require_post_quantum_refuses_local_super() {
    let engine = PipelineEngine::new(EngineConfig {
        require_post_quantum: true,
        ..compact_config()
    })
    .unwrap();

    assert!(matches!(
        engine.encrypt(&payload(100), None),
        Err(EngineError::CapabilityUnavailable(_))
    ));
}

#[test]
fn test_tampered_super_envelope_names_the_layer() {
    let engine = PipelineEngine::new(compact_config()).unwrap();
    let keypair = KeyPair::generate().unwrap();
    let sealed = engine.encrypt(&payload(200), Some(keypair.public_key())).unwrap();

    let expect_layer = |bytes: &[u8], layer: usize| match engine.decrypt(bytes, Some(&keypair)) {
        Err(EngineError::AuthenticationFailure { layer: failed }) => assert_eq!(failed, layer),
        other => panic!("expected failure at layer {}, got {:?}", layer, other.map(|p| p.len())),
    };

    for layer in 0..3 {
        let mut tampered = sealed.clone();
        tampered[nonce_offset(layer) + 5] ^= 0x10;
        expect_layer(&tampered, layer);

        let mut tampered = sealed.clone();
        tampered[tag_offset(layer) + 15] ^= 0x01;
        expect_layer(&tampered, layer);
    }

    // Ciphertext body after the encapsulation
    let mut tampered = sealed.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x80;
    expect_layer(&tampered, 2);

    // Inside the encapsulation prefix
    let mut tampered = sealed.clone();
    tampered[record_offset(3) + 10] ^= 0x01;
    expect_layer(&tampered, 2);
}

#[test]
fn test_every_ciphertext_bit_is_authenticated() {
    let engine = PipelineEngine::new(compact_config()).unwrap();
    let sealed = engine.encrypt(b"short message", None).unwrap();
    let body = record_offset(1);

    for byte in body..sealed.len() {
        for bit in 0..8 {
            let mut tampered = sealed.clone();
            tampered[byte] ^= 1 << bit;
            assert!(matches!(
                engine.decrypt(&tampered, None),
                Err(EngineError::AuthenticationFailure { layer: 0 })
            ));
        }
    }
}

#[test]
fn test_record_swap_fails() {
    let engine = PipelineEngine::new(compact_config()).unwrap();
    let keypair = KeyPair::generate().unwrap();
    let sealed = engine.encrypt(&payload(200), Some(keypair.public_key())).unwrap();

    // Whole records: the layout no longer matches the mode
    let mut swapped = sealed.clone();
    let (a, b) = (record_offset(0), record_offset(1));
    let first = sealed[a..a + RECORD_SIZE].to_vec();
    swapped.copy_within(b..b + RECORD_SIZE, a);
    swapped[b..b + RECORD_SIZE].copy_from_slice(&first);
    assert!(matches!(
        engine.decrypt(&swapped, Some(&keypair)),
        Err(EngineError::InvalidEnvelope(_))
    ));

    // Nonces only: layer 1 no longer derives its key
    let mut swapped = sealed.clone();
    let first = sealed[nonce_offset(0)..nonce_offset(0) + 12].to_vec();
    swapped.copy_within(nonce_offset(1)..nonce_offset(1) + 12, nonce_offset(0));
    swapped[nonce_offset(1)..nonce_offset(1) + 12].copy_from_slice(&first);
    assert!(matches!(
        engine.decrypt(&swapped, Some(&keypair)),
        Err(EngineError::AuthenticationFailure { layer: 1 })
    ));
}

#[test]
fn test_inner_length_mismatch_is_invalid() {
    let engine = PipelineEngine::new(compact_config()).unwrap();
    let sealed = engine.encrypt(&payload(32), None).unwrap();

    let mut tampered = sealed.clone();
    tampered[len_offset(0) + 3] ^= 0x01;
    assert!(matches!(
        engine.decrypt(&tampered, None),
        Err(EngineError::InvalidEnvelope(_))
    ));
}

#[test]
fn test_truncated_and_extended_envelopes() {
    let engine = PipelineEngine::new(compact_config()).unwrap();
    let sealed = engine.encrypt(&payload(32), None).unwrap();

    assert!(matches!(
        engine.decrypt(&sealed[..sealed.len() - 1], None),
        Err(EngineError::InvalidEnvelope(_))
    ));

    let mut extended = sealed.clone();
    extended.push(0);
    assert!(matches!(
        engine.decrypt(&extended, None),
        Err(EngineError::InvalidEnvelope(_))
    ));

    assert!(engine.decrypt(&[], None).is_err());
}

#[test]
fn test_require_post_quantum_refuses_local_hybrid() {
    let engine = PipelineEngine::new(EngineConfig {
        require_post_quantum: true,
        ..compact_config()
    })
    .unwrap();

    assert!(matches!(
        engine.encrypt(&payload(32), None),
        Err(EngineError::CapabilityUnavailable(_))
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let config = EngineConfig {
        booster_workers: 0,
        ..compact_config()
    };
    assert!(matches!(
        PipelineEngine::new(config),
        Err(EngineError::Config(_))
    ));

    let config = EngineConfig {
        kdf: KdfParams {
            memory_kib: 1,
            iterations: 1,
            parallelism: 1,
        },
        ..compact_config()
    };
    assert!(matches!(
        PipelineEngine::new(config),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn test_sign_encrypted_envelope() {
    let engine = PipelineEngine::new(compact_config()).unwrap();
    let sealed = engine.encrypt(b"signed and sealed", None).unwrap();

    for alg in [SignatureAlgorithm::Dilithium3, SignatureAlgorithm::Ed25519] {
        let signer = SigningKeyPair::generate(alg);
        let sig = signature::sign(&sealed, &signer).unwrap();

        assert!(signature::verify(&sealed, &sig, &signer.verifying_key()));

        let mut tampered = sealed.clone();
        tampered[0] ^= 1;
        assert!(!signature::verify(&tampered, &sig, &signer.verifying_key()));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_local_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..160)) {
        let engine = PipelineEngine::new(compact_config()).unwrap().with_local_secret([9u8; 32]);
        let sealed = engine.encrypt(&data, None).unwrap();
        prop_assert_eq!(engine.decrypt(&sealed, None).unwrap(), data);
    }

    #[test]
    fn prop_boost_parallel_matches_sequential(seed in 0u32..(1 << 20)) {
        let sequential = EntropyBooster::sequential().boost(seed).unwrap();
        let parallel = EntropyBooster::new(4).boost(seed).unwrap();
        prop_assert_eq!(sequential, parallel);
    }

    #[test]
    fn prop_layer_keys_are_deterministic(
        secret in any::<[u8; 32]>(),
        salt in proptest::collection::vec(any::<u8>(), 8..40),
        layer in 0u8..3,
    ) {
        let scheduler = KeyScheduler::new(fast_kdf(), EntropyBooster::sequential()).unwrap();
        let master = MasterSecret::new(secret);

        let first = scheduler.derive(&master, layer, &salt).unwrap();
        let second = scheduler.derive(&master, layer, &salt).unwrap();
        prop_assert_eq!(first.as_bytes(), second.as_bytes());
    }
}
