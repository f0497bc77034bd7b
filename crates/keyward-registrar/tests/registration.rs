//! Registration Tests

mod common;

use common::*;
use keyward_core::RegistrarError;
use keyward_registrar::CredentialStore;

#[tokio::test]
async fn test_invalid_factor_count_rejected() {
    let (registrar, store) = registrar();
    let keys = keyring(1);
    let challenge = registrar.get_challenge().await.unwrap();

    let result = registrar
        .register(&challenge, 0, &sign_all(&challenge, &[&keys[0]]))
        .await;

    assert_eq!(result, Err(RegistrarError::InvalidFactorCount));
    assert_eq!(
        result.unwrap_err().to_string(),
        "factor count must be greater than or equal to one"
    );
    assert_eq!(store.identity_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_fewer_signatures_than_factor_count_rejected() {
    let (registrar, _store) = registrar();
    let keys = keyring(1);
    let challenge = registrar.get_challenge().await.unwrap();

    let result = registrar
        .register(&challenge, 2, &sign_all(&challenge, &[&keys[0]]))
        .await;

    assert_eq!(result, Err(RegistrarError::InsufficientSignatures));
}

#[tokio::test]
async fn test_register_single_key() {
    let (registrar, store) = registrar();
    let keys = keyring(1);

    let identity = register(&registrar, 1, &[&keys[0]]).await;

    assert_eq!(store.identity_count().await.unwrap(), 1);
    let record = store.identity_record(&identity).unwrap().unwrap();
    assert_eq!(record.factor_count.get(), 1);
    verify_credentials(&registrar, &[&keys[0]], 1).await;
}

#[tokio::test]
async fn test_register_with_another_identitys_key_rejected() {
    let (registrar, store) = registrar();
    let keys = keyring(2);
    register(&registrar, 1, &[&keys[0]]).await;

    let challenge = registrar.get_challenge().await.unwrap();
    let result = registrar
        .register(&challenge, 1, &sign_all(&challenge, &[&keys[1], &keys[0]]))
        .await;

    assert_eq!(result, Err(RegistrarError::AlreadyRegistered));
    assert_eq!(store.identity_count().await.unwrap(), 1);
    // The rejected attempt did not claim the fresh key either
    let challenge = registrar.get_challenge().await.unwrap();
    let result = registrar
        .authenticate(&challenge, &sign_all(&challenge, &[&keys[1]]))
        .await;
    assert_eq!(result, Err(RegistrarError::UnrecognizedSignature));
}

#[tokio::test]
async fn test_register_multiple_keys_with_factor_count() {
    let (registrar, _store) = registrar();
    let keys = keyring(3);

    let identity = register(&registrar, 2, &[&keys[0], &keys[1], &keys[2]]).await;

    verify_credentials(&registrar, &[&keys[0], &keys[1], &keys[2]], 2).await;

    let challenge = registrar.get_challenge().await.unwrap();
    let authenticated = registrar
        .authenticate(&challenge, &sign_all(&challenge, &[&keys[2], &keys[0]]))
        .await
        .unwrap();
    assert_eq!(authenticated, identity);
}

#[tokio::test]
async fn test_register_with_unissued_challenge_rejected() {
    let (registrar, _store) = registrar();
    let keys = keyring(1);
    let challenge = keyward_core::Challenge::new(vec![7; 64]);

    let result = registrar
        .register(&challenge, 1, &sign_all(&challenge, &[&keys[0]]))
        .await;

    assert_eq!(result, Err(RegistrarError::InvalidChallenge));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_only_one_of_five_simultaneous_registrations_succeeds() {
    let (registrar, store) = registrar();
    let keys = keyring(1);
    let before = store.identity_count().await.unwrap();

    let mut attempts = Vec::new();
    for _ in 0..5 {
        let challenge = registrar.get_challenge().await.unwrap();
        let signatures = sign_all(&challenge, &[&keys[0]]);
        let registrar = registrar.clone();
        attempts.push(tokio::spawn(async move {
            registrar.register(&challenge, 1, &signatures).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(RegistrarError::AlreadyRegistered) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 4);
    assert_eq!(store.identity_count().await.unwrap(), before + 1);
}
