mod common;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
};
use common::{harness, now, proposal};
use notifier::{
    admin::{AdminState, ClearParams, clear_db},
    models::proposals::ProposalStatus,
};
use std::sync::Arc;

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

async fn seeded() -> common::Harness {
    let h = harness();
    h.source.set(vec![
        proposal("a", ProposalStatus::Active, (1, 0, 0)),
        proposal("b", ProposalStatus::Active, (2, 0, 0)),
    ]);
    h.engine.run_cycle_at(now()).await.unwrap();
    h
}

#[tokio::test]
async fn clear_db_with_valid_token_empties_store() {
    let h = seeded().await;
    let state = AdminState {
        engine: h.engine.clone(),
        admin_token: Some(Arc::from("s3cret")),
    };

    let response = clear_db(State(state), bearer("s3cret"), Query(ClearParams::default()))
        .await
        .unwrap();

    assert_eq!(response.0.removed, 2);
    assert_eq!(response.0.messages_deleted, 0);
    assert!(h.store.rows().is_empty());
}

#[tokio::test]
async fn clear_db_with_purge_deletes_messages() {
    let h = seeded().await;
    let state = AdminState {
        engine: h.engine.clone(),
        admin_token: Some(Arc::from("s3cret")),
    };

    let response = clear_db(State(state), bearer("s3cret"), Query(ClearParams { purge: true }))
        .await
        .unwrap();

    assert_eq!(response.0.messages_deleted, 2);
}

#[tokio::test]
async fn clear_db_rejects_bad_token() {
    let h = seeded().await;
    let state = AdminState {
        engine: h.engine.clone(),
        admin_token: Some(Arc::from("s3cret")),
    };

    let (status, _) = clear_db(State(state.clone()), bearer("wrong"), Query(ClearParams::default()))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = clear_db(State(state), HeaderMap::new(), Query(ClearParams::default()))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.store.rows().len(), 2);
}

#[tokio::test]
async fn clear_db_rejects_near_miss_tokens() {
    let h = seeded().await;
    let state = AdminState {
        engine: h.engine.clone(),
        admin_token: Some(Arc::from("s3cret")),
    };

    for token in ["s3creT", "s3cre", "s3cret-extra", ""] {
        let (status, _) = clear_db(State(state.clone()), bearer(token), Query(ClearParams::default()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED, "token {token:?}");
    }
    assert_eq!(h.store.rows().len(), 2);
}

#[tokio::test]
async fn clear_db_is_disabled_without_token() {
    let h = seeded().await;
    let state = AdminState {
        engine: h.engine.clone(),
        admin_token: None,
    };

    let (status, _) = clear_db(State(state), bearer("anything"), Query(ClearParams::default()))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.store.rows().len(), 2);
}
