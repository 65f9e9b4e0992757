//! Field refresh and decryption through a full session: batching, stale
//! results, field independence, contract scoping and lock behavior.

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use futures::StreamExt;
use futures_signals::signal::SignalExt;
use std::sync::Arc;
use veil_core::ciphertext::{CiphertextRegistry, FieldId};
use veil_core::decryption::{DecryptRequest, DecryptionOrchestrator, FieldOutcome};
use veil_core::effects::{ServiceError, ServiceValue};
use veil_core::fields::{FieldPhase, FieldTable};
use veil_core::{DecryptedValue, VeilError};
use veil_testkit::fixtures::{handle, outsider, token, vault, UNIT};
use veil_testkit::TestEnv;

const HALF: u128 = UNIT / 2;

#[tokio::test]
async fn shares_scenario_hides_value_after_handle_change() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    let placeholder = env.session.formatter().placeholder().to_string();

    env.write_field(shares.id(), handle(0xab), HALF);
    let refresh = env.session.refresh(&shares.id()).await.unwrap();
    assert!(refresh.changed);
    assert!(refresh.has_value);
    assert_eq!(shares.value(), placeholder);
    assert_eq!(shares.phase(), FieldPhase::PendingDecrypt);

    env.session.unlock().await.unwrap();
    assert_eq!(shares.value(), "0.5000");
    assert_eq!(shares.phase(), FieldPhase::Idle);

    env.write_field(shares.id(), handle(0xcd), 3 * HALF);
    env.service.gate().hold_next();
    let shares_id = shares.id();
    let (refresh, ()) = tokio::join!(env.session.refresh(&shares_id), async {
        env.service.gate().entered().await;
        assert_eq!(shares.value(), placeholder);
        assert!(shares.is_decrypting());
        env.service.gate().release();
    });

    assert!(refresh.unwrap().changed);
    assert_eq!(shares.value(), "1.5000");
    assert_eq!(shares.handle(), Some(handle(0xcd)));
}

#[tokio::test]
async fn pending_fields_decrypt_in_one_batch() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    let balance = env.track_balance();
    let assets = env.track_total_assets();
    env.write_field(shares.id(), handle(0x01), UNIT);
    env.write_field(balance.id(), handle(0x02), 2 * UNIT);
    env.write_field(assets.id(), handle(0x03), 40 * UNIT);

    let results = env.session.refresh_all().await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, result)| result.is_ok()));

    env.session.unlock().await.unwrap();
    assert_eq!(env.service.calls(), 1);
    assert_eq!(env.service.requests()[0].handles.len(), 3);
    assert_eq!(shares.value(), "1.0000");
    assert_eq!(balance.value(), "2.0000");
    assert_eq!(assets.value(), "40.0000");
}

#[tokio::test]
async fn stale_result_is_discarded_and_retried() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    env.write_field(shares.id(), handle(0x11), UNIT);
    env.service.set_amount(handle(0x22), 2 * UNIT);
    env.session.refresh(&shares.id()).await.unwrap();

    env.service.gate().hold_next();
    let (unlocked, ()) = tokio::join!(env.session.unlock(), async {
        env.service.gate().entered().await;
        env.source.set_handle(shares.id(), handle(0x22));
        let refresh = env.session.refresh(&shares.id()).await.unwrap();
        assert!(refresh.changed);
        assert_eq!(shares.decrypted(), None);
        env.service.gate().release();
    });
    unlocked.unwrap();

    let requests = env.service.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].handles, vec![handle(0x11)]);
    assert_eq!(requests[1].handles, vec![handle(0x22)]);
    assert_eq!(shares.value(), "2.0000");
}

#[tokio::test]
async fn single_pass_reports_stale_without_applying() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    env.write_field(shares.id(), handle(0x11), UNIT);
    env.service.set_amount(handle(0x22), 2 * UNIT);
    env.session.refresh(&shares.id()).await.unwrap();
    env.session.unlock().await.unwrap();

    env.service.gate().hold_next();
    let ids = [shares.id()];
    let (report, ()) = tokio::join!(env.session.decrypt_fields(&ids), async {
        env.service.gate().entered().await;
        env.source.set_handle(shares.id(), handle(0x22));
        env.session.refresh(&shares.id()).await.unwrap();
        env.service.gate().release();
    });

    let report = report.unwrap();
    assert_eq!(report.outcome(&shares.id()), Some(&FieldOutcome::Stale));
    assert_eq!(shares.decrypted(), None);
    assert_eq!(shares.phase(), FieldPhase::PendingDecrypt);

    let report = env.session.decrypt_pending().await.unwrap();
    assert_eq!(report.applied(), 1);
    assert_eq!(shares.value(), "2.0000");
}

#[tokio::test]
async fn overlapping_requests_for_a_field_are_coalesced() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    env.write_field(shares.id(), handle(0x11), UNIT);
    env.session.refresh(&shares.id()).await.unwrap();
    env.session.unlock().await.unwrap();
    let calls_before = env.service.calls();

    env.service.gate().hold_next();
    let ids = [shares.id()];
    let (first, ()) = tokio::join!(env.session.decrypt_fields(&ids), async {
        env.service.gate().entered().await;
        let second = env.session.decrypt_fields(&[shares.id()]).await.unwrap();
        assert_eq!(second.coalesced(), 1);
        assert_eq!(second.service_calls, 0);
        env.service.gate().release();
    });

    assert_eq!(first.unwrap().applied(), 1);
    assert_eq!(env.service.calls(), calls_before + 1);
    assert!(!shares.is_decrypting());
}

#[tokio::test]
async fn failing_field_leaves_siblings_untouched() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    let balance = env.track_balance();
    env.write_field(shares.id(), handle(0x01), UNIT);
    env.write_field(balance.id(), handle(0x02), 2 * UNIT);
    env.session.refresh_all().await.unwrap();
    env.session.unlock().await.unwrap();

    env.source.set_handle(shares.id(), handle(0x03));
    env.service.fail_handle(handle(0x03));
    env.session.refresh(&shares.id()).await.unwrap();

    assert_eq!(shares.value(), env.session.formatter().placeholder());
    assert_matches!(shares.last_error(), Some(VeilError::DecryptionFailed { .. }));
    assert!(shares.needs_retry());
    assert_eq!(balance.value(), "2.0000");
    assert_eq!(balance.last_error(), None);
}

#[tokio::test]
async fn service_outage_fails_only_the_batch() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    let balance = env.track_balance();
    env.write_field(shares.id(), handle(0x01), UNIT);
    env.write_field(balance.id(), handle(0x02), 2 * UNIT);
    env.session.refresh_all().await.unwrap();
    env.session.unlock().await.unwrap();

    env.service
        .set_outage(Some(ServiceError::Unavailable("relayer 502".into())));
    env.write_field(balance.id(), handle(0x04), 3 * UNIT);
    env.session.refresh(&balance.id()).await.unwrap();

    assert_eq!(shares.value(), "1.0000");
    assert!(balance.needs_retry());
    assert_eq!(balance.decrypted(), None);

    env.service.set_outage(None);
    let report = env.session.decrypt_pending().await.unwrap();
    assert_eq!(report.applied(), 1);
    assert_eq!(balance.value(), "3.0000");
    assert!(!balance.needs_retry());
}

#[tokio::test]
async fn uncovered_contract_fails_alone() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    let foreign = env.session.track(FieldId::total_assets(outsider()));
    env.write_field(shares.id(), handle(0x01), UNIT);
    env.write_field(foreign.id(), handle(0x09), 9 * UNIT);
    env.session.refresh_all().await.unwrap();

    env.session.unlock().await.unwrap();

    assert_eq!(shares.value(), "1.0000");
    assert_eq!(
        foreign.last_error(),
        Some(VeilError::UnauthorizedContract {
            contract: outsider()
        })
    );
    assert!(!foreign.needs_retry());
    assert_eq!(foreign.value(), env.session.formatter().placeholder());
    assert_eq!(env.service.calls(), 1);
    assert!(!env.service.requests()[0].handles.contains(&handle(0x09)));
}

#[tokio::test]
async fn orchestrator_enforces_signed_contract_set() {
    let env = TestEnv::new();
    let authorization = env.session.unlock().await.unwrap();

    let fields = FieldTable::new();
    let registry = CiphertextRegistry::new(Arc::new(env.source.clone()), fields.clone());
    let orchestrator = DecryptionOrchestrator::new(
        Arc::new(env.service.clone()),
        Arc::new(env.clock.clone()),
        fields.clone(),
    );

    let on_token = FieldId::total_assets(token());
    let on_vault = FieldId::total_shares(vault());
    let on_outsider = FieldId::total_shares(outsider());
    env.write_field(on_token, handle(0x0a), UNIT);
    env.write_field(on_vault, handle(0x0b), 2 * UNIT);
    env.write_field(on_outsider, handle(0x0c), 3 * UNIT);
    for field in [on_token, on_vault, on_outsider] {
        registry.fetch_handle(&field).await.unwrap();
    }

    let request = |field: FieldId, byte: u8| DecryptRequest {
        field,
        handle: handle(byte),
    };

    let calls_before = env.service.calls();
    let err = orchestrator
        .decrypt(&authorization, &[request(on_token, 0x0a), request(on_outsider, 0x0c)])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        VeilError::UnauthorizedContract {
            contract: outsider()
        }
    );
    assert_eq!(env.service.calls(), calls_before);

    for order in [
        [request(on_token, 0x0a), request(on_vault, 0x0b)],
        [request(on_vault, 0x0b), request(on_token, 0x0a)],
    ] {
        let report = orchestrator.decrypt(&authorization, &order).await.unwrap();
        assert_eq!(report.applied(), 2);
        assert_eq!(
            report.outcome(&on_token),
            Some(&FieldOutcome::Applied(DecryptedValue::Integer(UNIT)))
        );
    }
}

#[tokio::test]
async fn expired_authorization_is_refused_and_releases_fields() {
    let env = TestEnv::new();
    let authorization = env.session.unlock().await.unwrap();

    let fields = FieldTable::new();
    let registry = CiphertextRegistry::new(Arc::new(env.source.clone()), fields.clone());
    let orchestrator = DecryptionOrchestrator::new(
        Arc::new(env.service.clone()),
        Arc::new(env.clock.clone()),
        fields.clone(),
    );
    let field = FieldId::total_assets(vault());
    env.write_field(field, handle(0x0a), UNIT);
    registry.fetch_handle(&field).await.unwrap();

    env.clock.set(authorization.expires_at());
    let err = orchestrator
        .decrypt(
            &authorization,
            &[DecryptRequest {
                field,
                handle: handle(0x0a),
            }],
        )
        .await
        .unwrap_err();

    assert_matches!(err, VeilError::DecryptionFailed { .. });
    let snapshot = fields.get(&field).unwrap().snapshot();
    assert!(!snapshot.is_decrypting());
    assert_eq!(snapshot.value, None);
    assert_eq!(env.service.calls(), 0);
}

#[tokio::test]
async fn lock_clears_every_field() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    let balance = env.track_balance();
    env.write_field(shares.id(), handle(0x01), UNIT);
    env.write_field(balance.id(), handle(0x02), 2 * UNIT);
    env.session.refresh_all().await.unwrap();
    env.session.unlock().await.unwrap();
    assert_eq!(balance.value(), "2.0000");

    env.session.lock().await.unwrap();
    let placeholder = env.session.formatter().placeholder();
    for view in env.session.fields() {
        assert_eq!(view.value(), placeholder);
        assert!(view.handle().is_some());
    }

    env.session.unlock().await.unwrap();
    assert_eq!(env.wallet.prompts(), 1);
    assert_eq!(shares.value(), "1.0000");
    assert_eq!(balance.value(), "2.0000");
}

#[tokio::test]
async fn lock_during_decrypt_discards_result() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    env.write_field(shares.id(), handle(0x01), UNIT);
    env.session.refresh(&shares.id()).await.unwrap();

    env.service.gate().hold_next();
    let (unlocked, ()) = tokio::join!(env.session.unlock(), async {
        env.service.gate().entered().await;
        env.session.lock().await.unwrap();
        env.service.gate().release();
    });

    unlocked.unwrap();
    assert!(!env.session.is_unlocked().await);
    assert_eq!(shares.value(), env.session.formatter().placeholder());
    assert_eq!(env.service.calls(), 1);
}

#[tokio::test]
async fn fetch_failure_keeps_previous_value() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    env.write_field(shares.id(), handle(0x01), UNIT);
    env.session.refresh(&shares.id()).await.unwrap();
    env.session.unlock().await.unwrap();

    env.source.set_unavailable(true);
    let err = env.session.refresh(&shares.id()).await.unwrap_err();
    assert_matches!(err, VeilError::FetchFailed { contract, .. } if contract == vault());
    assert_eq!(shares.value(), "1.0000");
    assert!(shares.needs_retry());

    env.source.set_unavailable(false);
    let refresh = env.session.refresh(&shares.id()).await.unwrap();
    assert!(!refresh.changed);
    assert!(!shares.needs_retry());
    assert_eq!(shares.value(), "1.0000");
}

#[tokio::test]
async fn empty_handle_shows_zero_once_unlocked() {
    let env = TestEnv::new();
    let assets = env.track_total_assets();
    let refresh = env.session.refresh(&assets.id()).await.unwrap();
    assert!(!refresh.has_value);
    assert!(!assets.has_value());
    assert_eq!(assets.value(), env.session.formatter().placeholder());

    env.session.unlock().await.unwrap();
    assert_eq!(assets.value(), "0.0000");
    assert_eq!(env.service.calls(), 0);
}

#[tokio::test]
async fn expired_session_stops_auto_decrypt() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    env.write_field(shares.id(), handle(0x01), UNIT);
    env.session.refresh(&shares.id()).await.unwrap();
    let authorization = env.session.unlock().await.unwrap();

    env.clock.set(authorization.expires_at());
    env.write_field(shares.id(), handle(0x02), 2 * UNIT);
    env.session.refresh(&shares.id()).await.unwrap();

    assert_eq!(shares.value(), env.session.formatter().placeholder());
    assert!(!env.session.is_unlocked().await);
    let err = env.session.decrypt_fields(&[shares.id()]).await.unwrap_err();
    assert_matches!(err, VeilError::DecryptionFailed { .. });
}

#[tokio::test]
async fn boolean_and_text_plaintexts_are_normalized() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    let balance = env.track_balance();
    env.source.set_handle(shares.id(), handle(0x01));
    env.source.set_handle(balance.id(), handle(0x02));
    env.service.set_plaintext(handle(0x01), ServiceValue::Bool(true));
    env.service
        .set_plaintext(handle(0x02), ServiceValue::Text("250000000000000000".into()));
    env.session.refresh_all().await.unwrap();

    env.session.unlock().await.unwrap();
    assert_eq!(shares.decrypted(), Some(DecryptedValue::Boolean(true)));
    assert_eq!(shares.value(), "true");
    assert_eq!(balance.value(), "0.2500");
}

#[tokio::test]
async fn field_signal_publishes_decrypted_value() {
    let env = TestEnv::new();
    let shares = env.track_shares();
    let mut snapshots = Box::pin(shares.signal().to_stream());
    let initial = snapshots.next().await.unwrap();
    assert_eq!(initial.phase, FieldPhase::Idle);
    assert_eq!(initial.value, None);

    env.write_field(shares.id(), handle(0x01), UNIT);
    env.session.refresh(&shares.id()).await.unwrap();
    env.session.unlock().await.unwrap();

    let latest = snapshots.next().await.unwrap();
    assert_eq!(latest.value, Some(DecryptedValue::Integer(UNIT)));
    assert_eq!(latest.phase, FieldPhase::Idle);
}
