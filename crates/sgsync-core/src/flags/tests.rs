use super::*;
use crate::gate::Connectivity;
use crate::memory::MemoryStore;
use crate::testing::{
    episode_id, numbers, remote_show, seed_show, set_collected, set_watched, watched_state, FailingStore, FakeCloud,
    FakeTrakt,
};
use chrono::TimeZone;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn flags_of(store: &dyn LocalStore, show_id: ShowId) -> Vec<(u32, u32, WatchedState, bool)> {
    store
        .episodes_of_show(show_id)
        .unwrap()
        .into_iter()
        .map(|e| (e.season, e.number, e.watched, e.collected))
        .collect()
}

fn remote(records: Vec<RemoteShowFlags>) -> RemoteFlagState {
    RemoteFlagState::from_records(records)
}

#[test]
fn test_mirror_reconcile_is_idempotent() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 4), (2, 3)]);
    set_watched(&store, 10, &[(1, 1), (2, 3)], WatchedState::Watched);
    set_watched(&store, 10, &[(1, 4)], WatchedState::Skipped);
    let state = remote(vec![remote_show(10, Some(1), &[(1, &[1, 2]), (2, &[1, 2, 3])])]);
    let reconciler = FlagReconciler::new(&store);

    let first = reconciler
        .reconcile(FlagKind::Watched, &[10], &state, ReconcileMode::Mirror, true)
        .unwrap();
    assert!(first.complete);
    assert_eq!(first.changed_shows, vec![10]);
    let after_first = flags_of(&store, 10);

    let second = reconciler
        .reconcile(FlagKind::Watched, &[10], &state, ReconcileMode::Mirror, true)
        .unwrap();
    assert!(second.complete);
    assert!(second.changed_shows.is_empty());
    assert_eq!(flags_of(&store, 10), after_first);
}

#[test]
fn test_mirror_keeps_skipped_unless_remote_reports_watched() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 3)]);
    set_watched(&store, 10, &[(1, 1), (1, 2)], WatchedState::Skipped);
    set_watched(&store, 10, &[(1, 3)], WatchedState::Watched);
    let reconciler = FlagReconciler::new(&store);

    // Remote knows the show but none of these episodes
    let state = remote(vec![remote_show(10, None, &[(1, &[])])]);
    reconciler
        .reconcile(FlagKind::Watched, &[10], &state, ReconcileMode::Mirror, false)
        .unwrap();
    assert_eq!(watched_state(&store, 10, 1, 1), WatchedState::Skipped);
    assert_eq!(watched_state(&store, 10, 1, 2), WatchedState::Skipped);
    assert_eq!(watched_state(&store, 10, 1, 3), WatchedState::Unwatched);

    let state = remote(vec![remote_show(10, None, &[(1, &[2])])]);
    reconciler
        .reconcile(FlagKind::Watched, &[10], &state, ReconcileMode::Mirror, false)
        .unwrap();
    assert_eq!(watched_state(&store, 10, 1, 1), WatchedState::Skipped);
    assert_eq!(watched_state(&store, 10, 1, 2), WatchedState::Watched);
}

#[test]
fn test_mirror_clears_show_missing_on_remote_but_keeps_skipped() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 2)]);
    set_watched(&store, 10, &[(1, 1)], WatchedState::Watched);
    set_watched(&store, 10, &[(1, 2)], WatchedState::Skipped);

    let report = FlagReconciler::new(&store)
        .reconcile(FlagKind::Watched, &[10], &RemoteFlagState::default(), ReconcileMode::Mirror, false)
        .unwrap();

    assert!(report.uploads.is_empty());
    assert_eq!(watched_state(&store, 10, 1, 1), WatchedState::Unwatched);
    assert_eq!(watched_state(&store, 10, 1, 2), WatchedState::Skipped);
}

#[test]
fn test_season_collapse_matches_per_episode_updates() {
    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        seed_show(&store, 10, &[(1, 5), (2, 4), (3, 3)]);
        // Season 2 fully watched, season 3 mixed with a skip
        set_watched(&store, 10, &[(2, 1), (2, 2), (2, 3), (2, 4), (3, 1)], WatchedState::Watched);
        set_watched(&store, 10, &[(3, 2)], WatchedState::Skipped);
        set_collected(&store, 10, &[(2, 1), (2, 2), (2, 3), (2, 4)]);
        store
    }
    let watched = remote(vec![remote_show(10, None, &[(1, &[1, 2, 3, 4, 5]), (3, &[3])])]);
    let collected = remote(vec![remote_show(10, None, &[(1, &[1, 2, 3, 4, 5])])]);

    let collapsed = seeded();
    let per_episode = seeded();
    for (store, collapse) in [(&collapsed, true), (&per_episode, false)] {
        let reconciler = FlagReconciler::new(store).with_season_collapse(collapse);
        reconciler
            .reconcile(FlagKind::Watched, &[10], &watched, ReconcileMode::Mirror, false)
            .unwrap();
        reconciler
            .reconcile(FlagKind::Collected, &[10], &collected, ReconcileMode::Mirror, false)
            .unwrap();
    }

    assert_eq!(flags_of(&collapsed, 10), flags_of(&per_episode, 10));
    let flags = flags_of(&collapsed, 10);
    assert!(flags.iter().filter(|f| f.0 == 1).all(|f| f.2 == WatchedState::Watched && f.3));
    assert!(flags.iter().filter(|f| f.0 == 2).all(|f| f.2 == WatchedState::Unwatched && !f.3));
    assert_eq!(watched_state(&collapsed, 10, 3, 1), WatchedState::Unwatched);
    assert_eq!(watched_state(&collapsed, 10, 3, 2), WatchedState::Skipped);
    assert_eq!(watched_state(&collapsed, 10, 3, 3), WatchedState::Watched);
}

#[test]
fn test_merge_never_clears_and_queues_local_only_flags() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 2)]);
    seed_show(&store, 20, &[(1, 2)]);
    set_watched(&store, 10, &[(1, 1)], WatchedState::Watched);
    set_watched(&store, 20, &[(1, 1)], WatchedState::Watched);
    // Remote has no record of show 10, and only S01E02 of show 20
    let state = remote(vec![remote_show(20, None, &[(1, &[2])])]);

    let report = FlagReconciler::new(&store)
        .reconcile(FlagKind::Watched, &[10, 20], &state, ReconcileMode::MergeUploadMissing, false)
        .unwrap();

    assert_eq!(watched_state(&store, 10, 1, 1), WatchedState::Watched);
    assert_eq!(watched_state(&store, 20, 1, 1), WatchedState::Watched);
    assert_eq!(watched_state(&store, 20, 1, 2), WatchedState::Watched);
    assert_eq!(report.uploads.len(), 2);
    assert_eq!(report.uploads[0].show_id, 10);
    assert_eq!(report.uploads[0].episodes, vec![EpisodeNumber::new(1, 1)]);
    assert_eq!(report.uploads[1].episodes, vec![EpisodeNumber::new(1, 1)]);
    assert_eq!(report.uploads[0].value, EpisodeFlagValue::Watched(WatchedState::Watched));
}

#[test]
fn test_merge_skips_upload_of_show_without_remote_identity() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 1)]);
    set_collected(&store, 10, &[(1, 1)]);

    let report = FlagReconciler::new(&store)
        .reconcile(
            FlagKind::Collected,
            &[10],
            &RemoteFlagState::default(),
            ReconcileMode::MergeUploadMissing,
            true,
        )
        .unwrap();

    assert!(report.uploads.is_empty());
    assert!(store.episode(episode_id(10, 1, 1)).unwrap().unwrap().collected);
}

#[test]
fn test_batch_failure_is_isolated_to_its_show() {
    let store = FailingStore {
        inner: MemoryStore::new(),
        fail_show: 10,
    };
    seed_show(&store.inner, 10, &[(1, 2)]);
    seed_show(&store.inner, 20, &[(1, 2)]);
    let state = remote(vec![
        remote_show(10, None, &[(1, &[1])]),
        remote_show(20, None, &[(1, &[1])]),
    ]);

    let report = FlagReconciler::new(&store)
        .reconcile(FlagKind::Watched, &[10, 20], &state, ReconcileMode::Mirror, false)
        .unwrap();

    assert!(!report.complete);
    assert_eq!(report.failed_shows, vec![10]);
    assert_eq!(report.changed_shows, vec![20]);
    assert_eq!(watched_state(&store, 20, 1, 1), WatchedState::Watched);
    assert_eq!(watched_state(&store, 10, 1, 1), WatchedState::Unwatched);
}

#[test]
fn test_last_watched_never_regresses() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 1)]);
    let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let older = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    let reconciler = FlagReconciler::new(&store);

    let mut record = remote_show(10, None, &[(1, &[1])]);
    record.last_watched_at = Some(newer);
    reconciler
        .reconcile(FlagKind::Watched, &[10], &remote(vec![record.clone()]), ReconcileMode::Mirror, false)
        .unwrap();
    assert_eq!(store.last_watched_ms(10).unwrap(), Some(newer.timestamp_millis()));

    record.last_watched_at = Some(older);
    reconciler
        .reconcile(FlagKind::Watched, &[10], &remote(vec![record]), ReconcileMode::MergeUploadMissing, false)
        .unwrap();
    assert_eq!(store.last_watched_ms(10).unwrap(), Some(newer.timestamp_millis()));
}

#[test]
fn test_malformed_records_are_skipped() {
    let mut malformed = remote_show(10, Some(7), &[(1, &[1])]);
    malformed.show_id = None;
    let state = remote(vec![malformed, remote_show(20, Some(8), &[(1, &[1])])]);

    assert_eq!(state.malformed(), 1);
    assert_eq!(state.len(), 1);
    assert!(state.get(20).is_some());
}

#[test]
fn test_remote_trakt_id_is_stored() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 1)]);
    let state = remote(vec![remote_show(10, Some(1390), &[(1, &[])])]);

    FlagReconciler::new(&store)
        .reconcile(FlagKind::Collected, &[10], &state, ReconcileMode::Mirror, true)
        .unwrap();

    assert_eq!(store.show_trakt_id(10).unwrap(), Some(1390));
}

struct OnlineFor(AtomicU32);

impl Connectivity for OnlineFor {
    fn is_connected(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[test]
fn test_connectivity_loss_stops_between_shows() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 1)]);
    seed_show(&store, 20, &[(1, 1)]);
    let state = remote(vec![
        remote_show(10, None, &[(1, &[1])]),
        remote_show(20, None, &[(1, &[1])]),
    ]);
    let interrupt = Interrupt::new(CancellationToken::new(), Arc::new(OnlineFor(AtomicU32::new(1))));

    let result = FlagReconciler::new(&store)
        .with_interrupt(interrupt)
        .reconcile(FlagKind::Watched, &[10, 20], &state, ReconcileMode::Mirror, false);

    assert_eq!(result, Err(SyncError::NetworkUnavailable));
    assert_eq!(watched_state(&store, 10, 1, 1), WatchedState::Watched);
    assert_eq!(watched_state(&store, 20, 1, 1), WatchedState::Unwatched);
}

#[tokio::test]
async fn test_first_sync_uploads_then_sets_merge_flag() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 2)]);
    store
        .apply_batch(vec![StoreOp::SetShowTraktId {
            show_id: 10,
            trakt_id: 1390,
        }])
        .unwrap();
    set_watched(&store, 10, &[(1, 1)], WatchedState::Watched);
    let trakt = FakeTrakt::new();
    let mut state = SyncStateStore::in_memory();

    let report = FlagReconciler::new(&store)
        .sync(FlagService::Trakt, &trakt, FlagKind::Watched, &mut state, None, false)
        .await
        .unwrap();

    assert!(report.complete);
    assert_eq!(watched_state(&store, 10, 1, 1), WatchedState::Watched);
    let sent = trakt.sent_episodes.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].trakt_id, Some(1390));
    assert_eq!(numbers(&sent), vec![EpisodeNumber::new(1, 1)]);
    assert!(state.is_merged(merge_keys::TRAKT_EPISODES_WATCHED));
    assert!(!state.is_merged(merge_keys::TRAKT_EPISODES_COLLECTED));
    assert!(state.cursor("trakt", CursorKind::EpisodesWatched).is_some());
}

#[tokio::test]
async fn test_merge_state_is_keyed_by_service_not_client_name() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 2)]);
    set_watched(&store, 10, &[(1, 1)], WatchedState::Watched);
    let cloud = FakeCloud::named("hexagon");
    let mut state = SyncStateStore::in_memory();

    let report = FlagReconciler::new(&store)
        .sync(FlagService::Cloud, &cloud, FlagKind::Watched, &mut state, None, false)
        .await
        .unwrap();

    assert!(report.complete);
    assert_eq!(cloud.sent_episodes.lock().unwrap().len(), 1);
    assert!(state.is_merged(merge_keys::CLOUD_EPISODES_WATCHED));
    assert!(!state.is_merged(merge_keys::TRAKT_EPISODES_WATCHED));
    assert!(state.cursor("cloud", CursorKind::EpisodesWatched).is_some());
    assert!(state.cursor("hexagon", CursorKind::EpisodesWatched).is_none());
}

#[tokio::test]
async fn test_failed_upload_keeps_merge_mode() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 1)]);
    set_watched(&store, 10, &[(1, 1)], WatchedState::Watched);
    let trakt = FakeTrakt::new();
    trakt.watched.lock().unwrap().push(remote_show(10, Some(5), &[(1, &[])]));
    *trakt.fail_sends.lock().unwrap() = Some(sgsync_sources::RemoteError::api(500, "boom"));
    let mut state = SyncStateStore::in_memory();

    let result = FlagReconciler::new(&store)
        .sync(FlagService::Trakt, &trakt, FlagKind::Watched, &mut state, None, false)
        .await;

    assert!(matches!(result, Err(SyncError::RemoteApi { .. })));
    assert!(!state.is_merged(merge_keys::TRAKT_EPISODES_WATCHED));
    assert_eq!(watched_state(&store, 10, 1, 1), WatchedState::Watched);
}

#[tokio::test]
async fn test_unchanged_cursor_skips_and_forced_run_matches() {
    let store = MemoryStore::new();
    seed_show(&store, 10, &[(1, 3)]);
    let trakt = FakeTrakt::new();
    trakt.watched.lock().unwrap().push(remote_show(10, Some(5), &[(1, &[1, 2])]));
    let activity = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut state = SyncStateStore::in_memory();
    state.set_merged(merge_keys::TRAKT_EPISODES_WATCHED);
    let reconciler = FlagReconciler::new(&store);

    reconciler
        .sync(FlagService::Trakt, &trakt, FlagKind::Watched, &mut state, Some(activity), false)
        .await
        .unwrap();
    assert_eq!(*trakt.downloads.lock().unwrap(), 1);
    let after_sync = flags_of(&store, 10);

    let skipped = reconciler
        .sync(FlagService::Trakt, &trakt, FlagKind::Watched, &mut state, Some(activity), false)
        .await
        .unwrap();
    assert!(skipped.unchanged);
    assert_eq!(*trakt.downloads.lock().unwrap(), 1);

    let forced = reconciler
        .sync(FlagService::Trakt, &trakt, FlagKind::Watched, &mut state, Some(activity), true)
        .await
        .unwrap();
    assert!(!forced.unchanged);
    assert_eq!(*trakt.downloads.lock().unwrap(), 2);
    assert_eq!(flags_of(&store, 10), after_sync);
}
