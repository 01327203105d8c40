use chrono::Utc;
use sgsync_config::{merge_keys, SyncStateStore};
use sgsync_models::{CursorKind, ListEntity, ListItem, ListUpload, RemoteList};
use sgsync_sources::CloudService;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};
use crate::error::{ServiceKind, SyncError};
use crate::store::{LocalStore, StoreOp};

const SERVICE: ServiceKind = ServiceKind::Cloud;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListReport {
    pub lists_added: usize,
    pub lists_updated: usize,
    pub items_added: usize,
    pub lists_uploaded: usize,
    pub skipped_malformed: usize,
}

/// Pulls lists and list items from the cloud.
///
/// Only additions are pulled: lists or items missing remotely are never
/// removed locally. Local removals reach the cloud through the job queue.
pub struct ListReconciler<'a> {
    store: &'a dyn LocalStore,
}

impl<'a> ListReconciler<'a> {
    pub fn new(store: &'a dyn LocalStore) -> Self {
        Self { store }
    }

    /// Compute the additions for `remote_lists` against `local_lists`.
    pub fn reconcile(&self, local_lists: &[ListEntity], remote_lists: &[RemoteList]) -> Result<(Vec<StoreOp>, ListReport), SyncError> {
        let local_by_id: HashMap<&str, &ListEntity> = local_lists.iter().map(|l| (l.id.as_str(), l)).collect();
        let mut report = ListReport::default();
        let mut ops = Vec::new();

        for remote in remote_lists {
            let Some(list_id) = remote.id.as_deref().filter(|id| !id.is_empty()) else {
                warn!(name = remote.name.as_deref().unwrap_or("unknown"), "skipping remote list without id");
                report.skipped_malformed += 1;
                continue;
            };

            let existing_items: HashSet<String> = match local_by_id.get(list_id) {
                Some(local) => {
                    let name = remote.name.clone().unwrap_or_else(|| local.name.clone());
                    let order = remote.order.unwrap_or(local.order);
                    if name != local.name || order != local.order {
                        ops.push(StoreOp::UpsertList(ListEntity {
                            id: list_id.to_string(),
                            name,
                            order,
                        }));
                        report.lists_updated += 1;
                    }
                    self.store
                        .list_items(list_id)?
                        .into_iter()
                        .map(|item| item.id)
                        .collect()
                }
                None => {
                    let Some(name) = remote.name.clone() else {
                        warn!(list_id, "skipping remote list without name");
                        report.skipped_malformed += 1;
                        continue;
                    };
                    ops.push(StoreOp::UpsertList(ListEntity {
                        id: list_id.to_string(),
                        name,
                        order: remote.order.unwrap_or(0),
                    }));
                    report.lists_added += 1;
                    HashSet::new()
                }
            };

            let mut seen = existing_items;
            for item in &remote.items {
                let (Some(ref_id), Some(item_type)) = (item.ref_id, item.item_type) else {
                    debug!(list_id, "skipping remote list item without reference");
                    report.skipped_malformed += 1;
                    continue;
                };
                let item = ListItem::new(ref_id, item_type, list_id);
                if seen.insert(item.id.clone()) {
                    ops.push(StoreOp::InsertListItem(item));
                    report.items_added += 1;
                }
            }
        }

        Ok((ops, report))
    }

    /// Download changed lists and add what is missing locally. On the first
    /// run every local list is uploaded afterwards.
    #[instrument(skip(self, cloud, state))]
    pub async fn sync<C: CloudService + ?Sized>(
        &self,
        cloud: &C,
        state: &mut SyncStateStore,
        force: bool,
    ) -> Result<ListReport, SyncError> {
        let merged = state.is_merged(merge_keys::CLOUD_LISTS);
        let updated_since = if merged && !force {
            state.cursor(SERVICE.as_str(), CursorKind::ListsChanged)
        } else {
            None
        };

        let started_at = Utc::now();
        let remote_lists = cloud
            .download_lists(updated_since)
            .await
            .map_err(|e| SyncError::from_remote(SERVICE, e))?;
        let local_lists = self.store.lists()?;
        let (ops, mut report) = self.reconcile(&local_lists, &remote_lists)?;
        if !ops.is_empty() {
            self.store.apply_batch(ops)?;
        }

        if !merged {
            let uploads = self.local_uploads()?;
            if !uploads.is_empty() {
                info!(lists = uploads.len(), "uploading local lists to cloud");
                cloud
                    .upload_lists(&uploads)
                    .await
                    .map_err(|e| SyncError::from_remote(SERVICE, e))?;
            }
            report.lists_uploaded = uploads.len();
            state.set_merged(merge_keys::CLOUD_LISTS);
        }
        state.set_cursor(SERVICE.as_str(), CursorKind::ListsChanged, started_at);

        info!(
            operation = "list_sync",
            status = "success",
            lists_added = report.lists_added,
            lists_updated = report.lists_updated,
            items_added = report.items_added,
            lists_uploaded = report.lists_uploaded,
            "lists synced"
        );
        Ok(report)
    }

    fn local_uploads(&self) -> Result<Vec<ListUpload>, SyncError> {
        let mut uploads = Vec::new();
        for list in self.store.lists()? {
            let items = self.store.list_items(&list.id)?;
            uploads.push(ListUpload { list, items });
        }
        Ok(uploads)
    }
}
