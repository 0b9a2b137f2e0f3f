//! Client-side view state: the file list and the selected file's table.
//!
//! Both views are plain state machines driven by completed network requests;
//! rendering lives in [`super::render`].

use tracing::{debug, warn};

use crate::files::StoredIdentity;
use crate::tabular::{apply_sort, on_column_activated, Dataset, SortSpec};

use super::api::{ApiClient, ClientResult};

/// One displayed row of the file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListEntry {
    /// 1-based position in the listing
    pub index: usize,
    pub identity: String,
    pub display_name: String,
    pub uploaded_at: String,
}

#[derive(Debug, Default)]
pub struct FileListView {
    identities: Vec<String>,
}

impl FileListView {
    pub fn new() -> Self { Self::default() }

    pub fn identities(&self) -> &[String] { &self.identities }

    pub fn apply_listing(&mut self, identities: Vec<String>) {
        self.identities = identities;
    }

    /// Re-fetch the listing. On failure the current entries are kept.
    pub async fn refresh(&mut self, api: &ApiClient) -> bool {
        match api.list_files().await {
            Ok(ids) => {
                debug!(target: "csvdeck::client", count = ids.len(), "file list refreshed");
                self.apply_listing(ids);
                true
            }
            Err(e) => {
                warn!(target: "csvdeck::client", "Error fetching file list: {}", e);
                false
            }
        }
    }

    pub fn entries(&self) -> Vec<FileListEntry> {
        self.identities
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let (display_name, uploaded_at) = match StoredIdentity::parse(raw) {
                    Ok(id) => (id.display_name().to_string(), id.uploaded_at_local()),
                    Err(_) => (raw.clone(), "Invalid Date".to_string()),
                };
                FileListEntry { index: i + 1, identity: raw.clone(), display_name, uploaded_at }
            })
            .collect()
    }

    /// Resolve a user token: a 1-based list position, or an identity as is.
    pub fn resolve(&self, token: &str) -> String {
        if let Ok(n) = token.parse::<usize>() {
            if n >= 1 && n <= self.identities.len() {
                return self.identities[n - 1].clone();
            }
        }
        token.to_string()
    }
}

/// What the data table currently shows.
#[derive(Debug, Clone, Copy)]
pub enum TableDisplay<'a> {
    Nothing,
    Loading(&'a str),
    Table { identity: &'a str, dataset: &'a Dataset, sort: &'a SortSpec },
}

#[derive(Debug, Default)]
pub struct DataTableView {
    active: Option<(String, Dataset)>,
    sort: SortSpec,
    pending: Option<String>,
}

impl DataTableView {
    pub fn new() -> Self { Self::default() }

    pub fn active_identity(&self) -> Option<&str> {
        self.active.as_ref().map(|(id, _)| id.as_str())
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.active.as_ref().map(|(_, ds)| ds)
    }

    pub fn sort_spec(&self) -> &SortSpec { &self.sort }

    pub fn is_loading(&self) -> bool { self.pending.is_some() }

    /// Start loading `identity`. Returns false when it is already shown or
    /// already loading.
    pub fn begin_select(&mut self, identity: &str) -> bool {
        if self.pending.as_deref() == Some(identity) {
            return false;
        }
        if self.pending.is_none() && self.active_identity() == Some(identity) {
            return false;
        }
        self.pending = Some(identity.to_string());
        true
    }

    /// Finish a load started with [`begin_select`](Self::begin_select).
    ///
    /// A result for anything other than the pending identity is ignored. On
    /// success the dataset replaces the shown one and sorting resets; on
    /// failure the previous selection stays as it was.
    pub fn complete_load(&mut self, identity: &str, result: ClientResult<Dataset>) -> ClientResult<bool> {
        if self.pending.as_deref() != Some(identity) {
            debug!(target: "csvdeck::client", identity, "ignoring stale load result");
            return Ok(false);
        }
        self.pending = None;
        match result {
            Ok(dataset) => {
                self.active = Some((identity.to_string(), dataset));
                self.sort = SortSpec::default();
                Ok(true)
            }
            Err(e) => {
                warn!(target: "csvdeck::client", identity, "Error fetching file data: {}", e);
                Err(e)
            }
        }
    }

    /// Select and load `identity`. `Ok(false)` means it was already shown.
    pub async fn select(&mut self, api: &ApiClient, identity: &str) -> ClientResult<bool> {
        if !self.begin_select(identity) {
            return Ok(false);
        }
        let result = api.fetch_dataset(identity).await;
        self.complete_load(identity, result)
    }

    /// Header activation on `column`: updates the sort spec and reorders rows.
    pub fn activate_column(&mut self, column: &str) -> Option<&SortSpec> {
        let (_, dataset) = self.active.as_mut()?;
        let next = on_column_activated(&self.sort, column, dataset);
        apply_sort(dataset, &next);
        self.sort = next;
        Some(&self.sort)
    }

    /// Drop the shown table if `identity` is the one being shown.
    pub fn forget(&mut self, identity: &str) {
        if self.active_identity() == Some(identity) {
            self.active = None;
            self.sort = SortSpec::default();
        }
    }

    pub fn display(&self) -> TableDisplay<'_> {
        if let Some(p) = &self.pending {
            return TableDisplay::Loading(p);
        }
        match &self.active {
            Some((identity, dataset)) => TableDisplay::Table { identity, dataset, sort: &self.sort },
            None => TableDisplay::Nothing,
        }
    }
}
