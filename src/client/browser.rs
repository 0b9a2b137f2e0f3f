//! Interactive terminal browser over a csvdeck server.
//!
//! Commands are parsed one line at a time by [`Browser::execute`], which
//! returns the text to print. The file list is shared with a background task
//! that follows `/api/events` and refreshes the listing on every event.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::api::ApiClient;
use super::render::{render_file_list, render_table_display};
use super::views::{DataTableView, FileListView};

pub const HELP: &str = "Interactive commands:
  ls                   list uploaded files
  view <n|id>          show a file as a table (n = position in the list)
  sort <column>        sort the shown table by column; again to flip direction
  rm <n|id>            delete a file
  upload <path>        upload a CSV file
  status               show server and selection info
  help                 show this help
  quit | exit          leave the browser";

/// Result of one browser command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Output(String),
    Quit,
}

pub struct Browser {
    api: ApiClient,
    list: Arc<Mutex<FileListView>>,
    table: DataTableView,
    width: usize,
}

impl Browser {
    pub fn new(api: ApiClient, width: usize) -> Self {
        Self { api, list: Arc::new(Mutex::new(FileListView::new())), table: DataTableView::new(), width }
    }

    pub fn table(&self) -> &DataTableView { &self.table }

    pub fn list_snapshot(&self) -> Vec<String> { self.list.lock().identities().to_vec() }

    async fn refresh_list(&self) -> bool {
        refresh_shared(&self.api, &self.list).await
    }

    fn render_list(&self) -> String {
        render_file_list(&self.list.lock().entries(), self.width)
    }

    /// Follow the event stream, refreshing the shared list on every event.
    /// Notices go to `notify`. The task ends when the stream closes.
    pub fn spawn_event_watcher<F>(&self, notify: F) -> JoinHandle<()>
    where
        F: Fn(String) + Send + 'static,
    {
        let api = self.api.clone();
        let list = self.list.clone();
        tokio::spawn(async move {
            let mut stream = match api.subscribe_events().await {
                Ok(s) => s,
                Err(e) => {
                    warn!(target: "csvdeck::client", "event stream unavailable: {}", e);
                    return;
                }
            };
            info!(target: "csvdeck::client", "following file events");
            while let Some(next) = stream.next_event().await {
                match next {
                    Ok(ev) => {
                        debug!(target: "csvdeck::client", event = ev.kind.event_name(), identity = %ev.identity, "event");
                        refresh_shared(&api, &list).await;
                        notify(format!("[{}] {}", ev.kind.event_name(), ev.identity));
                    }
                    Err(e) => {
                        warn!(target: "csvdeck::client", "event stream error: {}", e);
                        break;
                    }
                }
            }
        })
    }

    /// Run one command line.
    pub async fn execute(&mut self, line: &str) -> anyhow::Result<Step> {
        let line = line.trim();
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };
        let out = match cmd.to_ascii_lowercase().as_str() {
            "" => String::new(),
            "quit" | "exit" => return Ok(Step::Quit),
            "help" | "?" => HELP.to_string(),
            "ls" | "list" => {
                self.refresh_list().await;
                self.render_list()
            }
            "status" => {
                let files = self.list.lock().identities().len();
                format!(
                    "server: {}\nfiles: {}\nshowing: {}\nsort: {:?}",
                    self.api.base_url(),
                    files,
                    self.table.active_identity().unwrap_or("-"),
                    self.table.sort_spec()
                )
            }
            "view" | "show" => {
                if arg.is_empty() { return Ok(Step::Output("usage: view <n|id>".into())); }
                let identity = self.list.lock().resolve(arg);
                match self.table.select(&self.api, &identity).await {
                    Ok(_) => render_table_display(self.table.display(), self.width),
                    Err(e) if e.is_not_found() => format!("not found: {}", identity),
                    Err(e) => format!("error: {}", e),
                }
            }
            "sort" => {
                if arg.is_empty() { return Ok(Step::Output("usage: sort <column>".into())); }
                let known = self.table.dataset().map(|ds| ds.column_index(arg).is_some());
                match known {
                    None => "no file selected".to_string(),
                    Some(false) => format!("no such column: {}", arg),
                    Some(true) => {
                        self.table.activate_column(arg);
                        render_table_display(self.table.display(), self.width)
                    }
                }
            }
            "rm" | "delete" => {
                if arg.is_empty() { return Ok(Step::Output("usage: rm <n|id>".into())); }
                let identity = self.list.lock().resolve(arg);
                match self.api.delete_file(&identity).await {
                    Ok(msg) => {
                        self.table.forget(&identity);
                        self.refresh_list().await;
                        msg
                    }
                    Err(e) if e.is_not_found() => format!("not found: {}", identity),
                    Err(e) => format!("error: {}", e),
                }
            }
            "upload" => {
                if arg.is_empty() { return Ok(Step::Output("usage: upload <path>".into())); }
                match self.api.upload_file(Path::new(arg)).await {
                    Ok(msg) => {
                        self.refresh_list().await;
                        msg
                    }
                    Err(e) => format!("error: {}", e),
                }
            }
            other => format!("unknown command: {} (try help)", other),
        };
        Ok(Step::Output(out))
    }
}

/// Fetch the listing outside the lock, then swap it in.
async fn refresh_shared(api: &ApiClient, list: &Mutex<FileListView>) -> bool {
    match api.list_files().await {
        Ok(ids) => {
            list.lock().apply_listing(ids);
            true
        }
        Err(e) => {
            warn!(target: "csvdeck::client", "Error fetching file list: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> Browser {
        Browser::new(ApiClient::new("http://127.0.0.1:9").unwrap(), 80)
    }

    #[tokio::test]
    async fn quit_and_help_need_no_server() {
        let mut b = offline();
        assert_eq!(b.execute("quit").await.unwrap(), Step::Quit);
        assert_eq!(b.execute("  EXIT ").await.unwrap(), Step::Quit);
        assert_eq!(b.execute("help").await.unwrap(), Step::Output(HELP.to_string()));
    }

    #[tokio::test]
    async fn missing_arguments_print_usage() {
        let mut b = offline();
        assert_eq!(b.execute("view").await.unwrap(), Step::Output("usage: view <n|id>".into()));
        assert_eq!(b.execute("sort").await.unwrap(), Step::Output("usage: sort <column>".into()));
    }

    #[tokio::test]
    async fn sort_without_selection() {
        let mut b = offline();
        assert_eq!(b.execute("sort x").await.unwrap(), Step::Output("no file selected".into()));
    }

    #[tokio::test]
    async fn unknown_command() {
        let mut b = offline();
        assert_eq!(
            b.execute("frobnicate").await.unwrap(),
            Step::Output("unknown command: frobnicate (try help)".into())
        );
    }
}
