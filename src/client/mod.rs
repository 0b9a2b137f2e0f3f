//! Terminal client: HTTP access, view state and table rendering.

pub mod api;
pub mod browser;
pub mod render;
pub mod views;

pub use api::{ApiClient, ClientError, ClientResult, EventStream};
pub use browser::{Browser, Step};
pub use views::{DataTableView, FileListView};
