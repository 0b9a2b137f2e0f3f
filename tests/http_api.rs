//! End-to-end tests: the real router on an ephemeral port, driven over HTTP.
//! Covers upload/list/view/delete, the SSE event stream and the terminal
//! browser on top of the client.

use std::time::Duration;

use anyhow::Result;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tempfile::{tempdir, TempDir};

use csvdeck::client::{ApiClient, Browser, ClientError, DataTableView, Step};
use csvdeck::events::{FileEventKind, FileLifecycleNotifier};
use csvdeck::files::FileStore;
use csvdeck::server::{serve, AppState};
use csvdeck::tabular::DecodeError;

const REPORT: &[u8] = b"name,score\nalice,10\nbob,9\ncarol,12\n";

struct TestServer {
    base: String,
    notifier: FileLifecycleNotifier,
    dir: TempDir,
}

async fn start(max_upload_bytes: usize) -> Result<TestServer> {
    let dir = tempdir()?;
    let store = FileStore::new(dir.path().join("uploads"))?;
    let notifier = FileLifecycleNotifier::new();
    let state = AppState::new(store, notifier.clone(), max_upload_bytes);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = serve(listener, state).await;
    });
    Ok(TestServer { base: format!("http://{}", addr), notifier, dir })
}

fn csv_form(name: &str, bytes: &[u8]) -> Form {
    Form::new().part("file", Part::bytes(bytes.to_vec()).file_name(name.to_string()))
}

#[tokio::test]
async fn upload_list_view_sort_delete() -> Result<()> {
    let srv = start(10 * 1024 * 1024).await?;
    let api = ApiClient::new(&srv.base)?;

    assert!(api.list_files().await?.is_empty());
    assert_eq!(api.upload_bytes("report.csv", REPORT.to_vec()).await?, "File uploaded successfully");

    let files = api.list_files().await?;
    assert_eq!(files.len(), 1);
    let id = files[0].clone();
    assert!(id.ends_with("-report.csv"), "unexpected identity {id}");
    assert!(srv.dir.path().join("uploads").join(&id).is_file());

    let rows = api.get_file_rows(&id).await?;
    assert_eq!(rows[0], serde_json::json!({"name": "alice", "score": 10}));
    assert_eq!(rows.len(), 3);

    let mut table = DataTableView::new();
    assert!(table.select(&api, &id).await?);
    table.activate_column("score");
    let scores = |t: &DataTableView| -> Vec<f64> {
        t.dataset().unwrap().rows().iter().filter_map(|r| r.get(1).as_number()).collect()
    };
    assert_eq!(scores(&table), vec![9.0, 10.0, 12.0]);
    table.activate_column("score");
    assert_eq!(scores(&table), vec![12.0, 10.0, 9.0]);

    assert_eq!(api.delete_file(&id).await?, "File deleted successfully");
    assert!(api.list_files().await?.is_empty());
    let err = api.get_file_rows(&id).await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn lifecycle_events_reach_subscribers() -> Result<()> {
    let srv = start(1024 * 1024).await?;
    let api = ApiClient::new(&srv.base)?;

    let mut stream = api.subscribe_events().await?;
    assert_eq!(srv.notifier.subscriber_count(), 1);

    api.upload_bytes("data.csv", b"a\n1\n".to_vec()).await?;
    let id = api.list_files().await?.remove(0);
    api.delete_file(&id).await?;

    let first = tokio::time::timeout(Duration::from_secs(5), stream.next_event()).await?.unwrap()?;
    assert_eq!(first.kind, FileEventKind::Uploaded);
    assert_eq!(first.identity, id);
    let second = tokio::time::timeout(Duration::from_secs(5), stream.next_event()).await?.unwrap()?;
    assert_eq!(second.kind, FileEventKind::Deleted);
    assert_eq!(second.identity, id);

    // closing the stream releases the listener on the server
    drop(stream);
    for _ in 0..50 {
        if srv.notifier.subscriber_count() == 0 { break; }
        srv.notifier.publish(FileEventKind::Uploaded, "0-nudge.csv");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(srv.notifier.subscriber_count(), 0);
    Ok(())
}

#[tokio::test]
async fn upload_without_file_part_is_rejected() -> Result<()> {
    let srv = start(1024 * 1024).await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/uploadFile", srv.base))
        .multipart(Form::new().text("note", "no file here"))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await?, "No file uploaded");

    let resp = client
        .post(format!("{}/api/uploadFile", srv.base))
        .multipart(csv_form("", b"a\n1\n"))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let api = ApiClient::new(&srv.base)?;
    assert!(api.list_files().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_identities_are_not_found() -> Result<()> {
    let srv = start(1024 * 1024).await?;
    let api = ApiClient::new(&srv.base)?;

    for id in ["1700000000000-missing.csv", "not-an-identity", ".."] {
        let err = api.get_file_rows(id).await.unwrap_err();
        assert_eq!(err.status(), Some(404), "read {id}");
        let err = api.delete_file(id).await.unwrap_err();
        assert_eq!(err.status(), Some(404), "delete {id}");
    }
    Ok(())
}

#[tokio::test]
async fn oversized_upload_is_rejected() -> Result<()> {
    let srv = start(1024).await?;
    let client = reqwest::Client::new();
    let big = vec![b'x'; 8 * 1024];
    let resp = client
        .post(format!("{}/api/uploadFile", srv.base))
        .multipart(csv_form("big.csv", &big))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    Ok(())
}

#[tokio::test]
async fn older_route_names_still_work() -> Result<()> {
    let srv = start(1024 * 1024).await?;
    let client = reqwest::Client::new();

    let health = client.get(&srv.base).send().await?.text().await?;
    assert_eq!(health, "csvdeck ok");

    let resp = client
        .post(format!("{}/api/upload", srv.base))
        .multipart(csv_form("alias.csv", b"a\n1\n"))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let names: Vec<String> = client.get(format!("{}/api/getFileNames", srv.base)).send().await?.json().await?;
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("-alias.csv"));
    Ok(())
}

#[tokio::test]
async fn header_only_file_is_empty_for_the_client() -> Result<()> {
    let srv = start(1024 * 1024).await?;
    let api = ApiClient::new(&srv.base)?;
    api.upload_bytes("empty.csv", b"a,b\n".to_vec()).await?;
    let id = api.list_files().await?.remove(0);

    assert!(api.get_file_rows(&id).await?.is_empty());
    let err = api.fetch_dataset(&id).await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(DecodeError::Empty)));
    Ok(())
}

#[tokio::test]
async fn browser_session_end_to_end() -> Result<()> {
    let srv = start(1024 * 1024).await?;
    let api = ApiClient::new(&srv.base)?;
    let path = srv.dir.path().join("report.csv");
    std::fs::write(&path, REPORT)?;

    let mut browser = Browser::new(api, 200);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let watcher = browser.spawn_event_watcher(move |notice| {
        let _ = tx.send(notice);
    });
    for _ in 0..50 {
        if srv.notifier.subscriber_count() == 1 { break; }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let out = browser.execute(&format!("upload {}", path.display())).await?;
    assert_eq!(out, Step::Output("File uploaded successfully".into()));

    let notice = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await?.unwrap();
    assert!(notice.starts_with("[fileUploaded] "));
    assert_eq!(browser.list_snapshot().len(), 1);

    let Step::Output(listing) = browser.execute("ls").await? else { panic!("unexpected quit") };
    assert!(listing.contains("report.csv"));

    let Step::Output(table) = browser.execute("view 1").await? else { panic!("unexpected quit") };
    assert!(table.contains("alice"));
    assert!(table.contains("rows: 3, cols: 2"));

    let Step::Output(sorted) = browser.execute("sort name").await? else { panic!("unexpected quit") };
    assert!(sorted.contains("name ^"));
    let Step::Output(missing) = browser.execute("sort nope").await? else { panic!("unexpected quit") };
    assert_eq!(missing, "no such column: nope");

    let Step::Output(gone) = browser.execute("view 1700000000000-gone.csv").await? else { panic!("unexpected quit") };
    assert_eq!(gone, "not found: 1700000000000-gone.csv");
    assert!(browser.table().dataset().is_some());

    let out = browser.execute("rm 1").await?;
    assert_eq!(out, Step::Output("File deleted successfully".into()));
    assert!(browser.table().dataset().is_none());
    assert!(browser.list_snapshot().is_empty());

    watcher.abort();
    Ok(())
}
