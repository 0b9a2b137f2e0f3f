//!
//! csvdeck CLI binary
//! ------------------
//! Terminal client for a csvdeck server: one-shot commands for scripting and
//! an interactive browser that follows file events as they happen.

use std::env;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use csvdeck::client::render::{render_file_list, render_table_display, terminal_width};
use csvdeck::client::{ApiClient, Browser, DataTableView, FileListView, Step};
use csvdeck::config::{client_base_url, flag_value, has_flag};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--connect <url>] list\n  {program} [--connect <url>] upload <path>\n  {program} [--connect <url>] show <id> [--sort <column>] [--desc]\n  {program} [--connect <url>] delete <id>\n  {program} [--connect <url>] watch\n  {program} [--connect <url>] --repl\n\nFlags:\n  --connect <url>     Server base URL (env: CSVDECK_URL, default http://127.0.0.1:5173)\n  --sort <column>     With show: sort the table by this column (ascending)\n  --desc              With show and --sort: sort descending\n  --repl              Start the interactive browser (also the default with no command)\n  -h, --help          Show this help\n\n{}",
        csvdeck::client::browser::HELP
    );
}

// Flags that take a value; their values are not positional arguments.
const VALUE_FLAGS: &[&str] = &["--connect", "--sort"];

fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 1;
    while i < args.len() {
        let a = &args[i];
        if VALUE_FLAGS.contains(&a.as_str()) { i += 2; continue; }
        if a.starts_with("--") || a == "-h" { i += 1; continue; }
        out.push(a.clone());
        i += 1;
    }
    out
}

fn nth_arg(pos: &[String], n: usize) -> Result<&str> {
    pos.get(n)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("missing argument for '{}'", pos.first().map(|s| s.as_str()).unwrap_or("")))
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "csvdeck_cli".to_string());
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        print_usage(&program);
        return Ok(());
    }

    let base = client_base_url(&args);
    let api = ApiClient::new(&base).with_context(|| format!("cannot use server URL {base}"))?;
    let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;

    let pos = positional(&args);
    if has_flag(&args, "--repl") || pos.is_empty() {
        return run_repl(rt, api);
    }

    let width = terminal_width();
    match pos[0].as_str() {
        "list" | "ls" => {
            let ids = rt.block_on(api.list_files())?;
            let mut list = FileListView::new();
            list.apply_listing(ids);
            println!("{}", render_file_list(&list.entries(), width));
        }
        "upload" => {
            let path = nth_arg(&pos, 1)?;
            let msg = rt.block_on(api.upload_file(Path::new(path)))?;
            println!("{}", msg);
        }
        "show" | "view" => {
            let identity = nth_arg(&pos, 1)?;
            let mut table = DataTableView::new();
            rt.block_on(table.select(&api, identity))?;
            if let Some(column) = flag_value(&args, "--sort") {
                if table.dataset().and_then(|ds| ds.column_index(&column)).is_none() {
                    return Err(anyhow!("no such column: {}", column));
                }
                table.activate_column(&column);
                if has_flag(&args, "--desc") {
                    table.activate_column(&column);
                }
            }
            println!("{}", render_table_display(table.display(), width));
        }
        "delete" | "rm" => {
            let identity = nth_arg(&pos, 1)?;
            let msg = rt.block_on(api.delete_file(identity))?;
            println!("{}", msg);
        }
        "watch" => {
            rt.block_on(async {
                let mut stream = api.subscribe_events().await?;
                println!("watching {} (ctrl-c to stop)", api.base_url());
                while let Some(ev) = stream.next_event().await {
                    let ev = ev?;
                    println!("{} {}", ev.kind.event_name(), ev.identity);
                }
                Ok::<_, anyhow::Error>(())
            })?;
        }
        other => {
            print_usage(&program);
            return Err(anyhow!("unknown command: {}", other));
        }
    }
    Ok(())
}

fn run_repl(rt: tokio::runtime::Runtime, api: ApiClient) -> Result<()> {
    let _guard = rt.enter();
    let mut browser = Browser::new(api.clone(), terminal_width());
    let watcher = browser.spawn_event_watcher(|notice| {
        println!("\n{}", notice);
        print!("> ");
        let _ = io::stdout().flush();
    });

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input = String::new();
    println!("csvdeck browser connected to {}. Type 'help' for commands.", api.base_url());
    if let Ok(Step::Output(out)) = rt.block_on(browser.execute("ls")) {
        println!("{}", out);
    }
    loop {
        input.clear();
        print!("> ");
        let _ = stdout.flush();
        match stdin.read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match rt.block_on(browser.execute(&input)) {
            Ok(Step::Quit) => break,
            Ok(Step::Output(out)) => {
                if !out.is_empty() { println!("{}", out); }
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }
    watcher.abort();
    Ok(())
}
