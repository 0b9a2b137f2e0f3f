use terminal_size::{terminal_size, Height, Width};

use crate::tabular::{Dataset, SortSpec};

use super::views::{FileListEntry, TableDisplay};

/// Usable terminal width, 80 when not attached to a terminal.
pub fn terminal_width() -> usize {
    if let Some((Width(w), Height(_h))) = terminal_size() {
        return (w.saturating_sub(4) as usize).max(20);
    }
    80
}

/// Render the file list as a numbered table.
pub fn render_file_list(entries: &[FileListEntry], termw: usize) -> String {
    if entries.is_empty() {
        return "no files uploaded".to_string();
    }
    let cols = vec!["#".to_string(), "file".to_string(), "uploaded".to_string()];
    let rows: Vec<Vec<Cell>> = entries
        .iter()
        .map(|e| {
            vec![
                Cell::right(e.index.to_string()),
                Cell::left(e.display_name.clone()),
                Cell::left(e.uploaded_at.clone()),
            ]
        })
        .collect();
    let mut out = render_grid(&cols, &rows, termw);
    out.push_str(&format!("\nfiles: {}", entries.len()));
    out
}

/// Render whatever the data table currently shows.
pub fn render_table_display(display: TableDisplay<'_>, termw: usize) -> String {
    match display {
        TableDisplay::Nothing => "no file selected".to_string(),
        TableDisplay::Loading(identity) => format!("loading {} ...", identity),
        TableDisplay::Table { identity, dataset, sort } => {
            let mut out = format!("file: {}\n", identity);
            out.push_str(&render_dataset(dataset, sort, termw));
            out
        }
    }
}

/// Render a dataset, marking the sorted column header with its direction.
pub fn render_dataset(dataset: &Dataset, sort: &SortSpec, termw: usize) -> String {
    let cols: Vec<String> = dataset
        .columns()
        .iter()
        .map(|c| match (&sort.column, sort.ascending) {
            (Some(active), true) if active == c => format!("{} ^", c),
            (Some(active), false) if active == c => format!("{} v", c),
            _ => c.clone(),
        })
        .collect();
    let rows: Vec<Vec<Cell>> = dataset
        .rows()
        .iter()
        .map(|r| {
            (0..cols.len())
                .map(|i| {
                    let v = r.get(i);
                    Cell { text: v.text_form().into_owned(), align_right: v.is_number() }
                })
                .collect()
        })
        .collect();
    let mut out = render_grid(&cols, &rows, termw);
    out.push_str(&format!("\nrows: {}, cols: {}", dataset.len(), dataset.columns().len()));
    out
}

struct Cell {
    text: String,
    align_right: bool,
}

impl Cell {
    fn left(text: String) -> Self { Self { text, align_right: false } }
    fn right(text: String) -> Self { Self { text, align_right: true } }
}

fn render_grid(cols: &[String], rows: &[Vec<Cell>], termw: usize) -> String {
    let mut widths: Vec<usize> = cols.iter().map(|s| s.chars().count().min(termw)).collect();
    for r in rows {
        for (i, cell) in r.iter().enumerate().take(cols.len()) {
            let w = cell.text.chars().count();
            if w > widths[i] { widths[i] = w.min(termw); }
        }
    }

    let sep = build_separator(&widths);
    let header: Vec<Cell> = cols.iter().map(|c| Cell::left(c.clone())).collect();
    let mut lines = vec![sep.clone(), build_row(&header, &widths), sep.clone()];
    for r in rows {
        lines.push(build_row(r, &widths));
    }
    lines.push(sep);
    lines.iter().map(|l| fit_line_to_width(l, termw)).collect::<Vec<_>>().join("\n")
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[Cell], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let (text, align_right) = match cells.get(i) {
            Some(c) => (truncate(&c.text, *w), c.align_right),
            None => (String::new(), false),
        };
        let pad = " ".repeat(w.saturating_sub(text.chars().count()));
        s.push(' ');
        if align_right {
            s.push_str(&pad);
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&pad);
        }
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

// Keep both ends of an overlong line, eliding the middle.
fn fit_line_to_width(s: &str, maxw: usize) -> String {
    let len = s.chars().count();
    if len <= maxw || maxw < 5 { return s.to_string(); }
    let keep = maxw - 1;
    let head = keep / 2;
    let tail = keep - head;
    let chars: Vec<char> = s.chars().collect();
    let mut out: String = chars[..head].iter().collect();
    out.push('…');
    out.extend(&chars[len - tail..]);
    out
}
