//! Column sorting for the data table.
//!
//! A [`SortSpec`] records the active column, whether it is numeric and the
//! direction. Header activation goes through [`on_column_activated`]; the
//! resulting spec is applied with [`apply_sort`], which reorders rows in place
//! with a stable sort. Re-applying after a direction flip therefore works on the
//! already-sorted sequence, so rows that tie keep the order they had.

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::codec::{CellValue, Dataset, Row};

/// Active sort column and direction. Default: nothing selected, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Option<String>,
    pub is_numeric: bool,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self { column: None, is_numeric: false, ascending: true }
    }
}

/// Numeric iff the first row's cell in `column` is a number.
///
/// Only the first row is looked at: a column whose first value is text but
/// whose later values are numbers classifies as text, and the reverse holds
/// too. Unknown columns and empty datasets classify as text.
pub fn classify(dataset: &Dataset, column: &str) -> bool {
    dataset
        .cell(0, column)
        .map(CellValue::is_number)
        .unwrap_or(false)
}

/// Comparator over rows for the cell at `column`.
///
/// Numeric columns order by value; a cell that is not a number ranks after
/// every number and ties with other such cells. Text columns order ignoring
/// case and accents, then by accent, with lowercase first on ties. Descending
/// swaps the operands instead of reversing the result.
pub fn build_comparator(column: usize, is_numeric: bool, ascending: bool) -> impl Fn(&Row, &Row) -> Ordering {
    let base = move |a: &Row, b: &Row| -> Ordering {
        if is_numeric {
            compare_numeric(a.get(column), b.get(column))
        } else {
            compare_text(a.get(column), b.get(column))
        }
    };
    move |a: &Row, b: &Row| if ascending { base(a, b) } else { base(b, a) }
}

fn compare_numeric(a: &CellValue, b: &CellValue) -> Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_text(a: &CellValue, b: &CellValue) -> Ordering {
    let (sa, sb) = (a.text_form(), b.text_form());
    collation_key(&sa)
        .cmp(&collation_key(&sb))
        .then_with(|| sa.to_lowercase().cmp(&sb.to_lowercase()))
        .then_with(|| sb.cmp(&sa))
}

/// Primary ordering key: decomposed, combining marks removed, lowercased.
/// `Émile` keys as `emile`.
fn collation_key(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Next spec after the header for `column` is activated.
///
/// The active column flips direction; any other column becomes active,
/// ascending, with its numeric flag recomputed from `dataset`. A column the
/// dataset does not have leaves the spec unchanged.
pub fn on_column_activated(current: &SortSpec, column: &str, dataset: &Dataset) -> SortSpec {
    if dataset.column_index(column).is_none() {
        return current.clone();
    }
    if current.column.as_deref() == Some(column) {
        return SortSpec { ascending: !current.ascending, ..current.clone() };
    }
    SortSpec {
        column: Some(column.to_string()),
        is_numeric: classify(dataset, column),
        ascending: true,
    }
}

/// Reorder `dataset` rows in place according to `spec`. No-op when no column
/// is selected or the column is not part of the dataset.
pub fn apply_sort(dataset: &mut Dataset, spec: &SortSpec) {
    let Some(name) = spec.column.as_deref() else { return };
    let Some(idx) = dataset.column_index(name) else { return };
    let cmp = build_comparator(idx, spec.is_numeric, spec.ascending);
    dataset.rows_mut().sort_by(|a, b| cmp(a, b));
}
