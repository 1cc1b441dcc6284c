
use itertools::Itertools;

use crate::dataset::Dataset;

/// Separator between `column: value` fragments
pub const FIELD_DELIMITER: &str = " | ";

/// Flattened text of one dataset row, tagged with the row it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub row_index: usize,
    pub text: String,
}

/// Flatten every row into `"<column>: <value>"` fragments joined by [`FIELD_DELIMITER`].
///
/// Output order matches row order. Values are not escaped or truncated; numbers
/// follow their column's kind (see [`Dataset::is_float_column`]).
#[inline]
pub fn build_documents(dataset: &Dataset) -> Vec<Document> {
    dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(row_index, row)| Document {
            row_index,
            text: dataset
                .columns()
                .iter()
                .zip(row.values())
                .enumerate()
                .map(|(position, (column, value))| {
                    format!(
                        "{}: {}",
                        column,
                        value.display_in(dataset.is_float_column(position))
                    )
                })
                .join(FIELD_DELIMITER),
        })
        .collect()
}
