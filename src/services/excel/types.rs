use crate::models::CellValue;

/// Data rows kept per sheet preview; the rest only count towards `row_count`.
pub const PREVIEW_ROW_LIMIT: usize = 100;

/// One decoded worksheet before normalisation. The first row, if any, is the header.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { name: name.into(), rows }
    }
}
