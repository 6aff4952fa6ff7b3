use super::types::{RawSheet, PREVIEW_ROW_LIMIT};
use super::utils::{cell_text, row_from_data};
use std::io::Cursor;
use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Reader};
use crate::error::AppError;
use crate::models::SheetPreview;

/// Decodes workbook bytes (xlsx, xlsm, xlsb, xls or ods) into raw sheets, in workbook order.
pub fn decode_workbook(file_data: Bytes) -> Result<Vec<RawSheet>, AppError> {
    let start = std::time::Instant::now();
    let cursor = Cursor::new(file_data);

    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| {
            tracing::error!("Failed to open Excel file: {}", e);
            AppError::InvalidFormat(e.to_string())
        })?;

    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!("Decoding {} sheets: {:?}", sheet_names.len(), sheet_names);

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for sheet_name in sheet_names {
        match workbook.worksheet_range(&sheet_name) {
            Ok(range) => {
                let rows = range.rows().map(row_from_data).collect();
                sheets.push(RawSheet::new(sheet_name, rows));
            }
            Err(e) => {
                // Chart sheets and similar have no cell grid; treat them as empty.
                tracing::warn!("Failed to read worksheet {}: {}", sheet_name, e);
                sheets.push(RawSheet::new(sheet_name, Vec::new()));
            }
        }
    }

    tracing::info!("Workbook decoded in {:?}", start.elapsed());
    Ok(sheets)
}

/// Turns decoded sheets into bounded previews, skipping sheets without a header row.
///
/// Fails with [`AppError::NoValidData`] when every sheet is empty.
pub fn build_sheet_previews(sheets: Vec<RawSheet>) -> Result<Vec<SheetPreview>, AppError> {
    let mut previews = Vec::with_capacity(sheets.len());

    for sheet in sheets {
        let mut rows = sheet.rows.into_iter();
        let Some(header_row) = rows.next() else {
            tracing::warn!("Sheet {} is empty, skipping", sheet.name);
            continue;
        };

        let headers: Vec<String> = header_row.iter().map(cell_text).collect();
        let data_rows: Vec<_> = rows.collect();
        let row_count = data_rows.len();
        let data: Vec<_> = data_rows.into_iter().take(PREVIEW_ROW_LIMIT).collect();

        tracing::info!(
            "Sheet {}: {} data rows, {} columns, {} stored",
            sheet.name,
            row_count,
            headers.len(),
            data.len()
        );

        previews.push(SheetPreview {
            name: sheet.name,
            row_count,
            column_count: headers.len(),
            headers,
            data,
        });
    }

    if previews.is_empty() {
        tracing::error!("No valid data found in Excel file after processing all sheets");
        return Err(AppError::NoValidData);
    }

    Ok(previews)
}

pub fn ingest(file_data: Bytes) -> Result<Vec<SheetPreview>, AppError> {
    build_sheet_previews(decode_workbook(file_data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;
    use rust_xlsxwriter::Workbook;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    #[test]
    fn month_sales_sheet_is_previewed() {
        let sheet = RawSheet::new("Sheet1", vec![
            vec![text("Month"), text("Sales")],
            vec![text("Jan"), num(10.0)],
            vec![text("Feb"), num(20.0)],
            vec![text("Mar"), text("bad")],
        ]);

        let previews = build_sheet_previews(vec![sheet]).unwrap();
        assert_eq!(previews.len(), 1);
        let preview = &previews[0];
        assert_eq!(preview.name, "Sheet1");
        assert_eq!(preview.row_count, 3);
        assert_eq!(preview.column_count, 2);
        assert_eq!(preview.headers, vec!["Month", "Sales"]);
        assert_eq!(preview.data[2], vec![text("Mar"), text("bad")]);
    }

    #[test]
    fn stored_rows_are_capped_but_counted() {
        let mut rows = vec![vec![text("Id")]];
        rows.extend((0..150).map(|i| vec![num(i as f64)]));

        let previews = build_sheet_previews(vec![RawSheet::new("Big", rows)]).unwrap();
        assert_eq!(previews[0].row_count, 150);
        assert_eq!(previews[0].data.len(), PREVIEW_ROW_LIMIT);
        assert_eq!(previews[0].data.last(), Some(&vec![num(99.0)]));
    }

    #[test]
    fn empty_sheets_are_skipped_in_order() {
        let sheets = vec![
            RawSheet::new("First", vec![vec![text("A")]]),
            RawSheet::new("Blank", vec![]),
            RawSheet::new("Third", vec![vec![text("B"), text("B"), text("")], vec![num(1.0)]]),
        ];

        let previews = build_sheet_previews(sheets).unwrap();
        let names: Vec<_> = previews.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Third"]);
        assert_eq!(previews[0].row_count, 0);
        // Duplicate and empty headers are kept verbatim.
        assert_eq!(previews[1].headers, vec!["B", "B", ""]);
        assert_eq!(previews[1].column_count, 3);
    }

    #[test]
    fn all_empty_sheets_is_no_valid_data() {
        let sheets = vec![RawSheet::new("A", vec![]), RawSheet::new("B", vec![])];
        assert!(matches!(build_sheet_previews(sheets), Err(AppError::NoValidData)));
    }

    #[test]
    fn garbage_bytes_are_invalid_format() {
        let result = ingest(Bytes::from_static(b"definitely not a spreadsheet"));
        assert!(matches!(result, Err(AppError::InvalidFormat(_))));
    }

    #[test]
    fn decodes_real_xlsx_workbook() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Sales").unwrap();
        sheet.write_string(0, 0, "Month").unwrap();
        sheet.write_string(0, 1, "Sales").unwrap();
        sheet.write_string(1, 0, "Jan").unwrap();
        sheet.write_number(1, 1, 10).unwrap();
        sheet.write_string(2, 0, "Feb").unwrap();
        sheet.write_boolean(2, 1, true).unwrap();
        workbook.add_worksheet().set_name("Empty").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let previews = ingest(Bytes::from(bytes)).unwrap();
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].name, "Sales");
        assert_eq!(previews[0].headers, vec!["Month", "Sales"]);
        assert_eq!(previews[0].data, vec![
            vec![text("Jan"), num(10.0)],
            vec![text("Feb"), CellValue::Bool(true)],
        ]);
    }
}
