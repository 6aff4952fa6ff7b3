use std::path::Path;
use calamine::Data;
use crate::models::CellValue;

const EXCEL_MIME_TYPES: [&str; 3] = [
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel.sheet.macroEnabled.12",
];

const EXCEL_EXTENSIONS: [&str; 2] = [".xls", ".xlsx"];

pub fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Accepts a file when either its MIME type or its extension says Excel.
pub fn is_excel_upload(original_name: &str, mime_type: &str) -> bool {
    EXCEL_MIME_TYPES.contains(&mime_type)
        || file_extension(original_name)
            .map_or(false, |ext| EXCEL_EXTENSIONS.contains(&ext.as_str()))
}

pub fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        // Dates stay as their serial number, like an unformatted spreadsheet export.
        Data::DateTime(d) => CellValue::Number(d.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

/// Converts a decoded row, dropping trailing empty cells so a row ends at its last value.
pub fn row_from_data(row: &[Data]) -> Vec<CellValue> {
    let end = row
        .iter()
        .rposition(|cell| !matches!(cell, Data::Empty))
        .map_or(0, |idx| idx + 1);
    row[..end].iter().map(cell_from_data).collect()
}

/// Textual form of a cell: numbers use their shortest decimal form, empty is `""`.
pub fn cell_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Text(s) => s.clone(),
        CellValue::Number(n) => n.to_string(),
        CellValue::Bool(b) => b.to_string(),
        CellValue::Empty => String::new(),
    }
}

/// Length of the longest decimal literal (sign, digits, fraction, exponent) at the start of `s`.
fn numeric_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = if matches!(bytes.first(), Some(b'+' | b'-')) { 1 } else { 0 };
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return 0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    end
}

/// Reads the leading number of a text cell, ignoring whatever follows it (`"3.5 kg"` is 3.5).
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let len = numeric_prefix_len(s);
    if len == 0 {
        return None;
    }
    s[..len].parse().ok()
}

/// Numeric form of a cell; anything without a finite leading number becomes `0.0`.
pub fn cell_number(cell: &CellValue) -> f64 {
    let value = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => leading_number(s).unwrap_or(0.0),
        CellValue::Bool(_) | CellValue::Empty => 0.0,
    };
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_by_mime_or_extension() {
        assert!(is_excel_upload("report.XLSX", "application/octet-stream"));
        assert!(is_excel_upload("report.bin", "application/vnd.ms-excel"));
        assert!(!is_excel_upload("report.csv", "text/csv"));
        assert!(!is_excel_upload("noextension", "text/plain"));
    }

    #[test]
    fn trailing_empty_cells_are_dropped() {
        let row = [Data::String("a".into()), Data::Empty, Data::Int(3), Data::Empty, Data::Empty];
        assert_eq!(
            row_from_data(&row),
            vec![CellValue::Text("a".into()), CellValue::Empty, CellValue::Number(3.0)]
        );
        assert!(row_from_data(&[Data::Empty, Data::Empty]).is_empty());
    }

    #[test]
    fn text_of_numbers_is_shortest_form() {
        assert_eq!(cell_text(&CellValue::Number(10.0)), "10");
        assert_eq!(cell_text(&CellValue::Number(72.5)), "72.5");
        assert_eq!(cell_text(&CellValue::Bool(false)), "false");
    }

    #[test]
    fn non_numeric_values_coerce_to_zero() {
        assert_eq!(cell_number(&CellValue::Text(" 42.5 ".into())), 42.5);
        assert_eq!(cell_number(&CellValue::Text("bad".into())), 0.0);
        assert_eq!(cell_number(&CellValue::Text(String::new())), 0.0);
        assert_eq!(cell_number(&CellValue::Text("NaN".into())), 0.0);
        assert_eq!(cell_number(&CellValue::Bool(true)), 0.0);
        assert_eq!(cell_number(&CellValue::Number(-3.0)), -3.0);
    }

    #[test]
    fn text_uses_its_leading_number() {
        let number = |s: &str| cell_number(&CellValue::Text(s.into()));
        assert_eq!(number("12abc"), 12.0);
        assert_eq!(number("1,500"), 1.0);
        assert_eq!(number("3.5 kg"), 3.5);
        assert_eq!(number("  -7e2x"), -700.0);
        assert_eq!(number("2e"), 2.0);
        assert_eq!(number(".5"), 0.5);
        assert_eq!(number("5."), 5.0);
        assert_eq!(number("-."), 0.0);
        assert_eq!(number("kg 3"), 0.0);
        assert_eq!(number("1e999"), 0.0);
    }
}
