use crate::error::AppError;
use crate::models::{ChartData, ChartType, ColorSpec, Dataset, SheetPreview};
use crate::services::excel::utils::{cell_number, cell_text};

pub const PALETTE: [&str; 10] = [
    "#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF",
    "#FF9F40", "#FF6384", "#C9CBCF", "#4BC0C0", "#FF6384",
];

const DATASET_LABEL: &str = "Data";
const BORDER_WIDTH: u32 = 1;

/// Returns `count` colors: palette entries first, then golden-angle hues.
///
/// The output depends only on `count`, so regenerating a chart keeps its colors.
pub fn generate_colors(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| match PALETTE.get(i) {
            Some(color) => color.to_string(),
            None => format!("hsl({}, 70%, 50%)", (i as f64 * 137.5) % 360.0),
        })
        .collect()
}

fn column_index(preview: &SheetPreview, column: &str) -> Result<usize, AppError> {
    preview
        .headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| AppError::UnknownColumn(format!("{} (sheet {})", column, preview.name)))
}

/// Builds chart data from the stored preview rows of one sheet.
///
/// Only rows where both selected cells are present contribute a point. Only the stored
/// preview is read, so sheets longer than the preview limit chart their first rows.
pub fn derive_chart_data(
    preview: &SheetPreview,
    x_column: &str,
    y_column: &str,
    chart_type: ChartType,
) -> Result<ChartData, AppError> {
    let x_idx = column_index(preview, x_column)?;
    let y_idx = column_index(preview, y_column)?;

    let (labels, values): (Vec<String>, Vec<f64>) = preview
        .data
        .iter()
        .filter_map(|row| {
            let x = row.get(x_idx).filter(|c| c.is_present())?;
            let y = row.get(y_idx).filter(|c| c.is_present())?;
            Some((cell_text(x), cell_number(y)))
        })
        .unzip();

    let color = if chart_type.colors_per_point() {
        ColorSpec::PerPoint(generate_colors(values.len()))
    } else {
        ColorSpec::Single(PALETTE[0].to_string())
    };

    tracing::debug!(
        "Derived {} points from sheet {} ({} x {})",
        values.len(),
        preview.name,
        x_column,
        y_column
    );

    Ok(ChartData {
        labels,
        datasets: vec![Dataset {
            label: DATASET_LABEL.to_string(),
            data: values,
            background_color: color.clone(),
            border_color: color,
            border_width: BORDER_WIDTH,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;

    fn preview(headers: &[&str], data: Vec<Vec<CellValue>>) -> SheetPreview {
        SheetPreview {
            name: "Sheet1".into(),
            row_count: data.len(),
            column_count: headers.len(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            data,
        }
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn colors_up_to_palette_size_are_verbatim() {
        assert!(generate_colors(0).is_empty());
        assert_eq!(generate_colors(3), vec!["#FF6384", "#36A2EB", "#FFCE56"]);
        assert_eq!(generate_colors(10), PALETTE.to_vec());
    }

    #[test]
    fn colors_past_palette_step_by_golden_angle() {
        let colors = generate_colors(13);
        assert_eq!(colors.len(), 13);
        assert_eq!(&colors[..10], &PALETTE[..]);
        assert_eq!(colors[10], "hsl(295, 70%, 50%)");
        assert_eq!(colors[11], "hsl(72.5, 70%, 50%)");
        assert_eq!(colors[12], "hsl(210, 70%, 50%)");
        assert_eq!(generate_colors(13), colors);
    }

    #[test]
    fn month_sales_chart() {
        let sheet = preview(&["Month", "Sales"], vec![
            vec![text("Jan"), CellValue::Number(10.0)],
            vec![text("Feb"), CellValue::Number(20.0)],
            vec![text("Mar"), text("bad")],
        ]);

        let chart = derive_chart_data(&sheet, "Month", "Sales", ChartType::Bar).unwrap();
        assert_eq!(chart.labels, vec!["Jan", "Feb", "Mar"]);
        assert_eq!(chart.datasets.len(), 1);
        let dataset = &chart.datasets[0];
        assert_eq!(dataset.label, "Data");
        assert_eq!(dataset.data, vec![10.0, 20.0, 0.0]);
        assert_eq!(dataset.border_width, 1);
        assert_eq!(dataset.background_color, ColorSpec::Single("#FF6384".into()));
    }

    #[test]
    fn rows_missing_either_cell_are_dropped() {
        let sheet = preview(&["X", "Y", "Z"], vec![
            vec![text("a"), CellValue::Number(1.0)],
            vec![CellValue::Empty, CellValue::Number(2.0)],
            vec![text("c")],
            vec![text(""), text("")],
            vec![CellValue::Number(5.0), CellValue::Bool(true), text("z")],
        ]);

        let chart = derive_chart_data(&sheet, "X", "Y", ChartType::Line).unwrap();
        assert_eq!(chart.labels, vec!["a", "", "5"]);
        assert_eq!(chart.datasets[0].data, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn text_values_chart_their_leading_number() {
        let sheet = preview(&["Item", "Amount"], vec![
            vec![text("a"), text("12abc")],
            vec![text("b"), text("1,500")],
            vec![text("c"), text("3.5 kg")],
        ]);

        let chart = derive_chart_data(&sheet, "Item", "Amount", ChartType::Bar).unwrap();
        assert_eq!(chart.datasets[0].data, vec![12.0, 1.0, 3.5]);
    }

    #[test]
    fn pie_charts_color_each_point() {
        let sheet = preview(&["K", "V"], vec![
            vec![text("a"), CellValue::Number(1.0)],
            vec![text("b"), CellValue::Number(2.0)],
        ]);

        let chart = derive_chart_data(&sheet, "K", "V", ChartType::Pie).unwrap();
        let expected = ColorSpec::PerPoint(vec!["#FF6384".into(), "#36A2EB".into()]);
        assert_eq!(chart.datasets[0].background_color, expected);
        assert_eq!(chart.datasets[0].border_color, expected);
    }

    #[test]
    fn unknown_or_differently_cased_column_fails() {
        let sheet = preview(&["Month", "Sales"], vec![]);
        assert!(matches!(
            derive_chart_data(&sheet, "Region", "Sales", ChartType::Bar),
            Err(AppError::UnknownColumn(_))
        ));
        assert!(matches!(
            derive_chart_data(&sheet, "Month", "sales", ChartType::Bar),
            Err(AppError::UnknownColumn(_))
        ));
    }

    #[test]
    fn only_stored_rows_are_charted() {
        let data: Vec<_> = (0..100)
            .map(|i| vec![text(&format!("r{i}")), CellValue::Number(i as f64)])
            .collect();
        let mut sheet = preview(&["Row", "Value"], data);
        sheet.row_count = 150;

        let chart = derive_chart_data(&sheet, "Row", "Value", ChartType::Scatter).unwrap();
        assert_eq!(chart.labels.len(), 100);
        assert_eq!(chart.labels.last().map(String::as_str), Some("r99"));
    }
}
