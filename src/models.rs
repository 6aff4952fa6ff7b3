use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single scalar cell as stored in a sheet preview.
///
/// Serialises to the bare JSON scalar (`"text"`, `12.5`, `true`, `null`) so stored
/// previews look exactly like the rows the client renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn is_present(&self) -> bool {
        !matches!(self, CellValue::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPreview {
    pub name: String,
    /// Data rows in the full sheet, header excluded. May exceed `data.len()`.
    pub row_count: usize,
    pub column_count: usize,
    pub headers: Vec<String>,
    pub data: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploaded,
    Processing,
    Processed,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Processing => "processing",
            UploadStatus::Processed => "processed",
            UploadStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "uploaded" => Some(UploadStatus::Uploaded),
            "processing" => Some(UploadStatus::Processing),
            "processed" => Some(UploadStatus::Processed),
            "error" => Some(UploadStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub original_name: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub status: UploadStatus,
    pub sheets: Vec<SheetPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub upload_date: DateTime<Utc>,
}

impl Upload {
    pub fn sheet(&self, name: &str) -> Option<&SheetPreview> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartType {
    #[serde(rename = "bar")]
    Bar,
    #[serde(rename = "line")]
    Line,
    #[serde(rename = "pie")]
    Pie,
    #[serde(rename = "scatter")]
    Scatter,
    #[serde(rename = "3d-bar")]
    Bar3d,
    #[serde(rename = "3d-scatter")]
    Scatter3d,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
            ChartType::Bar3d => "3d-bar",
            ChartType::Scatter3d => "3d-scatter",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bar" => Some(ChartType::Bar),
            "line" => Some(ChartType::Line),
            "pie" => Some(ChartType::Pie),
            "scatter" => Some(ChartType::Scatter),
            "3d-bar" => Some(ChartType::Bar3d),
            "3d-scatter" => Some(ChartType::Scatter3d),
            _ => None,
        }
    }

    /// Whether each data point gets its own color instead of one per dataset.
    pub fn colors_per_point(&self) -> bool {
        matches!(self, ChartType::Pie)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub column: String,
    pub label: String,
}

impl AxisSpec {
    pub fn for_column(column: &str) -> Self {
        Self {
            column: column.to_string(),
            label: column.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Single(String),
    PerPoint(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
    pub background_color: ColorSpec,
    pub border_color: ColorSpec,
    pub border_width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default = "default_true")]
    pub show_legend: bool,
    #[serde(default = "default_true")]
    pub show_grid: bool,
    #[serde(default = "default_true")]
    pub animation: bool,
}

impl ChartConfig {
    pub fn default_for(x_axis: &str, y_axis: &str, original_name: &str) -> Self {
        Self {
            title: format!("{y_axis} vs {x_axis}"),
            subtitle: format!("Chart from {original_name}"),
            show_legend: true,
            show_grid: true,
            animation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub format: String,
    pub exported_at: DateTime<Utc>,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInsights {
    pub summary: String,
    pub trends: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: String,
    pub user_id: String,
    pub upload_id: String,
    pub sheet_name: String,
    pub chart_type: ChartType,
    pub x_axis: AxisSpec,
    pub y_axis: AxisSpec,
    pub chart_data: ChartData,
    pub chart_config: ChartConfig,
    pub export_history: Vec<ExportRecord>,
    pub ai_insights: Option<AiInsights>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub upload_count: i64,
    pub total_storage_used: i64,
    pub created_at: DateTime<Utc>,
}

/// Owner details attached to listed uploads and analyses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub id: String,
    pub original_name: String,
}

/// An upload as it appears in listings, with its owner resolved.
#[derive(Debug, Clone, Serialize)]
pub struct UploadEntry {
    #[serde(flatten)]
    pub upload: Upload,
    pub user: Option<OwnerSummary>,
}

/// An analysis as it appears in listings, with its source upload and owner resolved.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisEntry {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub upload: Option<UploadSummary>,
    pub user: Option<OwnerSummary>,
}

/// Query-string paging parameters, normalised by [`Page::from_query`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

pub const MAX_PAGE_LIMIT: u32 = 100;

impl Page {
    pub fn from_query(query: PageQuery) -> Self {
        Self {
            page: query.page.filter(|p| *p > 0).unwrap_or(1),
            limit: query.limit.filter(|l| *l > 0).unwrap_or(10).min(MAX_PAGE_LIMIT),
        }
    }

    /// Rows to skip; widened so any page number stays representable.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: Page, total: u64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
            pages: total.div_ceil(page.limit as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_serialize_as_bare_scalars() {
        let row = vec![
            CellValue::Text("Jan".into()),
            CellValue::Number(10.0),
            CellValue::Bool(true),
            CellValue::Empty,
        ];
        assert_eq!(serde_json::to_value(&row).unwrap(), json!(["Jan", 10.0, true, null]));

        let back: Vec<CellValue> = serde_json::from_value(json!(["", 2.5, null])).unwrap();
        assert_eq!(back, vec![CellValue::Text(String::new()), CellValue::Number(2.5), CellValue::Empty]);
    }

    #[test]
    fn chart_type_wire_names() {
        let parsed: ChartType = serde_json::from_value(json!("3d-scatter")).unwrap();
        assert_eq!(parsed, ChartType::Scatter3d);
        assert_eq!(ChartType::parse(ChartType::Bar3d.as_str()), Some(ChartType::Bar3d));
        assert!(serde_json::from_value::<ChartType>(json!("doughnut")).is_err());
    }

    #[test]
    fn partial_chart_config_keeps_toggles_on() {
        let config: ChartConfig = serde_json::from_value(json!({"title": "Sales"})).unwrap();
        assert_eq!(config.title, "Sales");
        assert!(config.show_legend && config.show_grid && config.animation);
    }

    #[test]
    fn page_defaults_and_caps() {
        let page = Page::from_query(PageQuery { page: Some(0), limit: Some(500) });
        assert_eq!(page, Page { page: 1, limit: MAX_PAGE_LIMIT });
        assert_eq!(Pagination::new(Page { page: 2, limit: 10 }, 21).pages, 3);
        assert_eq!(Page { page: 3, limit: 10 }.offset(), 20);
        assert_eq!(Page { page: u32::MAX, limit: MAX_PAGE_LIMIT }.offset(), 429_496_729_400);
    }
}
