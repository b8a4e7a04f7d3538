use plotters::prelude::*;
use std::io::Cursor;
use std::str::FromStr;

use crate::aggregate::{GroupTotal, ReportView};
use crate::error::{AppError, ExportError};

const BRAND: RGBColor = RGBColor(0x1E, 0x88, 0xE5);

/// Charts of the expense report page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    /// Totals per month, oldest first
    Monthly,
    Company,
    Category,
    /// Ranking of owners, drawn with horizontal bars
    TopUsers,
}

impl FromStr for ChartKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(ChartKind::Monthly),
            "company" => Ok(ChartKind::Company),
            "category" => Ok(ChartKind::Category),
            "top-users" => Ok(ChartKind::TopUsers),
            other => Err(AppError::NotFound(format!("Gráfica desconocida: {}", other))),
        }
    }
}

impl ChartKind {
    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::Monthly => "Gastos por mes",
            ChartKind::Company => "Gastos por empresa",
            ChartKind::Category => "Gastos por categoría",
            ChartKind::TopUsers => "Top 10 usuarios",
        }
    }

    pub fn series<'a>(&self, report: &'a ReportView) -> &'a [GroupTotal] {
        match self {
            ChartKind::Monthly => &report.monthly,
            ChartKind::Company => &report.by_company,
            ChartKind::Category => &report.by_category,
            ChartKind::TopUsers => &report.top_users,
        }
    }

    pub fn options(&self) -> ChartOptions {
        ChartOptions {
            title: self.title().to_string(),
            horizontal: *self == ChartKind::TopUsers,
            ..ChartOptions::default()
        }
    }
}

/// Configuration options for chart rendering
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Label for the value axis
    pub value_label: String,

    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,

    /// Bars grow to the right instead of upwards
    pub horizontal: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            value_label: "Monto".to_string(),
            width: 800,
            height: 600,
            horizontal: false,
        }
    }
}

fn chart_error<E: std::fmt::Display>(e: E) -> ExportError {
    ExportError::Chart(e.to_string())
}

/// Axis label of a bar segment.
fn segment_label(labels: &[&str], value: &SegmentValue<usize>) -> String {
    match value {
        SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => {
            labels.get(*i).map(|l| l.to_string()).unwrap_or_default()
        }
        SegmentValue::Last => String::new(),
    }
}

/// Render one bar per group as a PNG image
///
/// # Arguments
/// * `points` - Labelled totals in display order
/// * `options` - Size, title and orientation
///
/// # Returns
/// * `Result<Vec<u8>, ExportError>` - PNG bytes or an error
pub fn render_bar_chart(points: &[GroupTotal], options: &ChartOptions) -> Result<Vec<u8>, ExportError> {
    let (width, height) = (options.width, options.height);
    let mut buffer = vec![0u8; (width * height * 3) as usize];

    let labels: Vec<&str> = points.iter().map(|p| p.label.as_str()).collect();
    let max = points.iter().map(|p| p.total).fold(0.0, f64::max);
    let top = if max > 0.0 { max * 1.1 } else { 1.0 };
    let slots = points.len().max(1);
    let bars = points.iter().enumerate().map(|(i, p)| (i, p.total));

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let mut builder = ChartBuilder::on(&root);
        builder
            .caption(&options.title, ("sans-serif", 30).into_font())
            .margin(10);

        if options.horizontal {
            let mut chart = builder
                .x_label_area_size(40)
                .y_label_area_size(160)
                .build_cartesian_2d(0.0..top, (0..slots).into_segmented())
                .map_err(chart_error)?;

            chart
                .configure_mesh()
                .disable_y_mesh()
                .y_labels(slots)
                .y_label_formatter(&|v| segment_label(&labels, v))
                .x_desc(&options.value_label)
                .draw()
                .map_err(chart_error)?;

            chart
                .draw_series(
                    Histogram::horizontal(&chart)
                        .style(BRAND.filled())
                        .margin(6)
                        .data(bars),
                )
                .map_err(chart_error)?;
        } else {
            let mut chart = builder
                .x_label_area_size(40)
                .y_label_area_size(70)
                .build_cartesian_2d((0..slots).into_segmented(), 0.0..top)
                .map_err(chart_error)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_labels(slots)
                .x_label_formatter(&|v| segment_label(&labels, v))
                .y_desc(&options.value_label)
                .draw()
                .map_err(chart_error)?;

            chart
                .draw_series(
                    Histogram::vertical(&chart)
                        .style(BRAND.filled())
                        .margin(6)
                        .data(bars),
                )
                .map_err(chart_error)?;
        }

        root.present().map_err(chart_error)?;
    }

    let image = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| ExportError::Chart("frame buffer size mismatch".to_string()))?;

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .map_err(chart_error)?;

    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("monthly".parse::<ChartKind>().unwrap(), ChartKind::Monthly);
        assert_eq!("top-users".parse::<ChartKind>().unwrap(), ChartKind::TopUsers);
        assert!("pie".parse::<ChartKind>().is_err());
    }

    #[test]
    fn test_only_ranking_is_horizontal() {
        assert!(ChartKind::TopUsers.options().horizontal);
        assert!(!ChartKind::Company.options().horizontal);
        assert_eq!(ChartKind::Category.options().title, "Gastos por categoría");
    }

    #[test]
    fn test_segment_labels() {
        let labels = ["2024-01", "2024-02"];
        assert_eq!(segment_label(&labels, &SegmentValue::CenterOf(1)), "2024-02");
        assert_eq!(segment_label(&labels, &SegmentValue::Exact(0)), "2024-01");
        assert_eq!(segment_label(&labels, &SegmentValue::CenterOf(5)), "");
        assert_eq!(segment_label(&labels, &SegmentValue::Last), "");
    }

    #[test]
    fn test_series_selection() {
        let report = ReportView {
            monthly: vec![GroupTotal {
                label: "2024-01".into(),
                total: 5.0,
            }],
            ..Default::default()
        };
        assert_eq!(ChartKind::Monthly.series(&report).len(), 1);
        assert!(ChartKind::TopUsers.series(&report).is_empty());
    }
}
