use chrono::NaiveDate;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook, Worksheet};
use std::path::{Path, PathBuf};

use crate::aggregate::{ExpenseRow, Kpis, TripRow, sum_amounts};
use crate::error::ExportError;
use crate::filter::DateRange;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Number format of the grand total.
pub const CURRENCY_FORMAT: &str = r##""$"#,##0.00"##;
/// Number format of the amount column on data rows, negatives in red.
pub const CURRENCY_ROW_FORMAT: &str = r##""$"#,##0.00;[Red]\-"$"#,##0.00"##;

const BRAND_BLUE: u32 = 0x1E88E5;
const TOTAL_LABEL: &str = "TOTAL:";

const TITLE_ROW: u32 = 0;
const HEADER_ROW: u32 = 2;
const FIRST_DATA_ROW: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSpec {
    pub header: &'static str,
    pub width: f64,
}

/// Fixed shape of one kind of export.
#[derive(Debug, PartialEq)]
pub struct ExportLayout {
    pub sheet: &'static str,
    pub title: &'static str,
    pub columns: &'static [ColumnSpec],
    pub file_name: &'static str,
}

const fn column(header: &'static str, width: f64) -> ColumnSpec {
    ColumnSpec { header, width }
}

pub const EXPENSE_LAYOUT: ExportLayout = ExportLayout {
    sheet: "Reporte de Gastos",
    title: "Reporte de Gastos",
    columns: &[
        column("Fecha", 20.0),
        column("Empresa", 25.0),
        column("Usuario", 25.0),
        column("Categoría", 20.0),
        column("Tamaño", 40.0),
        column("Monto", 15.0),
    ],
    file_name: "Reporte_Gastos.xlsx",
};

pub const TRIP_LAYOUT: ExportLayout = ExportLayout {
    sheet: "Viajes",
    title: "Reporte de Viajes - G-Logística",
    columns: &[
        column("Empresa", 25.0),
        column("Origen", 25.0),
        column("Destino", 25.0),
        column("Usuario", 25.0),
        column("Fecha", 20.0),
        column("Operador", 25.0),
        column("Costo", 15.0),
    ],
    file_name: "Reporte_Viajes.xlsx",
};

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl CellValue {
    fn text(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

/// A laid-out report ready to be rendered as xlsx or CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDocument {
    pub layout: &'static ExportLayout,
    pub title: String,
    pub rows: Vec<Vec<CellValue>>,
    pub total: f64,
}

fn short_date(date: NaiveDate) -> String {
    date.format("%-d/%-m/%Y").to_string()
}

/// Build the expense export from already filtered and sorted table rows
///
/// # Arguments
/// * `rows` - Table rows in display order
/// * `kpis` - KPIs of the same filtered set; their total becomes the totals row
/// * `range` - Active date range; the title carries it only when both ends are set
pub fn expense_report(rows: &[ExpenseRow], kpis: &Kpis, range: &DateRange) -> ExportDocument {
    let mut title = EXPENSE_LAYOUT.title.to_string();
    if let (Some(start), Some(end)) = (range.start, range.end) {
        title.push_str(&format!(" ({} - {})", short_date(start), short_date(end)));
    }

    ExportDocument {
        layout: &EXPENSE_LAYOUT,
        title,
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    CellValue::text(&r.fecha_txt),
                    CellValue::text(&r.empresa),
                    CellValue::text(&r.usuario),
                    CellValue::text(&r.categoria),
                    CellValue::text(&r.tamano),
                    CellValue::Number(r.monto),
                ]
            })
            .collect(),
        total: kpis.total,
    }
}

/// Build the trip export; the total is the sum of `costo` over `rows`.
pub fn trip_report(rows: &[TripRow]) -> ExportDocument {
    ExportDocument {
        layout: &TRIP_LAYOUT,
        title: TRIP_LAYOUT.title.to_string(),
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    CellValue::text(&r.empresa),
                    CellValue::text(&r.origen),
                    CellValue::text(&r.destino),
                    CellValue::text(&r.usuario),
                    CellValue::text(&r.fecha),
                    CellValue::text(&r.operador),
                    CellValue::Number(r.costo),
                ]
            })
            .collect(),
        total: sum_amounts(rows.iter().map(|r| r.costo)),
    }
}

impl ExportDocument {
    fn last_column(&self) -> u16 {
        self.layout.columns.len().saturating_sub(1) as u16
    }

    /// Render the report as an XLSX workbook
    ///
    /// Row 0 holds the merged title, row 1 is blank, row 2 the header and the
    /// data starts on row 3, followed by the totals row. Panes are frozen
    /// below the header.
    ///
    /// # Returns
    /// * `Result<Vec<u8>, ExportError>` - XLSX file content as bytes or an error
    pub fn to_xlsx(&self) -> Result<Vec<u8>, ExportError> {
        let mut workbook = Workbook::new();
        let mut worksheet = Worksheet::new();
        worksheet.set_name(self.layout.sheet)?;

        let blue = Color::RGB(BRAND_BLUE);
        let last = self.last_column();

        let title_format = Format::new()
            .set_bold()
            .set_font_size(16)
            .set_font_color(blue)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);
        let header_format = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(blue)
            .set_pattern(FormatPattern::Solid)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Thin);
        let cell_format = Format::new().set_border(FormatBorder::Thin);
        let amount_format = Format::new()
            .set_border(FormatBorder::Thin)
            .set_num_format(CURRENCY_ROW_FORMAT);
        let label_format = Format::new().set_bold();
        let total_format = Format::new()
            .set_bold()
            .set_font_color(blue)
            .set_num_format(CURRENCY_FORMAT);

        worksheet.merge_range(TITLE_ROW, 0, TITLE_ROW, last, &self.title, &title_format)?;

        for (col, spec) in self.layout.columns.iter().enumerate() {
            let col = col as u16;
            worksheet.set_column_width(col, spec.width)?;
            worksheet.write_string_with_format(HEADER_ROW, col, spec.header, &header_format)?;
        }

        for (i, cells) in self.rows.iter().enumerate() {
            let row = FIRST_DATA_ROW + i as u32;
            for (col, cell) in cells.iter().enumerate() {
                let col = col as u16;
                let format = if col == last {
                    &amount_format
                } else {
                    &cell_format
                };
                match cell {
                    CellValue::Text(text) => {
                        worksheet.write_string_with_format(row, col, text, format)?
                    }
                    CellValue::Number(number) => {
                        worksheet.write_number_with_format(row, col, *number, format)?
                    }
                };
            }
        }

        let total_row = FIRST_DATA_ROW + self.rows.len() as u32;
        worksheet.write_string_with_format(
            total_row,
            last.saturating_sub(1),
            TOTAL_LABEL,
            &label_format,
        )?;
        worksheet.write_number_with_format(total_row, last, self.total, &total_format)?;

        worksheet.set_freeze_panes(FIRST_DATA_ROW, 0)?;

        workbook.push_worksheet(worksheet);
        let buffer = workbook.save_to_buffer()?;

        Ok(buffer)
    }

    /// Render the report as CSV
    ///
    /// Same header, rows and totals line as the workbook, without the title.
    /// Commas, quotes and newlines are escaped.
    pub fn to_csv(&self) -> String {
        let mut csv_content = String::new();

        let headers: Vec<&str> = self.layout.columns.iter().map(|c| c.header).collect();
        push_csv_line(&mut csv_content, headers);

        for cells in &self.rows {
            push_csv_line(
                &mut csv_content,
                cells.iter().map(|cell| match cell {
                    CellValue::Text(text) => text.clone(),
                    CellValue::Number(number) => format!("{:.2}", number),
                }),
            );
        }

        let width = self.layout.columns.len();
        let mut totals = vec![String::new(); width];
        if width >= 2 {
            totals[width - 2] = TOTAL_LABEL.to_string();
        }
        if let Some(last) = totals.last_mut() {
            *last = format!("{:.2}", self.total);
        }
        push_csv_line(&mut csv_content, totals);

        csv_content
    }

    pub fn csv_file_name(&self) -> String {
        match self.layout.file_name.strip_suffix(".xlsx") {
            Some(stem) => format!("{}.csv", stem),
            None => format!("{}.csv", self.layout.file_name),
        }
    }

    /// Write the workbook to `dir/<file name>` and return the path
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(self.layout.file_name);
        std::fs::write(&path, self.to_xlsx()?)?;
        log::info!("export written to {}", path.display());
        Ok(path)
    }
}

fn push_csv_line<I, S>(out: &mut String, values: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_csv(value.as_ref()));
    }
    out.push('\n');
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
