//! PDF rendering of stored reports with printpdf's built-in Helvetica.
//!
//! Each report starts on a fresh A4 page: heading, ranges, a metrics table
//! and the stored narrative. Single-report exports also get a daily
//! sessions chart from the stored timeseries.

use anyhow::{anyhow, Result};
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point,
};

use trendline_core::analysis::AiAnalysis;
use trendline_core::analytics::Period;
use trendline_core::report::{ReportRecord, StoredTimeseriesRow};

pub const NO_ANALYSIS: &str = "No analysis stored for this report.";

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const BODY_SIZE: f32 = 10.0;
const WRAP_CHARS: usize = 95;
const TITLE_SIZE: f32 = 18.0;
/// Characters per heading line at `TITLE_SIZE` across the printable width.
const TITLE_WRAP_CHARS: usize = 44;

/// Table column offsets from the left margin, in millimetres.
const COLUMNS: [f32; 5] = [0.0, 62.0, 92.0, 122.0, 152.0];

const CHART_HEIGHT: f32 = 45.0;
const CHART_METRIC: &str = "sessions";

/// Built-in fonts only cover WinAnsi. Anything outside printable ASCII is
/// replaced so the text layer never carries glyphs the font cannot show.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201c}' | '\u{201d}' => '"',
            '\u{2192}' => '>',
            c if c == ' ' || c.is_ascii_graphic() => c,
            c if c.is_whitespace() => ' ',
            _ => '?',
        })
        .collect()
}

/// Greedy word wrap. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            lines.push(head);
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn fmt_value(value: f64) -> String {
    format!("{value:.2}")
}

fn fmt_change(value: f64) -> String {
    format!("{value:+.2}")
}

/// Cursor over an A4 document that adds pages as text runs past the margin.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(pdf_safe(title), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("failed to load font: {e:?}"))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("failed to load font: {e:?}"))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {}", self.pages + 1));
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
        self.pages += 1;
    }

    /// Start a new page unless `height` millimetres still fit.
    fn reserve(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn text_at(&self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(pdf_safe(text), size, Mm(MARGIN + x), Mm(self.y), font);
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        let height = size * 0.5;
        self.reserve(height);
        self.y -= height;
        self.text_at(text, size, 0.0, bold);
    }

    fn paragraph(&mut self, text: &str, indent: &str) {
        for (i, line) in wrap(text, WRAP_CHARS).into_iter().enumerate() {
            let prefix = if i == 0 { indent.to_string() } else { " ".repeat(indent.len()) };
            self.line(&format!("{prefix}{line}"), BODY_SIZE, false);
        }
    }

    fn heading(&mut self, text: &str) {
        for line in wrap(text, TITLE_WRAP_CHARS) {
            self.line(&line, TITLE_SIZE, true);
        }
    }

    fn row(&mut self, cells: &[String], bold: bool) {
        let height = BODY_SIZE * 0.55;
        self.reserve(height);
        self.y -= height;
        for (cell, x) in cells.iter().zip(COLUMNS) {
            self.text_at(cell, BODY_SIZE, x, bold);
        }
    }

    fn rectangle(&self, x: f32, y: f32, width: f32, height: f32) {
        let points = vec![
            (Point::new(Mm(x), Mm(y)), false),
            (Point::new(Mm(x + width), Mm(y)), false),
            (Point::new(Mm(x + width), Mm(y + height)), false),
            (Point::new(Mm(x), Mm(y + height)), false),
        ];
        self.layer.add_line(Line {
            points,
            is_closed: true,
        });
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc
            .save_to_bytes()
            .map_err(|e| anyhow!("failed to write PDF: {e:?}"))
    }
}

fn write_header(w: &mut PageWriter, report: &ReportRecord) {
    w.heading(&report.title);
    w.gap(2.0);
    w.line(&format!("Property {}", report.property_id), BODY_SIZE, false);
    w.line(
        &format!("Current period: {} to {}", report.start_date, report.end_date),
        BODY_SIZE,
        false,
    );
    w.line(
        &format!(
            "Comparison period: {} to {}",
            report.comparison_start, report.comparison_end
        ),
        BODY_SIZE,
        false,
    );
    w.line(&format!("Created {} UTC", report.created_at), BODY_SIZE, false);
    w.gap(4.0);
}

fn write_metrics(w: &mut PageWriter, report: &ReportRecord) {
    w.line("Metrics", 13.0, true);
    w.gap(1.0);
    let metrics = report
        .normalized_metrics
        .as_ref()
        .map(|n| n.metrics.as_slice())
        .unwrap_or_default();
    if metrics.is_empty() {
        w.line("No metrics stored for this report.", BODY_SIZE, false);
        w.gap(4.0);
        return;
    }
    let header = ["Metric", "Current", "Comparison", "Change", "Change %"].map(String::from);
    w.row(&header, true);
    for m in metrics {
        w.row(
            &[
                m.metric.clone(),
                fmt_value(m.current),
                fmt_value(m.comparison),
                fmt_change(m.abs_change),
                format!("{}%", fmt_change(m.pct_change)),
            ],
            false,
        );
    }
    w.gap(4.0);
}

fn write_chart(w: &mut PageWriter, timeseries: &[StoredTimeseriesRow]) {
    let points: Vec<(String, f64)> = timeseries
        .iter()
        .filter(|row| row.period == Period::Current)
        .map(|row| {
            let value = row.metrics.get(CHART_METRIC).copied().unwrap_or(0.0);
            (row.date.format("%m/%d").to_string(), value.max(0.0))
        })
        .collect();
    if points.is_empty() {
        return;
    }

    w.line("Daily sessions", 13.0, true);
    w.reserve(CHART_HEIGHT + 8.0);
    w.gap(CHART_HEIGHT + 2.0);

    let max = points.iter().map(|(_, v)| *v).fold(1.0_f64, f64::max);
    let width = PAGE_WIDTH - 2.0 * MARGIN;
    let slot = width / points.len() as f32;
    let bar = (slot - 1.5).max(0.5);
    let base = w.y;
    for (i, (label, value)) in points.iter().enumerate() {
        let height = (*value / max) as f32 * CHART_HEIGHT;
        let x = MARGIN + i as f32 * slot;
        if height > 0.0 {
            w.rectangle(x, base, bar, height);
        }
        // Label every other bar once the chart gets crowded.
        if points.len() <= 16 || i % 2 == 0 {
            w.layer
                .use_text(label.as_str(), 6.0, Mm(x), Mm(base - 4.0), &w.regular);
        }
    }
    w.gap(8.0);
}

fn write_list(w: &mut PageWriter, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    w.gap(1.0);
    w.line(heading, 11.0, true);
    for item in items {
        w.paragraph(item, "- ");
    }
}

fn write_analysis(w: &mut PageWriter, analysis: Option<&AiAnalysis>) {
    w.line("AI insights", 13.0, true);
    w.gap(1.0);
    let Some(analysis) = analysis else {
        w.line(NO_ANALYSIS, BODY_SIZE, false);
        return;
    };

    for paragraph in analysis.summary.lines().filter(|l| !l.trim().is_empty()) {
        w.paragraph(paragraph.trim(), "");
    }

    let per_metric: Vec<String> = analysis
        .per_metric
        .iter()
        .map(|i| {
            if i.impact.is_empty() {
                format!("{}: {}", i.metric, i.insight)
            } else {
                format!("{} ({}): {}", i.metric, i.impact, i.insight)
            }
        })
        .collect();
    write_list(w, "Per metric", &per_metric);
    write_list(w, "Anomalies", &analysis.anomalies);
    write_list(w, "SEO recommendations", &analysis.seo_recommendations);
    write_list(
        w,
        "Technical recommendations",
        &analysis.technical_recommendations,
    );
}

fn write_report(w: &mut PageWriter, report: &ReportRecord, timeseries: &[StoredTimeseriesRow]) {
    write_header(w, report);
    write_metrics(w, report);
    write_chart(w, timeseries);
    write_analysis(w, report.ai_analysis.as_ref());
}

/// One report, with its daily chart.
pub fn render_report(report: &ReportRecord, timeseries: &[StoredTimeseriesRow]) -> Result<Vec<u8>> {
    let mut w = PageWriter::new(&report.title)?;
    write_report(&mut w, report, timeseries);
    w.finish()
}

/// Several reports, one section each, in the given order.
pub fn render_reports(reports: &[ReportRecord]) -> Result<Vec<u8>> {
    let mut w = PageWriter::new("Analytics reports")?;
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            w.new_page();
        }
        write_report(&mut w, report, &[]);
    }
    w.finish()
}

/// `report-<id>.pdf`, or a dated bundle name for bulk exports.
pub fn attachment_name(ids: &[&str]) -> String {
    match ids {
        [id] => format!("report-{id}.pdf"),
        _ => format!(
            "reports-{}.pdf",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use serde_json::json;
    use trendline_core::analysis::MetricInsight;
    use trendline_core::comparison::{compute_change, ComparisonResult, DateRange};

    use super::*;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    fn report(analysis: Option<AiAnalysis>) -> ReportRecord {
        ReportRecord {
            id: "report_abc".to_string(),
            title: "Weekly \u{2014} March".to_string(),
            property_id: "123".to_string(),
            start_date: date("2024-03-01"),
            end_date: date("2024-03-07"),
            comparison_start: date("2024-02-23"),
            comparison_end: date("2024-02-29"),
            raw_data: json!({}),
            normalized_metrics: Some(ComparisonResult {
                metrics: vec![
                    compute_change("sessions", 120.0, 100.0),
                    compute_change("conversions", 0.0, 4.0),
                ],
                current_range: DateRange::new(date("2024-03-01"), date("2024-03-07"))
                    .expect("range"),
                comparison_range: DateRange::new(date("2024-02-23"), date("2024-02-29"))
                    .expect("range"),
                report_id: None,
                analysis: None,
            }),
            ai_analysis: analysis,
            created_at: "2024-03-08 09:30:00".to_string(),
        }
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap("alpha beta gamma delta epsilon", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta", "epsilon"]);
        assert!(wrap("", 10).is_empty());
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn non_ascii_replaced() {
        assert_eq!(pdf_safe("a \u{2014} b \u{2192} c\td"), "a - b > c d");
        assert_eq!(pdf_safe("caf\u{e9}"), "caf?");
    }

    #[test]
    fn change_formatting_is_signed() {
        assert_eq!(fmt_change(20.0), "+20.00");
        assert_eq!(fmt_change(-4.5), "-4.50");
        assert_eq!(fmt_value(1234.567), "1234.57");
    }

    #[test]
    fn renders_single_report_with_chart() {
        let mut metrics = BTreeMap::new();
        metrics.insert("sessions".to_string(), 42.0);
        let timeseries: Vec<StoredTimeseriesRow> = (1..=7)
            .map(|day| StoredTimeseriesRow {
                period: Period::Current,
                date: date(&format!("2024-03-0{day}")),
                metrics: metrics.clone(),
            })
            .collect();

        let bytes = render_report(&report(None), &timeseries).expect("pdf");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn renders_many_reports_and_long_analysis() {
        let analysis = AiAnalysis {
            summary: "Sessions grew strongly. ".repeat(80),
            per_metric: vec![MetricInsight {
                metric: "sessions".to_string(),
                insight: "Up 20% week over week".to_string(),
                impact: "positive".to_string(),
            }],
            anomalies: vec!["Conversions dropped to zero".to_string()],
            seo_recommendations: vec!["Refresh landing page titles".to_string()],
            technical_recommendations: vec!["Verify the purchase event fires".to_string()],
        };
        let reports = vec![report(Some(analysis)), report(None), report(None)];
        let bytes = render_reports(&reports).expect("pdf");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_titles_wrap_within_page() {
        const PT_TO_MM: f32 = 0.3528;
        const AVG_GLYPH_EM: f32 = 0.6;
        let printable = PAGE_WIDTH - 2.0 * MARGIN;
        let widest_line = TITLE_WRAP_CHARS as f32 * TITLE_SIZE * PT_TO_MM * AVG_GLYPH_EM;
        assert!(widest_line <= printable, "{widest_line}mm > {printable}mm");

        let title = "Quarterly organic search performance review ".repeat(5);
        let title = title.trim();
        assert!(title.chars().count() <= 200);
        let lines = wrap(title, TITLE_WRAP_CHARS);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= TITLE_WRAP_CHARS));

        let mut record = report(None);
        record.title = title.to_string();
        let bytes = render_report(&record, &[]).expect("pdf");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn attachment_names() {
        assert_eq!(attachment_name(&["report_abc"]), "report-report_abc.pdf");
        let bulk = attachment_name(&["a", "b"]);
        assert!(bulk.starts_with("reports-") && bulk.ends_with(".pdf"));
    }
}
