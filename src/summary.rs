//! Summary image: total count, top-5 countries by estimated GDP, render time.
//!
//! Drawn with Plotters' SVG backend into memory, then published by writing a temp
//! file next to the target and renaming it over `summary.svg`, so a reader gets
//! either the previous image or the new one. Staging and the final rename are
//! separate steps: a refresh stages the image before installing its snapshot and
//! only renames afterwards.

use crate::error::RenderError;
use crate::models::{CountryRecord, NewCountry};
use chrono::{DateTime, Utc};
use num_format::{Locale, ToFormattedString};
use plotters::backend::DrawingBackend;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontDesc, FontFamily, FontStyle};
use plotters_svg::SVGBackend;
use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;
pub const TOP_N: usize = 5;
pub const CONTENT_TYPE: &str = "image/svg+xml";

const BACKGROUND: RGBColor = RGBColor(240, 244, 247); // #f0f4f7
const INK: RGBColor = RGBColor(27, 67, 50); // #1b4332
const MUTED: RGBColor = RGBColor(85, 85, 85); // #555555

/// Microsoft Office chart palette, first five entries (one per ranked country).
const BAR_COLORS: [RGBColor; TOP_N] = [
    RGBColor(68, 114, 196),
    RGBColor(237, 125, 49),
    RGBColor(165, 165, 165),
    RGBColor(255, 192, 0),
    RGBColor(91, 155, 213),
];

/// A published summary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Anything the summary can rank: a stored record or a freshly aggregated one.
pub trait Ranked {
    fn name(&self) -> &str;
    fn estimated_gdp(&self) -> Option<f64>;
}

impl Ranked for CountryRecord {
    fn name(&self) -> &str {
        &self.name
    }
    fn estimated_gdp(&self) -> Option<f64> {
        self.estimated_gdp
    }
}

impl Ranked for NewCountry {
    fn name(&self) -> &str {
        &self.name
    }
    fn estimated_gdp(&self) -> Option<f64> {
        self.estimated_gdp
    }
}

/// Up to `n` records with the largest `estimated_gdp`, descending. Records without a
/// value are not ranked; ties keep snapshot order.
pub fn top_by_gdp<R: Ranked>(records: &[R], n: usize) -> Vec<&R> {
    let mut ranked: Vec<&R> = records
        .iter()
        .filter(|r| r.estimated_gdp().is_some_and(f64::is_finite))
        .collect();
    ranked.sort_by(|a, b| {
        b.estimated_gdp()
            .partial_cmp(&a.estimated_gdp())
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(n);
    ranked
}

/// Map a locale tag (`en`, `de`, `fr`, ...) to a `num_format::Locale`. Defaults to English.
fn map_locale(tag: &str) -> &'static Locale {
    match tag.to_lowercase().as_str() {
        "de" | "de_de" | "german" => &Locale::de,
        "fr" | "fr_fr" => &Locale::fr,
        "es" | "es_es" => &Locale::es,
        "it" | "it_it" => &Locale::it,
        "pt" | "pt_pt" | "pt_br" => &Locale::pt,
        "nl" | "nl_nl" => &Locale::nl,
        _ => &Locale::en,
    }
}

/// Format a GDP value with grouped thousands and two decimals, e.g. `1,234,567.89`.
pub fn format_gdp(value: f64, locale_tag: &str) -> String {
    if !value.is_finite() {
        return "NA".to_string();
    }
    let locale = map_locale(locale_tag);
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!(
        "{sign}{}{}{:02}",
        (cents / 100).to_formatted_string(locale),
        locale.decimal(),
        cents % 100
    )
}

/// Heuristic: estimate pixel width of text (Plotters has no built-in text measuring).
fn estimate_text_width_px(text: &str, font_px: u32) -> u32 {
    ((text.chars().count() as f32) * (font_px as f32) * 0.60).ceil() as u32
}

/// Truncate to fit `max_px`, ending with a single ellipsis if anything was cut.
fn truncate_to_width(text: &str, font_px: u32, max_px: u32) -> String {
    if estimate_text_width_px(text, font_px) <= max_px {
        return text.to_string();
    }
    let mut out = text.to_string();
    while !out.is_empty() && estimate_text_width_px(&format!("{out}…"), font_px) > max_px {
        out.pop();
    }
    out.push('…');
    out
}

fn draw_err<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> RenderError {
    RenderError::Draw(e.to_string())
}

fn text_style(px: u32, style: FontStyle, color: &'static RGBColor) -> TextStyle<'static> {
    TextStyle::from(FontDesc::new(FontFamily::SansSerif, px as f64, style))
        .pos(Pos::new(HPos::Left, VPos::Top))
        .color(color)
}

fn draw_summary<DB: DrawingBackend, R: Ranked>(
    root: &DrawingArea<DB, Shift>,
    total: usize,
    top: &[&R],
    rendered_at: DateTime<Utc>,
    locale_tag: &str,
) -> Result<(), RenderError> {
    root.fill(&BACKGROUND).map_err(draw_err)?;

    let title = text_style(28, FontStyle::Bold, &INK);
    let body = text_style(22, FontStyle::Normal, &INK);
    let heading = text_style(22, FontStyle::Bold, &INK);
    let row = text_style(20, FontStyle::Normal, &INK);
    let footer = text_style(18, FontStyle::Normal, &MUTED);

    root.draw(&Text::new("Country Summary", (50, 36), title))
        .map_err(draw_err)?;
    root.draw(&Text::new(
        format!("Total Countries: {total}"),
        (50, 100),
        body,
    ))
    .map_err(draw_err)?;
    root.draw(&Text::new(
        format!("Top {TOP_N} Countries by Estimated GDP:"),
        (50, 160),
        heading,
    ))
    .map_err(draw_err)?;

    let bar_x = 70;
    let bar_max_w = (WIDTH as i32) - bar_x - 50;
    let leader = top.first().and_then(|r| r.estimated_gdp()).unwrap_or(0.0);

    if top.is_empty() {
        root.draw(&Text::new(
            "No countries with an estimated GDP",
            (bar_x, 205),
            row.clone(),
        ))
        .map_err(draw_err)?;
    }

    for (i, rec) in top.iter().enumerate() {
        let y = 205 + (i as i32) * 46;
        let gdp = rec.estimated_gdp().unwrap_or(0.0);
        let prefix = format!("{}. ", i + 1);
        let value = format_gdp(gdp, locale_tag);
        // Room left for the name once rank and value are placed.
        let budget = (bar_max_w as u32)
            .saturating_sub(estimate_text_width_px(&format!("{prefix} - {value}"), 20));
        let name = truncate_to_width(rec.name(), 20, budget.max(60));
        root.draw(&Text::new(
            format!("{prefix}{name} - {value}"),
            (bar_x, y),
            row.clone(),
        ))
        .map_err(draw_err)?;

        let w = if leader > 0.0 {
            ((gdp / leader) * bar_max_w as f64).round() as i32
        } else {
            0
        };
        root.draw(&Rectangle::new(
            [(bar_x, y + 26), (bar_x + w.clamp(2, bar_max_w), y + 34)],
            BAR_COLORS[i % TOP_N].filled(),
        ))
        .map_err(draw_err)?;
    }

    root.draw(&Text::new(
        format!("Last Refresh: {}", rendered_at.format("%Y-%m-%d %H:%M:%S UTC")),
        (50, 470),
        footer,
    ))
    .map_err(draw_err)?;
    Ok(())
}

/// A rendered image written and synced to a temp file beside its target, not yet
/// visible to readers. Dropping it removes the temp file.
#[derive(Debug)]
pub struct StagedSummary {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedSummary {
    /// Rename the staged file over the published image.
    pub fn commit(self) -> Result<(), RenderError> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| RenderError::Publish {
                path: target.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

/// Renders the summary and owns its well-known publish location.
#[derive(Debug, Clone)]
pub struct SummaryRenderer {
    path: PathBuf,
    locale: String,
}

impl SummaryRenderer {
    pub fn new<P: Into<PathBuf>>(path: P, locale: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            locale: locale.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the SVG document for `records` in memory.
    pub fn render<R: Ranked>(
        &self,
        records: &[R],
        rendered_at: DateTime<Utc>,
    ) -> Result<String, RenderError> {
        let top = top_by_gdp(records, TOP_N);
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
            draw_summary(&root, records.len(), &top, rendered_at, &self.locale)?;
            root.present().map_err(draw_err)?;
        }
        Ok(svg)
    }

    /// Write `svg` to a synced temp file in the publish directory.
    pub fn stage_svg(&self, svg: &str) -> Result<StagedSummary, RenderError> {
        let publish_err = |source| RenderError::Publish {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(publish_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(publish_err)?;
        tmp.write_all(svg.as_bytes()).map_err(publish_err)?;
        tmp.as_file().sync_all().map_err(publish_err)?;
        Ok(StagedSummary {
            tmp,
            target: self.path.clone(),
        })
    }

    /// Render `records` and stage the result; nothing is published until
    /// [`StagedSummary::commit`].
    pub fn stage<R: Ranked>(
        &self,
        records: &[R],
        rendered_at: DateTime<Utc>,
    ) -> Result<StagedSummary, RenderError> {
        let svg = self.render(records, rendered_at)?;
        self.stage_svg(&svg)
    }

    /// Atomically replace the published image with `svg`.
    pub fn publish(&self, svg: &str) -> Result<(), RenderError> {
        self.stage_svg(svg)?.commit()
    }

    /// Render and publish in one step, stamped with the current time.
    pub fn render_and_publish<R: Ranked>(&self, records: &[R]) -> Result<(), RenderError> {
        self.stage(records, Utc::now())?.commit()
    }

    /// Read the published image; `None` if nothing has been rendered yet.
    pub fn load(&self) -> Result<Option<SummaryArtifact>, RenderError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(SummaryArtifact {
                bytes,
                content_type: CONTENT_TYPE,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RenderError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
