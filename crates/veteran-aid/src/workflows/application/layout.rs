//! Page layout for application letters.
//!
//! Layout is a pure pass from [`ParsedApplication`] to positioned draw operations; the
//! PDF encoder only replays them. Coordinates are PDF points with the origin at the
//! bottom-left corner, and text `y` is the baseline.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::LabelLanguage;

use super::parser::ParsedApplication;

/// Points per millimetre.
pub const MM: f32 = 72.0 / 25.4;

const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 11.0;
const SMALL_SIZE: f32 = 10.0;

const TITLE_GAP: f32 = 12.0 * MM;
const BLOCK_WIDTH_RATIO: f32 = 0.55;
const BLOCK_LINE: f32 = 5.0 * MM;
const BLOCK_GAP: f32 = 3.0 * MM;
const BLOCKS_SPACER: f32 = 6.0 * MM;

const LINE_HEIGHT: f32 = 6.0 * MM;
const PARAGRAPH_INDENT: f32 = 8.0 * MM;
const PARAGRAPH_GAP: f32 = 3.0 * MM;

const ATTACHMENTS_RESERVE: f32 = 35.0 * MM;
const ATTACHMENT_INDENT: f32 = 6.0 * MM;
const ATTACHMENTS_GAP: f32 = 4.0 * MM;

const SIGNATURE_RESERVE: f32 = 25.0 * MM;
const SIGNATURE_DROP: f32 = 8.0 * MM;
const DATE_RULE_START: f32 = 18.0 * MM;
const DATE_RULE_END: f32 = 70.0 * MM;
const SIGNATURE_LABEL_OFFSET: f32 = 90.0 * MM;
const SIGNATURE_RULE_OFFSET: f32 = 60.0 * MM;
const RULE_DROP: f32 = 1.5 * MM;
const RULE_WIDTH: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

/// Measures rendered text width in points.
pub trait TextMeasure {
    fn width(&self, text: &str, weight: FontWeight, size: f32) -> f32;
}

/// Page size and margins, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
}

impl PageGeometry {
    pub const A4: PageGeometry = PageGeometry {
        width: 595.2756,
        height: 841.8898,
        margin_left: 18.0 * MM,
        margin_right: 18.0 * MM,
        margin_top: 16.0 * MM,
        margin_bottom: 18.0 * MM,
    };

    pub fn usable_width(&self) -> f32 {
        self.width - self.margin_left - self.margin_right
    }

    pub fn right_edge(&self) -> f32 {
        self.width - self.margin_right
    }

    fn first_baseline(&self) -> f32 {
        self.height - self.margin_top
    }
}

/// Fixed captions printed on every letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub title: String,
    pub to: String,
    pub from: String,
    pub attachments: String,
    pub date: String,
    pub signature: String,
}

impl Labels {
    pub fn english() -> Self {
        Self {
            title: "APPLICATION".to_string(),
            to: "To:".to_string(),
            from: "From:".to_string(),
            attachments: "Attachments:".to_string(),
            date: "Date:".to_string(),
            signature: "Signature:".to_string(),
        }
    }

    pub fn ukrainian() -> Self {
        Self {
            title: "ЗАЯВА".to_string(),
            to: "Кому:".to_string(),
            from: "Від:".to_string(),
            attachments: "Додатки:".to_string(),
            date: "Дата:".to_string(),
            signature: "Підпис:".to_string(),
        }
    }

    pub fn captions(&self) -> [&str; 6] {
        [
            self.title.as_str(),
            self.to.as_str(),
            self.from.as_str(),
            self.attachments.as_str(),
            self.date.as_str(),
            self.signature.as_str(),
        ]
    }

    pub fn for_language(language: LabelLanguage) -> Self {
        match language {
            LabelLanguage::English => Self::english(),
            LabelLanguage::Ukrainian => Self::ukrainian(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub weight: FontWeight,
    pub text: String,
}

/// Horizontal line from `x1` to `x2` at height `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub x1: f32,
    pub x2: f32,
    pub y: f32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text(TextRun),
    Rule(Rule),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

impl Page {
    pub fn text_runs(&self) -> impl Iterator<Item = &TextRun> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text(run) => Some(run),
            DrawOp::Rule(_) => None,
        })
    }
}

/// Greedy word wrap. A candidate line is kept while its width is `<= max_width`; a single
/// word wider than the limit is emitted on its own line. Explicit newlines start new
/// lines and whitespace-only source lines come back as empty lines.
pub fn wrap(
    measure: &dyn TextMeasure,
    text: &str,
    weight: FontWeight,
    size: f32,
    max_width: f32,
) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if raw.trim().is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in raw.split(' ') {
            let candidate = if current.is_empty() {
                word.trim().to_string()
            } else {
                format!("{current} {word}").trim().to_string()
            };
            if measure.width(&candidate, weight, size) <= max_width {
                current = candidate;
            } else {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

fn paragraph_break() -> &'static Regex {
    static BREAK: OnceLock<Regex> = OnceLock::new();
    BREAK.get_or_init(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"))
}

/// Body paragraphs: separated by blank lines, trimmed, empty ones dropped.
pub fn paragraphs(body: &str) -> Vec<&str> {
    paragraph_break()
        .split(body)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

struct Cursor<'a> {
    geometry: &'a PageGeometry,
    measure: &'a dyn TextMeasure,
    pages: Vec<Page>,
    y: f32,
}

impl<'a> Cursor<'a> {
    fn new(geometry: &'a PageGeometry, measure: &'a dyn TextMeasure) -> Self {
        Self {
            geometry,
            measure,
            pages: vec![Page::default()],
            y: geometry.first_baseline(),
        }
    }

    /// Starts a new page when the baseline has reached `reserve` above the bottom margin.
    fn ensure_room(&mut self, reserve: f32) {
        if self.y <= self.geometry.margin_bottom + reserve {
            self.pages.push(Page::default());
            self.y = self.geometry.first_baseline();
        }
    }

    fn draw(&mut self, x: f32, weight: FontWeight, size: f32, text: &str) {
        if text.is_empty() {
            return;
        }
        let run = TextRun {
            x,
            y: self.y,
            size,
            weight,
            text: text.to_string(),
        };
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(DrawOp::Text(run));
        }
    }

    fn draw_right(&mut self, weight: FontWeight, size: f32, text: &str) {
        let x = self.geometry.right_edge() - self.measure.width(text, weight, size);
        self.draw(x, weight, size, text);
    }

    fn rule(&mut self, x1: f32, x2: f32) {
        let rule = Rule {
            x1,
            x2,
            y: self.y - RULE_DROP,
            width: RULE_WIDTH,
        };
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(DrawOp::Rule(rule));
        }
    }

    fn title(&mut self, title: &str) {
        let width = self.measure.width(title, FontWeight::Bold, TITLE_SIZE);
        let x = self.geometry.width / 2.0 - width / 2.0;
        self.draw(x, FontWeight::Bold, TITLE_SIZE, title);
        self.y -= TITLE_GAP;
    }

    fn right_block(&mut self, label: &str, content: &str) {
        let block_width = self.geometry.usable_width() * BLOCK_WIDTH_RATIO;

        self.ensure_room(0.0);
        self.draw_right(FontWeight::Bold, SMALL_SIZE, label);
        self.y -= BLOCK_LINE;

        for line in wrap(self.measure, content, FontWeight::Regular, SMALL_SIZE, block_width) {
            self.ensure_room(0.0);
            self.draw_right(FontWeight::Regular, SMALL_SIZE, &line);
            self.y -= BLOCK_LINE;
        }
        self.y -= BLOCK_GAP;
    }

    fn body(&mut self, body: &str) {
        let left = self.geometry.margin_left;
        let width = self.geometry.usable_width() - PARAGRAPH_INDENT;

        for paragraph in paragraphs(body) {
            let lines = wrap(self.measure, paragraph, FontWeight::Regular, BODY_SIZE, width);
            for (index, line) in lines.iter().enumerate() {
                self.ensure_room(0.0);
                let x = if index == 0 { left + PARAGRAPH_INDENT } else { left };
                self.draw(x, FontWeight::Regular, BODY_SIZE, line);
                self.y -= LINE_HEIGHT;
            }
            self.y -= PARAGRAPH_GAP;
        }
    }

    fn attachments(&mut self, heading: &str, items: &[String]) {
        if items.is_empty() {
            return;
        }
        let left = self.geometry.margin_left;
        let width = self.geometry.usable_width() - ATTACHMENT_INDENT;

        self.ensure_room(ATTACHMENTS_RESERVE);
        self.draw(left, FontWeight::Bold, BODY_SIZE, heading);
        self.y -= LINE_HEIGHT;

        for (index, item) in items.iter().enumerate() {
            let numbered = format!("{}. {}", index + 1, item);
            for line in wrap(self.measure, &numbered, FontWeight::Regular, BODY_SIZE, width) {
                self.ensure_room(0.0);
                self.draw(left + ATTACHMENT_INDENT, FontWeight::Regular, BODY_SIZE, &line);
                self.y -= LINE_HEIGHT;
            }
        }
        self.y -= ATTACHMENTS_GAP;
    }

    fn signature(&mut self, date_label: &str, signature_label: &str) {
        let left = self.geometry.margin_left;
        let right = self.geometry.right_edge();

        self.ensure_room(SIGNATURE_RESERVE);
        self.y -= SIGNATURE_DROP;

        self.draw(left, FontWeight::Regular, BODY_SIZE, date_label);
        self.rule(left + DATE_RULE_START, left + DATE_RULE_END);

        self.draw(right - SIGNATURE_LABEL_OFFSET, FontWeight::Regular, BODY_SIZE, signature_label);
        self.rule(right - SIGNATURE_RULE_OFFSET, right);
    }
}

/// Lays out a letter. The result always has at least one page.
pub fn layout(
    application: &ParsedApplication,
    title: &str,
    labels: &Labels,
    geometry: &PageGeometry,
    measure: &dyn TextMeasure,
) -> Vec<Page> {
    let mut cursor = Cursor::new(geometry, measure);

    cursor.title(title);
    cursor.right_block(&labels.to, &application.to);
    cursor.right_block(&labels.from, &application.from);
    cursor.y -= BLOCKS_SPACER;

    cursor.body(&application.body);
    cursor.attachments(&labels.attachments, &application.attachments);
    cursor.signature(&labels.date, &labels.signature);

    cursor.pages
}
