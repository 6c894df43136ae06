//! PDF encoding of laid-out pages.

use pdf_writer::types::{CidFontType, FontFlags, SystemInfo};
use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str, TextStr};

use crate::config::RendererConfig;

use super::fonts::{FontError, FontFace, FontSet, TrueTypeFont};
use super::layout::{layout, DrawOp, FontWeight, Labels, Page, PageGeometry};
use super::parser::ParsedApplication;

const REGULAR_RESOURCE: Name<'static> = Name(b"F1");
const BOLD_RESOURCE: Name<'static> = Name(b"F2");

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Font(#[from] FontError),
    #[error("the built-in font cannot draw the label characters {missing:?}; set PDF_FONT_PATH to a TrueType font that covers them")]
    UncoveredLabels { missing: Vec<char> },
}

/// Finished document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Renders application letters. Fonts are resolved once, when the renderer is created.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    fonts: FontSet,
    labels: Labels,
    geometry: PageGeometry,
}

impl PdfRenderer {
    pub fn initialize(config: &RendererConfig) -> Result<Self, RenderError> {
        let fonts = match &config.font_path {
            Some(path) => FontSet::load(path, config.bold_font_path.as_deref())?,
            None => {
                tracing::info!("no PDF font configured; using built-in Helvetica");
                FontSet::builtin()
            }
        };
        let labels = Labels::for_language(config.labels);
        let missing = fonts.missing_chars(&labels.captions().concat());
        if !missing.is_empty() {
            return Err(RenderError::UncoveredLabels { missing });
        }
        Ok(Self::new(fonts, labels))
    }

    pub fn new(fonts: FontSet, labels: Labels) -> Self {
        Self {
            fonts,
            labels,
            geometry: PageGeometry::A4,
        }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Parses tagged text and renders it. A blank `title` falls back to the label title.
    pub fn render(&self, text: &str, title: Option<&str>) -> RenderedDocument {
        self.render_parsed(&ParsedApplication::parse(text), title)
    }

    pub fn render_parsed(
        &self,
        application: &ParsedApplication,
        title: Option<&str>,
    ) -> RenderedDocument {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(self.labels.title.as_str());
        let missing = self
            .fonts
            .missing_chars(&format!("{title}\n{}", application.to_tagged_text()));
        if !missing.is_empty() {
            tracing::warn!(?missing, "letter contains characters the configured font cannot draw");
        }
        let pages = layout(application, title, &self.labels, &self.geometry, &self.fonts);
        let page_count = pages.len();
        let bytes = encode(&pages, &self.fonts, &self.geometry, title);

        tracing::debug!(page_count, bytes = bytes.len(), "rendered application PDF");
        RenderedDocument { bytes, page_count }
    }
}

struct RefAllocator(i32);

impl RefAllocator {
    fn next(&mut self) -> Ref {
        self.0 += 1;
        Ref::new(self.0)
    }
}

fn encode(pages: &[Page], fonts: &FontSet, geometry: &PageGeometry, title: &str) -> Vec<u8> {
    let mut refs = RefAllocator(0);
    let catalog_id = refs.next();
    let tree_id = refs.next();
    let info_id = refs.next();

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(tree_id);
    pdf.document_info(info_id)
        .title(TextStr(title))
        .producer(TextStr("veteran-aid"));

    let regular_id = write_font(&mut pdf, &mut refs, &fonts.regular);
    let bold_id = if fonts.shares_embedded_face() {
        regular_id
    } else {
        write_font(&mut pdf, &mut refs, &fonts.bold)
    };

    let page_ids: Vec<(Ref, Ref)> = pages.iter().map(|_| (refs.next(), refs.next())).collect();
    pdf.pages(tree_id)
        .kids(page_ids.iter().map(|(page_id, _)| *page_id))
        .count(page_ids.len() as i32);

    let media_box = Rect::new(0.0, 0.0, geometry.width, geometry.height);
    for (page, (page_id, content_id)) in pages.iter().zip(&page_ids) {
        let mut writer = pdf.page(*page_id);
        writer.media_box(media_box);
        writer.parent(tree_id);
        writer.contents(*content_id);
        writer
            .resources()
            .fonts()
            .pair(REGULAR_RESOURCE, regular_id)
            .pair(BOLD_RESOURCE, bold_id);
        writer.finish();

        let content = page_content(page, fonts);
        pdf.stream(*content_id, &content);
    }

    pdf.finish()
}

fn page_content(page: &Page, fonts: &FontSet) -> Vec<u8> {
    let mut content = Content::new();
    for op in &page.ops {
        match op {
            DrawOp::Text(run) => {
                let resource = match run.weight {
                    FontWeight::Regular => REGULAR_RESOURCE,
                    FontWeight::Bold => BOLD_RESOURCE,
                };
                let encoded = fonts.face(run.weight).encode(&run.text);
                content.begin_text();
                content.set_font(resource, run.size);
                content.next_line(run.x, run.y);
                content.show(Str(&encoded));
                content.end_text();
            }
            DrawOp::Rule(rule) => {
                content.set_line_width(rule.width);
                content.move_to(rule.x1, rule.y);
                content.line_to(rule.x2, rule.y);
                content.stroke();
            }
        }
    }
    content.finish()
}

fn write_font(pdf: &mut Pdf, refs: &mut RefAllocator, face: &FontFace) -> Ref {
    match face {
        FontFace::Builtin(font) => {
            let id = refs.next();
            pdf.type1_font(id)
                .base_font(Name(font.base_font().as_bytes()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            id
        }
        FontFace::TrueType(font) => write_truetype(pdf, refs, font),
    }
}

/// Embeds a TrueType font as a Type0 font whose CIDs are glyph ids.
fn write_truetype(pdf: &mut Pdf, refs: &mut RefAllocator, font: &TrueTypeFont) -> Ref {
    let type0_id = refs.next();
    let cid_id = refs.next();
    let descriptor_id = refs.next();
    let file_id = refs.next();
    let base_font = Name(font.postscript_name.as_bytes());

    pdf.type0_font(type0_id)
        .base_font(base_font)
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_id);

    let mut cid = pdf.cid_font(cid_id);
    cid.subtype(CidFontType::Type2);
    cid.base_font(base_font);
    cid.system_info(SystemInfo {
        registry: Str(b"Adobe"),
        ordering: Str(b"Identity"),
        supplement: 0,
    });
    cid.font_descriptor(descriptor_id);
    cid.cid_to_gid_map_predefined(Name(b"Identity"));
    cid.widths().consecutive(0, font.pdf_widths());
    cid.finish();

    let [x_min, y_min, x_max, y_max] = font.bbox.map(|value| font.to_pdf_units(f32::from(value)));
    pdf.font_descriptor(descriptor_id)
        .name(base_font)
        .flags(FontFlags::NON_SYMBOLIC)
        .bbox(Rect::new(x_min, y_min, x_max, y_max))
        .italic_angle(0.0)
        .ascent(font.to_pdf_units(f32::from(font.ascender)))
        .descent(font.to_pdf_units(f32::from(font.descender)))
        .cap_height(font.to_pdf_units(f32::from(font.cap_height)))
        .stem_v(80.0)
        .font_file2(file_id);

    pdf.stream(file_id, &font.data)
        .pair(Name(b"Length1"), font.data.len() as i32);

    type0_id
}
