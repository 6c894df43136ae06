//! Font metrics and text encoding for the PDF renderer.
//!
//! Two kinds of faces are supported: the standard Helvetica pair, which needs no font
//! file but only covers WinAnsi text, and a TrueType font read from disk that is embedded
//! with glyph-id encoding so any script it covers (Cyrillic included) renders.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::layout::{FontWeight, TextMeasure};

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("font {path} is not a usable TrueType font")]
    Parse { path: PathBuf },
}

/// One of the two standard Helvetica faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFont {
    Helvetica,
    HelveticaBold,
}

// Advance widths for WinAnsi 0x20..=0x7E, in 1/1000 em.
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

const HELVETICA_BOLD_ASCII: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0..?
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // P.._
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // `..o
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // p..~
];

// Latin-1 letters are measured at a typical lowercase advance.
const LATIN1_ADVANCE: u16 = 556;

impl BuiltinFont {
    pub fn base_font(self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
        }
    }

    fn winansi(ch: char) -> Option<u8> {
        match ch {
            ' '..='~' => Some(ch as u8),
            '\u{00A0}'..='\u{00FF}' => Some(ch as u32 as u8),
            '€' => Some(0x80),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            _ => None,
        }
    }

    /// Maps a character to its WinAnsi code; anything outside the encoding becomes `?`.
    pub fn encode_char(ch: char) -> u8 {
        Self::winansi(ch).unwrap_or(b'?')
    }

    pub fn covers(ch: char) -> bool {
        Self::winansi(ch).is_some()
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        text.chars().map(Self::encode_char).collect()
    }

    fn advance(self, code: u8) -> u16 {
        let bold = self == Self::HelveticaBold;
        match code {
            0x20..=0x7E => {
                let table = if bold {
                    &HELVETICA_BOLD_ASCII
                } else {
                    &HELVETICA_ASCII
                };
                table[(code - 0x20) as usize]
            }
            0x80 | 0x96 => 556,
            0x91 | 0x92 => {
                if bold {
                    278
                } else {
                    222
                }
            }
            0x93 | 0x94 => {
                if bold {
                    500
                } else {
                    333
                }
            }
            0x95 => 350,
            0x97 => 1000,
            0xA0 => 278,
            _ => LATIN1_ADVANCE,
        }
    }

    fn width(self, text: &str, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .map(|ch| u32::from(self.advance(Self::encode_char(ch))))
            .sum();
        units as f32 * size / 1000.0
    }
}

/// A TrueType font loaded into memory with the metrics needed for layout and embedding.
#[derive(Debug)]
pub struct TrueTypeFont {
    pub(crate) postscript_name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) units_per_em: u16,
    pub(crate) ascender: i16,
    pub(crate) descender: i16,
    pub(crate) cap_height: i16,
    pub(crate) bbox: [i16; 4],
    advances: Vec<u16>,
    glyphs: HashMap<char, u16>,
}

impl TrueTypeFont {
    pub fn load(path: &Path) -> Result<Self, FontError> {
        let data = fs::read(path).map_err(|source| FontError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let fallback_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("EmbeddedFont")
            .to_string();
        Self::from_bytes(data, fallback_name).ok_or_else(|| FontError::Parse {
            path: path.to_path_buf(),
        })
    }

    pub fn from_bytes(data: Vec<u8>, fallback_name: String) -> Option<Self> {
        let face = ttf_parser::Face::parse(&data, 0).ok()?;

        let units_per_em = face.units_per_em();
        let advances = (0..face.number_of_glyphs())
            .map(|gid| face.glyph_hor_advance(ttf_parser::GlyphId(gid)).unwrap_or(0))
            .collect();

        let mut glyphs = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|codepoint| {
                    let (Some(ch), Some(glyph)) =
                        (char::from_u32(codepoint), subtable.glyph_index(codepoint))
                    else {
                        return;
                    };
                    glyphs.entry(ch).or_insert(glyph.0);
                });
            }
        }

        let postscript_name = face
            .names()
            .into_iter()
            .filter(|name| name.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .find_map(|name| name.to_string())
            .map(|name| {
                name.chars()
                    .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
                    .collect::<String>()
            })
            .filter(|name| !name.is_empty())
            .unwrap_or(fallback_name);

        let bbox = face.global_bounding_box();
        let ascender = face.ascender();
        let descender = face.descender();
        let cap_height = face.capital_height().unwrap_or(ascender);

        drop(face);
        Some(Self {
            postscript_name,
            units_per_em,
            ascender,
            descender,
            cap_height,
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            advances,
            glyphs,
            data,
        })
    }

    pub fn glyph_count(&self) -> usize {
        self.advances.len()
    }

    pub fn covers(&self, ch: char) -> bool {
        self.glyphs.contains_key(&ch)
    }

    fn glyph(&self, ch: char) -> u16 {
        self.glyphs.get(&ch).copied().unwrap_or(0)
    }

    /// Converts font units to the 1/1000 em text space PDF uses.
    pub(crate) fn to_pdf_units(&self, value: f32) -> f32 {
        value * 1000.0 / f32::from(self.units_per_em.max(1))
    }

    pub(crate) fn pdf_widths(&self) -> impl Iterator<Item = f32> + '_ {
        self.advances
            .iter()
            .map(|advance| self.to_pdf_units(f32::from(*advance)))
    }

    /// Two-byte glyph ids, as expected by an Identity-H encoded font.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        text.chars()
            .flat_map(|ch| self.glyph(ch).to_be_bytes())
            .collect()
    }

    fn width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .map(|ch| {
                let gid = usize::from(self.glyph(ch));
                u32::from(self.advances.get(gid).copied().unwrap_or(0))
            })
            .sum();
        units as f32 * size / f32::from(self.units_per_em.max(1))
    }
}

#[derive(Debug, Clone)]
pub enum FontFace {
    Builtin(BuiltinFont),
    TrueType(Arc<TrueTypeFont>),
}

impl FontFace {
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Builtin(font) => font.encode(text),
            Self::TrueType(font) => font.encode(text),
        }
    }

    pub fn width(&self, text: &str, size: f32) -> f32 {
        match self {
            Self::Builtin(font) => font.width(text, size),
            Self::TrueType(font) => font.width(text, size),
        }
    }

    /// Line breaks and tabs are layout concerns and never reach the page.
    pub fn covers(&self, ch: char) -> bool {
        if ch.is_whitespace() && ch != '\u{00A0}' {
            return true;
        }
        match self {
            Self::Builtin(_) => BuiltinFont::covers(ch),
            Self::TrueType(font) => font.covers(ch),
        }
    }
}

/// Regular and bold faces used by one renderer.
#[derive(Debug, Clone)]
pub struct FontSet {
    pub regular: FontFace,
    pub bold: FontFace,
}

impl FontSet {
    pub fn builtin() -> Self {
        Self {
            regular: FontFace::Builtin(BuiltinFont::Helvetica),
            bold: FontFace::Builtin(BuiltinFont::HelveticaBold),
        }
    }

    /// Loads `regular`, and `bold` when given. Without a bold file the regular face is
    /// reused for headings.
    pub fn load(regular: &Path, bold: Option<&Path>) -> Result<Self, FontError> {
        let regular = Arc::new(TrueTypeFont::load(regular)?);
        let bold = match bold {
            Some(path) => Arc::new(TrueTypeFont::load(path)?),
            None => Arc::clone(&regular),
        };
        tracing::info!(
            regular = %regular.postscript_name,
            bold = %bold.postscript_name,
            glyphs = regular.glyph_count(),
            "loaded PDF fonts"
        );
        Ok(Self {
            regular: FontFace::TrueType(regular),
            bold: FontFace::TrueType(bold),
        })
    }

    pub fn face(&self, weight: FontWeight) -> &FontFace {
        match weight {
            FontWeight::Regular => &self.regular,
            FontWeight::Bold => &self.bold,
        }
    }

    /// Characters of `text` that either face would draw as a substitute, deduplicated in
    /// order of appearance.
    pub fn missing_chars(&self, text: &str) -> Vec<char> {
        let mut missing = Vec::new();
        for ch in text.chars() {
            let drawable = self.regular.covers(ch) && self.bold.covers(ch);
            if !drawable && !missing.contains(&ch) {
                missing.push(ch);
            }
        }
        missing
    }

    /// True when both weights resolve to the same embedded font file.
    pub(crate) fn shares_embedded_face(&self) -> bool {
        matches!(
            (&self.regular, &self.bold),
            (FontFace::TrueType(regular), FontFace::TrueType(bold)) if Arc::ptr_eq(regular, bold)
        )
    }
}

impl TextMeasure for FontSet {
    fn width(&self, text: &str, weight: FontWeight, size: f32) -> f32 {
        self.face(weight).width(text, size)
    }
}
