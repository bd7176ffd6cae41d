//! Font metrics and character decoding for text layout.
//!
//! Only what layout needs: code length, advance widths, vertical extent and a
//! best-effort Unicode mapping.

use crate::cmap::ToUnicodeMap;
use crate::utils::{dict_get, get_name, get_number, get_stream_content, resolve, resolve_dict};
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;
use std::ops::Range;

/// Helvetica advance widths for codes 32..=126 (WinAnsi), in 1/1000 em.
pub const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold, same layout.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Times family, same layout.
const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, //
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, //
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500, //
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, //
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

const TIMES_BOLD_WIDTHS: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500, //
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778, //
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500, //
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500, //
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

const TIMES_ITALIC_WIDTHS: [u16; 95] = [
    250, 333, 420, 500, 500, 833, 778, 214, 333, 333, 500, 675, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 675, 675, 675, 500, //
    920, 611, 611, 667, 722, 611, 611, 722, 722, 333, 444, 667, 556, 833, 667, 722, //
    611, 722, 611, 500, 556, 722, 611, 833, 611, 556, 556, 389, 278, 389, 422, 500, //
    333, 500, 500, 444, 500, 444, 278, 500, 500, 278, 278, 444, 278, 722, 500, 500, //
    500, 500, 389, 389, 278, 500, 444, 667, 444, 444, 389, 400, 275, 400, 541,
];

const TIMES_BOLD_ITALIC_WIDTHS: [u16; 95] = [
    250, 389, 555, 500, 500, 833, 778, 278, 333, 333, 500, 570, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500, //
    832, 667, 667, 667, 722, 667, 667, 722, 778, 389, 500, 667, 611, 889, 722, 722, //
    611, 722, 667, 556, 611, 722, 667, 889, 667, 611, 611, 333, 278, 333, 570, 500, //
    333, 500, 500, 444, 500, 444, 333, 500, 556, 278, 278, 500, 278, 778, 556, 500, //
    500, 500, 389, 389, 278, 556, 444, 667, 500, 444, 389, 348, 220, 348, 570,
];

/// WinAnsi code points for 0x80..=0x9F; 0 marks an unused slot.
const WIN_ANSI_HIGH: [u16; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, //
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0, 0x017D, 0, //
    0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, //
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

const DEFAULT_ASCENT: f32 = 800.0;
const DEFAULT_DESCENT: f32 = -200.0;

/// Metrics of the standard 14 fonts when a font omits `/Widths`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StandardMetrics {
    Helvetica,
    HelveticaBold,
    Courier,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
}

impl StandardMetrics {
    /// Matches the base font name, ignoring a subset tag and the usual
    /// metric-compatible aliases. Symbol and ZapfDingbats have no table.
    fn from_base_font(name: &[u8]) -> Option<Self> {
        let name = String::from_utf8_lossy(name);
        let name = match name.split_once('+') {
            Some((tag, rest)) if tag.len() == 6 => rest,
            _ => name.as_ref(),
        };
        let bold = name.contains("Bold") || name.contains("Black") || name.contains("Heavy");
        let italic = name.contains("Italic") || name.contains("Oblique");

        if name.contains("Courier") {
            Some(StandardMetrics::Courier)
        } else if name.contains("Times") {
            Some(match (bold, italic) {
                (false, false) => StandardMetrics::TimesRoman,
                (true, false) => StandardMetrics::TimesBold,
                (false, true) => StandardMetrics::TimesItalic,
                (true, true) => StandardMetrics::TimesBoldItalic,
            })
        } else if name.contains("Helvetica") || name.contains("Arial") {
            Some(if bold {
                StandardMetrics::HelveticaBold
            } else {
                StandardMetrics::Helvetica
            })
        } else {
            None
        }
    }

    fn width(&self, code: u32) -> f32 {
        let (table, fallback) = match self {
            StandardMetrics::Courier => return 600.0,
            StandardMetrics::Helvetica => (&HELVETICA_WIDTHS, 556.0),
            StandardMetrics::HelveticaBold => (&HELVETICA_BOLD_WIDTHS, 556.0),
            StandardMetrics::TimesRoman => (&TIMES_ROMAN_WIDTHS, 500.0),
            StandardMetrics::TimesBold => (&TIMES_BOLD_WIDTHS, 500.0),
            StandardMetrics::TimesItalic => (&TIMES_ITALIC_WIDTHS, 500.0),
            StandardMetrics::TimesBoldItalic => (&TIMES_BOLD_ITALIC_WIDTHS, 500.0),
        };
        match code {
            32..=126 => table[(code - 32) as usize] as f32,
            _ => fallback,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct WidthTable {
    first_char: u32,
    widths: Vec<f32>,
    // CID fonts: explicit per-code widths from /W
    cid_widths: HashMap<u32, f32>,
}

impl WidthTable {
    fn get(&self, code: u32) -> Option<f32> {
        if let Some(w) = self.cid_widths.get(&code) {
            return Some(*w);
        }
        code.checked_sub(self.first_char)
            .and_then(|idx| self.widths.get(idx as usize).copied())
    }
}

/// Layout-relevant view of a font dictionary.
#[derive(Debug, Clone)]
pub struct FontInfo {
    pub two_byte: bool,
    widths: WidthTable,
    default_width: Option<f32>,
    standard: Option<StandardMetrics>,
    to_unicode: Option<ToUnicodeMap>,
    pub ascent: f32,
    pub descent: f32,
}

impl Default for FontInfo {
    fn default() -> Self {
        Self {
            two_byte: false,
            widths: WidthTable::default(),
            default_width: None,
            standard: None,
            to_unicode: None,
            ascent: DEFAULT_ASCENT,
            descent: DEFAULT_DESCENT,
        }
    }
}

impl FontInfo {
    pub fn load(doc: &Document, dict: &Dictionary) -> Self {
        let mut font = FontInfo {
            two_byte: get_name(doc, dict, b"Subtype") == Some(b"Type0".as_slice()),
            ..FontInfo::default()
        };

        if let Some(Object::Stream(stream)) = dict_get(doc, dict, b"ToUnicode") {
            let map = ToUnicodeMap::parse(&get_stream_content(stream));
            if !map.is_empty() {
                font.to_unicode = Some(map);
            }
        }

        let descriptor_owner = if font.two_byte {
            let descendant = match dict_get(doc, dict, b"DescendantFonts") {
                Some(Object::Array(arr)) => arr.first().and_then(|d| resolve_dict(doc, d)),
                _ => None,
            };
            if let Some(cid_font) = descendant {
                font.widths.cid_widths = parse_cid_widths(doc, cid_font);
                font.default_width = Some(
                    dict_get(doc, cid_font, b"DW")
                        .and_then(get_number)
                        .unwrap_or(1000.0),
                );
            }
            descendant
        } else {
            font.widths.first_char = dict_get(doc, dict, b"FirstChar")
                .and_then(get_number)
                .map(|v| v.max(0.0) as u32)
                .unwrap_or(0);
            if let Some(Object::Array(arr)) = dict_get(doc, dict, b"Widths") {
                font.widths.widths = arr
                    .iter()
                    .map(|w| resolve(doc, w).and_then(get_number).unwrap_or(0.0))
                    .collect();
            }
            font.standard = get_name(doc, dict, b"BaseFont").and_then(StandardMetrics::from_base_font);
            Some(dict)
        };

        if let Some(descriptor) = descriptor_owner
            .and_then(|owner| dict_get(doc, owner, b"FontDescriptor"))
            .and_then(|d| match d {
                Object::Dictionary(d) => Some(d),
                _ => None,
            })
        {
            if font.default_width.is_none() {
                font.default_width = dict_get(doc, descriptor, b"MissingWidth")
                    .and_then(get_number)
                    .filter(|w| *w > 0.0);
            }
            let ascent = dict_get(doc, descriptor, b"Ascent").and_then(get_number);
            let descent = dict_get(doc, descriptor, b"Descent").and_then(get_number);
            if let (Some(ascent), Some(descent)) = (ascent, descent) {
                if ascent > 0.0 && descent <= 0.0 {
                    font.ascent = ascent;
                    font.descent = descent;
                }
            }
        }

        if font.widths.widths.is_empty() && font.widths.cid_widths.is_empty() && font.standard.is_none() {
            log::debug!("[Font] no width information, estimating advances");
        }

        font
    }

    /// Splits a string operand into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<(Range<usize>, u32)> {
        let step = if self.two_byte { 2 } else { 1 };
        (0..bytes.len())
            .step_by(step)
            .map(|start| {
                let end = (start + step).min(bytes.len());
                let code = bytes[start..end]
                    .iter()
                    .fold(0u32, |acc, b| (acc << 8) | *b as u32);
                (start..end, code)
            })
            .collect()
    }

    /// Advance width of `code` in glyph space (1/1000 of text space).
    pub fn width(&self, code: u32) -> f32 {
        if let Some(w) = self.widths.get(code) {
            return w;
        }
        if let Some(standard) = self.standard {
            return standard.width(code);
        }
        if let Some(w) = self.default_width {
            return w;
        }
        if code < 128 {
            550.0
        } else {
            1000.0
        }
    }

    /// Word spacing applies to the single-byte code 32 only.
    pub fn is_word_space(&self, bytes: &[u8]) -> bool {
        !self.two_byte && bytes == [b' ']
    }

    pub fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.get(code)) {
            return text.to_string();
        }
        if self.two_byte {
            return '\u{FFFD}'.to_string();
        }
        decode_win_ansi(code as u8).map(String::from).unwrap_or_default()
    }
}

fn decode_win_ansi(byte: u8) -> Option<char> {
    match byte {
        0x20..=0x7E | 0xA0..=0xFF => Some(byte as char),
        0x80..=0x9F => match WIN_ANSI_HIGH[(byte - 0x80) as usize] {
            0 => None,
            cp => char::from_u32(cp as u32),
        },
        b'\t' | b'\n' | b'\r' => Some(' '),
        _ => None,
    }
}

/// Parses a CID font `/W` array: `c [w1 w2 …]` and `cfirst clast w` forms.
fn parse_cid_widths(doc: &Document, cid_font: &Dictionary) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let arr = match dict_get(doc, cid_font, b"W") {
        Some(Object::Array(arr)) => arr,
        _ => return widths,
    };

    let mut i = 0;
    while i < arr.len() {
        let first = match resolve(doc, &arr[i]).and_then(get_number) {
            Some(v) => v as u32,
            None => break,
        };
        match arr.get(i + 1).and_then(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    let Some(code) = u32::try_from(offset).ok().and_then(|o| first.checked_add(o)) else {
                        break;
                    };
                    if let Some(w) = resolve(doc, w).and_then(get_number) {
                        widths.insert(code, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = get_number(last).map(|v| v as u32).unwrap_or(first);
                let w = arr
                    .get(i + 2)
                    .and_then(|o| resolve(doc, o))
                    .and_then(get_number)
                    .unwrap_or(1000.0);
                // guard against absurd ranges in broken files
                for code in first..=last.min(first.saturating_add(0xFFFF)) {
                    widths.insert(code, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Fonts of a resource dictionary keyed by resource name.
pub fn load_fonts(doc: &Document, resources: Option<&Dictionary>) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let font_dict = match resources.and_then(|r| dict_get(doc, r, b"Font")) {
        Some(Object::Dictionary(dict)) => dict,
        _ => return fonts,
    };
    for (name, obj) in font_dict.iter() {
        if let Some(dict) = resolve_dict(doc, obj) {
            fonts.insert(name.clone(), FontInfo::load(doc, dict));
        }
    }
    fonts
}
