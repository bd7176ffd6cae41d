//! Page content interpretation
//!
//! Walks a page's content stream with enough of the graphics state to place
//! every shown glyph and every drawn image in user space, then assembles the
//! page text that patterns are matched against. Form XObjects are entered with
//! their own matrix and resources, so what they paint is placed like the rest.

use crate::font::{load_fonts, FontInfo};
use crate::geometry::{Matrix, Point, Quad};
use crate::utils::{dict_get, get_name, get_number, get_stream_content, resolve};
use crate::ScanError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::ops::Range;

/// Forms nested deeper than this are not entered.
const MAX_FORM_DEPTH: usize = 16;

/// The content stream an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamRef {
    Page,
    Form(ObjectId),
}

/// One shown character code.
#[derive(Debug, Clone)]
pub struct Glyph {
    /// Unicode text of the code; empty when the code cannot be decoded.
    pub text: String,
    pub quad: Quad,
    pub stream: StreamRef,
    /// Index of the showing operation in its stream's operation list.
    pub op_index: usize,
    /// Index of the string inside a `TJ` array, 0 for the other operators.
    pub element: usize,
    /// Byte range of the code inside that string.
    pub bytes: Range<usize>,
    /// `TJ` adjustment that moves the pen exactly as this glyph did.
    pub adjust: f32,
}

/// An image XObject painted by a `Do` operation.
#[derive(Debug, Clone)]
pub struct ImagePlacement {
    pub name: Vec<u8>,
    pub quad: Quad,
    pub stream: StreamRef,
    pub op_index: usize,
}

/// A Form XObject painted by the page, directly or from another form.
#[derive(Debug, Clone)]
pub struct FormXObject {
    pub id: ObjectId,
    pub operations: Vec<Operation>,
    /// Resources the form was interpreted with: its own, or the painter's.
    pub resources: Dictionary,
    /// Every stream that paints the form, with the resource name it uses.
    pub painted_by: Vec<(StreamRef, Vec<u8>)>,
}

/// Everything a content stream paints.
#[derive(Debug, Clone, Default)]
pub struct Painting {
    pub glyphs: Vec<Glyph>,
    pub images: Vec<ImagePlacement>,
    pub forms: Vec<FormXObject>,
}

impl Painting {
    fn merge(&mut self, other: Painting) {
        self.glyphs.extend(other.glyphs);
        self.images.extend(other.images);
        for form in other.forms {
            self.record_form(form);
        }
    }

    fn record_form(&mut self, form: FormXObject) {
        match self.forms.iter_mut().find(|f| f.id == form.id) {
            Some(known) => {
                for painter in form.painted_by {
                    if !known.painted_by.contains(&painter) {
                        known.painted_by.push(painter);
                    }
                }
            }
            None => self.forms.push(form),
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    font: Option<Vec<u8>>,
    font_size: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            font: None,
            font_size: 0.0,
            rise: 0.0,
        }
    }
}

/// Interpreter over one content stream.
struct Interpreter<'a> {
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    fonts: HashMap<Vec<u8>, FontInfo>,
    xobjects: Option<&'a Dictionary>,
    fallback_font: FontInfo,
    stream: StreamRef,
    /// Forms being painted around this stream, outermost first.
    enclosing: Vec<ObjectId>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    painting: Painting,
}

fn operand(op: &Operation, idx: usize) -> Option<f32> {
    op.operands.get(idx).and_then(get_number)
}

fn matrix_operands(op: &Operation) -> Option<Matrix> {
    Some(Matrix::new(
        operand(op, 0)?,
        operand(op, 1)?,
        operand(op, 2)?,
        operand(op, 3)?,
        operand(op, 4)?,
        operand(op, 5)?,
    ))
}

/// A form's `/Matrix`, identity when absent or malformed.
fn form_matrix(doc: &Document, form: &Stream) -> Matrix {
    let numbers: Vec<f32> = match dict_get(doc, &form.dict, b"Matrix") {
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|v| resolve(doc, v).and_then(get_number))
            .collect(),
        _ => return Matrix::IDENTITY,
    };
    match numbers.as_slice() {
        [a, b, c, d, e, f] => Matrix::new(*a, *b, *c, *d, *e, *f),
        _ => Matrix::IDENTITY,
    }
}

/// Decodes a content stream; blank data yields no operations.
pub(crate) fn decode_operations(data: &[u8]) -> lopdf::Result<Vec<Operation>> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    Content::decode(data).map(|content| content.operations)
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document, resources: Option<&'a Dictionary>, stream: StreamRef) -> Self {
        let xobjects = match resources.and_then(|r| dict_get(doc, r, b"XObject")) {
            Some(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        };
        Self {
            doc,
            resources,
            fonts: load_fonts(doc, resources),
            xobjects,
            fallback_font: FontInfo::default(),
            stream,
            enclosing: Vec::new(),
            state: GraphicsState::default(),
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            painting: Painting::default(),
        }
    }

    fn run(&mut self, operations: &[Operation]) -> Result<(), ScanError> {
        for (op_index, op) in operations.iter().enumerate() {
            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(saved) = self.stack.pop() {
                        self.state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operands(op) {
                        self.state.ctm = m.then(&self.state.ctm);
                    }
                }
                "BT" => {
                    self.tm = Matrix::IDENTITY;
                    self.tlm = Matrix::IDENTITY;
                }
                "Tc" => {
                    if let Some(v) = operand(op, 0) {
                        self.state.char_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some(v) = operand(op, 0) {
                        self.state.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some(v) = operand(op, 0) {
                        self.state.h_scale = v / 100.0;
                    }
                }
                "TL" => {
                    if let Some(v) = operand(op, 0) {
                        self.state.leading = v;
                    }
                }
                "Ts" => {
                    if let Some(v) = operand(op, 0) {
                        self.state.rise = v;
                    }
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.state.font = Some(name.clone());
                    }
                    if let Some(size) = operand(op, 1) {
                        self.state.font_size = size;
                    }
                }
                "Td" | "TD" => {
                    if let (Some(tx), Some(ty)) = (operand(op, 0), operand(op, 1)) {
                        if op.operator == "TD" {
                            self.state.leading = -ty;
                        }
                        self.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_operands(op) {
                        self.tm = m;
                        self.tlm = m;
                    }
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes, op_index, 0);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes, op_index, 0);
                    }
                }
                "\"" => {
                    if let (Some(aw), Some(ac)) = (operand(op, 0), operand(op, 1)) {
                        self.state.word_spacing = aw;
                        self.state.char_spacing = ac;
                    }
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                        self.show(bytes, op_index, 0);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for (element, item) in items.iter().enumerate() {
                            match item {
                                Object::String(bytes, _) => self.show(bytes, op_index, element),
                                other => {
                                    if let Some(n) = get_number(other) {
                                        let tx = -n / 1000.0 * self.state.font_size * self.state.h_scale;
                                        self.tm = Matrix::translate(tx, 0.0).then(&self.tm);
                                    }
                                }
                            }
                        }
                    }
                }
                "Do" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.paint_xobject(name, op_index)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, bytes: &[u8], op_index: usize, element: usize) {
        let font = self
            .state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback_font);

        let fs = self.state.font_size;
        let h = self.state.h_scale;
        let (ascent, descent) = (font.ascent / 1000.0, font.descent / 1000.0);

        for (range, code) in font.codes(bytes) {
            let w0 = font.width(code) / 1000.0;
            let trm = Matrix::new(fs * h, 0.0, 0.0, fs, 0.0, self.state.rise)
                .then(&self.tm)
                .then(&self.state.ctm);
            let quad = Quad {
                ul: trm.apply(Point::new(0.0, ascent)),
                ur: trm.apply(Point::new(w0, ascent)),
                ll: trm.apply(Point::new(0.0, descent)),
                lr: trm.apply(Point::new(w0, descent)),
            };

            let spacing = if font.is_word_space(&bytes[range.clone()]) {
                self.state.char_spacing + self.state.word_spacing
            } else {
                self.state.char_spacing
            };
            let tx = (w0 * fs + spacing) * h;
            let scale = fs * h;
            let adjust = if scale.abs() > f32::EPSILON {
                -tx * 1000.0 / scale
            } else {
                0.0
            };

            self.painting.glyphs.push(Glyph {
                text: font.decode(code),
                quad,
                stream: self.stream,
                op_index,
                element,
                bytes: range,
                adjust,
            });
            self.tm = Matrix::translate(tx, 0.0).then(&self.tm);
        }
    }

    fn paint_xobject(&mut self, name: &[u8], op_index: usize) -> Result<(), ScanError> {
        let entry = self.xobjects.and_then(|x| x.get(name).ok());
        let stream = match entry.and_then(|obj| resolve(self.doc, obj)) {
            Some(Object::Stream(stream)) => stream,
            _ => {
                log::debug!("[Layout] XObject {:?} not found", String::from_utf8_lossy(name));
                return Ok(());
            }
        };

        match get_name(self.doc, &stream.dict, b"Subtype") {
            Some(b"Image") => {
                self.painting.images.push(ImagePlacement {
                    name: name.to_vec(),
                    quad: Quad::unit_square(&self.state.ctm),
                    stream: self.stream,
                    op_index,
                });
                Ok(())
            }
            Some(b"Form") => match entry {
                Some(Object::Reference(id)) => self.paint_form(*id, stream, name),
                _ => {
                    log::warn!("[Layout] direct form stream {:?} skipped", String::from_utf8_lossy(name));
                    Ok(())
                }
            },
            _ => Ok(()),
        }
    }

    fn paint_form(&mut self, id: ObjectId, form: &'a Stream, name: &[u8]) -> Result<(), ScanError> {
        if self.enclosing.contains(&id) || self.enclosing.len() >= MAX_FORM_DEPTH {
            log::warn!("[Layout] form {:?} nested too deep or recursive, not entered", id);
            return Ok(());
        }

        let resources = match dict_get(self.doc, &form.dict, b"Resources") {
            Some(Object::Dictionary(dict)) => Some(dict),
            _ => self.resources,
        };
        let operations = decode_operations(&get_stream_content(form))
            .map_err(|e| ScanError::Content(format!("form {} {}: {}", id.0, id.1, e)))?;

        let mut inner = Interpreter::new(self.doc, resources, StreamRef::Form(id));
        inner.state = self.state.clone();
        inner.state.ctm = form_matrix(self.doc, form).then(&self.state.ctm);
        inner.enclosing = self.enclosing.clone();
        inner.enclosing.push(id);
        inner.run(&operations)?;

        self.painting.merge(inner.painting);
        self.painting.record_form(FormXObject {
            id,
            operations,
            resources: resources.cloned().unwrap_or_default(),
            painted_by: vec![(self.stream, name.to_vec())],
        });
        Ok(())
    }
}

/// Runs the interpreter over a page's decoded operations.
pub fn interpret(
    doc: &Document,
    resources: Option<&Dictionary>,
    operations: &[Operation],
) -> Result<Painting, ScanError> {
    let mut interpreter = Interpreter::new(doc, resources, StreamRef::Page);
    interpreter.run(operations)?;
    Ok(interpreter.painting)
}

/// Page text assembled from glyphs, with a map back from text bytes to glyphs.
#[derive(Debug, Clone, Default)]
pub struct TextLayout {
    pub glyphs: Vec<Glyph>,
    pub text: String,
    glyph_at: Vec<Option<usize>>,
    line_of: Vec<usize>,
}

impl TextLayout {
    pub fn build(glyphs: Vec<Glyph>) -> Self {
        let mut text = String::new();
        let mut glyph_at: Vec<Option<usize>> = Vec::new();
        let mut line_of = Vec::with_capacity(glyphs.len());
        let mut line = 0usize;
        let mut prev: Option<&Glyph> = None;

        for (idx, glyph) in glyphs.iter().enumerate() {
            if let Some(p) = prev {
                match separator(p, glyph) {
                    Some('\n') => {
                        if !text.is_empty() && !text.ends_with('\n') {
                            text.push('\n');
                            glyph_at.push(None);
                        }
                        line += 1;
                    }
                    Some(sep) => {
                        let starts_blank = glyph.text.starts_with(char::is_whitespace);
                        if !text.ends_with(char::is_whitespace) && !starts_blank {
                            text.push(sep);
                            glyph_at.push(None);
                        }
                    }
                    None => {}
                }
            }

            text.push_str(&glyph.text);
            glyph_at.extend(std::iter::repeat(Some(idx)).take(glyph.text.len()));
            line_of.push(line);

            if glyph.quad.width() > 0.0 || glyph.quad.height() > 0.0 {
                prev = Some(glyph);
            }
        }

        Self {
            glyphs,
            text,
            glyph_at,
            line_of,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Quads covering the text byte range `start..end`, one per visual line.
    pub fn quads_for(&self, start: usize, end: usize) -> Vec<Quad> {
        let mut indices: Vec<usize> = self.glyph_at[start.min(self.glyph_at.len())..end.min(self.glyph_at.len())]
            .iter()
            .flatten()
            .copied()
            .collect();
        indices.dedup();

        let mut quads = Vec::new();
        let mut run: Option<(usize, usize)> = None;
        for idx in indices {
            run = match run {
                Some((first, last)) if self.line_of[first] == self.line_of[idx] => Some((first, idx.max(last))),
                Some((first, last)) => {
                    quads.push(self.run_quad(first, last));
                    Some((idx, idx))
                }
                None => Some((idx, idx)),
            };
        }
        if let Some((first, last)) = run {
            quads.push(self.run_quad(first, last));
        }
        quads
    }

    fn run_quad(&self, first: usize, last: usize) -> Quad {
        let a = &self.glyphs[first].quad;
        let b = &self.glyphs[last].quad;
        Quad {
            ul: a.ul,
            ll: a.ll,
            ur: b.ur,
            lr: b.lr,
        }
    }
}

/// Separator implied by the gap between two consecutive glyphs.
fn separator(prev: &Glyph, next: &Glyph) -> Option<char> {
    let height = prev.quad.height().max(1.0);
    let (along, across) = prev.quad.offset_from_end(next.quad.ll);
    let (pd, nd) = (prev.quad.direction(), next.quad.direction());
    let same_direction = pd.x * nd.x + pd.y * nd.y > 0.9;

    if !same_direction || across.abs() > 0.5 * height || along < -height {
        Some('\n')
    } else if along > 0.25 * height {
        Some(' ')
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn layout_of(ops: Vec<Operation>) -> (TextLayout, Vec<ImagePlacement>) {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let image_id = doc.add_object(lopdf::Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0u8],
        ));
        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "Im1" => image_id },
        };
        let painting = interpret(&doc, Some(&resources), &ops).unwrap();
        (TextLayout::build(painting.glyphs), painting.images)
    }

    fn text_ops(x: f32, y: f32, text: &str) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    #[test]
    fn test_glyph_positions_follow_widths() {
        let (layout, _) = layout_of(text_ops(100.0, 700.0, "AB"));
        assert_eq!(layout.text, "AB");
        // Courier: 600/1000 em at 10pt
        let first = layout.glyphs[0].quad.rect();
        let second = layout.glyphs[1].quad.rect();
        assert!((first.x0 - 100.0).abs() < 1e-3);
        assert!((second.x0 - 106.0).abs() < 1e-3);
        assert!((layout.glyphs[0].adjust + 600.0).abs() < 1e-3);
    }

    #[test]
    fn test_lines_are_separated() {
        let mut ops = text_ops(100.0, 700.0, "first");
        ops.extend(text_ops(100.0, 680.0, "second"));
        let (layout, _) = layout_of(ops);
        assert_eq!(layout.text, "first\nsecond");
    }

    #[test]
    fn test_gap_inserts_space() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Project"),
                    Object::Integer(-500),
                    Object::string_literal("Phoenix"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];
        let (layout, _) = layout_of(ops);
        assert_eq!(layout.text, "Project Phoenix");
        assert_eq!(layout.glyphs[7].element, 2);
    }

    #[test]
    fn test_match_spanning_lines_yields_quad_per_line() {
        let mut ops = text_ops(100.0, 700.0, "555-123");
        ops.extend(text_ops(100.0, 680.0, "4567"));
        let (layout, _) = layout_of(ops);
        let quads = layout.quads_for(0, layout.text.len());
        assert_eq!(quads.len(), 2);
    }

    #[test]
    fn test_image_placement_uses_ctm() {
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![50.into(), 0.into(), 0.into(), 40.into(), 200.into(), 300.into()]),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ];
        let (_, images) = layout_of(ops);
        assert_eq!(images.len(), 1);
        let rect = images[0].quad.rect();
        assert_eq!((rect.x0, rect.y0, rect.x1, rect.y1), (200.0, 300.0, 250.0, 340.0));
        assert_eq!(images[0].op_index, 2);
    }

    #[test]
    fn test_form_is_entered_with_its_matrix() {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let form_id = doc.new_object_id();
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Tj", vec![Object::string_literal("AB")]),
                Operation::new("ET", vec![]),
                // painting itself again is ignored
                Operation::new("Do", vec!["Fm1".into()]),
            ],
        };
        doc.objects.insert(
            form_id,
            Object::Stream(lopdf::Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 100.into(), 50.into()],
                    "Resources" => dictionary! {
                        "Font" => dictionary! { "F1" => font_id },
                        "XObject" => dictionary! { "Fm1" => form_id },
                    },
                },
                content.encode().unwrap(),
            )),
        );
        let resources = dictionary! {
            "XObject" => dictionary! { "Fm1" => form_id },
        };
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![2.into(), 0.into(), 0.into(), 2.into(), 0.into(), 0.into()]),
            Operation::new("Do", vec!["Fm1".into()]),
            Operation::new("Q", vec![]),
        ];

        let painting = interpret(&doc, Some(&resources), &ops).unwrap();
        assert_eq!(painting.glyphs.len(), 2);
        assert!((painting.glyphs[0].quad.rect().x0 - 200.0).abs() < 1e-3);
        assert!((painting.glyphs[1].quad.rect().x0 - 212.0).abs() < 1e-3);
        assert_eq!(painting.glyphs[0].stream, StreamRef::Form(form_id));
        assert_eq!(painting.glyphs[0].op_index, 2);
        assert_eq!(painting.forms.len(), 1);
        assert_eq!(painting.forms[0].painted_by, vec![(StreamRef::Page, b"Fm1".to_vec())]);
    }
}
