//! Redaction applicator
//!
//! Removes the glyphs and images covered by a page's regions from its content
//! stream, then paints the fill and placeholder label over each region.

use crate::document::{PageView, PdfDocument};
use crate::font::HELVETICA_WIDTHS;
use crate::geometry::{Point, Quad};
use crate::layout::{Glyph, StreamRef};
use crate::scanner::RegionMatch;
use crate::utils::{page_resources, resolve_dict};
use crate::ApplyError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};
use scrub_rules::{RedactionStyle, Rgb};
use std::collections::{BTreeMap, BTreeSet};

/// Slack, in points, when deciding whether a glyph center lies in a region.
const GLYPH_TOLERANCE: f32 = 0.1;
/// Slack when deciding whether an image placement lies in a region.
const IMAGE_TOLERANCE: f32 = 0.5;
/// Cap height of Helvetica as a fraction of the font size.
const LABEL_CAP_HEIGHT: f32 = 0.718;

/// What one `apply` call removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub regions: usize,
    pub glyphs_removed: usize,
    pub images_removed: usize,
}

fn rg(op: &str, color: Rgb) -> Operation {
    Operation::new(op, color.components().iter().map(|c| Object::Real(*c)).collect())
}

fn point_operands(p: Point) -> Vec<Object> {
    vec![Object::Real(p.x), Object::Real(p.y)]
}

/// The string operand of a `Tj`, `'` or `"` operation.
fn shown_string(op: &Operation) -> Option<&Object> {
    match op.operator.as_str() {
        "Tj" | "'" => op.operands.first(),
        "\"" => op.operands.get(2),
        _ => None,
    }
}

/// Rebuilds a `TJ` array with the removed glyphs replaced by the adjustments
/// that move the pen by the same amount.
fn rewrite_array(items: &[Object], glyphs: &[(&Glyph, bool)]) -> Vec<Object> {
    let mut out = Vec::with_capacity(items.len());

    for (element, item) in items.iter().enumerate() {
        let (bytes, format) = match item {
            Object::String(bytes, format) => (bytes, format),
            other => {
                out.push(other.clone());
                continue;
            }
        };

        let mut shown: Vec<&(&Glyph, bool)> = glyphs.iter().filter(|(g, _)| g.element == element).collect();
        if !shown.iter().any(|(_, removed)| *removed) {
            out.push(item.clone());
            continue;
        }
        shown.sort_by_key(|(g, _)| g.bytes.start);

        let mut kept: Vec<u8> = Vec::new();
        let mut shift = 0.0f32;
        let mut cursor = 0usize;
        let flush = |out: &mut Vec<Object>, kept: &mut Vec<u8>, format: &StringFormat| {
            if !kept.is_empty() {
                out.push(Object::String(std::mem::take(kept), format.clone()));
            }
        };

        for (glyph, removed) in shown {
            if glyph.bytes.start > cursor {
                kept.extend_from_slice(bytes.get(cursor..glyph.bytes.start).unwrap_or(&[]));
            }
            if *removed {
                flush(&mut out, &mut kept, format);
                shift += glyph.adjust;
            } else {
                if shift != 0.0 {
                    out.push(Object::Real(shift));
                    shift = 0.0;
                }
                kept.extend_from_slice(bytes.get(glyph.bytes.clone()).unwrap_or(&[]));
            }
            cursor = cursor.max(glyph.bytes.end);
        }

        if shift != 0.0 {
            out.push(Object::Real(shift));
        }
        if cursor < bytes.len() {
            kept.extend_from_slice(&bytes[cursor..]);
        }
        flush(&mut out, &mut kept, format);
    }
    out
}

/// Replaces one text-showing operation by its rewritten `TJ` form.
fn rewrite_operation(op: &Operation, glyphs: &[(&Glyph, bool)], out: &mut Vec<Operation>) {
    if op.operator == "TJ" {
        if let Some(Object::Array(items)) = op.operands.first() {
            out.push(Operation::new("TJ", vec![Object::Array(rewrite_array(items, glyphs))]));
            return;
        }
    }

    let Some(string) = shown_string(op) else {
        out.push(op.clone());
        return;
    };
    if op.operator == "\"" {
        out.push(Operation::new("Tw", vec![op.operands[0].clone()]));
        out.push(Operation::new("Tc", vec![op.operands[1].clone()]));
    }
    if op.operator != "Tj" {
        out.push(Operation::new("T*", vec![]));
    }
    let items = rewrite_array(std::slice::from_ref(string), glyphs);
    out.push(Operation::new("TJ", vec![Object::Array(items)]));
}

fn placeholder_font() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
        "FirstChar" => 32,
        "LastChar" => 126,
        "Widths" => Object::Array(HELVETICA_WIDTHS.iter().map(|w| Object::Integer(*w as i64)).collect()),
    }
}

/// Placeholder text restricted to what the placeholder font can show.
fn label_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (' '..='~').contains(&c) { c as u8 } else { b'?' })
        .collect()
}

fn label_width(bytes: &[u8]) -> f32 {
    bytes
        .iter()
        .map(|b| HELVETICA_WIDTHS[(*b - 32) as usize] as f32 / 1000.0)
        .sum()
}

/// Fill and label operations for every region, in default user space.
fn overlay(regions: &[RegionMatch], style: &RedactionStyle, font: Option<&[u8]>) -> Vec<Operation> {
    let mut ops = vec![Operation::new("q", vec![]), rg("rg", style.fill_color), rg("RG", style.fill_color)];

    for region in regions {
        let [ll, lr, ur, ul] = region.quad.corners();
        ops.push(Operation::new("m", point_operands(ll)));
        ops.push(Operation::new("l", point_operands(lr)));
        ops.push(Operation::new("l", point_operands(ur)));
        ops.push(Operation::new("l", point_operands(ul)));
        ops.push(Operation::new("h", vec![]));
        ops.push(Operation::new("f", vec![]));
    }

    let label = label_bytes(&style.placeholder_text);
    if let (Some(font), false) = (font, label.is_empty()) {
        let units = label_width(&label);
        for region in regions {
            ops.extend(label_operations(&region.quad, &label, units, font, style.text_color()));
        }
    }

    ops.push(Operation::new("Q", vec![]));
    ops
}

/// The label centered in `quad` and sized to fit it; nothing for regions
/// too small to hold legible text.
fn label_operations(quad: &Quad, label: &[u8], units: f32, font: &[u8], color: Rgb) -> Vec<Operation> {
    let (width, height) = (quad.width(), quad.height());
    if units <= 0.0 {
        return Vec::new();
    }
    let size = (height * 0.8).min(width / units);
    if size < 1.0 {
        return Vec::new();
    }

    let u = quad.direction();
    let n = Point::new(-u.y, u.x);
    let dx = (width - units * size) / 2.0;
    let dy = (height - LABEL_CAP_HEIGHT * size) / 2.0;
    let origin = Point::new(quad.ll.x + u.x * dx + n.x * dy, quad.ll.y + u.y * dx + n.y * dy);

    vec![
        Operation::new("BT", vec![]),
        rg("rg", color),
        Operation::new("Tf", vec![Object::Name(font.to_vec()), Object::Real(size)]),
        Operation::new(
            "Tm",
            vec![
                Object::Real(u.x),
                Object::Real(u.y),
                Object::Real(n.x),
                Object::Real(n.y),
                Object::Real(origin.x),
                Object::Real(origin.y),
            ],
        ),
        Operation::new("Tj", vec![Object::String(label.to_vec(), StringFormat::Literal)]),
        Operation::new("ET", vec![]),
    ]
}

/// Resolves a resource sub-dictionary into an owned, direct copy.
fn owned_subdict(doc: &lopdf::Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    resources
        .get(key)
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .cloned()
        .unwrap_or_default()
}

/// A stream and the index of one of its operations.
type OpKey = (StreamRef, usize);

/// One stream's operations without the removed images and with the covered
/// glyphs taken out of their strings.
fn rewrite_stream(
    stream: StreamRef,
    operations: &[Operation],
    glyphs: &BTreeMap<OpKey, Vec<(&Glyph, bool)>>,
    images: &BTreeMap<OpKey, &[u8]>,
) -> Vec<Operation> {
    let mut out = Vec::with_capacity(operations.len());
    for (idx, op) in operations.iter().enumerate() {
        let key = (stream, idx);
        if images.contains_key(&key) {
            continue;
        }
        match glyphs.get(&key) {
            Some(shown) => rewrite_operation(op, shown, &mut out),
            None => out.push(op.clone()),
        }
    }
    out
}

/// Image names `stream` stops painting once the removed placements are gone.
fn detached_images<'p>(
    stream: StreamRef,
    page: &'p PageView,
    removed: &BTreeMap<OpKey, &'p [u8]>,
) -> BTreeSet<&'p [u8]> {
    let still_drawn: BTreeSet<&[u8]> = page
        .images
        .iter()
        .filter(|image| image.stream == stream && !removed.contains_key(&(image.stream, image.op_index)))
        .map(|image| image.name.as_slice())
        .collect();
    removed
        .iter()
        .filter(|((owner, _), _)| *owner == stream)
        .map(|(_, name)| *name)
        .filter(|name| !still_drawn.contains(name))
        .collect()
}

/// Copy of `resources` without the detached images and with painted forms
/// pointing at their rewritten copies.
fn edit_resources(
    doc: &lopdf::Document,
    resources: &Dictionary,
    detached: &BTreeSet<&[u8]>,
    redirects: &[(&[u8], ObjectId)],
) -> Dictionary {
    let mut resources = resources.clone();
    if detached.is_empty() && redirects.is_empty() {
        return resources;
    }
    let mut xobjects = owned_subdict(doc, &resources, b"XObject");
    for name in detached {
        xobjects.remove(name);
    }
    for (name, id) in redirects {
        xobjects.set(name.to_vec(), Object::Reference(*id));
    }
    resources.set("XObject", Object::Dictionary(xobjects));
    resources
}

/// Forms with removals, plus every form that paints one of them.
fn forms_to_rewrite(page: &PageView, touched: impl Iterator<Item = StreamRef>) -> BTreeSet<ObjectId> {
    let mut dirty: BTreeSet<ObjectId> = touched
        .filter_map(|stream| match stream {
            StreamRef::Form(id) => Some(id),
            StreamRef::Page => None,
        })
        .collect();
    loop {
        let painters: Vec<ObjectId> = page
            .forms
            .iter()
            .filter(|form| dirty.contains(&form.id))
            .flat_map(|form| form.painted_by.iter())
            .filter_map(|(painter, _)| match painter {
                StreamRef::Form(id) if !dirty.contains(id) => Some(*id),
                _ => None,
            })
            .collect();
        if painters.is_empty() {
            return dirty;
        }
        dirty.extend(painters);
    }
}

/// Names under which `painter` paints a rewritten form, with the copy's id.
fn redirects<'p>(
    page: &'p PageView,
    copies: &BTreeMap<ObjectId, ObjectId>,
    painter: StreamRef,
) -> Vec<(&'p [u8], ObjectId)> {
    let mut out = Vec::new();
    for form in &page.forms {
        let Some(copy) = copies.get(&form.id) else {
            continue;
        };
        for (by, name) in &form.painted_by {
            if *by == painter {
                out.push((name.as_slice(), *copy));
            }
        }
    }
    out
}

fn encode(operations: Vec<Operation>) -> Result<Vec<u8>, ApplyError> {
    Content { operations }
        .encode()
        .map_err(|e| ApplyError::Content(e.to_string()))
}

impl PdfDocument {
    /// Commits every region of one page.
    ///
    /// Covered glyphs and images are removed from the content stream and
    /// from the Form XObjects it paints, which are replaced by page-local
    /// copies. The page content is then wrapped in `q … Q` and followed by
    /// the fill and label of each region. The document is only modified once
    /// all new content has been encoded, so a failure leaves it untouched.
    pub fn apply(
        &mut self,
        page: &PageView,
        regions: &[RegionMatch],
        style: &RedactionStyle,
    ) -> Result<ApplyReport, ApplyError> {
        if regions.is_empty() {
            return Ok(ApplyReport::default());
        }
        if regions.iter().any(|r| !r.quad.is_finite()) {
            return Err(ApplyError::InvalidRegion);
        }
        self.doc
            .get_dictionary(page.id)
            .map_err(|e| ApplyError::Malformed(e.to_string()))?;

        // Glyphs grouped by the operation that shows them, flagged for removal.
        let mut by_op: BTreeMap<OpKey, Vec<(&Glyph, bool)>> = BTreeMap::new();
        let mut glyphs_removed = 0;
        for glyph in &page.layout.glyphs {
            let center = glyph.quad.center();
            let removed = regions.iter().any(|r| r.quad.contains(center, GLYPH_TOLERANCE));
            if removed {
                glyphs_removed += 1;
            }
            by_op
                .entry((glyph.stream, glyph.op_index))
                .or_default()
                .push((glyph, removed));
        }
        by_op.retain(|_, glyphs| glyphs.iter().any(|(_, removed)| *removed));

        let removed_images: BTreeMap<OpKey, &[u8]> = page
            .images
            .iter()
            .filter(|image| regions.iter().any(|r| r.quad.contains_quad(&image.quad, IMAGE_TOLERANCE)))
            .map(|image| ((image.stream, image.op_index), image.name.as_slice()))
            .collect();

        let dirty = forms_to_rewrite(
            page,
            by_op.keys().chain(removed_images.keys()).map(|(stream, _)| *stream),
        );
        let mut rewritten = Vec::with_capacity(dirty.len());
        for form in page.forms.iter().filter(|form| dirty.contains(&form.id)) {
            let stream = StreamRef::Form(form.id);
            let encoded = encode(rewrite_stream(stream, &form.operations, &by_op, &removed_images))?;
            let dict = match self.doc.get_object(form.id) {
                Ok(Object::Stream(original)) => original.dict.clone(),
                _ => {
                    return Err(ApplyError::Malformed(format!(
                        "form {} {} is not a stream",
                        form.id.0, form.id.1
                    )))
                }
            };
            rewritten.push((form, dict, encoded));
        }

        let base_resources = page_resources(&self.doc, page.id).cloned().unwrap_or_default();
        let label_font = if style.placeholder_text.is_empty() {
            None
        } else {
            let fonts = owned_subdict(&self.doc, &base_resources, b"Font");
            let mut n = 0;
            let name = loop {
                let candidate = format!("ScrubF{}", n);
                if !fonts.has(candidate.as_bytes()) {
                    break candidate.into_bytes();
                }
                n += 1;
            };
            Some(name)
        };

        let mut operations = Vec::with_capacity(page.operations.len() + 2);
        operations.push(Operation::new("q", vec![]));
        operations.extend(rewrite_stream(StreamRef::Page, &page.operations, &by_op, &removed_images));
        operations.push(Operation::new("Q", vec![]));
        operations.extend(overlay(regions, style, label_font.as_deref()));
        let encoded = encode(operations)?;

        // Everything that can fail is done; build the new objects and commit.
        let copies: BTreeMap<ObjectId, ObjectId> = rewritten
            .iter()
            .map(|(form, _, _)| (form.id, self.doc.new_object_id()))
            .collect();
        let mut form_objects = Vec::with_capacity(rewritten.len());
        for (form, mut dict, content) in rewritten {
            let Some(copy) = copies.get(&form.id).copied() else {
                continue;
            };
            let stream = StreamRef::Form(form.id);
            let resources = edit_resources(
                &self.doc,
                &form.resources,
                &detached_images(stream, page, &removed_images),
                &redirects(page, &copies, stream),
            );
            dict.remove(b"Filter");
            dict.remove(b"DecodeParms");
            dict.remove(b"Length");
            dict.set("Resources", Object::Dictionary(resources));
            form_objects.push((copy, Stream::new(dict, content)));
        }

        let mut resources = edit_resources(
            &self.doc,
            &base_resources,
            &detached_images(StreamRef::Page, page, &removed_images),
            &redirects(page, &copies, StreamRef::Page),
        );
        if let Some(name) = &label_font {
            let font_id = match self.placeholder_font {
                Some(id) => id,
                None => {
                    let id = self.doc.add_object(Object::Dictionary(placeholder_font()));
                    self.placeholder_font = Some(id);
                    id
                }
            };
            let mut fonts = owned_subdict(&self.doc, &resources, b"Font");
            fonts.set(name.clone(), Object::Reference(font_id));
            resources.set("Font", Object::Dictionary(fonts));
        }

        let forms_rewritten = form_objects.len();
        for (id, stream) in form_objects {
            self.doc.objects.insert(id, Object::Stream(stream));
        }
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_dict = self
            .doc
            .get_object_mut(page.id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| ApplyError::Malformed(e.to_string()))?;
        page_dict.set("Contents", Object::Reference(content_id));
        page_dict.set("Resources", Object::Dictionary(resources));

        let report = ApplyReport {
            regions: regions.len(),
            glyphs_removed,
            images_removed: removed_images.len(),
        };
        log::info!(
            "[Applicator] page {}: {} regions, {} glyphs and {} images removed, {} forms rewritten",
            page.number,
            report.regions,
            report.glyphs_removed,
            report.images_removed,
            forms_rewritten
        );
        Ok(report)
    }
}
