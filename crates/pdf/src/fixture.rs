//! Small in-memory PDFs for tests.
//!
//! Pages draw Helvetica text lines from the top-left margin downwards and may
//! place gray image XObjects. Text-only pages inherit their font from the page
//! tree; pages with images carry their own resources. A page built with
//! [`FixturePage::in_form`] paints everything through one Form XObject.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

const LEFT: f32 = 72.0;
const TOP: f32 = 720.0;
const LINE_HEIGHT: f32 = 20.0;
const FONT_SIZE: i64 = 12;

#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    lines: Vec<String>,
    images: Vec<[f32; 4]>,
    in_form: bool,
}

impl FixturePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, text: impl Into<String>) -> Self {
        self.lines.push(text.into());
        self
    }

    /// An image drawn at `(x, y)` with the given size, in points.
    pub fn image(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.images.push([x, y, width, height]);
        self
    }

    /// Moves the page's drawing into a Form XObject named `Fm0`.
    pub fn in_form(mut self) -> Self {
        self.in_form = true;
        self
    }

    fn operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        for (idx, [x, y, w, h]) in self.images.iter().enumerate() {
            ops.push(Operation::new("q", vec![]));
            ops.push(Operation::new(
                "cm",
                vec![
                    Object::Real(*w),
                    0.into(),
                    0.into(),
                    Object::Real(*h),
                    Object::Real(*x),
                    Object::Real(*y),
                ],
            ));
            ops.push(Operation::new("Do", vec![Object::Name(format!("Im{}", idx).into_bytes())]));
            ops.push(Operation::new("Q", vec![]));
        }
        for (idx, line) in self.lines.iter().enumerate() {
            let y = TOP - idx as f32 * LINE_HEIGHT;
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
            ops.push(Operation::new("Td", vec![Object::Real(LEFT), Object::Real(y)]));
            ops.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
            ops.push(Operation::new("ET", vec![]));
        }
        ops
    }
}

fn media_box() -> Vec<Object> {
    vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)]
}

fn encode(operations: Vec<Operation>) -> Vec<u8> {
    Content { operations }.encode().expect("fixture content encodes")
}

#[derive(Debug, Clone, Default)]
pub struct PdfFixture {
    pages: Vec<FixturePage>,
}

impl PdfFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: FixturePage) -> Self {
        self.pages.push(page);
        self
    }

    /// `count` pages carrying the same single line.
    pub fn repeated(count: usize, line: &str) -> Self {
        (0..count).fold(Self::new(), |fixture, _| fixture.page(FixturePage::new().line(line)))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let mut page_dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            };

            let mut xobjects = Dictionary::new();
            for idx in 0..page.images.len() {
                let image_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => 2,
                        "Height" => 2,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    vec![0x00, 0x80, 0x80, 0xFF],
                ));
                xobjects.set(format!("Im{}", idx), image_id);
            }

            let ops = page.operations();
            if page.in_form && !ops.is_empty() {
                let form_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "BBox" => media_box(),
                        "Resources" => dictionary! {
                            "Font" => dictionary! { "F1" => font_id },
                            "XObject" => xobjects,
                        },
                    },
                    encode(ops),
                ));
                let paint = vec![
                    Operation::new("q", vec![]),
                    Operation::new("Do", vec![Object::Name(b"Fm0".to_vec())]),
                    Operation::new("Q", vec![]),
                ];
                page_dict.set("Contents", doc.add_object(Stream::new(dictionary! {}, encode(paint))));
                page_dict.set(
                    "Resources",
                    dictionary! {
                        "XObject" => dictionary! { "Fm0" => form_id },
                    },
                );
            } else {
                if !ops.is_empty() {
                    page_dict.set("Contents", doc.add_object(Stream::new(dictionary! {}, encode(ops))));
                }
                if !page.images.is_empty() {
                    page_dict.set(
                        "Resources",
                        dictionary! {
                            "Font" => dictionary! { "F1" => font_id },
                            "XObject" => xobjects,
                        },
                    );
                }
            }

            kids.push(Object::Reference(doc.add_object(page_dict)));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => media_box(),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("fixture document saves");
        bytes
    }
}
