use crate::layout::{decode_operations, interpret, FormXObject, ImagePlacement, TextLayout};
use crate::utils::{get_page_content, get_stream_content, page_resources};
use crate::{LoadError, ScanError, SerializeError};
use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};

/// A page read for scanning: decoded operations plus their layout.
///
/// The view is a snapshot; the applicator rewrites the page from these
/// operations, so a view must be used before its page is modified.
#[derive(Debug, Clone)]
pub struct PageView {
    /// 1-based page number
    pub number: u32,
    pub id: ObjectId,
    pub operations: Vec<Operation>,
    pub layout: TextLayout,
    pub images: Vec<ImagePlacement>,
    /// Form XObjects the page paints, at any depth.
    pub forms: Vec<FormXObject>,
}

/// An in-memory PDF owned by one redaction call.
pub struct PdfDocument {
    pub(crate) doc: Document,
    page_ids: Vec<ObjectId>,
    pub(crate) placeholder_font: Option<ObjectId>,
}

impl PdfDocument {
    /// Parses a document from raw bytes.
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        let doc = Document::load_mem(bytes)?;
        if doc.is_encrypted() {
            return Err(LoadError::Encrypted);
        }
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        log::debug!("[Document] loaded {} pages", page_ids.len());

        Ok(Self {
            doc,
            page_ids,
            placeholder_font: None,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Reads the page at 0-based `index`.
    pub fn page(&self, index: usize) -> Result<PageView, ScanError> {
        let id = *self
            .page_ids
            .get(index)
            .ok_or(ScanError::MissingPage(index))?;
        self.doc
            .get_dictionary(id)
            .map_err(|e| ScanError::Malformed(e.to_string()))?;

        let data = get_page_content(&self.doc, id).map_err(ScanError::Malformed)?;
        let operations = decode_operations(&data).map_err(|e| ScanError::Content(e.to_string()))?;

        let resources = page_resources(&self.doc, id);
        let painting = interpret(&self.doc, resources, &operations)?;

        Ok(PageView {
            number: index as u32 + 1,
            id,
            operations,
            layout: TextLayout::build(painting.glyphs),
            images: painting.images,
            forms: painting.forms,
        })
    }

    /// Extractable text of every page, in page order.
    pub fn page_texts(&self) -> Result<Vec<String>, ScanError> {
        (0..self.page_count())
            .map(|idx| self.page(idx).map(|page| page.layout.text))
            .collect()
    }

    /// Decompressed data of every stream object in the document.
    pub fn stream_data(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.doc.objects.values().filter_map(|obj| match obj {
            Object::Stream(stream) => Some(get_stream_content(stream)),
            _ => None,
        })
    }

    /// Serializes the document after dropping unreferenced objects and
    /// compressing streams. Consumes the document.
    pub fn save(mut self) -> Result<Vec<u8>, SerializeError> {
        let pruned = self.doc.prune_objects();
        log::debug!("[Document] pruned {} unreferenced objects", pruned.len());
        self.doc.renumber_objects();
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}
