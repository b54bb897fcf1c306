//! Uploaded document and the checks applied before it is staged.

use crate::error::PipelineError;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// A file received from the form, owned by the pipeline for one request.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Limits applied to uploads before they reach the analyzer.
#[derive(Debug, Clone, Copy)]
pub struct DocumentPolicy {
    pub max_bytes: usize,
    pub require_pdf: bool,
}

impl UploadedDocument {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reject documents over the size limit or, if required, non-PDF content.
    ///
    /// The type check looks at the leading bytes rather than the declared
    /// media type, browsers are inconsistent about what they send.
    pub fn validate(&self, policy: &DocumentPolicy) -> Result<(), PipelineError> {
        if self.len() > policy.max_bytes {
            return Err(PipelineError::too_large(self.len(), policy.max_bytes));
        }
        if policy.require_pdf && !self.bytes.starts_with(PDF_MAGIC) {
            return Err(PipelineError::unsupported_type(format!(
                "{} is not a PDF file",
                self.file_name
            )));
        }
        Ok(())
    }

    /// Mime type sent to the analyzer along with the staged file.
    pub fn analysis_mime_type(&self) -> &str {
        if self.bytes.starts_with(PDF_MAGIC) || self.media_type.is_empty() {
            "application/pdf"
        } else {
            &self.media_type
        }
    }

    /// Count pages with lopdf. `None` if the file does not parse.
    pub fn page_count(&self) -> Option<usize> {
        use lopdf::Document;
        use std::io::Cursor;

        let doc = Document::load_from(Cursor::new(&self.bytes)).ok()?;
        Some(doc.get_pages().len())
    }
}

/// One-page "Hello World" PDF built with lopdf.
#[cfg(test)]
pub(crate) fn hello_world_pdf() -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 48.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hello World")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
