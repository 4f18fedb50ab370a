use crate::checksum::{DocumentChecksummer, FieldMatcher};
use crate::doc::Document;
use md5::{Digest, Md5};

/// MD5 checksum over the document content and/or selected fields
///
/// With both fields and content enabled, the field hash and the content hash
/// are kept independent (`fields|content`) unless `combine_fields_and_content`
/// is set, in which case a single hash covers both.
#[derive(Debug, Clone)]
pub struct Md5DocumentChecksummer {
    matcher: FieldMatcher,
    content: bool,
    combine_fields_and_content: bool,
}

impl Md5DocumentChecksummer {
    pub fn new(matcher: FieldMatcher, content: bool, combine_fields_and_content: bool) -> Self {
        Self {
            matcher,
            content,
            combine_fields_and_content,
        }
    }

    /// Checksums the content only
    pub fn content_only() -> Self {
        Self::new(FieldMatcher::default(), true, false)
    }

    fn fields_string(&self, document: &Document) -> Option<String> {
        let mut out = String::new();
        for (field, values) in self.matcher.select(&document.metadata) {
            for value in values {
                out.push_str(field);
                out.push('=');
                out.push_str(value);
                out.push(';');
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

impl DocumentChecksummer for Md5DocumentChecksummer {
    fn create_document_checksum(&self, document: &Document) -> Option<String> {
        let fields = self.fields_string(document);

        match (fields, self.content) {
            (None, false) => None,
            (None, true) => Some(hex::encode(Md5::digest(&document.content))),
            (Some(fields), false) => Some(hex::encode(Md5::digest(fields.as_bytes()))),
            (Some(fields), true) if self.combine_fields_and_content => {
                let mut hasher = Md5::new();
                hasher.update(fields.as_bytes());
                hasher.update(&document.content);
                Some(hex::encode(hasher.finalize()))
            }
            (Some(fields), true) => Some(format!(
                "{}|{}",
                hex::encode(Md5::digest(fields.as_bytes())),
                hex::encode(Md5::digest(&document.content))
            )),
        }
    }
}
