use crate::checksum::{FieldMatcher, MetadataChecksummer};
use crate::doc::Metadata;

/// Builds a metadata checksum out of selected field values
///
/// The checksum is the plain concatenation of `name=value;` for every
/// non-blank value of the selected fields, in match order. It is compared
/// as-is between sessions, so it stays human readable.
#[derive(Debug, Clone)]
pub struct GenericMetadataChecksummer {
    matcher: FieldMatcher,
}

impl GenericMetadataChecksummer {
    pub fn new(matcher: FieldMatcher) -> Self {
        Self { matcher }
    }
}

impl MetadataChecksummer for GenericMetadataChecksummer {
    fn create_metadata_checksum(&self, metadata: &Metadata) -> Option<String> {
        let mut checksum = String::new();
        for (field, values) in self.matcher.select(metadata) {
            for value in values.iter().filter(|v| !v.trim().is_empty()) {
                checksum.push_str(field);
                checksum.push('=');
                checksum.push_str(value);
                checksum.push(';');
            }
        }

        if checksum.is_empty() {
            None
        } else {
            Some(checksum)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksummer(fields: &[&str]) -> GenericMetadataChecksummer {
        GenericMetadataChecksummer::new(FieldMatcher::from_names(fields.iter().copied()))
    }

    #[test]
    fn test_fields_in_matched_order() {
        let metadata: Metadata = [
            ("field1", "value1"),
            ("field2", "value2"),
            ("field3", "value3"),
        ]
        .into_iter()
        .collect();

        let checksum = checksummer(&["field1", "field2", "field3"]).create_metadata_checksum(&metadata);
        assert_eq!(checksum.as_deref(), Some("field1=value1;field2=value2;field3=value3;"));
    }

    #[test]
    fn test_checksum_is_stable_and_tracks_changes() {
        let summer = checksummer(&["Last-Modified"]);
        let mut metadata: Metadata = [("Last-Modified", "Mon"), ("Other", "x")].into_iter().collect();

        let first = summer.create_metadata_checksum(&metadata);
        assert_eq!(first, summer.create_metadata_checksum(&metadata));

        metadata.set("Other", "y");
        assert_eq!(first, summer.create_metadata_checksum(&metadata));

        metadata.set("Last-Modified", "Tue");
        assert_ne!(first, summer.create_metadata_checksum(&metadata));
    }

    #[test]
    fn test_multi_values_and_blanks() {
        let mut metadata = Metadata::new();
        metadata.add("tags", "a");
        metadata.add("tags", " ");
        metadata.add("tags", "b");

        let checksum = checksummer(&["tags"]).create_metadata_checksum(&metadata);
        assert_eq!(checksum.as_deref(), Some("tags=a;tags=b;"));
    }

    #[test]
    fn test_only_blank_values_yield_none() {
        let metadata: Metadata = [("title", "  ")].into_iter().collect();
        assert_eq!(checksummer(&["title"]).create_metadata_checksum(&metadata), None);
        assert_eq!(checksummer(&["missing"]).create_metadata_checksum(&metadata), None);
    }
}
