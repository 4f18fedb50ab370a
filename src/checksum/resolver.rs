use crate::doc::{DocContext, DocState};
use crate::event::{CrawlerEvent, EventManager, REJECTED_UNMODIFIED};

/// Which of the two checksums is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Metadata,
    Document,
}

impl ChecksumKind {
    fn current<'a>(&self, ctx: &'a DocContext) -> Option<&'a str> {
        match self {
            Self::Metadata => ctx.metadata_checksum.as_deref(),
            Self::Document => ctx.content_checksum.as_deref(),
        }
    }

    fn assign(&self, ctx: &mut DocContext, checksum: String) {
        match self {
            Self::Metadata => ctx.metadata_checksum = Some(checksum),
            Self::Document => ctx.content_checksum = Some(checksum),
        }
    }
}

/// Resolves NEW / MODIFIED / UNMODIFIED from a freshly computed checksum
///
/// `cached` is the record of the same reference from the previous session.
///
/// # Returns
///
/// * `true` - The document may proceed
/// * `false` - The document is unmodified and unmodified documents are rejected
pub fn resolve_checksum(
    ctx: &mut DocContext,
    cached: Option<&DocContext>,
    new_checksum: Option<String>,
    kind: ChecksumKind,
    process_unmodified: bool,
    events: &EventManager,
) -> bool {
    let Some(new_checksum) = new_checksum else {
        // Nothing to compare: keep a good state already resolved, else NEW
        if !ctx.state().map(|s| s.is_good_state()).unwrap_or(false) {
            ctx.set_state(DocState::New);
        }
        return true;
    };

    let previous = cached.and_then(|c| kind.current(c)).map(str::to_string);
    kind.assign(ctx, new_checksum.clone());

    match previous {
        None => {
            ctx.set_state(DocState::New);
            true
        }
        Some(previous) if previous == new_checksum => {
            ctx.set_state(DocState::Unmodified);
            if process_unmodified {
                return true;
            }
            events.fire(
                CrawlerEvent::for_doc(REJECTED_UNMODIFIED, ctx)
                    .with_message(format!("{:?} checksum unchanged: {}", kind, new_checksum)),
            );
            false
        }
        Some(_) => {
            ctx.set_state(DocState::Modified);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn cached_with(checksum: &str) -> DocContext {
        let mut cached = DocContext::new("ref", 0);
        cached.content_checksum = Some(checksum.to_string());
        cached
    }

    fn recording_events() -> (EventManager, Arc<Mutex<Vec<String>>>) {
        let events = EventManager::new();
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = names.clone();
        events.add_listener(move |e| sink.lock().unwrap().push(e.name.clone()));
        (events, names)
    }

    #[test]
    fn test_first_checksum_is_new() {
        let (events, _) = recording_events();
        let mut ctx = DocContext::new("ref", 0);

        assert!(resolve_checksum(&mut ctx, None, Some("abc".into()), ChecksumKind::Document, false, &events));
        assert_eq!(ctx.state(), Some(DocState::New));
        assert_eq!(ctx.content_checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn test_same_checksum_is_unmodified_and_rejected() {
        let (events, names) = recording_events();
        let mut ctx = DocContext::new("ref", 0);
        let cached = cached_with("abc");

        assert!(!resolve_checksum(&mut ctx, Some(&cached), Some("abc".into()), ChecksumKind::Document, false, &events));
        assert_eq!(ctx.state(), Some(DocState::Unmodified));
        assert_eq!(*names.lock().unwrap(), vec![REJECTED_UNMODIFIED.to_string()]);
    }

    #[test]
    fn test_same_checksum_accepted_when_processing_unmodified() {
        let (events, names) = recording_events();
        let mut ctx = DocContext::new("ref", 0);
        let cached = cached_with("abc");

        assert!(resolve_checksum(&mut ctx, Some(&cached), Some("abc".into()), ChecksumKind::Document, true, &events));
        assert_eq!(ctx.state(), Some(DocState::Unmodified));
        assert!(names.lock().unwrap().is_empty());
    }

    #[test]
    fn test_different_checksum_is_modified() {
        let (events, _) = recording_events();
        let mut ctx = DocContext::new("ref", 0);
        let cached = cached_with("abc");

        assert!(resolve_checksum(&mut ctx, Some(&cached), Some("xyz".into()), ChecksumKind::Document, false, &events));
        assert_eq!(ctx.state(), Some(DocState::Modified));
    }

    #[test]
    fn test_metadata_kind_reads_metadata_checksum() {
        let (events, _) = recording_events();
        let mut ctx = DocContext::new("ref", 0);
        // only the content checksum is cached, so metadata is seen for the first time
        let cached = cached_with("abc");

        assert!(resolve_checksum(&mut ctx, Some(&cached), Some("abc".into()), ChecksumKind::Metadata, false, &events));
        assert_eq!(ctx.state(), Some(DocState::New));
        assert_eq!(ctx.metadata_checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn test_no_checksum_preserves_good_state() {
        let (events, _) = recording_events();

        let mut fresh = DocContext::new("ref", 0);
        assert!(resolve_checksum(&mut fresh, None, None, ChecksumKind::Document, false, &events));
        assert_eq!(fresh.state(), Some(DocState::New));

        let mut modified = DocContext::new("ref", 0);
        modified.set_state(DocState::Modified);
        assert!(resolve_checksum(&mut modified, None, None, ChecksumKind::Document, false, &events));
        assert_eq!(modified.state(), Some(DocState::Modified));
    }
}
