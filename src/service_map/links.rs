//! Derives directed edges from parent/child span pairs.

use crate::core::{Result, Span, SpanId};
use crate::service_map::classifier::SpanClass;
use crate::service_map::model::{Link, LinkMap};
use ahash::AHashMap;

/// Builds the link map.
///
/// `classes[i]` must be the classification of `spans[i]`. Spans whose parent
/// is not part of the input produce no edge, and parent/child pairs that
/// resolve to the same node (client/server halves of one call) are skipped.
pub fn build_links(spans: &[Span], classes: &[SpanClass]) -> Result<LinkMap> {
    let mut links = LinkMap::new();

    // Later spans with a duplicated id win, matching a plain map rebuild
    let mut spans_by_id: AHashMap<&SpanId, usize> = AHashMap::with_capacity(spans.len());
    for (position, span) in spans.iter().enumerate() {
        spans_by_id.insert(&span.span_id, position);
    }

    for (span, child) in spans.iter().zip(classes) {
        let Some(parent_id) = &span.parent_span_id else {
            continue;
        };
        let Some(&parent_position) = spans_by_id.get(parent_id) else {
            continue;
        };
        let parent = &classes[parent_position];
        if parent.id == child.id {
            continue;
        }

        let key = (parent.id.clone(), child.id.clone());
        let (link, created) =
            links.get_or_try_insert_with(key, || Link::new(parent.id.clone(), child.id.clone()))?;
        if !created {
            link.record();
        }
    }

    Ok(links)
}
