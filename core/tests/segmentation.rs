// core/tests/segmentation.rs
//
// Integration tests for document segmentation.
//
// Tests cover:
// - Determined prefix followed by attributed composition
// - Interim characters and their prefix
// - Interim bounds checking
// - Custom display-attribute properties
// - Segmentation leaves the document untouched

use imebridge_core::memory::{MemoryDocument, StaticRegistry};
use imebridge_core::reconcile::full_document_range;
use imebridge_core::{
    AccessMode, AttributeClass, AttributeId, CompositionSegmenter, DisplayAttribute,
    DisplayAttributeResolver, EditCookie, Error, PropertyId,
};

fn rw() -> EditCookie {
    EditCookie::new(1, AccessMode::ReadWrite)
}

fn registry() -> StaticRegistry {
    let mut registry = StaticRegistry::new();
    registry.insert(
        AttributeId(7),
        DisplayAttribute {
            class: AttributeClass::TargetConverted,
            ..Default::default()
        },
    );
    registry
}

#[test]
fn test_determined_prefix_then_composition() {
    let doc = MemoryDocument::with_text("ABC");
    doc.compose("漢字", AttributeId(7));

    let registry = registry();
    let resolver = DisplayAttributeResolver::build(&registry);
    let segmenter = CompositionSegmenter::new(&resolver, 256);
    let (full, _) = full_document_range(&doc, rw(), None).unwrap();
    let seg = segmenter.segment(&doc, rw(), &full).unwrap();

    assert_eq!(seg.output.result, "ABC");
    assert_eq!(seg.output.composition, "漢字");
    assert_eq!(seg.output.attributes, vec![AttributeId(7), AttributeId(7)]);
    assert_eq!(seg.finalized.len(), 1);
    assert_eq!((seg.finalized[0].start(), seg.finalized[0].end()), (0, 3));
    assert_eq!(seg.retained, 0);

    // Walking is read-only; erasing is the caller's job.
    assert_eq!(doc.text(), "ABC漢字");
    let again = segmenter.segment(&doc, rw(), &full).unwrap();
    assert_eq!(again.output, seg.output);
}

#[test]
fn test_read_only_walk_retains_determined_text() {
    let doc = MemoryDocument::with_text("ABC");
    doc.compose("漢字", AttributeId(7));

    let registry = registry();
    let resolver = DisplayAttributeResolver::build(&registry);
    let ro = EditCookie::new(2, AccessMode::ReadOnly);
    let (full, _) = full_document_range(&doc, ro, None).unwrap();
    let seg = CompositionSegmenter::new(&resolver, 256)
        .segment(&doc, ro, &full)
        .unwrap();

    assert_eq!(seg.output.result, "");
    assert_eq!(seg.output.composition, "漢字");
    assert!(seg.finalized.is_empty());
    assert_eq!(seg.retained, 3);
}

#[test]
fn test_interim_prefix_is_finalized() {
    let doc = MemoryDocument::with_text("ABCD");
    doc.compose("한", AttributeId::NONE);
    doc.select_interim(4, 5);

    let registry = registry();
    let resolver = DisplayAttributeResolver::build(&registry);
    let (full, total) = full_document_range(&doc, rw(), None).unwrap();
    let interim = doc.range(4, 5);
    let seg = CompositionSegmenter::new(&resolver, 256)
        .segment_interim(&doc, rw(), &full, total, &interim)
        .unwrap();

    assert_eq!(seg.output.result, "ABCD");
    assert_eq!(seg.output.composition, "한");
    assert_eq!(seg.output.cursor, None);
    assert_eq!(seg.finalized.len(), 1);
    assert_eq!(seg.finalized[0].end(), 4);
}

#[test]
fn test_interim_at_document_start_has_no_prefix() {
    let doc = MemoryDocument::new();
    doc.compose("한", AttributeId::NONE);

    let registry = registry();
    let resolver = DisplayAttributeResolver::build(&registry);
    let (full, total) = full_document_range(&doc, rw(), None).unwrap();
    let seg = CompositionSegmenter::new(&resolver, 256)
        .segment_interim(&doc, rw(), &full, total, &doc.range(0, 1))
        .unwrap();

    assert_eq!(seg.output.result, "");
    assert_eq!(seg.output.composition, "한");
    assert!(seg.finalized.is_empty());
}

#[test]
fn test_interim_outside_range_is_rejected() {
    let doc = MemoryDocument::with_text("ABCD");
    let registry = registry();
    let resolver = DisplayAttributeResolver::build(&registry);
    let segmenter = CompositionSegmenter::new(&resolver, 256);

    let err = segmenter
        .segment_interim(&doc, rw(), &doc.range(1, 3), 2, &doc.range(0, 1))
        .unwrap_err();
    assert!(matches!(err, Error::InterimOutOfBounds));

    let err = segmenter
        .segment_interim(&doc, rw(), &doc.range(0, 2), 2, &doc.range(1, 4))
        .unwrap_err();
    assert!(matches!(err, Error::InterimOutOfBounds));
}

#[test]
fn test_interim_without_prefix_text_is_rejected() {
    let doc = MemoryDocument::with_text("AB");
    let registry = registry();
    let resolver = DisplayAttributeResolver::build(&registry);

    let err = CompositionSegmenter::new(&resolver, 256)
        .segment_interim(&doc, rw(), &doc.range(0, 2), 1, &doc.range(1, 2))
        .unwrap_err();
    assert!(matches!(err, Error::EmptyInterimPrefix));
    assert!(err.is_protocol_violation());
}

#[test]
fn test_custom_attribute_property() {
    let custom = PropertyId(40);
    let mut registry = registry();
    registry.add_property(custom);

    let doc = MemoryDocument::new();
    doc.compose("かな", AttributeId::NONE);
    doc.mark(0, 1, custom, 7);

    let resolver = DisplayAttributeResolver::build(&registry);
    let (full, _) = full_document_range(&doc, rw(), None).unwrap();
    let seg = CompositionSegmenter::new(&resolver, 256)
        .segment(&doc, rw(), &full)
        .unwrap();

    assert_eq!(seg.output.composition, "かな");
    assert_eq!(seg.output.attributes, vec![AttributeId(7), AttributeId::NONE]);
    let attrs = resolver.resolve_all(&seg.output.attributes);
    assert_eq!(attrs[0].class, AttributeClass::TargetConverted);
    assert_eq!(attrs[1], DisplayAttribute::default());
}

#[test]
fn test_registry_outage_falls_back_to_plain_composition() {
    let mut registry = registry();
    registry.set_unavailable(true);

    let doc = MemoryDocument::new();
    doc.compose("漢字", AttributeId(7));

    let resolver = DisplayAttributeResolver::build(&registry);
    let (full, _) = full_document_range(&doc, rw(), None).unwrap();
    let seg = CompositionSegmenter::new(&resolver, 256)
        .segment(&doc, rw(), &full)
        .unwrap();
    assert_eq!(seg.output.composition, "漢字");
    assert_eq!(seg.output.attributes, vec![AttributeId::NONE; 2]);
}
