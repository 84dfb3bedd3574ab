//! In-memory text-services host.
//!
//! [`MemoryDocument`] is a shared character buffer with property layers,
//! a selection, and an edit log. [`MemoryTextServices`] grants synchronous
//! sessions at once and queues asynchronous ones until the host pumps them.
//! Together with [`StaticRegistry`] and [`RecordingArea`] they let the
//! controller run without a platform input framework, which is what the
//! tests and the replay tool do.

use crate::attributes::{AttributeId, AttributeRegistry, DisplayAttribute};
use crate::context::{
    AccessMode, EditCookie, EditRecord, PropertyId, PropertySpan, Selection, TextContext,
};
use crate::conversion::ConversionArea;
use crate::error::{Error, Result};
use crate::range::{Anchor, Halt, TextRange};
use crate::session::{SessionGrant, SessionKind, TextServices, Urgency};
use ahash::AHashMap;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct SelectionState {
    start: usize,
    end: usize,
    active_end: Anchor,
    interim: bool,
}

/// A changed span; `property` is `None` for text changes.
#[derive(Debug, Clone, Copy)]
struct Change {
    start: usize,
    end: usize,
    property: Option<PropertyId>,
}

/// Moves a position across the replacement of `start..end` by `inserted`
/// characters.
fn adjust(pos: usize, start: usize, end: usize, inserted: usize) -> usize {
    if pos <= start {
        pos
    } else if pos >= end {
        pos - (end - start) + inserted
    } else {
        start
    }
}

#[derive(Debug, Default)]
struct Buffer {
    text: Vec<char>,
    properties: BTreeMap<PropertyId, Vec<u32>>,
    selection: Option<SelectionState>,
    selection_changed: bool,
    changes: Vec<Change>,
    writes_left: Option<usize>,
}

impl Buffer {
    fn len(&self) -> usize {
        self.text.len()
    }

    fn clamp(&self, start: usize, end: usize) -> (usize, usize) {
        let end = end.min(self.len());
        (start.min(end), end)
    }

    fn value(&self, id: PropertyId, pos: usize) -> u32 {
        self.properties
            .get(&id)
            .and_then(|layer| layer.get(pos))
            .copied()
            .unwrap_or(0)
    }

    fn replace(&mut self, start: usize, end: usize, text: &str) -> usize {
        let (start, end) = self.clamp(start, end);
        let chars: Vec<char> = text.chars().collect();
        let inserted = chars.len();

        self.text.splice(start..end, chars);
        for layer in self.properties.values_mut() {
            layer.splice(start..end, std::iter::repeat(0).take(inserted));
        }
        if let Some(sel) = self.selection.as_mut() {
            sel.start = adjust(sel.start, start, end, inserted);
            sel.end = adjust(sel.end, start, end, inserted);
        }
        for change in &mut self.changes {
            change.start = adjust(change.start, start, end, inserted);
            change.end = adjust(change.end, start, end, inserted);
        }
        self.changes.push(Change {
            start,
            end: start + inserted,
            property: None,
        });
        inserted
    }

    fn set_values(&mut self, id: PropertyId, start: usize, end: usize, value: u32) {
        let (start, end) = self.clamp(start, end);
        let len = self.len();
        let layer = self.properties.entry(id).or_insert_with(|| vec![0; len]);
        let mut changed = false;
        for slot in &mut layer[start..end] {
            if *slot != value {
                *slot = value;
                changed = true;
            }
        }
        if changed {
            self.changes.push(Change {
                start,
                end,
                property: Some(id),
            });
        }
    }

    fn set_selection(&mut self, selection: Option<SelectionState>) {
        self.selection = selection;
        self.selection_changed = true;
    }
}

/// Shared in-memory document.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    inner: Rc<RefCell<Buffer>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document holding plain, already determined text.
    pub fn with_text(text: &str) -> Self {
        let doc = Self::new();
        doc.push_str(text);
        doc.inner.borrow_mut().changes.clear();
        doc
    }

    pub fn text(&self) -> String {
        self.inner.borrow().text.iter().collect()
    }

    /// Lets `writes` more range edits through and refuses the rest. `None`
    /// lifts the limit.
    pub fn fail_writes_after(&self, writes: Option<usize>) {
        self.inner.borrow_mut().writes_left = writes;
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts plain text at `at` (clamped to the document length).
    pub fn insert(&self, at: usize, text: &str) {
        self.inner.borrow_mut().replace(at, at, text);
    }

    pub fn push_str(&self, text: &str) {
        let len = self.len();
        self.insert(len, text);
    }

    pub fn replace(&self, start: usize, end: usize, text: &str) {
        self.inner.borrow_mut().replace(start, end, text);
    }

    /// Appends text an input method is still composing and puts the caret
    /// after it.
    pub fn compose(&self, text: &str, attribute: AttributeId) {
        let mut buf = self.inner.borrow_mut();
        let start = buf.len();
        let end = start + buf.replace(start, start, text);
        buf.set_values(PropertyId::COMPOSING, start, end, 1);
        if !attribute.is_none() {
            buf.set_values(PropertyId::ATTRIBUTE, start, end, attribute.0);
        }
        buf.set_selection(Some(SelectionState {
            start: end,
            end,
            active_end: Anchor::End,
            interim: false,
        }));
    }

    /// Sets a property over `start..end` as the runtime would.
    pub fn mark(&self, start: usize, end: usize, id: PropertyId, value: u32) {
        self.inner.borrow_mut().set_values(id, start, end, value);
    }

    /// Clears the composing flag, turning the span into determined text.
    pub fn determine(&self, start: usize, end: usize) {
        self.mark(start, end, PropertyId::COMPOSING, 0);
    }

    pub fn value_at(&self, pos: usize, id: PropertyId) -> u32 {
        self.inner.borrow().value(id, pos)
    }

    pub fn select(&self, start: usize, end: usize) {
        self.set_selection(start, end, Anchor::End, false);
    }

    /// Selects `start..end` as an interim character.
    pub fn select_interim(&self, start: usize, end: usize) {
        self.set_selection(start, end, Anchor::End, true);
    }

    pub fn set_selection(&self, start: usize, end: usize, active_end: Anchor, interim: bool) {
        let mut buf = self.inner.borrow_mut();
        let (start, end) = buf.clamp(start, end);
        buf.set_selection(Some(SelectionState {
            start,
            end,
            active_end,
            interim,
        }));
    }

    pub fn clear_selection(&self) {
        self.inner.borrow_mut().set_selection(None);
    }

    /// Selection bounds, if any.
    pub fn selection_bounds(&self) -> Option<(usize, usize)> {
        self.inner.borrow().selection.map(|sel| (sel.start, sel.end))
    }

    pub fn range(&self, start: usize, end: usize) -> MemoryRange {
        let (start, end) = self.inner.borrow().clamp(start, end);
        MemoryRange {
            document: self.clone(),
            start,
            end,
        }
    }

    /// Hands out and resets everything changed since the last call.
    pub fn take_edit_record(&self) -> MemoryEditRecord {
        let mut buf = self.inner.borrow_mut();
        MemoryEditRecord {
            document: self.clone(),
            selection_changed: std::mem::take(&mut buf.selection_changed),
            changes: std::mem::take(&mut buf.changes),
        }
    }
}

impl TextContext for MemoryDocument {
    type Range = MemoryRange;

    fn start(&self, _ec: EditCookie) -> Result<MemoryRange> {
        Ok(self.range(0, 0))
    }

    fn selection(&self, _ec: EditCookie) -> Result<Option<Selection<MemoryRange>>> {
        let selection = self.inner.borrow().selection;
        Ok(selection.map(|sel| Selection {
            range: self.range(sel.start, sel.end),
            active_end: sel.active_end,
            interim: sel.interim,
        }))
    }

    fn property_spans(
        &self,
        _ec: EditCookie,
        ids: &[PropertyId],
        within: &MemoryRange,
    ) -> Result<Vec<PropertySpan<MemoryRange>>> {
        let buf = self.inner.borrow();
        let (start, end) = buf.clamp(within.start, within.end);
        let key = |pos: usize| -> Vec<u32> { ids.iter().map(|id| buf.value(*id, pos)).collect() };

        let mut spans = Vec::new();
        let mut span_start = start;
        while span_start < end {
            let values = key(span_start);
            let mut span_end = span_start + 1;
            while span_end < end && key(span_end) == values {
                span_end += 1;
            }
            spans.push(PropertySpan {
                range: self.range(span_start, span_end),
                values: ids
                    .iter()
                    .copied()
                    .zip(values)
                    .filter(|(_, value)| *value != 0)
                    .collect(),
            });
            span_start = span_end;
        }
        Ok(spans)
    }

    fn property_ranges(
        &self,
        _ec: EditCookie,
        id: PropertyId,
        within: Option<&MemoryRange>,
    ) -> Result<Vec<(MemoryRange, u32)>> {
        let buf = self.inner.borrow();
        let (start, end) = match within {
            Some(range) => buf.clamp(range.start, range.end),
            None => (0, buf.len()),
        };

        let mut runs = Vec::new();
        let mut pos = start;
        while pos < end {
            let value = buf.value(id, pos);
            let mut run_end = pos + 1;
            while run_end < end && buf.value(id, run_end) == value {
                run_end += 1;
            }
            if value != 0 {
                runs.push((self.range(pos, run_end), value));
            }
            pos = run_end;
        }
        Ok(runs)
    }

    fn set_property(
        &self,
        ec: EditCookie,
        id: PropertyId,
        range: &MemoryRange,
        value: u32,
    ) -> Result<()> {
        ec.require_write()?;
        self.inner
            .borrow_mut()
            .set_values(id, range.start, range.end, value);
        Ok(())
    }

    fn clear_property(&self, ec: EditCookie, id: PropertyId, range: &MemoryRange) -> Result<()> {
        self.set_property(ec, id, range, 0)
    }
}

/// Range over a [`MemoryDocument`], in character offsets.
#[derive(Debug, Clone)]
pub struct MemoryRange {
    document: MemoryDocument,
    start: usize,
    end: usize,
}

impl MemoryRange {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    fn position(&self, anchor: Anchor) -> usize {
        match anchor {
            Anchor::Start => self.start,
            Anchor::End => self.end,
        }
    }

    fn limit(&self) -> usize {
        self.document.len()
    }
}

fn shifted(pos: usize, count: isize, limit: usize, halt: Option<usize>) -> usize {
    let pos = pos.min(limit);
    let target = (pos as isize).saturating_add(count).clamp(0, limit as isize) as usize;
    match halt {
        Some(h) if count > 0 && h >= pos && h < target => h,
        Some(h) if count < 0 && h <= pos && h > target => h,
        _ => target,
    }
}

impl TextRange for MemoryRange {
    fn shift_start(
        &mut self,
        _ec: EditCookie,
        count: isize,
        halt: Option<Halt<'_, Self>>,
    ) -> Result<isize> {
        let before = self.start.min(self.limit());
        let halt = halt.map(|h| h.range.position(h.anchor));
        self.start = shifted(before, count, self.limit(), halt);
        if self.start > self.end {
            self.end = self.start;
        }
        Ok(self.start as isize - before as isize)
    }

    fn shift_end(
        &mut self,
        _ec: EditCookie,
        count: isize,
        halt: Option<Halt<'_, Self>>,
    ) -> Result<isize> {
        let before = self.end.min(self.limit());
        let halt = halt.map(|h| h.range.position(h.anchor));
        self.end = shifted(before, count, self.limit(), halt);
        if self.end < self.start {
            self.start = self.end;
        }
        Ok(self.end as isize - before as isize)
    }

    fn shift_start_to(&mut self, _ec: EditCookie, other: &Self, anchor: Anchor) -> Result<()> {
        self.start = other.position(anchor);
        if self.start > self.end {
            self.end = self.start;
        }
        Ok(())
    }

    fn shift_end_to(&mut self, _ec: EditCookie, other: &Self, anchor: Anchor) -> Result<()> {
        self.end = other.position(anchor);
        if self.end < self.start {
            self.start = self.end;
        }
        Ok(())
    }

    fn compare_start(&self, _ec: EditCookie, other: &Self, anchor: Anchor) -> Result<Ordering> {
        Ok(self.start.cmp(&other.position(anchor)))
    }

    fn compare_end(&self, _ec: EditCookie, other: &Self, anchor: Anchor) -> Result<Ordering> {
        Ok(self.end.cmp(&other.position(anchor)))
    }

    fn text(&self, _ec: EditCookie) -> Result<String> {
        let buf = self.document.inner.borrow();
        let (start, end) = buf.clamp(self.start, self.end);
        Ok(buf.text[start..end].iter().collect())
    }

    fn take_text(&mut self, _ec: EditCookie, max_chars: usize) -> Result<String> {
        let buf = self.document.inner.borrow();
        let (start, end) = buf.clamp(self.start, self.end);
        let stop = end.min(start.saturating_add(max_chars));
        let text = buf.text[start..stop].iter().collect();
        self.start = stop;
        Ok(text)
    }

    fn set_text(&mut self, ec: EditCookie, text: &str) -> Result<()> {
        ec.require_write()?;
        let mut buf = self.document.inner.borrow_mut();
        match buf.writes_left.as_mut() {
            Some(0) => return Err(Error::environment("document refused the edit")),
            Some(left) => *left -= 1,
            None => {}
        }
        let (start, end) = buf.clamp(self.start, self.end);
        trace!(start, end, len = text.len(), "replacing document text");
        let inserted = buf.replace(start, end, text);
        self.start = start;
        self.end = start + inserted;
        Ok(())
    }

    fn is_empty(&self, _ec: EditCookie) -> Result<bool> {
        let (start, end) = self.document.inner.borrow().clamp(self.start, self.end);
        Ok(start == end)
    }

    fn collapse(&mut self, _ec: EditCookie, anchor: Anchor) -> Result<()> {
        let pos = self.position(anchor);
        self.start = pos;
        self.end = pos;
        Ok(())
    }
}

/// Edit record captured from a [`MemoryDocument`].
#[derive(Debug, Clone)]
pub struct MemoryEditRecord {
    document: MemoryDocument,
    selection_changed: bool,
    changes: Vec<Change>,
}

impl MemoryEditRecord {
    /// A record reporting only a moved selection.
    pub fn selection_moved(document: &MemoryDocument) -> Self {
        Self {
            document: document.clone(),
            selection_changed: true,
            changes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.selection_changed && self.changes.is_empty()
    }
}

impl EditRecord<MemoryRange> for MemoryEditRecord {
    fn selection_changed(&self) -> Result<bool> {
        Ok(self.selection_changed)
    }

    fn text_and_property_updates(&self, ids: &[PropertyId]) -> Result<Vec<MemoryRange>> {
        Ok(self
            .changes
            .iter()
            .filter(|change| change.property.map_or(true, |id| ids.contains(&id)))
            .map(|change| self.document.range(change.start, change.end))
            .collect())
    }
}

/// A session the runtime queued for later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredSession {
    pub kind: SessionKind,
    pub cookie: EditCookie,
}

/// Text-services runtime backed by a [`MemoryDocument`].
#[derive(Debug)]
pub struct MemoryTextServices {
    document: MemoryDocument,
    queue: VecDeque<DeferredSession>,
    next_cookie: u32,
    read_only_grants: bool,
    refuse_sessions: bool,
    refused_kinds: Vec<SessionKind>,
    focus_bound: bool,
    terminations: usize,
    requests: Vec<SessionKind>,
}

impl MemoryTextServices {
    pub fn new(document: MemoryDocument) -> Self {
        Self {
            document,
            queue: VecDeque::new(),
            next_cookie: 1,
            read_only_grants: false,
            refuse_sessions: false,
            refused_kinds: Vec::new(),
            focus_bound: false,
            terminations: 0,
            requests: Vec::new(),
        }
    }

    pub fn document(&self) -> &MemoryDocument {
        &self.document
    }

    /// Issues a cookie for a host-initiated callback such as end-of-edit.
    pub fn mint_cookie(&mut self, access: AccessMode) -> EditCookie {
        let cookie = EditCookie::new(self.next_cookie, access);
        self.next_cookie += 1;
        cookie
    }

    /// Grants every later session read-only, as a runtime under contention
    /// may do.
    pub fn set_read_only_grants(&mut self, enabled: bool) {
        self.read_only_grants = enabled;
    }

    /// Makes every later session request fail.
    pub fn set_refuse_sessions(&mut self, enabled: bool) {
        self.refuse_sessions = enabled;
    }

    /// Makes later requests of `kind` fail.
    pub fn refuse_kind(&mut self, kind: SessionKind, enabled: bool) {
        self.refused_kinds.retain(|refused| *refused != kind);
        if enabled {
            self.refused_kinds.push(kind);
        }
    }

    /// Pops the oldest queued session.
    pub fn next_deferred(&mut self) -> Option<DeferredSession> {
        self.queue.pop_front()
    }

    pub fn queued_kinds(&self) -> Vec<SessionKind> {
        self.queue.iter().map(|session| session.kind).collect()
    }

    /// Discards queued sessions without running them.
    pub fn drop_deferred(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub fn is_focus_bound(&self) -> bool {
        self.focus_bound
    }

    pub fn terminations(&self) -> usize {
        self.terminations
    }

    /// Every session requested so far, refused ones included.
    pub fn requests(&self) -> &[SessionKind] {
        &self.requests
    }
}

impl TextServices for MemoryTextServices {
    type Context = MemoryDocument;

    fn context(&self) -> &MemoryDocument {
        &self.document
    }

    fn request_edit_session(
        &mut self,
        kind: SessionKind,
        access: AccessMode,
        urgency: Urgency,
    ) -> Result<SessionGrant> {
        self.requests.push(kind);
        if self.refuse_sessions || self.refused_kinds.contains(&kind) {
            return Err(Error::SessionRefused(kind));
        }

        let access = if self.read_only_grants {
            AccessMode::ReadOnly
        } else {
            access
        };
        let cookie = self.mint_cookie(access);
        match urgency {
            Urgency::Synchronous => Ok(SessionGrant::Immediate(cookie)),
            Urgency::AsyncBestEffort => {
                self.queue.push_back(DeferredSession { kind, cookie });
                Ok(SessionGrant::Deferred)
            }
        }
    }

    fn associate_focus(&mut self, bound: bool) -> Result<()> {
        self.focus_bound = bound;
        Ok(())
    }

    fn terminate_composition(&mut self) -> Result<()> {
        self.terminations += 1;
        Ok(())
    }
}

/// Fixed attribute registry.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    properties: Vec<PropertyId>,
    attributes: AHashMap<AttributeId, DisplayAttribute>,
    unavailable: bool,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extra display-attribute property.
    pub fn add_property(&mut self, id: PropertyId) {
        self.properties.push(id);
    }

    pub fn insert(&mut self, id: AttributeId, attribute: DisplayAttribute) {
        self.attributes.insert(id, attribute);
    }

    /// Makes property enumeration fail.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }
}

impl AttributeRegistry for StaticRegistry {
    fn attribute_property_ids(&self) -> Result<Vec<PropertyId>> {
        if self.unavailable {
            return Err(Error::environment("attribute registry unavailable"));
        }
        Ok(self.properties.clone())
    }

    fn resolve(&self, id: AttributeId) -> Option<DisplayAttribute> {
        self.attributes.get(&id).copied()
    }
}

/// A call made on a [`RecordingArea`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum AreaCall {
    Start,
    End,
    Result {
        text: String,
    },
    Composition {
        text: String,
        attributes: Vec<DisplayAttribute>,
        cursor: Option<usize>,
    },
    Clear,
}

/// Conversion area that records calls instead of drawing.
///
/// Clones share the log, so a test can keep one handle while the controller
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingArea {
    calls: Rc<RefCell<Vec<AreaCall>>>,
    failing: Rc<Cell<bool>>,
}

impl RecordingArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AreaCall> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<AreaCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    /// Makes draw calls fail with a render error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    fn record(&self, call: AreaCall) -> Result<()> {
        if self.failing.get() {
            return Err(Error::render("recording area is failing"));
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl ConversionArea for RecordingArea {
    fn start_composition(&mut self) -> Result<()> {
        self.record(AreaCall::Start)
    }

    fn end_composition(&mut self) -> Result<()> {
        self.record(AreaCall::End)
    }

    fn draw_result(&mut self, text: &str) -> Result<()> {
        self.record(AreaCall::Result {
            text: text.to_string(),
        })
    }

    fn draw_composition(
        &mut self,
        text: &str,
        attributes: &[DisplayAttribute],
        cursor: Option<usize>,
    ) -> Result<()> {
        self.record(AreaCall::Composition {
            text: text.to_string(),
            attributes: attributes.to_vec(),
            cursor,
        })
    }

    fn clear_composition(&mut self) -> Result<()> {
        self.record(AreaCall::Clear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rw() -> EditCookie {
        EditCookie::new(1, AccessMode::ReadWrite)
    }

    fn ro() -> EditCookie {
        EditCookie::new(2, AccessMode::ReadOnly)
    }

    #[test]
    fn test_shift_stops_at_document_edges() {
        let doc = MemoryDocument::with_text("hello");
        let mut range = doc.range(0, 0);
        assert_eq!(range.shift_end(ro(), isize::MAX, None).unwrap(), 5);
        assert_eq!(range.shift_start(ro(), -3, None).unwrap(), 0);
        assert_eq!(range.shift_start(ro(), 2, None).unwrap(), 2);
        assert_eq!(range.text(ro()).unwrap(), "llo");
    }

    #[test]
    fn test_shift_honors_halt() {
        let doc = MemoryDocument::with_text("abcdef");
        let caret = doc.range(4, 4);
        let mut range = doc.range(0, 0);
        let moved = range
            .shift_end(ro(), isize::MAX, Some(Halt::new(&caret, Anchor::Start)))
            .unwrap();
        assert_eq!(moved, 4);
        assert_eq!(range.text(ro()).unwrap(), "abcd");
    }

    #[test]
    fn test_start_drags_end() {
        let doc = MemoryDocument::with_text("abcdef");
        let mut range = doc.range(1, 2);
        range.shift_start(ro(), 3, None).unwrap();
        assert_eq!((range.start(), range.end()), (4, 4));
    }

    #[test]
    fn test_take_text_advances_start() {
        let doc = MemoryDocument::with_text("漢字かな");
        let mut range = doc.range(0, 4);
        assert_eq!(range.take_text(ro(), 3).unwrap(), "漢字か");
        assert_eq!(range.take_text(ro(), 3).unwrap(), "な");
        assert_eq!(range.take_text(ro(), 3).unwrap(), "");
        assert!(range.is_empty(ro()).unwrap());
    }

    #[test]
    fn test_set_text_requires_write_cookie() {
        let doc = MemoryDocument::with_text("abc");
        let mut range = doc.range(0, 1);
        assert!(matches!(
            range.set_text(ro(), "").unwrap_err(),
            Error::WriteOutsideSession
        ));
        assert_eq!(doc.text(), "abc");

        range.set_text(rw(), "").unwrap();
        assert_eq!(doc.text(), "bc");
    }

    #[test]
    fn test_refused_writes_leave_text() {
        let doc = MemoryDocument::with_text("abc");
        doc.fail_writes_after(Some(1));
        doc.range(2, 3).set_text(rw(), "").unwrap();
        assert!(doc.range(0, 1).set_text(rw(), "").unwrap_err().is_environment());
        assert_eq!(doc.text(), "ab");

        doc.fail_writes_after(None);
        doc.range(0, 1).set_text(rw(), "").unwrap();
        assert_eq!(doc.text(), "b");
    }

    #[test]
    fn test_property_spans_partition() {
        let doc = MemoryDocument::with_text("ab");
        doc.compose("cd", AttributeId(7));
        doc.compose("e", AttributeId::NONE);

        let full = doc.range(0, 5);
        let spans = doc
            .property_spans(ro(), &[PropertyId::COMPOSING, PropertyId::ATTRIBUTE], &full)
            .unwrap();
        let layout: Vec<_> = spans
            .iter()
            .map(|s| (s.range.start(), s.range.end(), s.values.clone()))
            .collect();
        assert_eq!(
            layout,
            vec![
                (0, 2, vec![]),
                (
                    2,
                    4,
                    vec![(PropertyId::COMPOSING, 1), (PropertyId::ATTRIBUTE, 7)]
                ),
                (4, 5, vec![(PropertyId::COMPOSING, 1)]),
            ]
        );

        let empty = doc.range(3, 3);
        assert!(doc
            .property_spans(ro(), &[PropertyId::COMPOSING], &empty)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_property_ranges_whole_document() {
        let doc = MemoryDocument::with_text("xx");
        doc.compose("yy", AttributeId::NONE);
        let runs = doc
            .property_ranges(ro(), PropertyId::COMPOSING, None)
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!((runs[0].0.start(), runs[0].0.end(), runs[0].1), (2, 4, 1));
    }

    #[test]
    fn test_set_property_requires_write_cookie() {
        let doc = MemoryDocument::with_text("abc");
        let range = doc.range(0, 3);
        assert!(doc
            .set_property(ro(), PropertyId::TRACK_COMPOSITION, &range, 1)
            .is_err());
        doc.set_property(rw(), PropertyId::TRACK_COMPOSITION, &range, 1)
            .unwrap();
        assert_eq!(doc.value_at(1, PropertyId::TRACK_COMPOSITION), 1);
    }

    #[test]
    fn test_selection_follows_edits() {
        let doc = MemoryDocument::with_text("abc");
        doc.compose("de", AttributeId::NONE);
        assert_eq!(doc.selection_bounds(), Some((5, 5)));

        doc.replace(0, 3, "");
        assert_eq!(doc.selection_bounds(), Some((2, 2)));
        doc.insert(0, "z");
        assert_eq!(doc.selection_bounds(), Some((3, 3)));
    }

    #[test]
    fn test_edit_record_filters_properties() {
        let doc = MemoryDocument::new();
        doc.compose("ab", AttributeId(7));
        let _ = doc.take_edit_record();

        doc.mark(0, 2, PropertyId::TRACK_COMPOSITION, 1);
        let record = doc.take_edit_record();
        assert!(!record.selection_changed().unwrap());
        assert!(record
            .text_and_property_updates(&[PropertyId::COMPOSING, PropertyId::ATTRIBUTE])
            .unwrap()
            .is_empty());

        doc.mark(0, 1, PropertyId::ATTRIBUTE, 9);
        let record = doc.take_edit_record();
        let updates = record
            .text_and_property_updates(&[PropertyId::COMPOSING, PropertyId::ATTRIBUTE])
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].len(), 1);
    }

    #[test]
    fn test_deletion_reports_empty_update() {
        let doc = MemoryDocument::with_text("abc");
        doc.replace(0, 2, "");
        let record = doc.take_edit_record();
        let updates = record.text_and_property_updates(&[]).unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_empty(ro()).unwrap());
    }

    #[test]
    fn test_services_queue_async_sessions() {
        let mut services = MemoryTextServices::new(MemoryDocument::new());
        let grant = services
            .request_edit_session(
                SessionKind::Complete,
                AccessMode::ReadOnly,
                Urgency::Synchronous,
            )
            .unwrap();
        assert!(matches!(grant, SessionGrant::Immediate(_)));

        services.set_read_only_grants(true);
        let grant = services
            .request_edit_session(
                SessionKind::Cleanup,
                AccessMode::ReadWrite,
                Urgency::AsyncBestEffort,
            )
            .unwrap();
        assert_eq!(grant, SessionGrant::Deferred);
        let queued = services.next_deferred().unwrap();
        assert_eq!(queued.kind, SessionKind::Cleanup);
        assert!(!queued.cookie.is_writable());
        assert!(services.next_deferred().is_none());
    }

    #[test]
    fn test_recording_area_failure() {
        let mut area = RecordingArea::new();
        let observer = area.clone();
        area.draw_result("x").unwrap();
        observer.set_failing(true);
        assert!(area.clear_composition().unwrap_err().is_environment());
        assert_eq!(
            observer.take_calls(),
            vec![AreaCall::Result {
                text: "x".to_string()
            }]
        );
    }
}
