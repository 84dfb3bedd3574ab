//! Composition lifecycle controller.
//!
//! The controller receives notifications from the text-services runtime,
//! keeps the composition depth and commit bookkeeping, asks for edit sessions
//! and runs them, and forwards finalized and provisional text to the
//! conversion area.
//!
//! Three passes do the document work:
//!
//! - **Complete** (read-only, synchronous) commits whatever text remains when
//!   the outermost composition ends, skipping a prefix committed earlier.
//! - **Cleanup** (read-write, queued) erases committed text from the document.
//! - **UpdateCompositionString** (read-write, queued) re-segments the document
//!   after edits and redraws the composition.
//!
//! Requests of a kind already outstanding are dropped, so a burst of edits
//! collapses into one update pass.

use crate::attributes::{AttributeRegistry, DisplayAttributeResolver};
use crate::context::{EditCookie, EditRecord, PropertyId, TextContext};
use crate::conversion::ConversionArea;
use crate::error::{Error, Result};
use crate::range::{char_len, read_chunked, TextRange};
use crate::reconcile::{
    adjust_for_completed_prefix, cursor_position, full_document_range, has_composition_changed,
    interim_selection,
};
use crate::segment::{CompositionSegmenter, Segmentation};
use crate::session::{EditSessionScheduler, RequestOutcome, SessionKind, TextServices, Ticket};
use crate::sink::{
    ActivationSink, CleanupContextSink, ClientId, CompositionSink, EventReply, EventSink,
    FocusSink, OwnerId, ProfileKind, TextEditSink, TextServicesEvent, UiElementSink,
};
use crate::{Config, NestedStartPolicy};
use tracing::{debug, error, info, warn};

type RangeOf<S> = <<S as TextServices>::Context as TextContext>::Range;

/// An erase that stopped after removing `erased` characters.
#[derive(Debug)]
struct EraseFailure {
    erased: usize,
    error: Error,
}

/// Bookkeeping for the current composition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositionState {
    depth: u32,
    completed_len: usize,
    cleanup_skipped: bool,
    modifying_doc: bool,
}

impl CompositionState {
    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    /// Accepted composition starts not yet matched by an end.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Characters at the document start already committed and awaiting
    /// cleanup.
    pub fn completed_len(&self) -> usize {
        self.completed_len
    }

    /// Set when the last cleanup pass failed.
    pub fn cleanup_skipped(&self) -> bool {
        self.cleanup_skipped
    }

    pub fn is_modifying_doc(&self) -> bool {
        self.modifying_doc
    }
}

pub struct CompositionController<S, A, G> {
    client: ClientId,
    config: Config,
    services: S,
    registry: G,
    make_area: Box<dyn FnMut() -> A>,
    area: Option<A>,
    scheduler: EditSessionScheduler,
    state: CompositionState,
}

impl<S, A, G> CompositionController<S, A, G>
where
    S: TextServices,
    A: ConversionArea,
    G: AttributeRegistry,
{
    /// Creates an unbound controller. `make_area` builds the conversion area
    /// on the first keyboard activation.
    pub fn new(
        client: ClientId,
        services: S,
        registry: G,
        config: Config,
        make_area: impl FnMut() -> A + 'static,
    ) -> Self {
        Self {
            client,
            config,
            services,
            registry,
            make_area: Box::new(make_area),
            area: None,
            scheduler: EditSessionScheduler::new(),
            state: CompositionState::default(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut S {
        &mut self.services
    }

    pub fn registry(&self) -> &G {
        &self.registry
    }

    pub fn conversion_area(&self) -> Option<&A> {
        self.area.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.area.is_some()
    }

    pub fn state(&self) -> &CompositionState {
        &self.state
    }

    pub fn scheduler(&self) -> &EditSessionScheduler {
        &self.scheduler
    }

    pub fn is_in_composition(&self) -> bool {
        self.state.is_active()
    }

    /// True while committed text may still sit in the document: a cleanup
    /// pass is outstanding or the last one failed.
    ///
    /// A cleanup request the runtime refuses counts as a failed pass, so the
    /// committed prefix keeps being skipped until a later cleanup erases it.
    pub fn is_pending_composition_cleanup(&self) -> bool {
        self.scheduler.is_pending(SessionKind::Cleanup) || self.state.cleanup_skipped
    }

    pub fn on_composition_cleanup(&mut self, succeeded: bool) {
        self.state.cleanup_skipped = !succeeded;
    }

    /// Flags that the document is being modified on our behalf. Composition
    /// starts arriving meanwhile nest instead of being refused.
    pub fn set_modifying_doc_flag(&mut self, modifying: bool) {
        self.state.modifying_doc = modifying;
    }

    /// Runs a session the runtime queued earlier.
    ///
    /// A session whose request was withdrawn in the meantime does nothing.
    pub fn run_edit_session(&mut self, kind: SessionKind, ec: EditCookie) -> Result<()> {
        if !self.scheduler.is_pending(kind) {
            debug!(?kind, "edit session no longer pending");
            return Ok(());
        }
        let outcome = self.execute(kind, ec);
        self.scheduler.finish(kind);
        outcome
    }

    /// Withdraws outstanding sessions and releases the conversion area.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        let cancelled = self.scheduler.cancel_all();
        if self.area.take().is_some() {
            if let Err(e) = self.services.associate_focus(false) {
                warn!(error = %e, "failed to release focus");
            }
            info!(?cancelled, client = self.client.0, "controller shut down");
        }
    }

    fn request_session(&mut self, kind: SessionKind) -> Result<RequestOutcome> {
        match self.scheduler.request(&mut self.services, kind)? {
            Ticket::Run(ec) => {
                let outcome = self.execute(kind, ec);
                self.scheduler.finish(kind);
                outcome.map(|()| RequestOutcome::Ran)
            }
            Ticket::Queued => Ok(RequestOutcome::Queued),
            Ticket::Skipped => Ok(RequestOutcome::Skipped),
        }
    }

    /// Requests a session whose failure must not abort the caller.
    fn request_best_effort(&mut self, kind: SessionKind) {
        match self.request_session(kind) {
            Ok(outcome) => debug!(?kind, ?outcome, "edit session requested"),
            Err(e) => {
                warn!(?kind, error = %e, "edit session failed");
                if kind == SessionKind::Cleanup {
                    self.on_composition_cleanup(false);
                }
            }
        }
    }

    fn execute(&mut self, kind: SessionKind, ec: EditCookie) -> Result<()> {
        match kind {
            SessionKind::Complete => self.complete_composition(ec),
            SessionKind::Cleanup => self.empty_composition_range(ec),
            SessionKind::UpdateCompositionString => self.update_composition_string(ec),
        }
    }

    fn area_mut(&mut self) -> Result<&mut A> {
        self.area.as_mut().ok_or(Error::NotBound)
    }

    fn complete_composition(&mut self, ec: EditCookie) -> Result<()> {
        let (mut range, total) = full_document_range(self.services.context(), ec, None)?;
        let completed = self.state.completed_len;

        if completed > 0 && completed >= total && self.is_pending_composition_cleanup() {
            debug!(completed, total, "document holds only text awaiting cleanup");
            return self.area_mut()?.clear_composition();
        }

        let adjustment = adjust_for_completed_prefix(&mut range, ec, total, completed);
        if adjustment.remaining == 0 {
            return self.area_mut()?.clear_composition();
        }

        let text = read_chunked(&mut range, ec, self.config.read_chunk_len)?;
        self.area_mut()?.draw_result(&text)?;
        self.state.completed_len = adjustment.completed + text.chars().count();
        info!(
            committed = text.chars().count(),
            completed_len = self.state.completed_len,
            "composition completed"
        );
        Ok(())
    }

    fn empty_composition_range(&mut self, ec: EditCookie) -> Result<()> {
        if !self.is_pending_composition_cleanup() {
            return Ok(());
        }
        let outcome = self.erase_committed_text(ec);
        if let Err(e) = &outcome {
            warn!(error = %e, "composition cleanup failed");
        }
        self.on_composition_cleanup(outcome.is_ok());
        outcome
    }

    fn erase_committed_text(&mut self, ec: EditCookie) -> Result<()> {
        let completed = self.state.completed_len;
        if completed == 0 {
            return Ok(());
        }

        let (mut range, total) = full_document_range(self.services.context(), ec, None)?;
        if completed < total {
            range.shift_end(ec, completed as isize - total as isize, None)?;
        }
        match self.erase(ec, vec![range]) {
            Ok(erased) => {
                debug!(erased, "committed text erased");
                self.state.completed_len = 0;
                Ok(())
            }
            Err(failure) => {
                self.state.completed_len = completed.saturating_sub(failure.erased);
                Err(failure.error)
            }
        }
    }

    /// Empties `ranges`, last first so earlier ranges stay valid, and returns
    /// how many characters went.
    ///
    /// Every range is measured before the first edit. Finalized ranges form a
    /// document prefix, so after a failure the characters still present are
    /// the leading ones.
    fn erase(
        &mut self,
        ec: EditCookie,
        ranges: Vec<RangeOf<S>>,
    ) -> std::result::Result<usize, EraseFailure> {
        if ranges.is_empty() {
            return Ok(0);
        }
        let lens = ec
            .require_write()
            .and_then(|()| {
                ranges
                    .iter()
                    .map(|range| char_len(range, ec))
                    .collect::<Result<Vec<_>>>()
            })
            .map_err(|error| EraseFailure { erased: 0, error })?;

        self.state.modifying_doc = true;
        let mut erased = 0;
        let mut outcome = Ok(());
        for (mut range, len) in ranges.into_iter().zip(lens).rev() {
            if let Err(error) = range.set_text(ec, "") {
                outcome = Err(error);
                break;
            }
            erased += len;
        }
        self.state.modifying_doc = false;
        outcome
            .map(|()| erased)
            .map_err(|error| EraseFailure { erased, error })
    }

    /// Accounts for `committed` characters of finalized text that were drawn
    /// and of which `erased` left the document. `completed` is the prefix a
    /// previous composition committed and the result skipped.
    fn settle_committed(&mut self, completed: usize, committed: usize, erased: usize) {
        if committed == 0 {
            return;
        }
        let left = completed.max(committed) - erased;
        self.state.completed_len = left;
        if left == 0 {
            if completed > 0 {
                self.scheduler.cancel(SessionKind::Cleanup);
                self.on_composition_cleanup(true);
            }
        } else if !self.is_pending_composition_cleanup() {
            debug!(left, "committed text left in the document");
            self.request_best_effort(SessionKind::Cleanup);
        }
    }

    fn update_composition_string(&mut self, ec: EditCookie) -> Result<()> {
        if !self.is_in_composition() {
            debug!("no composition to update");
            return Ok(());
        }

        let ctx = self.services.context();
        let (full, total) = full_document_range(ctx, ec, None)?;
        if total == 0 {
            return self.area_mut()?.clear_composition();
        }

        let interim = interim_selection(ctx, ec)?;
        let (segmentation, attributes) = {
            let resolver = DisplayAttributeResolver::build(&self.registry);
            let segmenter = CompositionSegmenter::new(&resolver, self.config.read_chunk_len);
            let segmentation = match &interim {
                Some(interim) => segmenter.segment_interim(ctx, ec, &full, total, interim)?,
                None => segmenter.segment(ctx, ec, &full)?,
            };
            let attributes = resolver.resolve_all(&segmentation.output.attributes);
            (segmentation, attributes)
        };
        let Segmentation {
            mut output,
            finalized,
            retained,
        } = segmentation;

        // Finalized text still precedes the caret; nothing is erased yet.
        let committed = output.result.chars().count();
        if interim.is_none() {
            let len = output.composition_len();
            output.cursor = Some(self.relative_cursor(ec, retained + committed, len));
        }

        let completed = if self.is_pending_composition_cleanup() {
            self.state.completed_len
        } else {
            0
        };
        if completed > 0 {
            debug!(completed, "skipping text committed by the previous composition");
        }
        let result: String = output.result.chars().skip(completed).collect();
        if !result.is_empty() {
            self.area_mut()?.draw_result(&result)?;
        }

        match self.erase(ec, finalized) {
            Ok(erased) => self.settle_committed(completed, committed, erased),
            Err(failure) => {
                warn!(
                    erased = failure.erased,
                    error = %failure.error,
                    "failed to erase committed text"
                );
                self.settle_committed(completed, committed, failure.erased);
                return Err(failure.error);
            }
        }
        if ec.is_writable() {
            self.mark_tracked_composition(ec);
        }

        if !result.is_empty() && !self.config.draw_composition_after_result {
            return Ok(());
        }
        let area = self.area_mut()?;
        if output.composition.is_empty() {
            area.clear_composition()
        } else {
            area.draw_composition(&output.composition, &attributes, output.cursor)
        }
    }

    fn mark_tracked_composition(&mut self, ec: EditCookie) {
        let ctx = self.services.context();
        let outcome = full_document_range(ctx, ec, None).and_then(|(full, _)| {
            ctx.set_property(ec, PropertyId::TRACK_COMPOSITION, &full, 1)
        });
        if let Err(e) = outcome {
            warn!(error = %e, "failed to mark tracked composition");
        }
    }

    /// Caret offset within the composition, clamped to its length. `before`
    /// characters of finalized text precede the composition.
    fn relative_cursor(&self, ec: EditCookie, before: usize, len: usize) -> usize {
        match cursor_position(self.services.context(), ec) {
            Ok(Some(position)) => position.saturating_sub(before).min(len),
            Ok(None) => len,
            Err(e) => {
                warn!(error = %e, "cursor position unavailable");
                len
            }
        }
    }
}

impl<S, A, G> CompositionSink for CompositionController<S, A, G>
where
    S: TextServices,
    A: ConversionArea,
    G: AttributeRegistry,
{
    fn on_start_composition(&mut self, owner: OwnerId) -> Result<bool> {
        if self.area.is_none() {
            debug!(?owner, "no conversion area, refusing composition");
            return Ok(false);
        }
        if owner == OwnerId::APPLICATION {
            debug!("ignoring self-owned composition");
            return Ok(true);
        }
        if self.state.depth > 0 && !self.state.modifying_doc {
            let accepted = match self.config.nested_start_policy {
                NestedStartPolicy::Reject => false,
                NestedStartPolicy::Ignore => true,
            };
            debug!(?owner, accepted, "composition started inside another");
            return Ok(accepted);
        }

        self.state.depth += 1;
        if self.state.depth > 1 {
            debug!(depth = self.state.depth, "nested composition");
            return Ok(true);
        }

        info!(?owner, "composition started");
        if self.config.finalize_on_start {
            self.request_best_effort(SessionKind::Complete);
            self.request_best_effort(SessionKind::Cleanup);
        }
        if let Some(area) = self.area.as_mut() {
            if let Err(e) = area.start_composition() {
                warn!(error = %e, "conversion area rejected composition start");
            }
        }
        Ok(true)
    }

    fn on_update_composition(&mut self, owner: OwnerId) -> Result<()> {
        debug!(?owner, "composition updated");
        Ok(())
    }

    fn on_end_composition(&mut self, owner: OwnerId) -> Result<()> {
        if owner == OwnerId::APPLICATION {
            debug!("ignoring self-owned composition end");
            return Ok(());
        }
        if self.area.is_none() {
            return Err(Error::NotBound);
        }
        if self.state.depth == 0 {
            error!(?owner, "composition ended without a matching start");
            return Err(Error::EndWithoutStart);
        }

        self.state.depth -= 1;
        if self.state.depth > 0 {
            return Ok(());
        }

        self.request_best_effort(SessionKind::Complete);
        self.request_best_effort(SessionKind::Cleanup);
        if let Some(area) = self.area.as_mut() {
            if let Err(e) = area.end_composition() {
                warn!(error = %e, "conversion area rejected composition end");
            }
        }
        info!(?owner, "composition ended");
        Ok(())
    }
}

impl<S, A, G> TextEditSink<RangeOf<S>> for CompositionController<S, A, G>
where
    S: TextServices,
    A: ConversionArea,
    G: AttributeRegistry,
{
    fn on_end_edit(
        &mut self,
        ec: EditCookie,
        record: &dyn EditRecord<RangeOf<S>>,
    ) -> Result<RequestOutcome> {
        if !self.is_in_composition() || self.area.is_none() {
            return Ok(RequestOutcome::Unchanged);
        }
        if !has_composition_changed(self.services.context(), ec, record)? {
            return Ok(RequestOutcome::Unchanged);
        }
        self.request_session(SessionKind::UpdateCompositionString)
    }
}

impl<S, A, G> ActivationSink for CompositionController<S, A, G>
where
    S: TextServices,
    A: ConversionArea,
    G: AttributeRegistry,
{
    fn on_activated(&mut self, profile: ProfileKind, active: bool) -> Result<()> {
        if profile != ProfileKind::Keyboard || !active {
            debug!(?profile, active, "ignoring profile change");
            return Ok(());
        }
        if self.area.is_some() {
            return Ok(());
        }

        self.area = Some((self.make_area)());
        if let Err(e) = self.services.associate_focus(true) {
            warn!(error = %e, "failed to associate focus");
        }
        info!(client = self.client.0, "conversion area bound");
        Ok(())
    }
}

impl<S, A, G> FocusSink for CompositionController<S, A, G>
where
    S: TextServices,
    A: ConversionArea,
    G: AttributeRegistry,
{
    fn on_focus_changed(&mut self, focused: bool) -> Result<()> {
        if focused || !self.is_in_composition() {
            return Ok(());
        }
        info!(depth = self.state.depth, "focus lost, terminating composition");
        if let Err(e) = self.services.terminate_composition() {
            warn!(error = %e, "failed to terminate composition");
        }
        Ok(())
    }
}

impl<S, A, G> CleanupContextSink for CompositionController<S, A, G>
where
    S: TextServices,
    A: ConversionArea,
    G: AttributeRegistry,
{
    fn on_cleanup_context(&mut self, ec: EditCookie) -> Result<()> {
        let ctx = self.services.context();
        for (range, _) in ctx.property_ranges(ec, PropertyId::COMPOSING, None)? {
            if let Err(e) = ctx.clear_property(ec, PropertyId::COMPOSING, &range) {
                warn!(error = %e, "failed to clear composing mark");
            }
        }
        Ok(())
    }
}

impl<S, A, G> UiElementSink for CompositionController<S, A, G> {}

impl<S, A, G> EventSink<RangeOf<S>> for CompositionController<S, A, G>
where
    S: TextServices,
    A: ConversionArea,
    G: AttributeRegistry,
{
    fn handle_event(&mut self, event: TextServicesEvent<'_, RangeOf<S>>) -> Result<EventReply> {
        match event {
            TextServicesEvent::Activated { profile, active } => {
                self.on_activated(profile, active).map(|()| EventReply::Done)
            }
            TextServicesEvent::FocusChanged(focused) => {
                self.on_focus_changed(focused).map(|()| EventReply::Done)
            }
            TextServicesEvent::CompositionStarted(owner) => {
                self.on_start_composition(owner).map(EventReply::Accepted)
            }
            TextServicesEvent::CompositionUpdated(owner) => {
                self.on_update_composition(owner).map(|()| EventReply::Done)
            }
            TextServicesEvent::CompositionEnded(owner) => {
                self.on_end_composition(owner).map(|()| EventReply::Done)
            }
            TextServicesEvent::EndEdit { cookie, record } => {
                self.on_end_edit(cookie, record).map(EventReply::Edited)
            }
            TextServicesEvent::CleanupContext(cookie) => {
                self.on_cleanup_context(cookie).map(|()| EventReply::Done)
            }
            TextServicesEvent::EditSession { kind, cookie } => {
                self.run_edit_session(kind, cookie).map(|()| EventReply::Done)
            }
            TextServicesEvent::BeginUiElement(element) => {
                Ok(EventReply::Accepted(self.begin_ui_element(element)))
            }
            TextServicesEvent::UpdateUiElement(element) => {
                self.update_ui_element(element);
                Ok(EventReply::Done)
            }
            TextServicesEvent::EndUiElement(element) => {
                self.end_ui_element(element);
                Ok(EventReply::Done)
            }
        }
    }
}
