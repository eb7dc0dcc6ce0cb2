//! The reader session: one explicit owner for book, state, caches, page
//! turns, storage and speech.
//!
//! `render` is the only place that builds or replaces the pagination. Every
//! other entry point changes state and asks the scheduler for a render; the
//! host drives everything by calling [`ReaderSession::tick`] once per frame.

use log::{debug, error, info};
use std::rc::Rc;

use crate::book::{BookData, PointRef};
use crate::error::ReaderError;
use crate::flow::{FlowCache, FlowPart};
use crate::measure::{TextMeasure, WrapMeasure};
use crate::metrics::{ColumnMetrics, Insets, LayoutTuning, Viewport, compute_metrics};
use crate::pagination::{
    Pagination, PaginationKey, PaginationTuning, WidthAction, WidthReconciler, build_pagination,
};
use crate::scheduler::{FrameClock, RenderScheduler, SystemClock};
use crate::state::{LaunchOverrides, ReaderState, TURN_SPEED_STEP, clamp_turn_speed};
use crate::storage::{self, MemoryStorage, Storage};
use crate::style::{ReaderStyle, StyleTokens};
use crate::transition::{TransitionController, TransitionEvent, TransitionTuning, TurnOutcome};
use crate::voice::{SilentSpeech, SpeechEngine, SpeechParams, VoiceOver, page_viewport, visible_page_text};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub layout: LayoutTuning,
    pub pagination: PaginationTuning,
    pub transition: TransitionTuning,
    pub speech: SpeechParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPage {
    ContentUnavailable,
    LayoutError,
}

impl FallbackPage {
    pub fn message(&self) -> &'static str {
        match self {
            FallbackPage::ContentUnavailable => "Content unavailable",
            FallbackPage::LayoutError => "Layout error: this chapter could not be paginated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered {
        page: usize,
        total_pages: usize,
        rebuilt: bool,
    },
    /// The container has no usable size yet; nothing was drawn.
    NotReady,
    Fallback(FallbackPage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterDirection {
    Next,
    Previous,
}

pub struct SessionBuilder {
    book: BookData,
    storage: Option<Box<dyn Storage>>,
    speech: Option<Box<dyn SpeechEngine>>,
    clock: Option<Box<dyn FrameClock>>,
    measurer: Option<Box<dyn TextMeasure>>,
    config: SessionConfig,
    overrides: LaunchOverrides,
    viewport: Viewport,
    container: Insets,
}

impl SessionBuilder {
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    pub fn speech(mut self, speech: impl SpeechEngine + 'static) -> Self {
        self.speech = Some(Box::new(speech));
        self
    }

    pub fn clock(mut self, clock: impl FrameClock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn measurer(mut self, measurer: impl TextMeasure + 'static) -> Self {
        self.measurer = Some(Box::new(measurer));
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn overrides(mut self, overrides: LaunchOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn container(mut self, container: Insets) -> Self {
        self.container = container;
        self
    }

    pub fn build(self) -> ReaderSession {
        let storage = self
            .storage
            .unwrap_or_else(|| Box::new(MemoryStorage::new()));
        let progress = storage::load_progress(storage.as_ref());
        let preferences = storage::load_preferences(storage.as_ref());
        let state = ReaderState::restore(&self.book, progress, preferences, &self.overrides);
        info!(
            "Reader session at {}/{}/{}",
            state.chapter_id, state.section_id, state.point_id
        );

        let mut scheduler = RenderScheduler::default();
        scheduler.request(true);

        ReaderSession {
            book: self.book,
            state,
            storage,
            voice: VoiceOver::new(
                self.speech.unwrap_or_else(|| Box::new(SilentSpeech)),
                self.config.speech.clone(),
            ),
            clock: self.clock.unwrap_or_else(|| Box::new(SystemClock)),
            measurer: self
                .measurer
                .unwrap_or_else(|| Box::new(WrapMeasure::default())),
            flow: FlowCache::default(),
            pagination: None,
            reconciler: WidthReconciler::default(),
            controller: TransitionController::new(self.config.transition),
            scheduler,
            viewport: self.viewport,
            container: self.container,
            fallback: None,
            has_rendered: false,
            config: self.config,
        }
    }
}

pub struct ReaderSession {
    book: BookData,
    state: ReaderState,
    config: SessionConfig,
    storage: Box<dyn Storage>,
    voice: VoiceOver,
    clock: Box<dyn FrameClock>,
    measurer: Box<dyn TextMeasure>,
    flow: FlowCache,
    pagination: Option<Pagination>,
    reconciler: WidthReconciler,
    controller: TransitionController,
    scheduler: RenderScheduler,
    viewport: Viewport,
    container: Insets,
    fallback: Option<FallbackPage>,
    has_rendered: bool,
}

impl ReaderSession {
    pub fn builder(book: BookData) -> SessionBuilder {
        SessionBuilder {
            book,
            storage: None,
            speech: None,
            clock: None,
            measurer: None,
            config: SessionConfig::default(),
            overrides: LaunchOverrides::default(),
            viewport: Viewport::default(),
            container: Insets::default(),
        }
    }

    pub fn book(&self) -> &BookData {
        &self.book
    }

    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    pub fn controller(&self) -> &TransitionController {
        &self.controller
    }

    pub fn fallback(&self) -> Option<FallbackPage> {
        self.fallback
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn is_animating(&self) -> bool {
        self.controller.is_animating()
    }

    /// Whether the host should keep ticking at frame rate.
    pub fn needs_frame(&self) -> bool {
        self.controller.is_animating()
            || self.controller.reveal_pending()
            || self.scheduler.is_pending()
    }

    pub fn translate_x(&self) -> f32 {
        self.controller.translate_x(self.clock.now())
    }

    pub fn buffer_scale(&self) -> f32 {
        self.controller.buffer_scale(self.clock.now())
    }

    pub fn current_page(&self) -> usize {
        self.state.page_index
    }

    pub fn total_pages(&self) -> usize {
        self.pagination.as_ref().map_or(0, |p| p.total_pages)
    }

    pub fn progress_fraction(&self) -> f32 {
        self.pagination
            .as_ref()
            .map_or(0.0, |p| p.progress_fraction(self.state.page_index))
    }

    pub fn metrics(&self) -> Option<ColumnMetrics> {
        compute_metrics(
            self.viewport,
            self.container,
            &self.state.style,
            &self.config.layout,
        )
    }

    pub fn style_tokens(&self) -> Option<StyleTokens> {
        self.metrics()
            .map(|metrics| StyleTokens::resolve(&self.state.style, &metrics))
    }

    pub fn chapter_title(&self) -> Option<&str> {
        self.book
            .chapter(&self.state.chapter_id)?
            .title
            .as_deref()
    }

    pub fn point_title(&self) -> Option<&str> {
        self.book
            .point(
                &self.state.chapter_id,
                &self.state.section_id,
                &self.state.point_id,
            )?
            .title
            .as_deref()
    }

    pub fn request_render(&mut self, force_reflow: bool) {
        self.scheduler.request(force_reflow);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        debug!("Viewport {}x{}", viewport.width, viewport.height);
        self.viewport = viewport;
        self.state.auto_align_page = true;
        self.scheduler.request(true);
    }

    pub fn set_container(&mut self, container: Insets) {
        if container == self.container {
            return;
        }
        self.container = container;
        self.state.auto_align_page = true;
        self.scheduler.request(true);
    }

    /// Advances animations and runs a pending render, if any.
    pub fn tick(&mut self) -> Option<RenderOutcome> {
        let now = self.clock.now();
        self.controller.tick(now);
        self.process_transition_events();
        self.flush()
    }

    /// Runs the pending render without advancing animations.
    pub fn flush(&mut self) -> Option<RenderOutcome> {
        let request = self.scheduler.take()?;
        Some(self.render(request.force_reflow))
    }

    pub fn render(&mut self, force_reflow: bool) -> RenderOutcome {
        let now = self.clock.now();

        let resolved = self.book.resolves(
            &self.state.chapter_id,
            &self.state.section_id,
            &self.state.point_id,
        );
        let Some(chapter) = self
            .book
            .chapter(&self.state.chapter_id)
            .filter(|_| resolved)
        else {
            error!(
                "{}",
                ReaderError::content_unavailable(format!(
                    "{}/{}/{}",
                    self.state.chapter_id, self.state.section_id, self.state.point_id
                ))
            );
            return self.show_fallback(FallbackPage::ContentUnavailable);
        };
        let parts = self.flow.parts_for(chapter);

        let Some(metrics) = self.metrics() else {
            debug!("{}", ReaderError::LayoutNotReady);
            return RenderOutcome::NotReady;
        };

        let key = PaginationKey::new(&self.state.chapter_id, &parts, &self.state.style, &metrics);
        let cached = self.pagination.as_ref().is_some_and(|p| p.key == key);
        let rebuilt = force_reflow || !cached;
        if rebuilt {
            if let Err(outcome) = self.rebuild(&parts, &metrics) {
                return outcome;
            }
        } else {
            debug!("Pagination cache hit for {key}");
        }

        let mounted = self
            .measurer
            .mounted_extent(&parts, metrics.column_box(), &self.state.style);
        let Some(pagination) = self.pagination.as_mut() else {
            return self.show_fallback(FallbackPage::LayoutError);
        };
        let layout_changed = match self
            .reconciler
            .reconcile(pagination, mounted, &self.config.pagination)
        {
            WidthAction::Accept | WidthAction::GiveUp => rebuilt,
            WidthAction::Extended { .. } => true,
            WidthAction::Rebuild => {
                self.scheduler.request(true);
                rebuilt
            }
        };

        let target = if self.state.auto_align_page {
            pagination.page_for_point(&self.state.point_id).unwrap_or(0)
        } else {
            pagination.clamp_page(self.state.page_index)
        };
        let total_pages = pagination.total_pages;
        let shift = pagination.page_shift_width;
        self.state.auto_align_page = false;
        self.state.page_index = target;

        if !self.has_rendered || layout_changed {
            self.controller.jump_to(target, shift, now);
        } else if target != self.controller.target_page() {
            self.controller.request_turn(
                target,
                total_pages,
                shift,
                self.state.turn_speed,
                false,
                now,
            );
            // A turn cut short here settles on a page the reader already left.
            self.controller.drain_events();
        }

        self.fallback = None;
        self.has_rendered = true;
        if !self.process_transition_events() {
            self.persist_progress();
        }

        RenderOutcome::Rendered {
            page: target,
            total_pages,
            rebuilt,
        }
    }

    fn rebuild(&mut self, parts: &Rc<Vec<FlowPart>>, metrics: &ColumnMetrics) -> Result<(), RenderOutcome> {
        match build_pagination(
            &self.state.chapter_id,
            parts,
            metrics,
            &self.state.style,
            self.measurer.as_ref(),
            &self.config.pagination,
        ) {
            Ok(pagination) => {
                self.reconciler.track(&pagination.key);
                self.state.pagination_key = Some(pagination.key.clone());
                self.pagination = Some(pagination);
                Ok(())
            }
            Err(e) => {
                error!("{} (metrics {:?})", ReaderError::from(e), metrics);
                Err(self.show_fallback(FallbackPage::LayoutError))
            }
        }
    }

    fn show_fallback(&mut self, page: FallbackPage) -> RenderOutcome {
        self.pagination = None;
        self.state.pagination_key = None;
        self.fallback = Some(page);
        self.has_rendered = false;
        self.voice.stop();
        RenderOutcome::Fallback(page)
    }

    /// Commits settled pages. Returns true if any page was committed.
    fn process_transition_events(&mut self) -> bool {
        let mut committed = false;
        for event in self.controller.drain_events() {
            match event {
                TransitionEvent::Settled(page) => {
                    self.commit_page(page);
                    committed = true;
                }
                TransitionEvent::Revealed(page) => debug!("Buffer revealed for page {page}"),
            }
        }
        committed
    }

    fn commit_page(&mut self, page: usize) {
        let Some(pagination) = self.pagination.as_ref() else {
            return;
        };
        let page = pagination.clamp_page(page);
        self.state.page_index = page;
        // The current point stays if it starts on the page. Otherwise the
        // first point starting there names it, and failing that the current
        // point stays while it still spans the page.
        let anchor = if pagination.page_for_point(&self.state.point_id) == Some(page) {
            None
        } else {
            match pagination.page_anchors.get(page).and_then(Option::as_ref) {
                Some(anchor) => Some(anchor),
                None if pagination.point_covers_page(&self.state.point_id, page) => None,
                None => pagination.anchor_for_page(page),
            }
        };
        if let Some(anchor) = anchor {
            self.state.section_id = anchor.section_id.clone();
            self.state.point_id = anchor.point_id.clone();
        }
        self.persist_progress();
        if self.state.auto_voice {
            self.speak_visible_page();
        }
    }

    fn persist_progress(&mut self) {
        storage::save_progress(self.storage.as_mut(), &self.state.progress_record());
    }

    fn persist_preferences(&mut self) {
        storage::save_preferences(self.storage.as_mut(), &self.state.preferences_record());
    }

    /// Turns by `delta` pages from the page currently shown or being turned
    /// to. Turning past either end does nothing.
    pub fn change_page(&mut self, delta: isize) -> TurnOutcome {
        let Some(pagination) = self.pagination.as_ref() else {
            return TurnOutcome::Unchanged;
        };
        let base = self.controller.target_page();
        let to = base
            .saturating_add_signed(delta)
            .min(pagination.last_page());
        if to == base {
            return TurnOutcome::Unchanged;
        }
        let total_pages = pagination.total_pages;
        let shift = pagination.page_shift_width;

        let now = self.clock.now();
        let outcome = self.controller.request_turn(
            to,
            total_pages,
            shift,
            self.state.turn_speed,
            false,
            now,
        );
        self.state.auto_align_page = false;
        self.process_transition_events();
        self.state.page_index = to;
        outcome
    }

    /// Moves to a point; false if the chain does not resolve.
    pub fn go_to_point(&mut self, target: PointRef) -> bool {
        if !self
            .book
            .resolves(&target.chapter_id, &target.section_id, &target.point_id)
        {
            debug!("Ignoring navigation to unknown point {target:?}");
            return false;
        }
        let chapter_changed = target.chapter_id != self.state.chapter_id;
        self.state.go_to(target);
        if chapter_changed {
            self.controller.cancel(self.clock.now());
            self.controller.drain_events();
            self.has_rendered = false;
        }
        self.scheduler.request(false);
        true
    }

    pub fn next_point(&mut self) -> bool {
        self.step_point(1)
    }

    pub fn prev_point(&mut self) -> bool {
        self.step_point(-1)
    }

    fn step_point(&mut self, offset: isize) -> bool {
        match self.book.neighbor_point(&self.state.position(), offset) {
            Some(target) => self.go_to_point(target),
            None => false,
        }
    }

    pub fn change_chapter(&mut self, direction: ChapterDirection) -> bool {
        let Some(position) = self.book.chapter_position(&self.state.chapter_id) else {
            return false;
        };
        let target = match direction {
            ChapterDirection::Next => position.checked_add(1),
            ChapterDirection::Previous => position.checked_sub(1),
        };
        let Some(chapter) = target.and_then(|i| self.book.chapters.get(i)) else {
            return false;
        };
        match self.book.first_point_in(&chapter.id, None) {
            Some(point) => self.go_to_point(point),
            None => false,
        }
    }

    pub fn go_to_anchor(&mut self, anchor_id: &str) -> bool {
        match self.book.resolve_anchor(anchor_id) {
            Some(point) => self.go_to_point(point),
            None => false,
        }
    }

    pub fn set_style(&mut self, style: ReaderStyle) {
        let style = style.clamped();
        if style == self.state.style {
            return;
        }
        self.state.style = style;
        self.state.auto_align_page = true;
        self.persist_preferences();
        self.scheduler.request(false);
    }

    fn update_style(&mut self, change: impl FnOnce(&mut ReaderStyle)) {
        let mut style = self.state.style.clone();
        change(&mut style);
        self.set_style(style);
    }

    pub fn adjust_font_size(&mut self, delta: i32) {
        self.update_style(|style| style.adjust_font_size(delta));
    }

    pub fn adjust_line_height(&mut self, delta: f32) {
        self.update_style(|style| style.adjust_line_height(delta));
    }

    pub fn adjust_font_weight(&mut self, steps: i32) {
        self.update_style(|style| style.adjust_font_weight(steps));
    }

    pub fn cycle_font(&mut self, direction: i32) {
        self.update_style(|style| style.cycle_font(direction));
    }

    pub fn cycle_theme(&mut self, direction: i32) {
        self.update_style(|style| style.cycle_theme(direction));
    }

    /// Turn speed only affects animation, so no render is scheduled.
    pub fn set_turn_speed(&mut self, speed: f32) {
        let speed = clamp_turn_speed(speed);
        if speed == self.state.turn_speed {
            return;
        }
        self.state.turn_speed = speed;
        self.persist_preferences();
    }

    pub fn adjust_turn_speed(&mut self, steps: i32) {
        let speed = self.state.turn_speed + steps as f32 * TURN_SPEED_STEP;
        self.set_turn_speed((speed * 10.0).round() / 10.0);
    }

    pub fn set_auto_voice(&mut self, enabled: bool) {
        if enabled == self.state.auto_voice {
            return;
        }
        self.state.auto_voice = enabled;
        self.persist_preferences();
        if enabled {
            self.speak_visible_page();
        } else {
            self.voice.stop();
        }
    }

    pub fn toggle_auto_voice(&mut self) {
        self.set_auto_voice(!self.state.auto_voice);
    }

    pub fn set_speech_params(&mut self, params: SpeechParams) {
        self.voice.set_params(params);
    }

    pub fn is_speaking(&mut self) -> bool {
        self.voice.is_speaking()
    }

    pub fn visible_page_text(&self) -> String {
        match self.pagination.as_ref() {
            Some(pagination) => {
                let viewport = page_viewport(pagination, self.translate_x());
                visible_page_text(pagination, &viewport)
            }
            None => String::new(),
        }
    }

    pub fn speak_visible_page(&mut self) {
        let text = self.visible_page_text();
        self.voice.speak(&text);
    }
}
