//! Section state machine
//!
//! Per-section state is derived from formulas on demand: visible (show
//! condition), required (required condition) and complete (completion
//! condition, or every required field filled). The flow itself only stores
//! [`FlowState`]: the current section, completed and visited sections and the
//! navigation history.
//!
//! Navigation errors are returned to the host; formula failures inside the
//! conditions degrade to hidden/optional/incomplete.

use super::definition::{FlowState, Section};
use super::events::{EventBus, EventCallback, FlowEvent, SubscriptionId};
use super::timer::{AutoAdvanceTimer, ScheduledAdvance};
use crate::error::{ConfigError, FlowError, FlowResult};
use chrono::{DateTime, Utc};
use formflow_core::{FieldMap, FieldMeta, FormData};
use formflow_formula::{EvaluationContext, FormulaEngine};
use log::debug;
use serde::{Deserialize, Serialize};

/// Options for a [`SectionFlow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowOptions {
    /// Allow `navigate_previous`
    pub allow_back_navigation: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            allow_back_navigation: true,
        }
    }
}

/// Per-call navigation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Leave the current section without checking its completion
    pub skip_validation: bool,
}

impl NavigateOptions {
    pub fn skip_validation() -> Self {
        Self {
            skip_validation: true,
        }
    }
}

/// Progress through the visible sections of a form
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormProgress {
    pub visible_sections: usize,
    /// Visible sections marked completed by navigation
    pub completed_sections: usize,
    pub required_sections: usize,
    /// Whole percent of visible sections completed
    pub percent: f64,
    pub current_section_id: Option<String>,
}

/// Field fill state of one section
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProgress {
    pub section_id: String,
    pub total_fields: usize,
    pub filled_fields: usize,
    pub required_fields: usize,
    pub filled_required_fields: usize,
    /// Whole percent of fields filled
    pub percent: f64,
    pub is_complete: bool,
}

fn non_blank(formula: &Option<String>) -> Option<&str> {
    formula.as_deref().filter(|f| !f.trim().is_empty())
}

fn field_meta<'a>(field_map: &'a FieldMap, key: &str) -> Option<&'a FieldMeta> {
    field_map
        .get(key)
        .or_else(|| field_map.values().find(|meta| meta.matches(key)))
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 * 100.0 / total as f64).round()
    }
}

fn is_visible(engine: &mut FormulaEngine, section: &Section, data: &FormData, map: &FieldMap) -> bool {
    engine.evaluate_condition(section.show_condition.as_deref(), data, map)
}

fn is_required(engine: &mut FormulaEngine, section: &Section, data: &FormData, map: &FieldMap) -> bool {
    non_blank(&section.required_condition)
        .map_or(false, |formula| engine.evaluate_condition(Some(formula), data, map))
}

fn is_complete(engine: &mut FormulaEngine, section: &Section, data: &FormData, map: &FieldMap) -> bool {
    if let Some(formula) = non_blank(&section.completion_condition) {
        return engine.evaluate_condition(Some(formula), data, map);
    }

    let ctx = EvaluationContext::new(data, map);
    section
        .fields
        .iter()
        .filter(|field| field_meta(map, field).map_or(false, |meta| meta.required))
        .all(|field| !ctx.get_field_value(field).is_blank())
}

/// Section state machine for one form
#[derive(Debug, Default)]
pub struct SectionFlow {
    engine: FormulaEngine,
    options: FlowOptions,
    /// Sorted by `order`; ties keep registration order
    sections: Vec<Section>,
    state: FlowState,
    timer: AutoAdvanceTimer,
    events: EventBus,
}

impl SectionFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: FlowOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &FlowOptions {
        &self.options
    }

    // === Sections ===

    /// Register a section, replacing any section with the same id
    pub fn register_section(&mut self, section: Section) {
        if let Some(idx) = self.index_of(&section.id) {
            if self.sections[idx].order == section.order {
                self.sections[idx] = section;
                return;
            }
            self.sections.remove(idx);
        }

        let at = self
            .sections
            .iter()
            .position(|s| s.order > section.order)
            .unwrap_or(self.sections.len());
        debug!("registered section {} at position {}", section.id, at);
        self.sections.insert(at, section);
    }

    /// Remove a section and every trace of it in the flow state
    pub fn remove_section(&mut self, id: &str) -> Option<Section> {
        let idx = self.index_of(id)?;
        let removed = self.sections.remove(idx);
        self.state.forget(id);
        if self.timer.is_pending_for(id) {
            self.timer.cancel();
        }
        Some(removed)
    }

    pub fn get_section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// All sections in form order
    pub fn get_sections(&self) -> &[Section] {
        &self.sections
    }

    /// Sections whose show condition currently holds, in form order
    pub fn get_visible_sections(&mut self, form_data: &FormData, field_map: &FieldMap) -> Vec<&Section> {
        let visible = self.visible_indices(form_data, field_map);
        visible.into_iter().map(|idx| &self.sections[idx]).collect()
    }

    pub fn is_section_visible(&mut self, id: &str, form_data: &FormData, field_map: &FieldMap) -> bool {
        match self.sections.iter().find(|s| s.id == id) {
            Some(section) => is_visible(&mut self.engine, section, form_data, field_map),
            None => false,
        }
    }

    pub fn is_section_required(&mut self, id: &str, form_data: &FormData, field_map: &FieldMap) -> bool {
        match self.sections.iter().find(|s| s.id == id) {
            Some(section) => is_required(&mut self.engine, section, form_data, field_map),
            None => false,
        }
    }

    pub fn is_section_complete(&mut self, id: &str, form_data: &FormData, field_map: &FieldMap) -> bool {
        match self.sections.iter().find(|s| s.id == id) {
            Some(section) => is_complete(&mut self.engine, section, form_data, field_map),
            None => false,
        }
    }

    pub fn current_section_id(&self) -> Option<&str> {
        self.state.current_section_id.as_deref()
    }

    pub fn current_section(&self) -> Option<&Section> {
        self.current_section_id().and_then(|id| self.get_section(id))
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.id == id)
    }

    fn visible_indices(&mut self, form_data: &FormData, field_map: &FieldMap) -> Vec<usize> {
        let engine = &mut self.engine;
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, section)| is_visible(engine, section, form_data, field_map))
            .map(|(idx, _)| idx)
            .collect()
    }

    // === Navigation ===

    /// Make `sections[idx]` current
    fn enter(&mut self, idx: usize, record_history: bool) {
        let to = self.sections[idx].id.clone();
        let from = self.state.current_section_id.clone();
        if from.as_deref() == Some(to.as_str()) {
            return;
        }

        if record_history {
            if let Some(previous) = &from {
                self.state.navigation_history.push(previous.clone());
            }
        }
        self.state.visited_section_ids.insert(to.clone());
        self.state.current_section_id = Some(to.clone());
        if !self.timer.is_pending_for(&to) {
            self.timer.cancel();
        }

        debug!("section {:?} -> {}", from, to);
        self.events.emit(FlowEvent::SectionChanged { from, to });
    }

    /// Jump to a section.
    ///
    /// Fails with [`FlowError::NotFound`] for an unknown id and
    /// [`FlowError::NotVisible`] when its show condition is false.
    pub fn navigate_to_section(
        &mut self,
        id: &str,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> FlowResult<()> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        if !is_visible(&mut self.engine, &self.sections[idx], form_data, field_map) {
            return Err(FlowError::NotVisible(id.to_string()));
        }
        self.enter(idx, true);
        Ok(())
    }

    /// Move to the next visible section.
    ///
    /// Without a current section this enters the first visible one. Otherwise
    /// the current section must be complete (unless validation is skipped or
    /// the section allows skipping) and is marked completed. Returns the new
    /// current section, or `None` once the form is completed.
    pub fn navigate_next(
        &mut self,
        form_data: &FormData,
        field_map: &FieldMap,
        options: NavigateOptions,
    ) -> FlowResult<Option<String>> {
        let visible = self.visible_indices(form_data, field_map);

        let Some(current) = self.state.current_section_id.clone() else {
            return Ok(visible.first().map(|&idx| {
                self.enter(idx, true);
                self.sections[idx].id.clone()
            }));
        };
        let current_idx = self
            .index_of(&current)
            .ok_or_else(|| FlowError::NotFound(current.clone()))?;

        let section = &self.sections[current_idx];
        let complete = options.skip_validation
            || is_complete(&mut self.engine, section, form_data, field_map);
        if complete {
            self.state.completed_section_ids.insert(current.clone());
        } else if section.allow_skip {
            debug!("leaving incomplete section {}", current);
        } else {
            debug!("section {} is incomplete", current);
            self.events.emit(FlowEvent::ValidationFailed {
                section_id: current.clone(),
            });
            return Err(FlowError::Incomplete(current));
        }

        match visible.into_iter().find(|&idx| idx > current_idx) {
            Some(idx) => {
                self.enter(idx, true);
                Ok(Some(self.sections[idx].id.clone()))
            }
            None => {
                self.timer.cancel();
                debug!("form completed after {}", current);
                self.events.emit(FlowEvent::FormCompleted {
                    completed_section_ids: self.state.completed_section_ids.iter().cloned().collect(),
                });
                Ok(None)
            }
        }
    }

    /// Go back to the most recent section in the history that is still visible.
    /// Returns `None` when the history is exhausted.
    pub fn navigate_previous(
        &mut self,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> FlowResult<Option<String>> {
        if !self.options.allow_back_navigation {
            return Err(FlowError::NavigationDisabled);
        }

        while let Some(id) = self.state.navigation_history.pop() {
            if self.state.current_section_id.as_deref() == Some(id.as_str()) {
                continue;
            }
            let Some(idx) = self.index_of(&id) else {
                continue;
            };
            if !is_visible(&mut self.engine, &self.sections[idx], form_data, field_map) {
                debug!("skipping hidden section {} in history", id);
                continue;
            }
            self.enter(idx, false);
            return Ok(Some(id));
        }

        Ok(None)
    }

    /// Re-derive visibility after a data change.
    ///
    /// A current section that became hidden is replaced by the nearest visible
    /// section after it, else the first visible section, else none. Auto-advance
    /// is then (re)evaluated.
    pub fn recalculate_flow(&mut self, form_data: &FormData, field_map: &FieldMap) {
        self.recalculate_flow_at(Utc::now(), form_data, field_map);
    }

    /// [`recalculate_flow`](Self::recalculate_flow) at a given instant
    pub fn recalculate_flow_at(&mut self, now: DateTime<Utc>, form_data: &FormData, field_map: &FieldMap) {
        let visible = self.visible_indices(form_data, field_map);

        if let Some(current) = self.state.current_section_id.clone() {
            let current_idx = self.index_of(&current);
            if !current_idx.map_or(false, |idx| visible.contains(&idx)) {
                let replacement = current_idx
                    .and_then(|ci| visible.iter().copied().find(|&idx| idx > ci))
                    .or_else(|| visible.first().copied());
                match replacement {
                    Some(idx) => self.enter(idx, false),
                    None => {
                        debug!("no visible section left after hiding {}", current);
                        self.state.current_section_id = None;
                        self.timer.cancel();
                    }
                }
            }
        }

        self.evaluate_auto_advance(now, form_data, field_map);

        let visible_section_ids = visible
            .iter()
            .map(|&idx| self.sections[idx].id.clone())
            .collect();
        self.events.emit(FlowEvent::FlowRecalculated {
            current_section_id: self.state.current_section_id.clone(),
            visible_section_ids,
        });
    }

    // === Auto-advance ===

    fn evaluate_auto_advance(&mut self, now: DateTime<Utc>, form_data: &FormData, field_map: &FieldMap) {
        let Some(idx) = self
            .state
            .current_section_id
            .as_deref()
            .and_then(|id| self.index_of(id))
        else {
            self.timer.cancel();
            return;
        };

        let section = &self.sections[idx];
        if !section.auto_advance || !is_complete(&mut self.engine, section, form_data, field_map) {
            self.timer.cancel();
            return;
        }

        // An advance already pending for this section keeps its original due time
        if !self.timer.is_pending_for(&section.id) {
            self.timer
                .schedule(section.id.clone(), now, section.advance_delay_ms);
        }
    }

    /// Fire a due auto-advance; see [`poll_auto_advance_at`](Self::poll_auto_advance_at)
    pub fn poll_auto_advance(&mut self, form_data: &FormData, field_map: &FieldMap) -> FlowResult<Option<String>> {
        self.poll_auto_advance_at(Utc::now(), form_data, field_map)
    }

    /// Fire the pending auto-advance if it is due at `now`.
    ///
    /// Every precondition is checked again against the current data: the
    /// section must still be current, visible, flagged for auto-advance and
    /// complete. If so this performs `navigate_next` without validation and
    /// returns its result; otherwise the advance is dropped and `None` returned.
    pub fn poll_auto_advance_at(
        &mut self,
        now: DateTime<Utc>,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> FlowResult<Option<String>> {
        let Some(advance) = self.timer.take_due(now) else {
            return Ok(None);
        };

        if !self.auto_advance_holds(&advance.section_id, form_data, field_map) {
            debug!("auto-advance of {} dropped", advance.section_id);
            return Ok(None);
        }

        debug!("auto-advancing from {}", advance.section_id);
        self.navigate_next(form_data, field_map, NavigateOptions::skip_validation())
    }

    fn auto_advance_holds(&mut self, id: &str, form_data: &FormData, field_map: &FieldMap) -> bool {
        if self.state.current_section_id.as_deref() != Some(id) {
            return false;
        }
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let section = &self.sections[idx];
        section.auto_advance
            && is_visible(&mut self.engine, section, form_data, field_map)
            && is_complete(&mut self.engine, section, form_data, field_map)
    }

    /// Cancel the pending auto-advance. Returns whether one was pending.
    pub fn cancel_auto_advance(&mut self) -> bool {
        self.timer.cancel().is_some()
    }

    pub fn pending_auto_advance(&self) -> Option<&ScheduledAdvance> {
        self.timer.pending()
    }

    // === Progress ===

    pub fn get_form_progress(&mut self, form_data: &FormData, field_map: &FieldMap) -> FormProgress {
        let visible = self.visible_indices(form_data, field_map);

        let mut completed_sections = 0;
        let mut required_sections = 0;
        for &idx in &visible {
            let section = &self.sections[idx];
            if self.state.completed_section_ids.contains(&section.id) {
                completed_sections += 1;
            }
            if is_required(&mut self.engine, section, form_data, field_map) {
                required_sections += 1;
            }
        }

        FormProgress {
            visible_sections: visible.len(),
            completed_sections,
            required_sections,
            percent: percent(completed_sections, visible.len()),
            current_section_id: self.state.current_section_id.clone(),
        }
    }

    pub fn get_section_progress(
        &mut self,
        id: &str,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> Option<SectionProgress> {
        let idx = self.index_of(id)?;
        let section = &self.sections[idx];
        let ctx = EvaluationContext::new(form_data, field_map);

        let mut filled_fields = 0;
        let mut required_fields = 0;
        let mut filled_required_fields = 0;
        for field in &section.fields {
            let filled = !ctx.get_field_value(field).is_blank();
            let required = field_meta(field_map, field).map_or(false, |meta| meta.required);
            filled_fields += usize::from(filled);
            required_fields += usize::from(required);
            filled_required_fields += usize::from(filled && required);
        }

        Some(SectionProgress {
            section_id: section.id.clone(),
            total_fields: section.fields.len(),
            filled_fields,
            required_fields,
            filled_required_fields,
            percent: percent(filled_fields, section.fields.len()),
            is_complete: is_complete(&mut self.engine, section, form_data, field_map),
        })
    }

    // === State ===

    pub fn export_state(&self) -> FlowState {
        self.state.clone()
    }

    /// Replace the flow state. References to unknown sections are dropped and
    /// any pending auto-advance is cancelled; call
    /// [`recalculate_flow`](Self::recalculate_flow) afterwards to re-check visibility.
    pub fn import_state(&mut self, mut state: FlowState) {
        let sections = &self.sections;
        let known = |id: &String| sections.iter().any(|s| &s.id == id);

        state.completed_section_ids.retain(|id| known(id));
        state.visited_section_ids.retain(|id| known(id));
        state.navigation_history.retain(|id| known(id));
        if !state.current_section_id.as_ref().map_or(true, known) {
            state.current_section_id = None;
        }

        self.timer.cancel();
        self.state = state;
    }

    pub fn export_state_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(&self.state)?)
    }

    pub fn import_state_json(&mut self, json: &str) -> Result<(), ConfigError> {
        self.import_state(serde_json::from_str(json)?);
        Ok(())
    }

    /// Clear all navigation state. Sections and listeners are kept.
    pub fn reset(&mut self) {
        debug!("flow reset");
        self.timer.cancel();
        self.state = FlowState::default();
    }

    // === Notifications ===

    pub fn subscribe(&mut self, callback: EventCallback) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.events.len()
    }

    /// Formula engine used for section conditions
    pub fn engine_mut(&mut self) -> &mut FormulaEngine {
        &mut self.engine
    }
}
