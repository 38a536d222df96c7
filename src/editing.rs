//! Interactive overlay drawing.
//!
//! Every dialog of the drawing flow is a named state that waits for an
//! explicit answer (`commit_text`, `commit_color` or `cancel`), so the host
//! decides how and when to ask the user.

use thiserror::Error;

use crate::measure::Calibration;
use crate::overlay::{
    EXTRA_CALIBRATED_VALUE, EXTRA_NOTE, EXTRA_UNIT, HexColor, Overlay, OverlayId, OverlayKind,
};
use crate::store::{OverlayStore, StoreError};
use crate::zoom::{CoordinateMapper, DevicePoint, ImageSize, Point, ZoomState};

/// Placeholder id carried by drafts until they are committed.
const DRAFT_ID: &str = "draft";

/// Errors from editing operations.
#[derive(Debug, Error)]
pub enum EditError {
    /// A draft or prompt is pending; finish or cancel it first
    #[error("A drawing is in progress")]
    DrawingInProgress,

    /// An answer was supplied but no prompt is waiting for it
    #[error("No prompt is waiting for an answer")]
    NoPendingPrompt,

    /// Pointer input arrived with no image loaded
    #[error("No image loaded")]
    NoImage,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Overlay drawing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Note,
    Ruler,
    RegionOfInterest,
}

impl Tool {
    /// Display and persisted name.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Note => "Note",
            Tool::Ruler => "Ruler",
            Tool::RegionOfInterest => "ROI",
        }
    }

    pub fn all() -> &'static [Tool] {
        &[Tool::Note, Tool::Ruler, Tool::RegionOfInterest]
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::all().iter().copied().find(|t| t.name() == name)
    }

    /// Kind of overlay this tool produces.
    pub fn kind(&self) -> OverlayKind {
        match self {
            Tool::Note => OverlayKind::Note,
            Tool::Ruler => OverlayKind::Ruler,
            Tool::RegionOfInterest => OverlayKind::RegionOfInterest,
        }
    }
}

/// Where the editing flow currently is.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EditingState {
    /// Analysis mode off.
    #[default]
    Idle,
    /// A tool is selected and waits for a press.
    Armed(Tool),
    /// A note was placed at `at` and needs its text.
    AwaitingNoteText { at: Point },
    /// A ruler was started at `at` and needs its color.
    AwaitingRulerColor { at: Point },
    /// A draft follows the pointer.
    Drawing { tool: Tool, draft: Overlay },
    /// A finished draft waits for an optional note.
    AwaitingDraftNote { tool: Tool, draft: Overlay },
}

impl EditingState {
    /// Tool in use, if any.
    pub fn tool(&self) -> Option<Tool> {
        match self {
            EditingState::Idle => None,
            EditingState::Armed(tool)
            | EditingState::Drawing { tool, .. }
            | EditingState::AwaitingDraftNote { tool, .. } => Some(*tool),
            EditingState::AwaitingNoteText { .. } => Some(Tool::Note),
            EditingState::AwaitingRulerColor { .. } => Some(Tool::Ruler),
        }
    }

    /// True while a draft or a prompt is pending.
    pub fn is_busy(&self) -> bool {
        !matches!(self, EditingState::Idle | EditingState::Armed(_))
    }
}

/// Pointer input in device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Press(DevicePoint),
    Move(DevicePoint),
    Release(DevicePoint),
    /// Secondary button: abandons the current draft.
    Secondary,
}

/// What an editing call did.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Nothing happened.
    Ignored,
    /// The state changed without producing a prompt.
    StateChanged,
    /// The host should ask for note text.
    PromptNoteText,
    /// The host should ask for a ruler color.
    PromptRulerColor,
    /// The host should ask for an optional note on the finished draft.
    PromptDraftNote,
    /// The draft moved; re-render the preview.
    PreviewUpdated,
    /// An overlay was added to the store at this index.
    Committed(usize),
    /// The pending draft or prompt was dropped.
    Discarded,
}

/// Drawing state machine for one viewer.
#[derive(Debug, Clone, Default)]
pub struct OverlayEditingSession {
    state: EditingState,
    calibration: Option<Calibration>,
}

impl OverlayEditingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditingState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, EditingState::Idle)
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Calibration applied to committed rulers. `None` disables it.
    pub fn set_calibration(&mut self, calibration: Option<Calibration>) {
        self.calibration = calibration;
    }

    /// The in-progress draft, for preview rendering.
    pub fn draft(&self) -> Option<&Overlay> {
        match &self.state {
            EditingState::Drawing { draft, .. } | EditingState::AwaitingDraftNote { draft, .. } => {
                Some(draft)
            }
            _ => None,
        }
    }

    fn transition(&mut self, next: EditingState) {
        log::debug!("Editing: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Arm `tool`. Refused while a draft or prompt is pending.
    pub fn select_tool(&mut self, tool: Tool) -> Result<EditOutcome, EditError> {
        if self.state.is_busy() {
            return Err(EditError::DrawingInProgress);
        }
        if self.state == EditingState::Armed(tool) {
            return Ok(EditOutcome::Ignored);
        }
        self.transition(EditingState::Armed(tool));
        Ok(EditOutcome::StateChanged)
    }

    /// Leave analysis mode, discarding any pending draft or prompt.
    pub fn deactivate(&mut self) -> EditOutcome {
        match self.state {
            EditingState::Idle => EditOutcome::Ignored,
            EditingState::Armed(_) => {
                self.transition(EditingState::Idle);
                EditOutcome::StateChanged
            }
            _ => {
                self.transition(EditingState::Idle);
                EditOutcome::Discarded
            }
        }
    }

    /// Primary press at an in-bounds image point.
    pub fn press(&mut self, at: Point) -> EditOutcome {
        let EditingState::Armed(tool) = self.state else {
            return EditOutcome::Ignored;
        };
        match tool {
            Tool::Note => {
                self.transition(EditingState::AwaitingNoteText { at });
                EditOutcome::PromptNoteText
            }
            Tool::Ruler => {
                self.transition(EditingState::AwaitingRulerColor { at });
                EditOutcome::PromptRulerColor
            }
            Tool::RegionOfInterest => {
                let draft = Overlay::region(
                    OverlayId::new(DRAFT_ID),
                    at,
                    at,
                    OverlayKind::RegionOfInterest.default_color(),
                );
                self.transition(EditingState::Drawing { tool, draft });
                EditOutcome::StateChanged
            }
        }
    }

    /// Pointer motion. Only a drawing draft reacts.
    pub fn move_to(&mut self, at: Point) -> EditOutcome {
        match &mut self.state {
            EditingState::Drawing { draft, .. } => {
                draft.set_free_endpoint(at);
                EditOutcome::PreviewUpdated
            }
            _ => EditOutcome::Ignored,
        }
    }

    /// Primary release: fixes the free endpoint and asks for a note.
    pub fn release(&mut self, at: Point) -> EditOutcome {
        let state = std::mem::take(&mut self.state);
        match state {
            EditingState::Drawing { tool, mut draft } => {
                draft.set_free_endpoint(at);
                self.transition(EditingState::AwaitingDraftNote { tool, draft });
                EditOutcome::PromptDraftNote
            }
            other => {
                self.state = other;
                EditOutcome::Ignored
            }
        }
    }

    /// Secondary action: drop a drawing draft.
    pub fn secondary(&mut self) -> EditOutcome {
        match self.state {
            EditingState::Drawing { tool, .. } => {
                self.transition(EditingState::Armed(tool));
                EditOutcome::Discarded
            }
            _ => EditOutcome::Ignored,
        }
    }

    /// Answer a text prompt: note text or the optional draft note.
    pub fn commit_text(
        &mut self,
        text: &str,
        store: &mut OverlayStore,
    ) -> Result<EditOutcome, EditError> {
        let state = std::mem::take(&mut self.state);
        match state {
            EditingState::AwaitingNoteText { at } => {
                if text.is_empty() {
                    self.transition(EditingState::Armed(Tool::Note));
                    return Ok(EditOutcome::Discarded);
                }
                let note = Overlay::note(
                    store.next_id(),
                    at,
                    text,
                    OverlayKind::Note.default_color(),
                );
                self.state = EditingState::Armed(Tool::Note);
                Ok(EditOutcome::Committed(store.add(note)?))
            }
            EditingState::AwaitingDraftNote { tool, draft } => {
                self.commit_draft(tool, draft, Some(text), store)
            }
            other => {
                self.state = other;
                Err(EditError::NoPendingPrompt)
            }
        }
    }

    /// Answer the ruler color prompt and start drawing.
    pub fn commit_color(&mut self, color: HexColor) -> Result<EditOutcome, EditError> {
        match self.state {
            EditingState::AwaitingRulerColor { at } => {
                let draft = Overlay::ruler(OverlayId::new(DRAFT_ID), at, at, color);
                self.transition(EditingState::Drawing {
                    tool: Tool::Ruler,
                    draft,
                });
                Ok(EditOutcome::StateChanged)
            }
            _ => Err(EditError::NoPendingPrompt),
        }
    }

    /// Dismiss the current prompt or draft.
    ///
    /// A dismissed draft note still commits the draft, since the note is
    /// optional.
    pub fn cancel(&mut self, store: &mut OverlayStore) -> Result<EditOutcome, EditError> {
        let state = std::mem::take(&mut self.state);
        match state {
            EditingState::AwaitingNoteText { .. } => {
                self.transition(EditingState::Armed(Tool::Note));
                Ok(EditOutcome::Discarded)
            }
            EditingState::AwaitingRulerColor { .. } => {
                self.transition(EditingState::Armed(Tool::Ruler));
                Ok(EditOutcome::Discarded)
            }
            EditingState::Drawing { tool, .. } => {
                self.transition(EditingState::Armed(tool));
                Ok(EditOutcome::Discarded)
            }
            EditingState::AwaitingDraftNote { tool, draft } => {
                self.commit_draft(tool, draft, None, store)
            }
            other => {
                self.state = other;
                Ok(EditOutcome::Ignored)
            }
        }
    }

    fn commit_draft(
        &mut self,
        tool: Tool,
        mut draft: Overlay,
        note: Option<&str>,
        store: &mut OverlayStore,
    ) -> Result<EditOutcome, EditError> {
        if let Some(note) = note.filter(|n| !n.is_empty()) {
            draft.set_extra(EXTRA_NOTE, note);
        }
        if let (Some(cal), Some(distance)) = (&self.calibration, draft.distance()) {
            draft.set_extra(EXTRA_CALIBRATED_VALUE, distance * cal.factor());
            draft.set_extra(EXTRA_UNIT, cal.unit());
        }
        draft.id = store.next_id();
        self.transition(EditingState::Armed(tool));
        Ok(EditOutcome::Committed(store.add(draft)?))
    }

    /// Route a device-space pointer event. Events outside the image are
    /// ignored without touching the state.
    pub fn handle_pointer(
        &mut self,
        event: PointerEvent,
        mapper: &CoordinateMapper,
        zoom: &ZoomState,
        image: Option<ImageSize>,
    ) -> Result<EditOutcome, EditError> {
        if !self.is_active() {
            return Ok(EditOutcome::Ignored);
        }
        let size = image.ok_or(EditError::NoImage)?;
        let map = |p| mapper.to_image_space(p, zoom, size);

        let outcome = match event {
            PointerEvent::Secondary => self.secondary(),
            PointerEvent::Press(p) => map(p).map_or(EditOutcome::Ignored, |at| self.press(at)),
            PointerEvent::Move(p) => map(p).map_or(EditOutcome::Ignored, |at| self.move_to(at)),
            PointerEvent::Release(p) => {
                map(p).map_or(EditOutcome::Ignored, |at| self.release(at))
            }
        };
        Ok(outcome)
    }
}
