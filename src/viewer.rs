//! The viewer session: owner of the image, view state and overlays.
//!
//! A host creates one session per window with [`ViewerSession::open`], feeds
//! it pointer events and user answers, asks it for frames to paint, and
//! calls [`ViewerSession::close`] on exit so the session state is written
//! back.

use std::path::{Path, PathBuf};

use image::RgbImage;
use web_time::Instant;

use crate::annotation::{AnnotationLog, AnnotationRecord};
use crate::config::UserPreferences;
use crate::editing::{EditOutcome, EditingState, OverlayEditingSession, PointerEvent, Tool};
use crate::error::{ExportError, ViewerError};
use crate::filter::{FilterMode, FilterPipeline};
use crate::live::LiveCapture;
use crate::measure::{Calibration, GridCalibration};
use crate::overlay::{DrawList, HexColor, OverlaySurface, PendingLabel, RasterSurface};
use crate::persistence::KeyValueStore;
use crate::settings::{SavedPositions, SessionSettings, SettingsWarning};
use crate::source::{FileSource, ImageSupplier, SourceError};
use crate::store::{LoadReport, OverlayEdit, OverlayStore};
use crate::zoom::{CoordinateMapper, DevicePoint, ImageSize, ZoomState};

/// What [`ViewerSession::open`] had to skip or repair.
#[derive(Debug, Clone, Default)]
pub struct OpenReport {
    pub settings: Vec<SettingsWarning>,
    pub overlays: LoadReport,
}

/// One table row of the overlay manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayRow {
    pub index: usize,
    pub kind: String,
    pub position: String,
    pub details: String,
}

/// A viewer window's state.
#[derive(Debug)]
pub struct ViewerSession {
    preferences: UserPreferences,
    image: Option<RgbImage>,
    last_file: Option<PathBuf>,
    zoom: ZoomState,
    mapper: CoordinateMapper,
    pipeline: FilterPipeline,
    overlays: OverlayStore,
    annotations: AnnotationLog,
    editing: OverlayEditingSession,
    positions: SavedPositions,
    grid: GridCalibration,
    live: LiveCapture,
}

impl ViewerSession {
    /// Fresh session with nothing restored.
    pub fn new(preferences: UserPreferences) -> Self {
        Self {
            zoom: ZoomState::new(preferences.default_zoom),
            live: LiveCapture::new(preferences.live_fps),
            preferences,
            image: None,
            last_file: None,
            mapper: CoordinateMapper::new(),
            pipeline: FilterPipeline::new(),
            overlays: OverlayStore::new(),
            annotations: AnnotationLog::new(),
            editing: OverlayEditingSession::new(),
            positions: SavedPositions::new(),
            grid: GridCalibration::default(),
        }
    }

    /// Restore a session from `store`.
    pub fn open(preferences: UserPreferences, store: &dyn KeyValueStore) -> (Self, OpenReport) {
        let (settings, warnings) = SessionSettings::load(store);
        let mut session = Self::new(preferences);
        let overlays = session.apply_settings(settings);
        log::info!(
            "Opened session with {} overlays and {} saved positions",
            session.overlays.len(),
            session.positions.len()
        );
        (
            session,
            OpenReport {
                settings: warnings,
                overlays,
            },
        )
    }

    fn apply_settings(&mut self, settings: SessionSettings) -> LoadReport {
        self.zoom = ZoomState::new(settings.last_zoom);
        self.pipeline = FilterPipeline::new()
            .with_mode(settings.contrast_mode)
            .with_enabled(settings.enhanced_mode)
            .with_trace_enhancement(settings.trace_enhancement);
        self.last_file = settings.last_file;

        let (overlays, report) = OverlayStore::from_values(&settings.analysis_overlays);
        self.overlays = overlays;
        self.annotations = AnnotationLog::from_value(&settings.saved_annotations);
        self.positions = settings.saved_positions;
        self.grid = settings.grid_calibration;

        self.editing = OverlayEditingSession::new();
        self.editing.set_calibration(settings.calibration);
        if settings.analysis_mode_active {
            if let Err(e) = self.editing.select_tool(settings.current_analysis_tool) {
                log::warn!("Could not restore tool {:?}: {}", settings.current_analysis_tool, e);
            }
        }
        report
    }

    /// Snapshot of everything that is persisted.
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            last_zoom: self.zoom.scale_percent(),
            enhanced_mode: self.pipeline.enabled,
            contrast_mode: self.pipeline.mode,
            trace_enhancement: self.pipeline.trace_enhancement,
            last_file: self.last_file.clone(),
            analysis_overlays: self.overlays.to_values(),
            saved_annotations: self.annotations.to_value(),
            saved_positions: self.positions.clone(),
            analysis_mode_active: self.editing.is_active(),
            current_analysis_tool: self.editing.state().tool().unwrap_or_default(),
            calibration: self.editing.calibration().cloned(),
            grid_calibration: self.grid.clone(),
        }
    }

    /// Stop live capture, drop any pending draft and write the session back.
    pub fn close(&mut self, store: &mut dyn KeyValueStore) -> Result<(), ViewerError> {
        self.live.stop();
        let settings = self.settings();
        if self.editing.state().is_busy() {
            log::debug!("Discarding unfinished drawing on close");
        }
        settings.save(store)?;
        self.overlays.mark_clean();
        log::info!("Closed session ({} overlays saved)", self.overlays.len());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Image
    // ------------------------------------------------------------------------

    pub fn image(&self) -> Option<&RgbImage> {
        self.image.as_ref()
    }

    pub fn image_size(&self) -> Option<ImageSize> {
        self.image.as_ref().map(ImageSize::of)
    }

    pub fn last_file(&self) -> Option<&Path> {
        self.last_file.as_deref()
    }

    /// Replace the image with one from `supplier`. On failure the current
    /// image and overlays are untouched.
    pub fn load_from(&mut self, supplier: &mut dyn ImageSupplier) -> Result<ImageSize, ViewerError> {
        let image = supplier.acquire().inspect_err(|e| {
            log::warn!("Acquisition from {} failed: {}", supplier.name(), e);
        })?;
        let size = ImageSize::of(&image);
        if size.is_empty() {
            log::warn!("{} returned an empty frame, keeping the current image", supplier.name());
            return Err(SourceError::Empty {
                width: size.width,
                height: size.height,
            }
            .into());
        }
        log::debug!("Acquired {}x{} from {}", size.width, size.height, supplier.name());
        self.image = Some(image);
        Ok(size)
    }

    /// Load an image file and remember it as the last file.
    pub fn open_file(&mut self, path: &Path) -> Result<ImageSize, ViewerError> {
        let size = self.load_from(&mut FileSource::new(path))?;
        self.last_file = Some(path.to_path_buf());
        Ok(size)
    }

    // ------------------------------------------------------------------------
    // View state
    // ------------------------------------------------------------------------

    pub fn zoom(&self) -> &ZoomState {
        &self.zoom
    }

    pub fn zoom_mut(&mut self) -> &mut ZoomState {
        &mut self.zoom
    }

    /// Device position of the bitmap's top-left corner.
    pub fn set_viewport_origin(&mut self, origin: DevicePoint) {
        self.mapper.set_origin(origin);
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    /// Toggle enhanced mode. Switching on jumps to the enhanced zoom,
    /// switching off back to the default zoom.
    pub fn set_enhanced(&mut self, enabled: bool) {
        self.pipeline.enabled = enabled;
        let zoom = if enabled {
            self.preferences.enhanced_zoom
        } else {
            self.preferences.default_zoom
        };
        self.zoom.set_scale(zoom);
        log::debug!("Enhanced mode {} (zoom {}%)", enabled, self.zoom.scale_percent());
    }

    pub fn set_contrast_mode(&mut self, mode: FilterMode) {
        self.pipeline.mode = mode;
        log::debug!("Contrast mode: {}", mode);
    }

    /// Advance to the next contrast mode.
    pub fn cycle_contrast(&mut self) -> FilterMode {
        self.set_contrast_mode(self.pipeline.mode.next());
        self.pipeline.mode
    }

    pub fn set_trace_enhancement(&mut self, enabled: bool) {
        self.pipeline.trace_enhancement = enabled;
    }

    // ------------------------------------------------------------------------
    // Saved positions
    // ------------------------------------------------------------------------

    pub fn positions(&self) -> &SavedPositions {
        &self.positions
    }

    /// Save the current zoom and scroll under `name`.
    pub fn save_position(&mut self, name: &str) -> bool {
        self.positions.save_current(name, &self.zoom)
    }

    /// Restore a saved position. Returns `false` for an unknown name.
    pub fn load_position(&mut self, name: &str) -> bool {
        match self.positions.get(name) {
            Some(position) => {
                self.zoom = position.to_zoom();
                log::debug!("Restored position '{}'", name);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Rendering and export
    // ------------------------------------------------------------------------

    /// Filtered, scaled bitmap of the current image.
    pub fn render_bitmap(&self) -> Result<RgbImage, ViewerError> {
        let image = self.image.as_ref().ok_or(ViewerError::NoImage)?;
        Ok(self.pipeline.render(image, &self.zoom)?)
    }

    /// Draw annotations, committed overlays and the draft, in that order.
    pub fn draw_overlays(&self, surface: &mut dyn OverlaySurface) {
        self.annotations.render(surface, &self.zoom);
        for overlay in self.overlays.iter() {
            overlay.render(surface, &self.zoom);
        }
        if let Some(draft) = self.editing.draft() {
            draft.render(surface, &self.zoom);
        }
    }

    /// Overlay primitives for a host painter.
    pub fn overlay_draw_list(&self) -> DrawList {
        let mut list = DrawList::new();
        self.draw_overlays(&mut list);
        list
    }

    /// Bitmap with overlays rasterised on top. Labels are returned for the
    /// host to paint.
    pub fn render_composited(&self) -> Result<(RgbImage, Vec<PendingLabel>), ViewerError> {
        let bitmap = self.render_bitmap()?;
        match RasterSurface::from_rgb(&bitmap) {
            Some(mut surface) => {
                self.draw_overlays(&mut surface);
                Ok(surface.finish())
            }
            None => Ok((bitmap, Vec::new())),
        }
    }

    /// Write the current view as PNG. The raster is produced by the same
    /// path as the preview.
    pub fn export_view(&self, path: &Path, with_overlays: bool) -> Result<ImageSize, ViewerError> {
        if self.image.is_none() {
            return Err(ExportError::NoImage.into());
        }
        let bitmap = if with_overlays {
            self.render_composited()?.0
        } else {
            self.render_bitmap()?
        };
        bitmap
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|source| ExportError::Encode {
                path: path.to_path_buf(),
                source,
            })?;
        log::info!(
            "Exported {}x{} view to {:?}",
            bitmap.width(),
            bitmap.height(),
            path
        );
        Ok(ImageSize::of(&bitmap))
    }

    // ------------------------------------------------------------------------
    // Live capture
    // ------------------------------------------------------------------------

    pub fn live(&self) -> &LiveCapture {
        &self.live
    }

    /// Start live capture. The contrast mode goes back to normal.
    pub fn start_live(&mut self, fps: u32, now: Instant) {
        self.set_contrast_mode(FilterMode::None);
        self.live.set_fps(fps, now);
        self.live.start(now);
    }

    pub fn stop_live(&mut self) {
        self.live.stop();
    }

    /// Run one live tick if one is due. Returns whether a new frame arrived.
    /// A failed capture keeps the previous frame.
    pub fn live_tick(
        &mut self,
        supplier: &mut dyn ImageSupplier,
        now: Instant,
    ) -> Result<bool, ViewerError> {
        let Some(token) = self.live.begin_tick(now) else {
            return Ok(false);
        };
        let result = self.load_from(supplier);
        self.live.finish_tick(token, now);
        result.map(|_| true)
    }

    // ------------------------------------------------------------------------
    // Overlay editing
    // ------------------------------------------------------------------------

    pub fn editing(&self) -> &OverlayEditingSession {
        &self.editing
    }

    pub fn editing_state(&self) -> &EditingState {
        self.editing.state()
    }

    pub fn overlays(&self) -> &OverlayStore {
        &self.overlays
    }

    /// Switch analysis mode. Turning it on arms `tool`; turning it off drops
    /// any drawing in progress.
    pub fn set_analysis_mode(&mut self, active: bool, tool: Tool) -> Result<EditOutcome, ViewerError> {
        if active {
            Ok(self.editing.select_tool(tool)?)
        } else {
            Ok(self.editing.deactivate())
        }
    }

    pub fn select_tool(&mut self, tool: Tool) -> Result<EditOutcome, ViewerError> {
        Ok(self.editing.select_tool(tool)?)
    }

    pub fn pointer(&mut self, event: PointerEvent) -> Result<EditOutcome, ViewerError> {
        let size = self.image_size();
        Ok(self
            .editing
            .handle_pointer(event, &self.mapper, &self.zoom, size)?)
    }

    pub fn commit_text(&mut self, text: &str) -> Result<EditOutcome, ViewerError> {
        Ok(self.editing.commit_text(text, &mut self.overlays)?)
    }

    pub fn commit_color(&mut self, color: HexColor) -> Result<EditOutcome, ViewerError> {
        Ok(self.editing.commit_color(color)?)
    }

    pub fn cancel(&mut self) -> Result<EditOutcome, ViewerError> {
        Ok(self.editing.cancel(&mut self.overlays)?)
    }

    pub fn set_calibration(&mut self, calibration: Option<Calibration>) {
        self.editing.set_calibration(calibration);
    }

    pub fn grid_calibration(&self) -> &GridCalibration {
        &self.grid
    }

    pub fn set_grid_calibration(&mut self, grid: GridCalibration) {
        self.grid = grid;
    }

    // ------------------------------------------------------------------------
    // Overlay management
    // ------------------------------------------------------------------------

    /// Rows for the overlay manager table.
    pub fn overlay_rows(&self) -> Vec<OverlayRow> {
        self.overlays
            .iter()
            .enumerate()
            .map(|(index, overlay)| {
                let (kind, position, details) = overlay.summary();
                OverlayRow {
                    index,
                    kind,
                    position,
                    details,
                }
            })
            .collect()
    }

    pub fn delete_overlay(&mut self, index: usize) -> Result<(), ViewerError> {
        self.overlays.delete(index)?;
        Ok(())
    }

    pub fn edit_overlay(&mut self, index: usize, edit: &OverlayEdit) -> Result<bool, ViewerError> {
        Ok(self.overlays.edit(index, edit)?)
    }

    pub fn clear_overlays(&mut self) {
        self.overlays.clear();
    }

    pub fn export_overlays(&self, path: &Path) -> Result<usize, ViewerError> {
        Ok(self.overlays.export_to_file(path)?)
    }

    /// Replace the overlays with those in `path`. Refused while drawing.
    pub fn import_overlays(&mut self, path: &Path) -> Result<LoadReport, ViewerError> {
        if self.editing.state().is_busy() {
            return Err(crate::editing::EditError::DrawingInProgress.into());
        }
        let (overlays, report) = OverlayStore::import_from_file(path)?;
        self.overlays = overlays;
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Annotation log
    // ------------------------------------------------------------------------

    pub fn annotations(&self) -> &AnnotationLog {
        &self.annotations
    }

    pub fn add_annotation(&mut self, record: AnnotationRecord) -> usize {
        self.annotations.add(record)
    }

    pub fn remove_annotation(&mut self, index: usize) -> Option<AnnotationRecord> {
        self.annotations.remove(index)
    }
}
