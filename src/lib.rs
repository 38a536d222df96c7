//! tracelens - trace viewer engine
//!
//! Displays a raster image of recorded traces at an adjustable zoom, applies
//! contrast filters, and lets the user place notes, rulers and regions of
//! interest in image coordinates. Overlays survive zoom changes, filter
//! changes and image reloads, and are persisted as JSON.
//!
//! The host application owns the window and the event loop. It talks to a
//! [`viewer::ViewerSession`], which owns everything else.

pub mod annotation;
pub mod config;
pub mod editing;
pub mod error;
pub mod filter;
pub mod live;
pub mod measure;
pub mod overlay;
pub mod persistence;
pub mod settings;
pub mod source;
pub mod store;
pub mod viewer;
pub mod zoom;

pub use error::ViewerError;
pub use viewer::ViewerSession;
