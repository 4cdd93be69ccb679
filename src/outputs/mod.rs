//! Output generation for the persisted history.
//!
//! - [`html`]: Renders every stored record into a static HTML page
//!
//! The report is rebuilt from the full history on every run, so it always
//! matches what is on disk.

pub mod html;
