//! This library keeps a Spectra installation in sync with its plug-in
//! update sites.
//!
//! Open a manager on an installation root as follows:
//!
//! ```no_run
//! use rups::updater::UpdateManager;
//!
//! let manager = UpdateManager::open("path/to/Spectra");
//! ```

pub mod cmd;
pub mod config;
pub mod updater;
