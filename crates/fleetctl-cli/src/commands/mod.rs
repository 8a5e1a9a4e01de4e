//! Command implementations

pub mod apply;
pub mod destroy;
pub mod infra;
pub mod logs;
pub mod model;
pub mod run;

use crate::output::ProgressBar;
use fleetctl_core::types::ProgressEvent;

/// Renders one streamed pull event onto a progress bar. Shared by
/// `apply`, `run`, and `model deploy`.
pub(crate) fn render_pull_progress(bar: &ProgressBar, event: &ProgressEvent) {
    match event {
        ProgressEvent::ManifestStart => bar.set_message("pulling manifest"),
        ProgressEvent::LayerProgress { digest, total, completed } => {
            bar.set_length(*total);
            bar.set_position(*completed);
            bar.set_message(format!("layer {}", &digest[..digest.len().min(12)]));
        }
        ProgressEvent::Success => bar.set_message("success"),
        ProgressEvent::Error { msg } => bar.set_message(format!("error: {msg}")),
        ProgressEvent::Other { status } => bar.set_message(status.clone()),
    }
}
