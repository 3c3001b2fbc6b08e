// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Values diff between a release and its predecessor.
//!
//! Values often hold credentials. Callers gate this behind
//! `config_diff_enabled`, and nothing here logs the rendered text.

use crate::release::ReleaseRecord;
use serde_json::{Map, Value};
use similar::TextDiff;
use tracing::warn;

const CONTEXT_LINES: usize = 3;

fn render(values: &Map<String, Value>) -> Option<String> {
    serde_json::to_string_pretty(values).ok().map(|mut s| {
        s.push('\n');
        s
    })
}

/// Render the values change from `previous` to `current`.
///
/// Without a predecessor the full current values are returned. Identical
/// values produce an empty string.
pub fn config_diff(current: &ReleaseRecord, previous: Option<&ReleaseRecord>) -> String {
    let Some(current_text) = render(&current.config) else {
        warn!(release = %current.name, "Failed to render current values");
        return String::new();
    };

    let Some(previous) = previous else {
        return current_text;
    };

    let Some(previous_text) = render(&previous.config) else {
        warn!(release = %current.name, "Failed to render previous values");
        return String::new();
    };

    TextDiff::from_lines(&previous_text, &current_text)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header("Old Values", "New Values")
        .to_string()
}
