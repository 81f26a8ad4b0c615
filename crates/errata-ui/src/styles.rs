//! Ayu color theme and styling functions for `ej` output.
//!
//! Uses the Ayu Dark color palette for consistent terminal styling.
//! Color source: <https://github.com/ayu-theme/ayu-colors>
//!
//! Design principles:
//! - Only things that need attention get strong color (failures, closes)
//! - Epics get color; tasks and subtasks use standard text
//! - Small Unicode symbols for icons, NOT emoji blobs

use errata_core::enums::{IssueType, OnRespin};
use owo_colors::OwoColorize;

use crate::terminal::supports_color;

// ---------------------------------------------------------------------------
// Ayu Dark color palette (RGB values)
// ---------------------------------------------------------------------------

const PASS: (u8, u8, u8) = (0xc2, 0xd9, 0x4c); // #c2d94c - bright green
const WARN: (u8, u8, u8) = (0xff, 0xb4, 0x54); // #ffb454 - bright yellow
const FAIL: (u8, u8, u8) = (0xf0, 0x71, 0x78); // #f07178 - bright red
const MUTED: (u8, u8, u8) = (0x6c, 0x76, 0x80); // #6c7680 - muted gray
const ACCENT: (u8, u8, u8) = (0x59, 0xc2, 0xff); // #59c2ff - bright blue

const TYPE_EPIC: (u8, u8, u8) = (0xd2, 0xa6, 0xff); // #d2a6ff - purple

// ---------------------------------------------------------------------------
// Icons
// ---------------------------------------------------------------------------

pub const ICON_PASS: &str = "\u{2713}"; // check mark
pub const ICON_WARN: &str = "\u{26A0}"; // warning sign
pub const ICON_FAIL: &str = "\u{2716}"; // heavy x
pub const ICON_SKIP: &str = "-";
pub const ICON_CREATE: &str = "+";
pub const ICON_REUSE: &str = "=";

// Tree characters for hierarchical display
pub const TREE_BRANCH: &str = "\u{251C}\u{2500} "; // ├─
pub const TREE_LAST: &str = "\u{2514}\u{2500} "; // └─
pub const TREE_PIPE: &str = "\u{2502}  "; // │
pub const TREE_INDENT: &str = "   ";

// ---------------------------------------------------------------------------
// Helper: apply truecolor only when color is supported
// ---------------------------------------------------------------------------

/// Applies truecolor foreground to a string, falling back to plain text
/// when color is not supported.
fn color_str(s: &str, rgb: (u8, u8, u8)) -> String {
    if supports_color() {
        s.truecolor(rgb.0, rgb.1, rgb.2).to_string()
    } else {
        s.to_string()
    }
}

/// Applies truecolor foreground + bold to a string.
fn color_bold_str(s: &str, rgb: (u8, u8, u8)) -> String {
    if supports_color() {
        s.truecolor(rgb.0, rgb.1, rgb.2).bold().to_string()
    } else {
        s.to_string()
    }
}

// ---------------------------------------------------------------------------
// Core semantic render helpers
// ---------------------------------------------------------------------------

pub fn render_pass(s: &str) -> String {
    color_str(s, PASS)
}

pub fn render_warn(s: &str) -> String {
    color_str(s, WARN)
}

pub fn render_fail(s: &str) -> String {
    color_str(s, FAIL)
}

pub fn render_muted(s: &str) -> String {
    color_str(s, MUTED)
}

pub fn render_accent(s: &str) -> String {
    color_str(s, ACCENT)
}

pub fn render_bold(s: &str) -> String {
    if supports_color() {
        s.bold().to_string()
    } else {
        s.to_string()
    }
}

/// Renders a section header in uppercase with accent color and bold.
pub fn render_category(s: &str) -> String {
    color_bold_str(&s.to_uppercase(), ACCENT)
}

// ---------------------------------------------------------------------------
// Icon renderers
// ---------------------------------------------------------------------------

pub fn render_pass_icon() -> String {
    color_str(ICON_PASS, PASS)
}

pub fn render_warn_icon() -> String {
    color_str(ICON_WARN, WARN)
}

pub fn render_fail_icon() -> String {
    color_str(ICON_FAIL, FAIL)
}

pub fn render_skip_icon() -> String {
    color_str(ICON_SKIP, MUTED)
}

pub fn render_create_icon() -> String {
    color_str(ICON_CREATE, PASS)
}

pub fn render_reuse_icon() -> String {
    color_str(ICON_REUSE, ACCENT)
}

// ---------------------------------------------------------------------------
// Domain rendering
// ---------------------------------------------------------------------------

/// Renders an issue type. Epics get color; other types use standard text.
pub fn render_type(issue_type: IssueType) -> String {
    let s = issue_type.as_str();
    match issue_type {
        IssueType::Epic => color_bold_str(s, TYPE_EPIC),
        _ => s.to_string(),
    }
}

/// Renders an `on_respin` action. `keep` is highlighted, `close` is muted.
pub fn render_on_respin(action: OnRespin) -> String {
    match action {
        OnRespin::Keep => render_accent(action.as_str()),
        OnRespin::Close => render_muted(action.as_str()),
    }
}

/// Shortens `s` to at most `max` characters, ending with an ellipsis when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('\u{2026}');
    out
}
