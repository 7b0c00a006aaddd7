//! Per-field keyboard probes.
//!
//! Each probe focuses one input field, drives the on-screen keyboard, and
//! diffs snapshots to decide what happened. Two interaction strategies:
//!
//! - **Key traversal**: when the keyboard exposes `Button` children in the
//!   accessibility tree, every visible key is tapped once and must produce an
//!   observable change (field-text delta or visible-key-set delta) unless its
//!   label is a known non-content key.
//! - **Grid taps**: when no keys are discoverable, a uniform grid of points
//!   inside the keyboard container is tapped and the field text diffed after
//!   each tap.
//!
//! Behavioral deviations are recorded as anomalies and never abort the run;
//! a field whose element cannot be located or focused is skipped, not fatal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::thread;

use crate::config::Config;
use crate::device::DeviceControl;
use crate::poll::poll_until;
use crate::snapshot;
use crate::uitree::{grid_points, Bounds, UiSnapshot};

/// Widget class the keyboard renders its keys as
pub const KEY_BUTTON_CLASS: &str = "android.widget.Button";

/// Language-indicator labels the keyboard cycles through
pub const LANGUAGE_LABELS: &[&str] = &["EN", "中", "FR", "AR"];

/// The language a password keyboard must stay pinned to
pub const PASSWORD_BASELINE_LANGUAGE: &str = "EN";

/// Labels that enter the symbol page
const SYMBOL_TOGGLE_LABELS: &[&str] = &["123", "?123", "#+=", "#", "Sym"];

/// Labels that leave the symbol page
const SYMBOL_RETURN_LABELS: &[&str] = &["ABC", "abc"];

/// Non-content keys that are allowed to produce no observable change
const CONTROL_KEY_LABELS: &[&str] = &[
    "⇧", "Shift", "⌫", "Del", "Backspace", "↵", "Enter", "␣", "Space", "123", "?123", "#+=", "#",
    "ABC", "abc", "Sym",
];

/// Seed keys typed to provoke CJK candidate suggestions ("ni" → 你)
const CJK_SEED_KEYS: &[&str] = &["n", "i"];

/// Grid strategy dimensions (rows x cols, padded inside the container)
const GRID_ROWS: usize = 5;
const GRID_COLS: usize = 10;
const GRID_PAD: i32 = 12;

/// Vertical position of the tab row as a fraction of screen height
const TAB_ROW_Y_FRACTION: f64 = 0.14;

/// One recorded deviation from expected keyboard behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    /// Field under probe (TEXT, NUMBER, PHONE, PASSWORD)
    pub field: String,
    /// Phase the deviation was observed in (tab, focus, keyboard, typing, ...)
    pub phase: String,
    /// Human-readable detail
    pub detail: String,
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(\"{}\", \"{}\", \"{}\")",
            self.field, self.phase, self.detail
        )
    }
}

/// Result of a complete probe run
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    /// When the run started
    #[serde(with = "chrono::serde::ts_seconds")]
    pub started: DateTime<Utc>,
    /// Every anomaly observed, in probe order
    pub anomalies: Vec<Anomaly>,
}

impl ProbeReport {
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
            anomalies: Vec::new(),
        }
    }
}

impl Default for ProbeReport {
    fn default() -> Self {
        Self::new()
    }
}

/// The four input fields the demo app exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Phone,
    Password,
}

impl FieldKind {
    /// Probe order of a full run
    pub fn all() -> [FieldKind; 4] {
        [
            FieldKind::Text,
            FieldKind::Number,
            FieldKind::Phone,
            FieldKind::Password,
        ]
    }

    /// Field name used in anomaly records
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "TEXT",
            FieldKind::Number => "NUMBER",
            FieldKind::Phone => "PHONE",
            FieldKind::Password => "PASSWORD",
        }
    }

    /// Resource name of the field's tab selector
    pub fn tab_resource(&self) -> &'static str {
        match self {
            FieldKind::Text => "btn_text",
            FieldKind::Number => "btn_number",
            FieldKind::Phone => "btn_phone",
            FieldKind::Password => "btn_password",
        }
    }

    /// Resource name of the field's edit element
    pub fn field_resource(&self) -> &'static str {
        match self {
            FieldKind::Text => "et_text",
            FieldKind::Number => "et_number",
            FieldKind::Phone => "et_phone",
            FieldKind::Password => "et_password",
        }
    }

    /// Horizontal position of the tab as a fraction of screen width
    /// (fallback when the tab's resource id is absent from the dump)
    pub fn tab_x_fraction(&self) -> f64 {
        match self {
            FieldKind::Text => 0.14,
            FieldKind::Number => 0.34,
            FieldKind::Password => 0.54,
            FieldKind::Phone => 0.74,
        }
    }

    /// Whether this field's keypad must expose the digits 0-9
    pub fn expect_digits(&self) -> bool {
        matches!(self, FieldKind::Number | FieldKind::Phone)
    }
}

/// Whether a key label is allowed to produce no observable change
pub fn is_non_content_key(label: &str) -> bool {
    CONTROL_KEY_LABELS.contains(&label) || LANGUAGE_LABELS.contains(&label)
}

/// Whether a character is in the main CJK unified ideograph ranges
fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

/// Whether a key label reads as an IME candidate suggestion
/// (contains CJK code points and is not the language indicator itself)
pub fn is_candidate_label(label: &str) -> bool {
    label.chars().any(is_cjk) && !LANGUAGE_LABELS.contains(&label)
}

/// Digits 0-9 absent from the given key labels
pub fn missing_digits(labels: &BTreeSet<String>) -> Vec<char> {
    ('0'..='9')
        .filter(|d| !labels.contains(&d.to_string()))
        .collect()
}

/// Best-effort append diff: the inserted suffix when `cur` extends `prev`.
///
/// This is a heuristic, not a content check: cursor-positioned insertion or
/// autocorrect rewrites do not read as an append and yield `None`.
pub fn diff_append<'a>(prev: &str, cur: &'a str) -> Option<&'a str> {
    cur.strip_prefix(prev).filter(|delta| !delta.is_empty())
}

/// Drives the probes for one device and accumulates the report
pub struct Prober<'a> {
    dev: &'a dyn DeviceControl,
    config: &'a Config,
    report: ProbeReport,
}

impl<'a> Prober<'a> {
    pub fn new(dev: &'a dyn DeviceControl, config: &'a Config) -> Self {
        Self {
            dev,
            config,
            report: ProbeReport::new(),
        }
    }

    /// Force-stop, clear, and relaunch the target app
    pub fn relaunch_app(&self) {
        let timing = &self.config.timing;
        let app = &self.config.app;
        self.dev
            .run(&["am", "force-stop", &app.package], timing.command_timeout);
        self.dev
            .run(&["pm", "clear", &app.package], timing.command_timeout);
        self.dev
            .run(&["am", "start", "-n", &app.activity], timing.command_timeout);
        thread::sleep(timing.launch_delay);
    }

    /// Run every field probe in order and hand back the report
    pub fn run_all(mut self) -> ProbeReport {
        for kind in FieldKind::all() {
            println!("PROBE {}", kind.name());
            self.probe_field(kind);
        }
        self.report
    }

    /// Consume the prober and hand back whatever was recorded so far
    pub fn into_report(self) -> ProbeReport {
        self.report
    }

    /// Probe a single field end-to-end (never panics; failures become anomalies)
    pub fn probe_field(&mut self, kind: FieldKind) {
        let app = &self.config.app;
        let field_id = app.resource_id(kind.field_resource());

        if !self.tap_tab(kind) {
            self.record(kind, "tab", "failed to click tab");
            return;
        }
        // Give the UI a moment to swap the visible EditText.
        thread::sleep(self.config.timing.tap_delay);

        if !self.tap_field(kind) {
            // Fallback: tap the center of the generic input container.
            if let Some(container) = self.node_bounds(&app.input_container_id()) {
                let (x, y) = container.center();
                self.dev.tap(x, y, self.config.timing.command_timeout);
                thread::sleep(self.config.timing.tap_delay);
            }
            // Re-check: the field must be readable and, when it claims to be
            // focusable, actually focused now.
            let settled = self
                .snapshot()
                .and_then(|s| s.find_by_id(&field_id).map(|n| !n.focusable || n.focused))
                .unwrap_or(false);
            if !settled {
                self.record(kind, "focus", "failed to click EditText");
                return;
            }
        }

        let Some(keyboard) = self.node_bounds(&app.keyboard_container_id()) else {
            self.record(kind, "keyboard", "missing keyboard container");
            return;
        };

        let before = self.field_text(&field_id);
        let keys = self
            .snapshot()
            .map(|snap| visible_keys(&snap, keyboard))
            .unwrap_or_default();

        if keys.is_empty() {
            self.grid_probe(kind, &field_id, keyboard, &before);
        } else {
            self.key_probe(kind, &field_id, keyboard, &keys);
            match kind {
                FieldKind::Text => {
                    self.symbol_page_check(keyboard);
                    self.cjk_candidate_check(keyboard);
                }
                FieldKind::Password => self.password_checks(keyboard),
                _ => {}
            }
        }
    }

    fn record(&mut self, kind: FieldKind, phase: &str, detail: impl Into<String>) {
        let anomaly = Anomaly {
            field: kind.name().to_string(),
            phase: phase.to_string(),
            detail: detail.into(),
        };
        eprintln!("anomaly: {}", anomaly);
        self.report.anomalies.push(anomaly);
    }

    fn snapshot(&self) -> Option<UiSnapshot> {
        snapshot::fetch(self.dev, self.config)
    }

    fn node_bounds(&self, resource_id: &str) -> Option<Bounds> {
        self.snapshot()?.find_by_id(resource_id)?.bounds
    }

    /// Displayed text of a node, or empty when it cannot be read
    fn field_text(&self, resource_id: &str) -> String {
        self.snapshot()
            .and_then(|s| s.find_by_id(resource_id).map(|n| n.text.clone()))
            .unwrap_or_default()
    }

    fn tap_tab(&mut self, kind: FieldKind) -> bool {
        let tab_id = self.config.app.resource_id(kind.tab_resource());
        let timing = self.config.timing.clone();
        poll_until(timing.tap_attempts, timing.tap_delay, || {
            let snap = self.snapshot()?;
            match snap.find_by_id(&tab_id).and_then(|n| n.center()) {
                Some((x, y)) => {
                    self.dev.tap(x, y, timing.command_timeout);
                    Some(true)
                }
                None => {
                    // Some ROMs intermittently omit nodes from the dump; fall
                    // back to the known tab-row position.
                    let (w, h) = snap.screen_size();
                    let x = (w as f64 * kind.tab_x_fraction()) as i32;
                    let y = (h as f64 * TAB_ROW_Y_FRACTION) as i32;
                    self.dev.tap(x, y, timing.command_timeout);
                    Some(true)
                }
            }
        })
        .unwrap_or(false)
    }

    /// Tap the field's edit element and verify it took focus.
    ///
    /// Retries across snapshots; swipes upward a bounded number of times to
    /// bring an off-screen target into view; double-taps to absorb first-tap
    /// flakiness. Focus is only enforced for nodes reporting focusable=true.
    fn tap_field(&mut self, kind: FieldKind) -> bool {
        let field_id = self.config.app.resource_id(kind.field_resource());
        let timing = self.config.timing.clone();
        let mut scrolls_left = timing.scroll_attempts;

        poll_until(timing.tap_attempts, timing.tap_delay, || {
            let snap = self.snapshot()?;
            let Some(node) = snap.find_by_id(&field_id) else {
                if scrolls_left > 0 {
                    scrolls_left -= 1;
                    let (w, h) = snap.screen_size();
                    self.dev.swipe(
                        w / 2,
                        h * 2 / 3,
                        w / 2,
                        h / 3,
                        200,
                        timing.command_timeout,
                    );
                }
                return None;
            };
            let (x, y) = node.center()?;
            let focusable = node.focusable;
            self.dev.tap(x, y, timing.command_timeout);
            self.dev.tap(x, y, timing.command_timeout);
            thread::sleep(timing.settle_delay);

            if !focusable {
                return Some(true);
            }
            let focused = self
                .snapshot()?
                .find_by_id(&field_id)
                .map(|n| n.focused)
                .unwrap_or(false);
            focused.then_some(true)
        })
        .unwrap_or(false)
    }

    /// Tap every discoverable key once; each must produce an observable
    /// change unless its label is a non-content key.
    ///
    /// For password fields the label set is also scanned after every tap:
    /// candidate suggestions may surface mid-traversal and be cleared by a
    /// later key, so a single check at the end would miss them.
    fn key_probe(&mut self, kind: FieldKind, field_id: &str, keyboard: Bounds, keys: &[Key]) {
        let timing = self.config.timing.clone();
        let mut last_text = self.field_text(field_id);
        let mut last_labels: BTreeSet<String> =
            keys.iter().map(|k| k.label.clone()).collect();
        let mut candidates_seen = false;

        if kind.expect_digits() {
            for digit in missing_digits(&last_labels) {
                self.record(kind, "layout", format!("missing digit {}", digit));
            }
        }
        if kind == FieldKind::Password {
            self.flag_password_candidates(&last_labels, &mut candidates_seen);
        }

        for key in keys {
            self.dev.tap(key.x, key.y, timing.command_timeout);
            thread::sleep(timing.settle_delay);

            let cur_text = self.field_text(field_id);
            let cur_labels = self.visible_labels(keyboard);
            let changed = cur_text != last_text || cur_labels != last_labels;
            if !changed && !is_non_content_key(&key.label) {
                self.record(
                    kind,
                    "key",
                    format!("key '{}' produced no observable change", key.label),
                );
            }
            if kind == FieldKind::Password {
                self.flag_password_candidates(&cur_labels, &mut candidates_seen);
            }
            last_text = cur_text;
            last_labels = cur_labels;
        }
    }

    /// Record the password candidate anomaly on first sighting, at most once
    fn flag_password_candidates(&mut self, labels: &BTreeSet<String>, seen: &mut bool) {
        if *seen || !labels.iter().any(|l| is_candidate_label(l)) {
            return;
        }
        *seen = true;
        self.record(
            FieldKind::Password,
            "candidates",
            "unexpected candidate suggestions on password field",
        );
    }

    /// Tap a uniform grid inside the keyboard container and diff the field
    /// text after each tap. Used when the tree exposes no key buttons.
    fn grid_probe(&mut self, kind: FieldKind, field_id: &str, keyboard: Bounds, before: &str) {
        let timing = self.config.timing.clone();
        let points = grid_points(keyboard, GRID_ROWS, GRID_COLS, GRID_PAD);

        let mut last = before.to_string();
        let mut inserted = String::new();
        for (x, y) in points.into_iter().take(timing.grid_tap_cap) {
            self.dev.tap(x, y, timing.command_timeout);
            thread::sleep(timing.settle_delay);

            let cur = self.field_text(field_id);
            if cur != last {
                // Best-effort: assume append, record the delta.
                if let Some(delta) = diff_append(&last, &cur) {
                    inserted.push_str(delta);
                }
                last = cur;
            }
        }

        if last == *before {
            self.record(kind, "typing", "no text change after tapping keyboard grid");
            return;
        }

        if kind.expect_digits() {
            let distinct: BTreeSet<char> =
                inserted.chars().filter(|c| c.is_ascii_digit()).collect();
            // Very loose; just confirm the keypad is numeric-ish.
            if distinct.len() < 3 {
                self.record(
                    kind,
                    "typing",
                    format!(
                        "expected digits, got inserted='{}'",
                        inserted.chars().take(30).collect::<String>()
                    ),
                );
            }
        }
    }

    /// Password policy: the language indicator must stay pinned across
    /// repeated taps of the language key. Candidate suppression is checked
    /// per tap during key traversal.
    fn password_checks(&mut self, keyboard: Bounds) {
        let timing = self.config.timing.clone();

        let Some(indicator) = self.language_indicator(keyboard) else {
            // No language key rendered at all; nothing to drift.
            return;
        };
        if indicator.label != PASSWORD_BASELINE_LANGUAGE {
            self.record(
                FieldKind::Password,
                "language",
                format!(
                    "expected baseline {}, found {}",
                    PASSWORD_BASELINE_LANGUAGE, indicator.label
                ),
            );
            return;
        }

        let baseline = indicator.label.clone();
        for _ in 0..3 {
            let Some(key) = self.language_indicator(keyboard) else {
                break;
            };
            self.dev.tap(key.x, key.y, timing.command_timeout);
            thread::sleep(timing.settle_delay);

            let after = self
                .language_indicator(keyboard)
                .map(|k| k.label)
                .unwrap_or_default();
            if after != baseline {
                self.record(
                    FieldKind::Password,
                    "language",
                    format!("language drifted from {} to {}", baseline, after),
                );
                break;
            }
        }
    }

    /// Symbol page entry/exit: toggling must swap the visible key set to one
    /// that actually contains symbols, and toggle back out.
    fn symbol_page_check(&mut self, keyboard: Bounds) {
        let timing = self.config.timing.clone();
        let before = self.visible_labels(keyboard);
        let Some(toggle) = self.find_key_in(keyboard, SYMBOL_TOGGLE_LABELS) else {
            self.record(FieldKind::Text, "symbols", "symbols toggle not found");
            return;
        };

        self.dev.tap(toggle.x, toggle.y, timing.command_timeout);
        thread::sleep(timing.settle_delay);

        let page = self.visible_labels(keyboard);
        if page == before {
            self.record(
                FieldKind::Text,
                "symbols",
                "symbol page did not change visible keys",
            );
        } else if !page
            .iter()
            .any(|l| l.chars().any(|c| c.is_ascii_punctuation()))
        {
            self.record(FieldKind::Text, "symbols", "no symbol keys on symbol page");
        }

        // Exit the page: the dedicated return key when rendered, else the
        // toggle cycles back.
        let exit = self
            .find_key_in(keyboard, SYMBOL_RETURN_LABELS)
            .or_else(|| self.find_key_in(keyboard, SYMBOL_TOGGLE_LABELS));
        if let Some(key) = exit {
            self.dev.tap(key.x, key.y, timing.command_timeout);
            thread::sleep(timing.settle_delay);
        }
    }

    /// Cycle to the CJK language, type the seed keys, and require at least
    /// one candidate suggestion to appear.
    fn cjk_candidate_check(&mut self, keyboard: Bounds) {
        let timing = self.config.timing.clone();

        if !self.cycle_language(keyboard, "中") {
            self.record(
                FieldKind::Text,
                "language",
                "language cycle never reached 中",
            );
            return;
        }

        for &seed in CJK_SEED_KEYS {
            if let Some(key) = self.find_key_in(keyboard, &[seed]) {
                self.dev.tap(key.x, key.y, timing.command_timeout);
                thread::sleep(timing.settle_delay);
            }
        }

        let has_candidates = self
            .visible_labels(keyboard)
            .iter()
            .any(|l| is_candidate_label(l));
        if !has_candidates {
            self.record(
                FieldKind::Text,
                "candidates",
                format!(
                    "no candidate suggestions after typing '{}'",
                    CJK_SEED_KEYS.join("")
                ),
            );
        }

        // Best effort: return to the baseline language for later probes.
        self.cycle_language(keyboard, PASSWORD_BASELINE_LANGUAGE);
    }

    /// Tap the language key until the indicator shows `target`, within the
    /// cycle budget.
    fn cycle_language(&mut self, keyboard: Bounds, target: &str) -> bool {
        let timing = self.config.timing.clone();
        poll_until(timing.language_cycle_attempts, timing.settle_delay, || {
            let key = self.language_indicator(keyboard)?;
            if key.label == target {
                return Some(true);
            }
            self.dev.tap(key.x, key.y, timing.command_timeout);
            None
        })
        .unwrap_or(false)
    }

    /// The language-cycle key currently rendered inside the keyboard
    fn language_indicator(&self, keyboard: Bounds) -> Option<Key> {
        self.find_key_in(keyboard, LANGUAGE_LABELS)
    }

    fn find_key_in(&self, keyboard: Bounds, labels: &[&str]) -> Option<Key> {
        let snap = self.snapshot()?;
        visible_keys(&snap, keyboard)
            .into_iter()
            .find(|k| labels.contains(&k.label.as_str()))
    }

    fn visible_labels(&self, keyboard: Bounds) -> BTreeSet<String> {
        self.snapshot()
            .map(|snap| {
                visible_keys(&snap, keyboard)
                    .into_iter()
                    .map(|k| k.label)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A visible key: its label and tap point
#[derive(Debug, Clone)]
pub struct Key {
    pub label: String,
    pub x: i32,
    pub y: i32,
}

/// Enumerate the visible keys inside the keyboard container, deduplicated
/// by label in document order.
pub fn visible_keys(snap: &UiSnapshot, keyboard: Bounds) -> Vec<Key> {
    let mut seen = BTreeSet::new();
    let mut keys = Vec::new();
    for node in snap.nodes_within(KEY_BUTTON_CLASS, keyboard) {
        if node.text.is_empty() || !seen.insert(node.text.clone()) {
            continue;
        }
        if let Some((x, y)) = node.center() {
            keys.push(Key {
                label: node.text.clone(),
                x,
                y,
            });
        }
    }
    keys
}
