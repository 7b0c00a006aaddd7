//! Accessibility-tree snapshots: bounds geometry, node attributes, lookup.
//!
//! A `uiautomator dump` is a flat-enough XML document whose `<node>` elements
//! carry everything the probe needs as attributes (`resource-id`, `class`,
//! `text`, `bounds`, `focused`, `focusable`). Snapshots are produced fresh on
//! every dump, searched with a linear scan, and discarded after each step;
//! at tens of nodes no index is warranted.

use regex::Regex;
use std::sync::OnceLock;

/// Root marker that distinguishes a complete dump from a truncated one
pub const HIERARCHY_MARKER: &str = "<hierarchy";

/// Screen size assumed when the root node carries no usable bounds
pub const FALLBACK_SCREEN_SIZE: (i32, i32) = (1080, 2400);

fn bounds_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d+),(\d+)\]\[(\d+),(\d+)\]").expect("valid bounds pattern"))
}

fn node_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<node\b[^>]*>").expect("valid node pattern"))
}

fn attr_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([\w-]+)="([^"]*)""#).expect("valid attribute pattern"))
}

/// An element's bounding rectangle, `[left,top][right,bottom]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Parse the dump's `[x1,y1][x2,y2]` form
    pub fn parse(s: &str) -> Option<Self> {
        let caps = bounds_pattern().captures(s)?;
        let coord = |i: usize| caps.get(i)?.as_str().parse::<i32>().ok();
        Some(Self {
            left: coord(1)?,
            top: coord(2)?,
            right: coord(3)?,
            bottom: coord(4)?,
        })
    }

    /// Integer center point; strictly inside for any non-empty rectangle
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Whether a point lies inside the rectangle (edges exclusive on the far side)
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Shrink the rectangle by `pad` on every side
    pub fn inset(&self, pad: i32) -> Self {
        Self {
            left: self.left + pad,
            top: self.top + pad,
            right: self.right - pad,
            bottom: self.bottom - pad,
        }
    }

    /// True when the rectangle has no area
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

/// A read-only element snapshot from one accessibility dump
#[derive(Debug, Clone)]
pub struct UiNode {
    /// Stable per-element identifier (`pkg:id/name`), may be empty
    pub resource_id: String,
    /// Android widget class name
    pub class: String,
    /// Displayed text
    pub text: String,
    /// Bounding rectangle, when well-formed
    pub bounds: Option<Bounds>,
    /// Whether the element currently holds focus
    pub focused: bool,
    /// Whether the element can take focus
    pub focusable: bool,
}

impl UiNode {
    fn from_attrs(element: &str) -> Self {
        let mut resource_id = String::new();
        let mut class = String::new();
        let mut text = String::new();
        let mut bounds = None;
        let mut focused = false;
        let mut focusable = false;

        for caps in attr_pattern().captures_iter(element) {
            let value = unescape_xml(&caps[2]);
            match &caps[1] {
                "resource-id" => resource_id = value.trim().to_string(),
                "class" => class = value,
                "text" => text = value,
                "bounds" => bounds = Bounds::parse(&value),
                "focused" => focused = value == "true",
                "focusable" => focusable = value == "true",
                _ => {}
            }
        }

        Self {
            resource_id,
            class,
            text,
            bounds,
            focused,
            focusable,
        }
    }

    /// Center point of the node's bounds, when present
    pub fn center(&self) -> Option<(i32, i32)> {
        self.bounds.map(|b| b.center())
    }
}

/// A parsed accessibility dump
#[derive(Debug, Clone, Default)]
pub struct UiSnapshot {
    /// All nodes in document order
    pub nodes: Vec<UiNode>,
}

impl UiSnapshot {
    /// Parse a dump document; `None` unless it carries the hierarchy root marker
    pub fn parse(xml: &str) -> Option<Self> {
        if !xml.contains(HIERARCHY_MARKER) {
            return None;
        }
        let nodes = node_pattern()
            .find_iter(xml)
            .map(|m| UiNode::from_attrs(m.as_str()))
            .collect();
        Some(Self { nodes })
    }

    /// First node with an exact resource id match
    pub fn find_by_id(&self, resource_id: &str) -> Option<&UiNode> {
        self.nodes
            .iter()
            .find(|n| n.resource_id == resource_id)
    }

    /// Nodes of a class whose center lies inside the given region
    pub fn nodes_within<'a>(
        &'a self,
        class: &'a str,
        region: Bounds,
    ) -> impl Iterator<Item = &'a UiNode> + 'a {
        self.nodes.iter().filter(move |n| {
            n.class == class
                && n.center()
                    .map(|(x, y)| region.contains(x, y))
                    .unwrap_or(false)
        })
    }

    /// Screen dimensions from the root node's bounds
    pub fn screen_size(&self) -> (i32, i32) {
        self.nodes
            .first()
            .and_then(|n| n.bounds)
            .filter(|b| !b.is_empty())
            .map(|b| (b.width(), b.height()))
            .unwrap_or(FALLBACK_SCREEN_SIZE)
    }
}

/// Uniform grid of cell-center sample points inside a padded region.
///
/// Empty when the padded rectangle degenerates.
pub fn grid_points(bounds: Bounds, rows: usize, cols: usize, pad: i32) -> Vec<(i32, i32)> {
    let inner = bounds.inset(pad);
    if inner.is_empty() || rows == 0 || cols == 0 {
        return Vec::new();
    }
    let mut points = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let x = inner.left + (inner.width() * (2 * c as i32 + 1)) / (2 * cols as i32);
            let y = inner.top + (inner.height() * (2 * r as i32 + 1)) / (2 * rows as i32);
            points.push((x, y));
        }
    }
    points
}

fn unescape_xml(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="com.carbit.inappkeyboard" bounds="[0,0][1080,2400]" focused="false" focusable="false" />
  <node index="1" text="Text" resource-id="com.carbit.inappkeyboard:id/btn_text" class="android.widget.Button" package="com.carbit.inappkeyboard" bounds="[40,280][280,360]" focused="false" focusable="true" />
  <node index="2" text="abc" resource-id="com.carbit.inappkeyboard:id/et_text" class="android.widget.EditText" package="com.carbit.inappkeyboard" bounds="[40,420][1040,540]" focused="true" focusable="true" />
</hierarchy>"#;

    #[test]
    fn test_bounds_parse() {
        let b = Bounds::parse("[40,280][280,360]").unwrap();
        assert_eq!(b.left, 40);
        assert_eq!(b.top, 280);
        assert_eq!(b.right, 280);
        assert_eq!(b.bottom, 360);
    }

    #[test]
    fn test_bounds_parse_rejects_malformed() {
        assert!(Bounds::parse("").is_none());
        assert!(Bounds::parse("[40,280]").is_none());
        assert!(Bounds::parse("40,280,280,360").is_none());
    }

    #[test]
    fn test_center_strictly_inside() {
        // Centers of well-formed non-empty rects must land strictly inside.
        let cases = [
            Bounds::parse("[0,0][1080,2400]").unwrap(),
            Bounds::parse("[40,280][280,360]").unwrap(),
            Bounds::parse("[5,5][7,7]").unwrap(),
        ];
        for b in cases {
            let (cx, cy) = b.center();
            assert!(b.contains(cx, cy), "center of {:?} not inside", b);
            assert!(cx > b.left && cx < b.right);
            assert!(cy > b.top && cy < b.bottom);
        }
    }

    #[test]
    fn test_snapshot_parse_and_find() {
        let snap = UiSnapshot::parse(SAMPLE).unwrap();
        assert_eq!(snap.nodes.len(), 3);

        let btn = snap
            .find_by_id("com.carbit.inappkeyboard:id/btn_text")
            .unwrap();
        assert_eq!(btn.class, "android.widget.Button");
        assert_eq!(btn.text, "Text");
        assert!(btn.focusable);
        assert!(!btn.focused);

        let et = snap
            .find_by_id("com.carbit.inappkeyboard:id/et_text")
            .unwrap();
        assert!(et.focused);
        assert_eq!(et.text, "abc");
    }

    #[test]
    fn test_snapshot_rejects_truncated_dump() {
        assert!(UiSnapshot::parse("").is_none());
        assert!(UiSnapshot::parse("<node text=\"orphan\" />").is_none());
    }

    #[test]
    fn test_screen_size_from_root() {
        let snap = UiSnapshot::parse(SAMPLE).unwrap();
        assert_eq!(snap.screen_size(), (1080, 2400));
        assert_eq!(UiSnapshot::default().screen_size(), FALLBACK_SCREEN_SIZE);
    }

    #[test]
    fn test_grid_points_inside_padded_region() {
        let b = Bounds::parse("[0,1000][1000,1500]").unwrap();
        let pts = grid_points(b, 5, 10, 12);
        assert_eq!(pts.len(), 50);
        let inner = b.inset(12);
        for (x, y) in pts {
            assert!(inner.contains(x, y), "({}, {}) outside padded region", x, y);
        }
    }

    #[test]
    fn test_grid_points_degenerate_region() {
        let b = Bounds::parse("[0,0][20,20]").unwrap();
        assert!(grid_points(b, 5, 10, 12).is_empty());
    }

    #[test]
    fn test_unescape_xml_attributes() {
        let xml = r#"<hierarchy><node text="a&amp;b" resource-id="x" class="android.widget.Button" bounds="[0,0][10,10]" focused="false" focusable="true" /></hierarchy>"#;
        let snap = UiSnapshot::parse(xml).unwrap();
        assert_eq!(snap.nodes[0].text, "a&b");
    }
}
