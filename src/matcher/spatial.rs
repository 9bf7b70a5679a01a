//! Location-hint scoring ("top right toolbar", "bottom left", ...).

use crate::driver::{ElementInfo, Rect, Viewport};

/// Elements whose top edge is within this many pixels count as toolbar items.
pub const TOOLBAR_MAX_Y: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Top,
    Bottom,
    Left,
    Right,
    Center,
    Toolbar,
}

fn regions_in(hint: &str) -> Vec<Region> {
    let hint = hint.to_lowercase();
    let mut regions = Vec::new();
    for word in hint.split(|c: char| !c.is_alphanumeric()) {
        let region = match word {
            "top" | "upper" => Region::Top,
            "bottom" | "lower" => Region::Bottom,
            "left" => Region::Left,
            "right" => Region::Right,
            "center" | "centre" | "middle" => Region::Center,
            "toolbar" => Region::Toolbar,
            _ => continue,
        };
        if !regions.contains(&region) {
            regions.push(region);
        }
    }
    regions
}

fn contains(region: Region, rect: &Rect, viewport: &Viewport) -> bool {
    let (cx, cy) = rect.center();
    let third_w = viewport.width / 3.0;
    let third_h = viewport.height / 3.0;
    match region {
        Region::Top => cy < third_h,
        Region::Bottom => cy > 2.0 * third_h,
        Region::Left => cx < third_w,
        Region::Right => cx > 2.0 * third_w,
        Region::Center => {
            (third_w..=2.0 * third_w).contains(&cx) && (third_h..=2.0 * third_h).contains(&cy)
        }
        Region::Toolbar => rect.y <= TOOLBAR_MAX_Y,
    }
}

/// Number of hinted regions the element's box falls into.
pub fn region_score(hint: &str, rect: &Rect, viewport: &Viewport) -> i32 {
    if rect.is_empty() {
        return 0;
    }
    regions_in(hint)
        .into_iter()
        .filter(|region| contains(*region, rect, viewport))
        .count() as i32
}

/// Index and score of the element that best fits the hint; `None` when no
/// element falls into any hinted region.
pub fn best_in_region(
    elements: &[ElementInfo],
    hint: &str,
    viewport: &Viewport,
) -> Option<(usize, i32)> {
    let mut best: Option<(usize, i32)> = None;
    for (index, element) in elements.iter().enumerate() {
        let Some(rect) = element.rect else { continue };
        let score = region_score(hint, &rect, viewport);
        if score > 0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((index, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ElementHandle;

    fn at(id: &str, x: f64, y: f64) -> ElementInfo {
        ElementInfo {
            handle: ElementHandle::new(id),
            tag: "button".into(),
            aria_label: String::new(),
            text: String::new(),
            title: String::new(),
            rect: Some(Rect::new(x, y, 40.0, 20.0)),
        }
    }

    const VIEW: Viewport = Viewport {
        width: 1200.0,
        height: 900.0,
    };

    #[test]
    fn top_right_toolbar_prefers_corner() {
        let elements = vec![at("left", 10.0, 10.0), at("corner", 1100.0, 20.0), at("mid", 600.0, 450.0)];
        assert_eq!(best_in_region(&elements, "top right toolbar", &VIEW), Some((1, 3)));
    }

    #[test]
    fn center_and_bottom() {
        let elements = vec![at("corner", 1100.0, 20.0), at("mid", 600.0, 450.0), at("foot", 50.0, 850.0)];
        assert_eq!(best_in_region(&elements, "center of the dialog", &VIEW), Some((1, 1)));
        assert_eq!(best_in_region(&elements, "bottom-left", &VIEW), Some((2, 2)));
    }

    #[test]
    fn unknown_hint_matches_nothing() {
        let elements = vec![at("a", 10.0, 10.0)];
        assert_eq!(best_in_region(&elements, "somewhere near the logo", &VIEW), None);
        assert_eq!(region_score("top", &Rect::new(0.0, 0.0, 0.0, 0.0), &VIEW), 0);
    }
}
