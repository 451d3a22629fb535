//! Interaction driver: trusted CDP input events.
//!
//! Autoplay only fires reliably off trusted events, so clicks and hovers go
//! through `Input.dispatchMouseEvent` rather than element `.click()`. The
//! pointer always travels a curved path to the target first; a click that
//! teleports is a bot tell.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use headless_chrome::protocol::cdp::Input::{
    self, DispatchMouseEvent, DispatchMouseEventPointer_TypeOption, DispatchMouseEventTypeOption,
};
use headless_chrome::Tab;
use rand::Rng;

use crate::gate::VideoIdSlot;

/// Locates the playback trigger: known play-button classes first, the video
/// element itself next, then anything labeled Play. Searches shadow roots
/// and same-origin iframes; falls back to the centroid of the first visible
/// iframe when nothing matches. Returns viewport coordinates or null.
const FIND_PLAY_TARGET_JS: &str = r#"
(() => {
    const SELECTORS = [
        '.play-button',
        '.ytp-large-play-button',
        '.ytp-play-button',
        'video',
        '[aria-label*="Play" i]',
    ];

    function deepQueryAll(root, selector) {
        const out = [];
        const walk = (node) => {
            if (node.querySelectorAll) {
                node.querySelectorAll(selector).forEach(el => out.push(el));
            }
            const all = node.querySelectorAll ? node.querySelectorAll('*') : [];
            for (const el of all) {
                if (el.shadowRoot) walk(el.shadowRoot);
            }
        };
        walk(root);
        return out;
    }

    function findIn(doc, offsetX, offsetY) {
        for (const sel of SELECTORS) {
            for (const el of deepQueryAll(doc, sel)) {
                const r = el.getBoundingClientRect();
                if (r.width >= 5 && r.height >= 5) {
                    return { x: offsetX + r.x + r.width / 2, y: offsetY + r.y + r.height / 2 };
                }
            }
        }
        return null;
    }

    const top = findIn(document, 0, 0);
    if (top) return JSON.stringify(top);

    let fallback = null;
    for (const f of document.querySelectorAll('iframe')) {
        const fr = f.getBoundingClientRect();
        if (fr.width < 50 || fr.height < 50) continue;
        if (!fallback) {
            fallback = { x: fr.x + fr.width / 2, y: fr.y + fr.height / 2 };
        }
        let doc = null;
        try { doc = f.contentDocument; } catch (e) { /* cross-origin */ }
        if (!doc) continue;
        const hit = findIn(doc, fr.x, fr.y);
        if (hit) return JSON.stringify(hit);
    }
    return JSON.stringify(fallback);
})()
"#;

#[derive(Debug, Clone, Copy)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

fn cubic_bezier(t: f64, p0: Point, p1: Point, p2: Point, p3: Point) -> Point {
    let cx = 3.0 * (p1.x - p0.x);
    let bx = 3.0 * (p2.x - p1.x) - cx;
    let ax = p3.x - p0.x - cx - bx;

    let cy = 3.0 * (p1.y - p0.y);
    let by = 3.0 * (p2.y - p1.y) - cy;
    let ay = p3.y - p0.y - cy - by;

    Point {
        x: (ax * t.powi(3)) + (bx * t.powi(2)) + (cx * t) + p0.x,
        y: (ay * t.powi(3)) + (by * t.powi(2)) + (cy * t) + p0.y,
    }
}

fn mouse_event(kind: DispatchMouseEventTypeOption, x: f64, y: f64) -> DispatchMouseEvent {
    DispatchMouseEvent {
        Type: kind,
        x,
        y,
        button: None,
        buttons: None,
        modifiers: None,
        timestamp: None,
        delta_x: None,
        delta_y: None,
        pointer_Type: Some(DispatchMouseEventPointer_TypeOption::Mouse),
        force: None,
        tangential_pressure: None,
        tilt_x: None,
        tilt_y: None,
        twist: None,
        click_count: None,
    }
}

/// Move the pointer along a randomized Bezier arc.
pub async fn move_pointer(tab: &Arc<Tab>, start: Point, end: Point) -> Result<()> {
    let steps = 25;
    let variance = 100.0;
    let (p1, p2) = {
        let mut rng = rand::thread_rng();
        let p1 = Point::new(
            start.x + (end.x - start.x) * rng.gen_range(0.2..0.8) + rng.gen_range(-variance..variance),
            start.y + (end.y - start.y) * rng.gen_range(0.2..0.8) + rng.gen_range(-variance..variance),
        );
        let p2 = Point::new(
            start.x + (end.x - start.x) * rng.gen_range(0.2..0.8) + rng.gen_range(-variance..variance),
            start.y + (end.y - start.y) * rng.gen_range(0.2..0.8) + rng.gen_range(-variance..variance),
        );
        (p1, p2)
    };

    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let p = cubic_bezier(t, start, p1, p2, end);
        tab.call_method(mouse_event(DispatchMouseEventTypeOption::MouseMoved, p.x, p.y))?;
        let delay = rand::thread_rng().gen_range(5..15);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    Ok(())
}

/// Hover the target: arc move plus a tiny settle wiggle so mouseover and
/// mousemove listeners both fire.
pub async fn hover(tab: &Arc<Tab>, target: Point) -> Result<()> {
    let start = random_start();
    move_pointer(tab, start, target).await?;
    for _ in 0..3 {
        let (dx, dy) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0))
        };
        tab.call_method(mouse_event(
            DispatchMouseEventTypeOption::MouseMoved,
            target.x + dx,
            target.y + dy,
        ))?;
        tokio::time::sleep(Duration::from_millis(60)).await;
    }
    Ok(())
}

/// Full trusted click: arc move, press, short hold, release.
pub async fn click(tab: &Arc<Tab>, target: Point) -> Result<()> {
    let start = random_start();
    move_pointer(tab, start, target).await?;

    let mut press = mouse_event(DispatchMouseEventTypeOption::MousePressed, target.x, target.y);
    press.button = Some(Input::MouseButton::Left);
    press.click_count = Some(1);
    tab.call_method(press)?;

    let hold = rand::thread_rng().gen_range(40..120);
    tokio::time::sleep(Duration::from_millis(hold)).await;

    let mut release = mouse_event(DispatchMouseEventTypeOption::MouseReleased, target.x, target.y);
    release.button = Some(Input::MouseButton::Left);
    release.click_count = Some(1);
    tab.call_method(release)?;
    Ok(())
}

/// Wheel-scroll by `delta_y` in small randomized steps.
pub async fn scroll(tab: &Arc<Tab>, delta_y: f64) -> Result<()> {
    let steps = 10;
    let step_size = delta_y / steps as f64;
    for _ in 0..steps {
        let mut ev = mouse_event(DispatchMouseEventTypeOption::MouseWheel, 100.0, 100.0);
        ev.delta_x = Some(0.0);
        ev.delta_y = Some(step_size);
        tab.call_method(ev)?;
        let delay = rand::thread_rng().gen_range(50..150);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    Ok(())
}

/// Small down-then-up jiggle after settle; enough activity to look awake
/// without moving the creative out of view.
pub async fn scroll_jiggle(tab: &Arc<Tab>) -> Result<()> {
    let down = rand::thread_rng().gen_range(120.0..260.0);
    scroll(tab, down).await?;
    let pause = rand::thread_rng().gen_range(300..700);
    tokio::time::sleep(Duration::from_millis(pause)).await;
    scroll(tab, -down).await?;
    Ok(())
}

/// Longer browse simulation for pages that key lazy rendering off activity:
/// staged scrolls with idle mouse drift between them.
pub async fn browse_around(tab: &Arc<Tab>) -> Result<()> {
    for _ in 0..3 {
        let delta = rand::thread_rng().gen_range(150.0..400.0);
        scroll(tab, delta).await?;
        let (from, to) = {
            let mut rng = rand::thread_rng();
            (
                Point::new(rng.gen_range(100.0..600.0), rng.gen_range(100.0..500.0)),
                Point::new(rng.gen_range(100.0..600.0), rng.gen_range(100.0..500.0)),
            )
        };
        move_pointer(tab, from, to).await?;
        let pause = rand::thread_rng().gen_range(400..900);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }
    scroll(tab, -500.0).await?;
    Ok(())
}

fn random_start() -> Point {
    let mut rng = rand::thread_rng();
    Point::new(rng.gen_range(50.0..400.0), rng.gen_range(50.0..300.0))
}

/// Find the playback trigger coordinates on the live page.
pub fn find_play_target(tab: &Arc<Tab>) -> Result<Option<Point>> {
    let result = tab.evaluate(FIND_PLAY_TARGET_JS, false)?;
    let raw = result
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("play-target probe returned no payload"))?;
    let parsed: Option<serde_json::Value> = serde_json::from_str(raw)?;
    Ok(parsed.and_then(|v| {
        let x = v.get("x")?.as_f64()?;
        let y = v.get("y")?.as_f64()?;
        Some(Point::new(x, y))
    }))
}

/// Click the playback trigger, then poll the wire slot until the video id
/// shows up or the budget runs out.
pub async fn trigger_playback(
    tab: &Arc<Tab>,
    slot: &VideoIdSlot,
    wait: Duration,
) -> Result<Option<String>> {
    if slot.is_set() {
        return Ok(slot.get());
    }
    match find_play_target(tab)? {
        Some(target) => {
            println!("▶️ Clicking play target at ({:.0}, {:.0})", target.x, target.y);
            click(tab, target).await?;
        }
        None => {
            println!("▶️ No play target found, skipping click");
            return Ok(None);
        }
    }
    Ok(wait_for_video_id(slot, wait).await)
}

/// Poll the write-once slot every 250ms until set or timed out.
pub async fn wait_for_video_id(slot: &VideoIdSlot, wait: Duration) -> Option<String> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        if let Some(id) = slot.get() {
            return Some(id);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
