//! Monitor enumeration results and capture-region selection.
//!
//! Backends enumerate their outputs into [`MonitorDescriptor`]s and hand them
//! to a [`MonitorLayout`], which owns the virtual-desktop union and the
//! current selection. Selection semantics are therefore identical across
//! platforms.

use serde::Serialize;
use std::fmt;

use super::errors::CaptureError;
use crate::frame::Geometry;

/// A physical display and its position in the virtual desktop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorDescriptor {
    /// Dense index starting at 0
    pub id: u32,
    /// Human-readable name ("HDMI-1", "\\\\.\\DISPLAY2", ...)
    pub label: String,
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl MonitorDescriptor {
    pub fn region(&self) -> CaptureRegion {
        CaptureRegion {
            origin_x: self.origin_x,
            origin_y: self.origin_y,
            width: self.width,
            height: self.height,
        }
    }
}

impl fmt::Display for MonitorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}x{} at {},{}){}",
            self.id,
            self.label,
            self.width,
            self.height,
            self.origin_x,
            self.origin_y,
            if self.is_primary { " primary" } else { "" }
        )
    }
}

/// Which part of the virtual desktop to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorSelector {
    /// Union of all monitors
    #[default]
    VirtualDesktop,
    /// One monitor by id
    Monitor(u32),
}

impl MonitorSelector {
    /// Numeric form used by the CLI and config: -1 is the whole desktop.
    pub fn id(&self) -> i32 {
        match self {
            MonitorSelector::VirtualDesktop => -1,
            MonitorSelector::Monitor(id) => *id as i32,
        }
    }
}

/// Only -1 selects the whole desktop; other negative ids are rejected.
impl TryFrom<i32> for MonitorSelector {
    type Error = CaptureError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        match id {
            -1 => Ok(MonitorSelector::VirtualDesktop),
            id if id >= 0 => Ok(MonitorSelector::Monitor(id as u32)),
            id => Err(CaptureError::InvalidMonitorId(id)),
        }
    }
}

impl fmt::Display for MonitorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorSelector::VirtualDesktop => write!(f, "all monitors"),
            MonitorSelector::Monitor(id) => write!(f, "monitor {}", id),
        }
    }
}

/// Rectangle of the virtual desktop that is actually captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CaptureRegion {
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width, self.height)
    }
}

/// Bounding box of all monitor rectangles.
///
/// Returns `None` for an empty slice.
pub fn virtual_desktop(monitors: &[MonitorDescriptor]) -> Option<CaptureRegion> {
    let first = monitors.first()?;
    let mut left = first.origin_x as i64;
    let mut top = first.origin_y as i64;
    let mut right = left + first.width as i64;
    let mut bottom = top + first.height as i64;

    for m in &monitors[1..] {
        left = left.min(m.origin_x as i64);
        top = top.min(m.origin_y as i64);
        right = right.max(m.origin_x as i64 + m.width as i64);
        bottom = bottom.max(m.origin_y as i64 + m.height as i64);
    }

    Some(CaptureRegion {
        origin_x: left as i32,
        origin_y: top as i32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

/// Enumerated monitors plus the current selection.
#[derive(Debug, Clone, Default)]
pub struct MonitorLayout {
    monitors: Vec<MonitorDescriptor>,
    desktop: CaptureRegion,
    selected: MonitorSelector,
    region: CaptureRegion,
}

impl MonitorLayout {
    /// Build a layout with the whole desktop selected.
    ///
    /// `desktop` is the platform's notion of the full screen; if the
    /// platform reports none (`None`), the union of `monitors` is used.
    pub fn new(monitors: Vec<MonitorDescriptor>, desktop: Option<CaptureRegion>) -> Self {
        let desktop = desktop
            .or_else(|| virtual_desktop(&monitors))
            .unwrap_or_default();
        Self {
            monitors,
            desktop,
            selected: MonitorSelector::VirtualDesktop,
            region: desktop,
        }
    }

    /// A fresh copy of the monitor list.
    pub fn monitors(&self) -> Vec<MonitorDescriptor> {
        self.monitors.clone()
    }

    pub fn desktop(&self) -> CaptureRegion {
        self.desktop
    }

    pub fn selected(&self) -> MonitorSelector {
        self.selected
    }

    pub fn region(&self) -> CaptureRegion {
        self.region
    }

    /// Change the selection.
    ///
    /// Selecting the virtual desktop always succeeds. An unknown monitor id
    /// fails with [`CaptureError::InvalidMonitor`] and leaves the current
    /// selection unchanged.
    pub fn select(&mut self, selector: MonitorSelector) -> Result<CaptureRegion, CaptureError> {
        let region = match selector {
            MonitorSelector::VirtualDesktop => self.desktop,
            MonitorSelector::Monitor(id) => self
                .monitors
                .iter()
                .find(|m| m.id == id)
                .map(MonitorDescriptor::region)
                .ok_or(CaptureError::InvalidMonitor {
                    requested: selector.id(),
                    available: self.monitors.len(),
                })?,
        };
        self.selected = selector;
        self.region = region;
        Ok(region)
    }
}

#[cfg(test)]
pub(crate) fn dual_monitors() -> Vec<MonitorDescriptor> {
    vec![
        MonitorDescriptor {
            id: 0,
            label: "Left".to_string(),
            origin_x: 0,
            origin_y: 0,
            width: 1920,
            height: 1080,
            is_primary: true,
        },
        MonitorDescriptor {
            id: 1,
            label: "Right".to_string(),
            origin_x: 1920,
            origin_y: -200,
            width: 1280,
            height: 1024,
            is_primary: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_desktop_union() {
        let desktop = virtual_desktop(&dual_monitors()).unwrap();
        assert_eq!(desktop.origin_x, 0);
        assert_eq!(desktop.origin_y, -200);
        assert_eq!(desktop.width, 3200);
        assert_eq!(desktop.height, 1280);
    }

    #[test]
    fn test_virtual_desktop_empty() {
        assert!(virtual_desktop(&[]).is_none());
    }

    #[test]
    fn test_select_monitor_and_back_to_desktop() {
        let mut layout = MonitorLayout::new(dual_monitors(), None);
        let region = layout.select(MonitorSelector::Monitor(1)).unwrap();
        assert_eq!(region.origin_x, 1920);
        assert_eq!(region.geometry(), Geometry::new(1280, 1024));

        let first = layout.select(MonitorSelector::VirtualDesktop).unwrap();
        let second = layout.select(MonitorSelector::VirtualDesktop).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, layout.desktop());
    }

    #[test]
    fn test_invalid_selection_keeps_previous_region() {
        let mut layout = MonitorLayout::new(dual_monitors(), None);
        layout.select(MonitorSelector::Monitor(0)).unwrap();
        let before = layout.region();

        match layout.select(MonitorSelector::Monitor(99)) {
            Err(CaptureError::InvalidMonitor {
                requested,
                available,
            }) => {
                assert_eq!(requested, 99);
                assert_eq!(available, 2);
            }
            other => panic!("Expected InvalidMonitor, got {:?}", other),
        }
        assert_eq!(layout.region(), before);
        assert_eq!(layout.selected(), MonitorSelector::Monitor(0));
    }

    #[test]
    fn test_platform_desktop_overrides_union() {
        let platform = CaptureRegion {
            origin_x: 0,
            origin_y: 0,
            width: 4000,
            height: 2000,
        };
        let layout = MonitorLayout::new(dual_monitors(), Some(platform));
        assert_eq!(layout.region(), platform);
    }

    #[test]
    fn test_selector_from_id() {
        assert_eq!(
            MonitorSelector::try_from(-1).unwrap(),
            MonitorSelector::VirtualDesktop
        );
        assert_eq!(MonitorSelector::try_from(2).unwrap(), MonitorSelector::Monitor(2));
        assert!(matches!(
            MonitorSelector::try_from(-7),
            Err(CaptureError::InvalidMonitorId(-7))
        ));
        assert_eq!(MonitorSelector::Monitor(3).id(), 3);
        assert_eq!(MonitorSelector::VirtualDesktop.id(), -1);
    }

    #[test]
    fn test_monitor_display() {
        let m = &dual_monitors()[0];
        assert_eq!(format!("{}", m), "[0] Left (1920x1080 at 0,0) primary");
    }
}
