//! Coordinate transformation between the browser page preview and PDF page space
//!
//! The editor reports a stamp rectangle in client pixels, measured from the
//! top-left corner of the rendered preview. [`map_client_rect_to_pdf`] rescales
//! it into points, still top-left based and measured on the page as displayed.
//! [`PageBox::image_matrix`] then undoes the page's `/Rotate`, flips the Y axis
//! and applies the page box origin so the rectangle can be written into a
//! content stream.

use crate::error::{Result, StampError};
use serde::{Deserialize, Serialize};

/// Where and how to place a signature, as authored in the browser editor.
///
/// The record is fixed-shape: unknown fields are rejected. The editor's wire
/// names (`rotation`, `page_width`, `page_height`) are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlacementRequest {
    /// 1-based page number
    pub page_number: u32,
    /// Screen-clockwise rotation of the stamp
    #[serde(default, alias = "rotation")]
    pub rotation_degrees: f64,
    #[serde(alias = "page_width")]
    pub viewport_width: f64,
    #[serde(alias = "page_height")]
    pub viewport_height: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PlacementRequest {
    /// Parse and validate a request body.
    pub fn from_json(body: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(body)
            .map_err(|e| StampError::InvalidInput(format!("Malformed placement request: {}", e)))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_number == 0 {
            return Err(StampError::InvalidInput(
                "Page numbers start at 1".to_string(),
            ));
        }
        let values = [
            self.rotation_degrees,
            self.viewport_width,
            self.viewport_height,
            self.x,
            self.y,
            self.width,
            self.height,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(StampError::InvalidInput(
                "Placement values must be finite numbers".to_string(),
            ));
        }
        check_viewport(self.viewport_width, self.viewport_height)?;
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(StampError::InvalidInput(format!(
                "Stamp size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// A rectangle in PDF points, top-left origin relative to the page box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PdfRect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn is_finite(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite())
    }

    /// True when the rectangle encloses no area.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

/// Effective page box (CropBox, else MediaBox) in PDF user space, plus the
/// page's `/Rotate` as a clockwise quarter-turn count in degrees.
///
/// Viewers show the box turned by `rotation`, so the editor preview and the
/// mapper work in that visible frame: see [`PageBox::visible_width`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    /// One of 0, 90, 180, 270
    pub rotation: u32,
}

impl PageBox {
    /// Build from a `[llx lly urx ury]` array, normalizing corner order.
    pub fn from_corners(corners: [f64; 4]) -> Self {
        let [a, b, c, d] = corners;
        Self {
            x0: a.min(c),
            y0: b.min(d),
            x1: a.max(c),
            y1: b.max(d),
            rotation: 0,
        }
    }

    /// Apply a `/Rotate` value. Negative angles count counter-clockwise;
    /// values that are not a multiple of 90 are ignored, as viewers do.
    pub fn with_rotation(mut self, degrees: i64) -> Self {
        self.rotation = if degrees % 90 == 0 {
            degrees.rem_euclid(360) as u32
        } else {
            0
        };
        self
    }

    /// Unrotated box width in user space.
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    /// Unrotated box height in user space.
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    fn is_sideways(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Width of the page as displayed.
    pub fn visible_width(&self) -> f64 {
        if self.is_sideways() {
            self.height()
        } else {
            self.width()
        }
    }

    /// Height of the page as displayed.
    pub fn visible_height(&self) -> f64 {
        if self.is_sideways() {
            self.width()
        } else {
            self.height()
        }
    }

    /// Map a point given from the top-left of the displayed page into user space.
    pub fn visible_to_user(&self, u: f64, v: f64) -> (f64, f64) {
        match self.rotation {
            90 => (self.x0 + v, self.y0 + u),
            180 => (self.x1 - u, self.y0 + v),
            270 => (self.x1 - v, self.y1 - u),
            _ => (self.x0 + u, self.y1 - v),
        }
    }

    /// Convert a top-left based rectangle on the displayed page into the user
    /// space rectangle it covers (bottom-left origin, offset by the box origin).
    pub fn to_user_space(&self, rect: &PdfRect) -> PdfRect {
        let (ax, ay) = self.visible_to_user(rect.x0, rect.y0);
        let (bx, by) = self.visible_to_user(rect.x1, rect.y1);
        PdfRect {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    /// `cm` operands that draw an image upright on the displayed page, filling
    /// `rect` (top-left based, visible frame).
    ///
    /// Image space is the unit square with its origin at the image's
    /// bottom-left corner, so the matrix columns are the images of the
    /// rectangle's bottom edge and left edge.
    pub fn image_matrix(&self, rect: &PdfRect) -> [f64; 6] {
        let (ox, oy) = self.visible_to_user(rect.x0, rect.y1);
        let (rx, ry) = self.visible_to_user(rect.x1, rect.y1);
        let (tx, ty) = self.visible_to_user(rect.x0, rect.y0);
        [rx - ox, ry - oy, tx - ox, ty - oy, ox, oy]
    }
}

fn check_viewport(client_width: f64, client_height: f64) -> Result<()> {
    if !(client_width.is_finite() && client_width > 0.0)
        || !(client_height.is_finite() && client_height > 0.0)
    {
        return Err(StampError::InvalidInput(format!(
            "Client viewport must be nonzero, got {}x{}",
            client_width, client_height
        )));
    }
    Ok(())
}

/// Scale the request's client rectangle into the page's point space.
///
/// Each axis uses its own ratio; the preview is not assumed to keep the
/// page's aspect ratio.
pub fn map_client_rect_to_pdf(
    page_width: f64,
    page_height: f64,
    request: &PlacementRequest,
) -> Result<PdfRect> {
    check_viewport(request.viewport_width, request.viewport_height)?;
    if !(page_width.is_finite() && page_width > 0.0)
        || !(page_height.is_finite() && page_height > 0.0)
    {
        return Err(StampError::InvalidInput(format!(
            "Page size must be positive, got {}x{}",
            page_width, page_height
        )));
    }

    let x_ratio = page_width / request.viewport_width;
    let y_ratio = page_height / request.viewport_height;

    Ok(PdfRect {
        x0: request.x * x_ratio,
        y0: request.y * y_ratio,
        x1: (request.x + request.width) * x_ratio,
        y1: (request.y + request.height) * y_ratio,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn dimension() -> impl Strategy<Value = f64> {
        1.0f64..2000.0
    }

    fn fraction() -> impl Strategy<Value = f64> {
        0.0f64..=1.0
    }

    proptest! {
        /// Scaling the client rectangle by k scales the PDF rectangle's extents by k
        #[test]
        fn mapping_is_linear_in_rect_size(
            viewport_w in dimension(),
            viewport_h in dimension(),
            page_w in dimension(),
            page_h in dimension(),
            x_pct in fraction(),
            y_pct in fraction(),
            w_pct in 0.01f64..0.25,
            h_pct in 0.01f64..0.25,
            k in 0.5f64..2.0,
        ) {
            let base = PlacementRequest {
                page_number: 1,
                rotation_degrees: 0.0,
                viewport_width: viewport_w,
                viewport_height: viewport_h,
                x: x_pct * viewport_w * 0.5,
                y: y_pct * viewport_h * 0.5,
                width: w_pct * viewport_w,
                height: h_pct * viewport_h,
            };
            let scaled = PlacementRequest {
                width: base.width * k,
                height: base.height * k,
                ..base
            };

            let a = map_client_rect_to_pdf(page_w, page_h, &base).unwrap();
            let b = map_client_rect_to_pdf(page_w, page_h, &scaled).unwrap();

            let tolerance = 1e-6 * (1.0 + a.width().max(a.height()) * k);
            prop_assert!(
                (b.width() - a.width() * k).abs() < tolerance,
                "width {} should be {} * {}", b.width(), a.width(), k
            );
            prop_assert!(
                (b.height() - a.height() * k).abs() < tolerance,
                "height {} should be {} * {}", b.height(), a.height(), k
            );
        }

        /// A full-viewport rectangle always maps onto the full page
        #[test]
        fn full_viewport_maps_to_full_page(
            viewport_w in dimension(),
            viewport_h in dimension(),
            page_w in dimension(),
            page_h in dimension(),
        ) {
            let req = PlacementRequest {
                page_number: 1,
                rotation_degrees: 0.0,
                viewport_width: viewport_w,
                viewport_height: viewport_h,
                x: 0.0,
                y: 0.0,
                width: viewport_w,
                height: viewport_h,
            };
            let rect = map_client_rect_to_pdf(page_w, page_h, &req).unwrap();
            prop_assert!((rect.x1 - page_w).abs() < 1e-6);
            prop_assert!((rect.y1 - page_h).abs() < 1e-6);
        }

        #[test]
        fn zero_viewport_always_fails(
            other in dimension(),
            zero_width in any::<bool>(),
            page_w in dimension(),
            page_h in dimension(),
        ) {
            let (vw, vh) = if zero_width { (0.0, other) } else { (other, 0.0) };
            let req = PlacementRequest {
                page_number: 1,
                rotation_degrees: 0.0,
                viewport_width: vw,
                viewport_height: vh,
                x: 1.0,
                y: 1.0,
                width: 1.0,
                height: 1.0,
            };
            let result = map_client_rect_to_pdf(page_w, page_h, &req);
            prop_assert!(matches!(result, Err(StampError::InvalidInput(_))));
        }

        /// User-space conversion round-trips back through the flipped axis
        #[test]
        fn user_space_preserves_extents(
            page_w in dimension(),
            page_h in dimension(),
            x0 in 0.0f64..500.0,
            y0 in 0.0f64..500.0,
            w in 1.0f64..500.0,
            h in 1.0f64..500.0,
        ) {
            let page = PageBox::from_corners([0.0, 0.0, page_w, page_h]);
            let rect = PdfRect::new(x0, y0, x0 + w, y0 + h);
            let user = page.to_user_space(&rect);
            prop_assert!((user.width() - w).abs() < 1e-9);
            prop_assert!((user.height() - h).abs() < 1e-9);
            prop_assert!((user.y1 - (page_h - y0)).abs() < 1e-9);
        }

        /// Whatever the page rotation, the stamp covers the mapped rectangle's area
        /// and the image origin stays inside the page box
        #[test]
        fn image_matrix_preserves_area(
            page_w in dimension(),
            page_h in dimension(),
            turns in 0i64..4,
            x_pct in 0.0f64..0.5,
            y_pct in 0.0f64..0.5,
            w_pct in 0.01f64..0.5,
            h_pct in 0.01f64..0.5,
        ) {
            let page = PageBox::from_corners([0.0, 0.0, page_w, page_h]).with_rotation(turns * 90);
            let (vw, vh) = (page.visible_width(), page.visible_height());
            let rect = PdfRect::new(
                x_pct * vw,
                y_pct * vh,
                (x_pct + w_pct) * vw,
                (y_pct + h_pct) * vh,
            );
            let [a, b, c, d, e, f] = page.image_matrix(&rect);
            let area = (a * d - b * c).abs();
            prop_assert!((area - rect.width() * rect.height()).abs() < 1e-6 * (1.0 + area));
            prop_assert!(e >= -1e-9 && e <= page_w + 1e-9);
            prop_assert!(f >= -1e-9 && f <= page_h + 1e-9);
        }
    }
}
