//! Node shapes, edge curves and visual attributes.
//!
//! Shape and curve kinds are closed sets modelled as enums. The spatial index
//! and the layout engine only ever see bounding boxes; every kind-specific
//! computation lives in the `match` arms below.

use kurbo::{Affine, Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Visual attributes of a node.
///
/// The core never interprets these; they are carried through to the render
/// snapshot and the persistence document untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStyle {
    /// Fill color (None = no fill).
    #[serde(default)]
    pub fill: Option<SerializableColor>,
    /// Outline color.
    pub stroke: SerializableColor,
    /// Outline width in world units.
    pub stroke_width: f64,
    /// Overall opacity (0.0 = fully transparent, 1.0 = fully opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Optional caption drawn by the renderer.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_opacity() -> f64 {
    1.0
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            fill: Some(SerializableColor::white()),
            stroke: SerializableColor::black(),
            stroke_width: 2.0,
            opacity: 1.0,
            label: None,
        }
    }
}

impl NodeStyle {
    /// Get the fill color as a peniko Color.
    pub fn fill_color(&self) -> Option<Color> {
        self.fill.map(Into::into)
    }

    /// Get the stroke color as a peniko Color.
    pub fn stroke_color(&self) -> Color {
        self.stroke.into()
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Geometry of a node, centered on the node position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shapeKind", content = "shapeParams", rename_all = "camelCase")]
pub enum NodeShape {
    Circle {
        radius: f64,
    },
    Rectangle {
        width: f64,
        height: f64,
        /// Rotation in radians around the center.
        #[serde(default)]
        rotation: f64,
    },
}

impl NodeShape {
    /// A circle of the given radius.
    pub fn circle(radius: f64) -> Self {
        NodeShape::Circle { radius }
    }

    /// An axis-aligned rectangle.
    pub fn rect(width: f64, height: f64) -> Self {
        NodeShape::Rectangle {
            width,
            height,
            rotation: 0.0,
        }
    }

    /// Check the size invariants. Returns the reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            NodeShape::Circle { radius } => {
                if !(radius.is_finite() && radius > 0.0) {
                    return Err(format!("circle radius must be positive, got {radius}"));
                }
            }
            NodeShape::Rectangle {
                width,
                height,
                rotation,
            } => {
                if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
                    return Err(format!(
                        "rectangle size must be positive, got {width}x{height}"
                    ));
                }
                if !rotation.is_finite() {
                    return Err("rectangle rotation is not finite".to_string());
                }
            }
        }
        Ok(())
    }

    /// Area enclosed by the shape.
    pub fn area(&self) -> f64 {
        match *self {
            NodeShape::Circle { radius } => std::f64::consts::PI * radius * radius,
            NodeShape::Rectangle { width, height, .. } => width * height,
        }
    }

    /// Radius of the smallest circle around the center enclosing the shape.
    pub fn bounding_radius(&self) -> f64 {
        match *self {
            NodeShape::Circle { radius } => radius,
            NodeShape::Rectangle { width, height, .. } => 0.5 * width.hypot(height),
        }
    }

    /// Axis-aligned bounding box when centered on `center`.
    pub fn bounds_at(&self, center: Point) -> Rect {
        match *self {
            NodeShape::Circle { radius } => Rect::new(
                center.x - radius,
                center.y - radius,
                center.x + radius,
                center.y + radius,
            ),
            NodeShape::Rectangle {
                width,
                height,
                rotation,
            } => {
                let (sin, cos) = rotation.sin_cos();
                let half_w = 0.5 * (width * cos.abs() + height * sin.abs());
                let half_h = 0.5 * (width * sin.abs() + height * cos.abs());
                Rect::new(
                    center.x - half_w,
                    center.y - half_h,
                    center.x + half_w,
                    center.y + half_h,
                )
            }
        }
    }

    /// Exact containment test for a world-space point.
    pub fn contains(&self, center: Point, point: Point) -> bool {
        match *self {
            NodeShape::Circle { radius } => (point - center).hypot2() <= radius * radius,
            NodeShape::Rectangle {
                width,
                height,
                rotation,
            } => {
                let local = Affine::rotate(-rotation) * (point - center).to_point();
                local.x.abs() <= 0.5 * width && local.y.abs() <= 0.5 * height
            }
        }
    }

    /// Whether the shape overlaps `rect` at all (touching counts).
    pub fn intersects_rect(&self, center: Point, rect: Rect) -> bool {
        match *self {
            NodeShape::Circle { radius } => {
                let nearest = Point::new(
                    center.x.clamp(rect.x0, rect.x1),
                    center.y.clamp(rect.y0, rect.y1),
                );
                (nearest - center).hypot2() <= radius * radius
            }
            NodeShape::Rectangle {
                width,
                height,
                rotation,
            } => {
                // Separating axis test between the oriented box and `rect`.
                let (sin, cos) = rotation.sin_cos();
                let u = Vec2::new(cos, sin);
                let v = Vec2::new(-sin, cos);
                let (hw, hh) = (0.5 * width, 0.5 * height);
                let (rw, rh) = (0.5 * rect.width(), 0.5 * rect.height());
                let offset = center - rect.center();
                [Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0), u, v]
                    .into_iter()
                    .all(|axis| {
                        let box_extent = hw * axis.dot(u).abs() + hh * axis.dot(v).abs();
                        let rect_extent = rw * axis.x.abs() + rh * axis.y.abs();
                        offset.dot(axis).abs() <= box_extent + rect_extent
                    })
            }
        }
    }
}

/// How an edge is drawn between its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "curveKind", content = "curveParams", rename_all = "camelCase")]
pub enum CurveKind {
    /// Straight segment.
    #[default]
    Line,
    /// Cubic bezier; control points are offsets from the source and target
    /// positions respectively.
    #[serde(rename_all = "camelCase")]
    Bezier {
        source_offset: Vec2,
        target_offset: Vec2,
    },
}

impl CurveKind {
    /// Horizontal S-curve whose handles reach half the horizontal distance
    /// between the endpoints.
    pub fn flowing(source: Point, target: Point) -> Self {
        let reach = 0.5 * (target.x - source.x).abs();
        CurveKind::Bezier {
            source_offset: Vec2::new(reach, 0.0),
            target_offset: Vec2::new(-reach, 0.0),
        }
    }

    /// Absolute control points for the given endpoints, if the curve has any.
    pub fn control_points(&self, source: Point, target: Point) -> Option<(Point, Point)> {
        match *self {
            CurveKind::Line => None,
            CurveKind::Bezier {
                source_offset,
                target_offset,
            } => Some((source + source_offset, target + target_offset)),
        }
    }

    /// Conservative bounds of the curve (control hull for beziers).
    pub fn bounds(&self, source: Point, target: Point) -> Rect {
        let rect = Rect::from_points(source, target);
        match self.control_points(source, target) {
            None => rect,
            Some((c1, c2)) => rect.union_pt(c1).union_pt(c2),
        }
    }

    pub(crate) fn is_finite(&self) -> bool {
        match *self {
            CurveKind::Line => true,
            CurveKind::Bezier {
                source_offset,
                target_offset,
            } => source_offset.is_finite() && target_offset.is_finite(),
        }
    }
}

/// Check that a world position is usable.
pub(crate) fn check_position(position: Point) -> Result<(), String> {
    if position.x.is_finite() && position.y.is_finite() {
        Ok(())
    } else {
        Err(format!("position ({}, {}) is not finite", position.x, position.y))
    }
}
