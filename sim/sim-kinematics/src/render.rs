//! Rendering pass-through for visualization shapes.
//!
//! The tree does not render anything itself. Entities hold shared references
//! to [`Shape`]s and forward draw requests to whatever [`RenderInterface`]
//! the caller supplies.

use std::fmt;
use std::rc::Rc;

use nalgebra::{Isometry3, Vector4};

/// RGBA color with components in `[0, 1]`.
pub type Color = Vector4<f64>;

/// Default color used when a caller does not pick one.
#[must_use]
pub fn default_color() -> Color {
    Color::new(0.5, 0.5, 1.0, 1.0)
}

/// Minimal immediate-mode rendering back end.
pub trait RenderInterface {
    /// Save the current model matrix.
    fn push_matrix(&mut self);

    /// Restore the most recently saved model matrix.
    fn pop_matrix(&mut self);

    /// Post-multiply the current model matrix by `tf`.
    fn transform(&mut self, tf: &Isometry3<f64>) {
        let _ = tf;
    }
}

/// Something an entity can display.
pub trait Shape: fmt::Debug {
    /// Draw into `ri`. `use_default_color` asks the shape to ignore its own
    /// color in favor of `color`.
    fn draw(&self, ri: &mut dyn RenderInterface, color: &Color, use_default_color: bool);
}

/// Draw every shape between a `push_matrix`/`pop_matrix` pair.
///
/// A missing render target makes this a no-op.
pub fn draw_shapes(
    shapes: &[Rc<dyn Shape>],
    ri: Option<&mut dyn RenderInterface>,
    color: &Color,
    use_default_color: bool,
) {
    let Some(ri) = ri else {
        return;
    };

    for shape in shapes {
        ri.push_matrix();
        shape.draw(ri, color, use_default_color);
        ri.pop_matrix();
    }
}
