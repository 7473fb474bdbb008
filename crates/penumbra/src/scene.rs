//! Host-side paintable scene
//!
//! Colour plus coverage alpha in an RGBA8 grid. Any cell with alpha above
//! zero is an emitter or occluder. Every mutation bumps the generation so the
//! pipeline knows when to re-upload.

use glam::{Vec2, Vec4};
use penumbra_core::{Grid, SurfaceFormat};

/// Round brush used by the drawing calls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    /// Pixels
    pub radius: f32,
    pub color: Vec4,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            radius: 4.0,
            color: Vec4::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Pen {
    drawing: bool,
    moved: bool,
    position: Vec2,
}

#[derive(Debug, Clone)]
pub struct Scene {
    grid: Grid,
    generation: u64,
    brush: Brush,
    pen: Pen,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            grid: Grid::new(width, height, SurfaceFormat::Rgba8Unorm),
            generation: 0,
            brush: Brush::default(),
            pen: Pen::default(),
        }
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Incremented by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn is_drawing(&self) -> bool {
        self.pen.drawing
    }

    /// Copy of the scene at a new size, keeping the overlapping region.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let mut scene = Scene::new(width, height);
        for y in 0..height.min(self.height()) {
            for x in 0..width.min(self.width()) {
                scene.grid.store(x, y, self.grid.load(x as i32, y as i32));
            }
        }
        scene.brush = self.brush;
        scene.generation = self.generation + 1;
        scene
    }

    pub fn clear(&mut self) {
        self.grid.fill(Vec4::ZERO);
        self.generation += 1;
    }

    pub fn fill_circle(&mut self, center: Vec2, radius: f32, color: Vec4) {
        self.stroke(center, center, radius, color);
    }

    /// Paint a capsule from `from` to `to`. A zero-length segment paints a disc.
    /// Colour is stored premultiplied by its alpha.
    pub fn stroke(&mut self, from: Vec2, to: Vec2, radius: f32, color: Vec4) {
        let radius = radius.max(0.5);
        let color = (color.truncate() * color.w).extend(color.w);
        let lo = (from.min(to) - radius).floor().max(Vec2::ZERO);
        let hi = (from.max(to) + radius)
            .ceil()
            .min(Vec2::new(self.width() as f32, self.height() as f32));
        let segment = to - from;
        let length_sq = segment.length_squared();

        for y in lo.y as u32..hi.y as u32 {
            for x in lo.x as u32..hi.x as u32 {
                let p = Vec2::new(x as f32, y as f32) + 0.5;
                let t = if length_sq > 0.0 {
                    ((p - from).dot(segment) / length_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                if p.distance_squared(from + segment * t) <= radius * radius {
                    self.grid.store(x, y, color);
                }
            }
        }
        self.generation += 1;
    }

    pub fn start_drawing(&mut self, position: Vec2) {
        self.pen = Pen {
            drawing: true,
            moved: false,
            position,
        };
    }

    /// Extend the current stroke. Returns whether anything was painted.
    pub fn move_to(&mut self, position: Vec2) -> bool {
        if !self.pen.drawing {
            self.pen.position = position;
            return false;
        }
        let Brush { radius, color } = self.brush;
        self.stroke(self.pen.position, position, radius, color);
        self.pen.position = position;
        self.pen.moved = true;
        true
    }

    /// End the stroke. A stroke that never moved leaves a dot; `commit`
    /// paints the last segment up to `position`. Returns whether a stroke
    /// was in progress.
    pub fn stop_drawing(&mut self, position: Vec2, commit: bool) -> bool {
        if !self.pen.drawing {
            return false;
        }
        let Brush { radius, color } = self.brush;
        if !self.pen.moved {
            self.stroke(self.pen.position, self.pen.position, radius, color);
        } else if commit {
            self.stroke(self.pen.position, position, radius, color);
        }
        self.pen = Pen {
            position,
            ..Pen::default()
        };
        true
    }
}
