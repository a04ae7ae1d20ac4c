//! Graphics-side seam of the frame loop.

use glam::Mat4;

use crate::compute::ParticleDevice;
use crate::error::DeviceResult;
use crate::protocol::{BufferOwner, GraphicsAccess};

/// Per-frame inputs of the draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    /// Projection matrix.
    pub projection: Mat4,
    /// View matrix.
    pub view: Mat4,
    /// Particles to draw; always the full buffer.
    pub particle_count: u32,
}

/// Draws the shared buffer and presents the result.
pub trait ParticleRenderer<D: ParticleDevice> {
    /// A rendered, not yet presented, frame.
    type Frame;

    /// Draws every slot of the buffer.
    ///
    /// Returns `None` when there is nothing to present this frame (for
    /// example a surface that had to be reconfigured).
    ///
    /// # Errors
    ///
    /// Fails on unrecoverable device errors.
    fn draw(
        &mut self,
        particles: &GraphicsAccess<'_, D>,
        view: &FrameView,
    ) -> DeviceResult<Option<Self::Frame>>;

    /// Shows a drawn frame.
    fn present(&mut self, frame: Self::Frame);

    /// Adapts to a new window size.
    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Renderer without output. Checks ownership on every draw and remembers
/// what it was asked to draw.
#[derive(Debug, Clone, Default)]
pub struct HeadlessRenderer {
    draws: u64,
    presents: u64,
    owner_violations: u64,
    last_draw_count: u32,
    last_view: Option<FrameView>,
}

impl HeadlessRenderer {
    /// A renderer that has drawn nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw calls issued.
    #[must_use]
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Frames presented.
    #[must_use]
    pub fn presents(&self) -> u64 {
        self.presents
    }

    /// Draws observed while the buffer was not owned by graphics.
    #[must_use]
    pub fn owner_violations(&self) -> u64 {
        self.owner_violations
    }

    /// Vertex count of the last draw.
    #[must_use]
    pub fn last_draw_count(&self) -> u32 {
        self.last_draw_count
    }

    /// View of the last draw.
    #[must_use]
    pub fn last_view(&self) -> Option<&FrameView> {
        self.last_view.as_ref()
    }
}

impl<D: ParticleDevice> ParticleRenderer<D> for HeadlessRenderer {
    type Frame = u64;

    fn draw(
        &mut self,
        particles: &GraphicsAccess<'_, D>,
        view: &FrameView,
    ) -> DeviceResult<Option<u64>> {
        if particles.owner() != BufferOwner::Graphics {
            self.owner_violations += 1;
        }
        self.draws += 1;
        self.last_draw_count = particles.draw_count();
        self.last_view = Some(*view);
        Ok(Some(self.draws))
    }

    fn present(&mut self, _frame: u64) {
        self.presents += 1;
    }
}
