//! The particle buffer as vertex input.
//!
//! The draw binds the shared buffer directly; these attributes read the
//! position and the alive byte at their fixed record offsets.

use std::ops::Range;

use ember_core::config::SpriteMode;
use ember_core::particle::RecordLayout;

use crate::shaders::{VS_BILLBOARD, VS_POINT};

/// Attribute 0: position. Attribute 1: alive flag in component x.
pub const PARTICLE_ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: RecordLayout::POSITION_OFFSET,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Uint8x4,
        offset: RecordLayout::ALIVE_OFFSET,
        shader_location: 1,
    },
];

/// Vertices per billboard quad (triangle strip).
pub const QUAD_VERTICES: u32 = 4;

/// Vertex buffer layout over particle records.
///
/// Points advance once per vertex; billboards once per instance, with the
/// four quad corners generated from the vertex index.
#[must_use]
pub fn particle_vertex_layout(mode: SpriteMode) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: RecordLayout::STRIDE,
        step_mode: match mode {
            SpriteMode::Points => wgpu::VertexStepMode::Vertex,
            SpriteMode::Billboards => wgpu::VertexStepMode::Instance,
        },
        attributes: &PARTICLE_ATTRIBUTES,
    }
}

/// Primitive topology for `mode`.
#[must_use]
pub fn topology(mode: SpriteMode) -> wgpu::PrimitiveTopology {
    match mode {
        SpriteMode::Points => wgpu::PrimitiveTopology::PointList,
        SpriteMode::Billboards => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

/// Vertex entry point for `mode`.
#[must_use]
pub fn vertex_entry(mode: SpriteMode) -> &'static str {
    match mode {
        SpriteMode::Points => VS_POINT,
        SpriteMode::Billboards => VS_BILLBOARD,
    }
}

/// `(vertices, instances)` to draw `count` particles.
#[must_use]
pub fn draw_ranges(mode: SpriteMode, count: u32) -> (Range<u32>, Range<u32>) {
    match mode {
        SpriteMode::Points => (0..count, 0..1),
        SpriteMode::Billboards => (0..QUAD_VERTICES, 0..count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::particle::ParticleRecord;

    #[test]
    fn test_attributes_match_record() {
        let layout = particle_vertex_layout(SpriteMode::Points);
        assert_eq!(layout.array_stride, std::mem::size_of::<ParticleRecord>() as u64);

        let position = &layout.attributes[0];
        assert_eq!(position.offset, bytemuck::offset_of!(ParticleRecord, position) as u64);
        assert_eq!(position.format.size(), 12);

        let alive = &layout.attributes[1];
        assert_eq!(alive.offset, bytemuck::offset_of!(ParticleRecord, alive) as u64);
        // alive byte plus its three zero pad bytes
        assert_eq!(alive.format.size(), 4);
    }

    #[test]
    fn test_every_slot_is_drawn() {
        let n = 1_000_000;
        let (vertices, instances) = draw_ranges(SpriteMode::Points, n);
        assert_eq!((vertices.len(), instances.len()), (n as usize, 1));
        let (vertices, instances) = draw_ranges(SpriteMode::Billboards, n);
        assert_eq!((vertices.len(), instances.len()), (4, n as usize));
    }

    #[test]
    fn test_mode_pipeline_settings() {
        assert_eq!(
            particle_vertex_layout(SpriteMode::Billboards).step_mode,
            wgpu::VertexStepMode::Instance
        );
        assert_eq!(topology(SpriteMode::Points), wgpu::PrimitiveTopology::PointList);
        assert_eq!(vertex_entry(SpriteMode::Billboards), "vs_billboard");
    }
}
