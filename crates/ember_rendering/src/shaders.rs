//! WGSL program sources.
//!
//! Both programs are embedded in the binary. A configured path replaces the
//! embedded text; an unreadable path is a setup error rather than a silent
//! fallback, since the user asked for that file explicitly.

use std::path::Path;

use ember_core::config::SourceConfig;
use ember_core::error::{SetupError, SetupResult};

/// Embedded kernel program.
pub const KERNEL_PROGRAM: &str = include_str!("../shaders/particle_kernels.wgsl");

/// Embedded shading program.
pub const RENDER_PROGRAM: &str = include_str!("../shaders/particle_render.wgsl");

/// Placeholder in the kernel program replaced by the work-group size.
pub const GROUP_SIZE_PLACEHOLDER: &str = "{{GROUP_SIZE}}";

/// Shading program entry point for point sprites.
pub const VS_POINT: &str = "vs_point";
/// Shading program entry point for billboards.
pub const VS_BILLBOARD: &str = "vs_billboard";
/// Fragment entry point.
pub const FS_MAIN: &str = "fs_main";

/// Program texts ready to hand to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    /// Kernel program with the work-group size substituted.
    pub kernels: String,
    /// Shading program.
    pub render: String,
}

impl ShaderSources {
    /// The embedded programs.
    #[must_use]
    pub fn embedded(group_size: u32) -> Self {
        Self {
            kernels: substitute_group_size(KERNEL_PROGRAM, group_size),
            render: RENDER_PROGRAM.to_owned(),
        }
    }

    /// Programs selected by `sources`, falling back to the embedded text for
    /// unset paths.
    ///
    /// # Errors
    ///
    /// [`SetupError::SourceRead`] if a configured file cannot be read.
    pub fn load(sources: &SourceConfig, group_size: u32) -> SetupResult<Self> {
        let kernels = read_or_embedded(sources.kernel_path.as_deref(), KERNEL_PROGRAM)?;
        let render = read_or_embedded(sources.shader_path.as_deref(), RENDER_PROGRAM)?;
        Ok(Self {
            kernels: substitute_group_size(&kernels, group_size),
            render,
        })
    }
}

/// Replaces every `{{GROUP_SIZE}}` in `source` with `group_size`.
#[must_use]
pub fn substitute_group_size(source: &str, group_size: u32) -> String {
    source.replace(GROUP_SIZE_PLACEHOLDER, &group_size.to_string())
}

fn read_or_embedded(path: Option<&Path>, embedded: &str) -> SetupResult<String> {
    let Some(path) = path else {
        return Ok(embedded.to_owned());
    };
    let text = std::fs::read_to_string(path).map_err(|source| SetupError::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), bytes = text.len(), "loaded program source");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::compute::{Kernel, KernelParams, SimParams};
    use ember_core::particle::RecordLayout;

    /// `(name, offset, size)` of every member of a WGSL struct, plus the
    /// struct size, using the host-shareable layout rules for the scalar and
    /// vector types these programs use.
    fn wgsl_struct_layout(source: &str, name: &str) -> (Vec<(String, u64, u64)>, u64) {
        let header = format!("struct {name} {{");
        let start = source.find(&header).expect("struct declared") + header.len();
        let body = &source[start..start + source[start..].find('}').expect("struct closed")];

        let mut fields = Vec::new();
        let mut offset = 0u64;
        let mut struct_align = 1u64;
        for line in body.lines() {
            let line = line.trim().trim_end_matches(',');
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let (field, ty) = line.split_once(':').expect("member has a type");
            let (align, size) = match ty.trim() {
                "f32" | "u32" | "atomic<u32>" => (4, 4),
                "vec2<f32>" => (8, 8),
                "vec3<f32>" => (16, 12),
                "vec4<f32>" => (16, 16),
                "mat4x4<f32>" => (16, 64),
                other => panic!("unhandled WGSL type {other}"),
            };
            offset = offset.next_multiple_of(align);
            fields.push((field.trim().to_owned(), offset, size));
            offset += size;
            struct_align = struct_align.max(align);
        }
        (fields, offset.next_multiple_of(struct_align))
    }

    #[test]
    fn test_particle_struct_matches_record_layout() {
        let (fields, size) = wgsl_struct_layout(KERNEL_PROGRAM, "Particle");
        assert_eq!(size, RecordLayout::STRIDE);
        let expected: Vec<(String, u64, u64)> = RecordLayout::FIELDS
            .iter()
            .map(|&(name, offset, size)| (name.to_owned(), offset, size))
            .collect();
        assert_eq!(fields, expected);
    }

    #[test]
    fn test_param_blocks_match_host_structs() {
        let (fields, kernel_params) = wgsl_struct_layout(KERNEL_PROGRAM, "KernelParams");
        assert_eq!(kernel_params, std::mem::size_of::<KernelParams>() as u64);
        let seed_hi = fields.iter().find(|(name, _, _)| name == "seed_hi").unwrap();
        assert_eq!(seed_hi.1, bytemuck::offset_of!(KernelParams, seed_hi) as u64);

        let (fields, sim_params) = wgsl_struct_layout(KERNEL_PROGRAM, "SimParams");
        assert_eq!(sim_params, std::mem::size_of::<SimParams>() as u64);
        let drag = fields.iter().find(|(name, _, _)| name == "drag").unwrap();
        assert_eq!(drag.1, bytemuck::offset_of!(SimParams, drag) as u64);

        let (_, uniforms) = wgsl_struct_layout(RENDER_PROGRAM, "RenderUniforms");
        assert_eq!(uniforms, std::mem::size_of::<crate::renderer::RenderUniforms>() as u64);
    }

    #[test]
    fn test_embedded_programs_declare_entry_points() {
        let sources = ShaderSources::embedded(128);
        for kernel in Kernel::ALL {
            assert!(sources.kernels.contains(&format!("fn {}(", kernel.entry_point())));
        }
        for entry in [VS_POINT, VS_BILLBOARD, FS_MAIN] {
            assert!(sources.render.contains(&format!("fn {entry}(")));
        }
    }

    #[test]
    fn test_group_size_substitution() {
        let sources = ShaderSources::embedded(64);
        assert!(!sources.kernels.contains(GROUP_SIZE_PLACEHOLDER));
        assert_eq!(sources.kernels.matches("@workgroup_size(64)").count(), 4);
    }

    #[test]
    fn test_load_without_paths_uses_embedded() {
        let config = SourceConfig {
            kernel_path: None,
            shader_path: None,
            texture_path: None,
        };
        assert_eq!(ShaderSources::load(&config, 256).unwrap(), ShaderSources::embedded(256));
    }

    #[test]
    fn test_missing_override_is_an_error() {
        let config = SourceConfig {
            kernel_path: Some("does/not/exist.wgsl".into()),
            ..SourceConfig::default()
        };
        let err = ShaderSources::load(&config, 256).unwrap_err();
        assert!(matches!(err, SetupError::SourceRead { .. }));
    }
}
