//! Compilation options: language version, profile, extensions, and the
//! host-environment capability limits the semantic analyzer queries.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shader pipeline stage of a compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderStage {
    /// Infer the stage from a file name suffix (`.vert`, `.geom`, `.frag`).
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "vert" => Some(ShaderStage::Vertex),
            "geom" => Some(ShaderStage::Geometry),
            "frag" => Some(ShaderStage::Fragment),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Language profile selected by the host or a `#version` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Profile {
    #[default]
    Core,
    Es,
}

/// Numeric resource limits of the (fake or real) host environment.
///
/// Defaults match the minimums a standalone front end advertises for
/// GLSL 1.10 plus a little headroom for parser tests taken from real apps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityLimits {
    pub max_lights: u32,
    pub max_clip_planes: u32,
    pub max_texture_units: u32,
    pub max_texture_coord_units: u32,
    pub max_vertex_attribs: u32,
    pub max_vertex_uniform_components: u32,
    pub max_varying_floats: u32,
    pub max_vertex_texture_image_units: u32,
    pub max_combined_texture_image_units: u32,
    pub max_texture_image_units: u32,
    pub max_fragment_uniform_components: u32,
    pub max_draw_buffers: u32,
}

impl Default for CapabilityLimits {
    fn default() -> Self {
        Self {
            max_lights: 8,
            max_clip_planes: 8,
            max_texture_units: 2,
            max_texture_coord_units: 4,
            max_vertex_attribs: 16,
            max_vertex_uniform_components: 512,
            max_varying_floats: 8 * 4,
            max_vertex_texture_image_units: 0,
            max_combined_texture_image_units: 2,
            max_texture_image_units: 2,
            max_fragment_uniform_components: 64,
            max_draw_buffers: 2,
        }
    }
}

/// Read-only configuration for compiling one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Default language version, overridden by a `#version` directive.
    pub version: u16,
    pub profile: Profile,
    /// Extension names enabled by the host before compilation starts.
    pub extensions: Vec<String>,
    pub limits: CapabilityLimits,
    /// Hard cap on optimization fixed-point iterations. A safety valve, not
    /// a semantically meaningful number; reaching it is not an error.
    pub max_opt_iterations: usize,
    /// Rewrite statically counted loops into their unrolled form.
    pub unroll_loops: bool,
    /// Loops with more iterations than this are never unrolled.
    pub unroll_limit: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            version: 110,
            profile: Profile::Core,
            extensions: Vec::new(),
            limits: CapabilityLimits::default(),
            max_opt_iterations: 32,
            unroll_loops: false,
            unroll_limit: 32,
        }
    }
}

impl CompileOptions {
    /// Options for an OpenGL ES unit (`--glsl-es`).
    pub fn glsl_es() -> Self {
        Self {
            version: 100,
            profile: Profile::Es,
            ..Self::default()
        }
    }

    /// Versions this front end accepts in a `#version` directive.
    pub fn is_supported_version(version: u16, profile: Profile) -> bool {
        match profile {
            Profile::Core => matches!(version, 110 | 120 | 130),
            Profile::Es => version == 100,
        }
    }

    /// Extensions this front end knows about.
    pub fn is_known_extension(name: &str) -> bool {
        matches!(
            name,
            "GL_ARB_draw_buffers"
                | "GL_ARB_fragment_coord_conventions"
                | "GL_EXT_texture_array"
                | "GL_OES_standard_derivatives"
        ) || name == "all"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_from_path() {
        assert_eq!(
            ShaderStage::from_path(Path::new("a.vert")),
            Some(ShaderStage::Vertex)
        );
        assert_eq!(
            ShaderStage::from_path(Path::new("b.frag")),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(ShaderStage::from_path(Path::new("c.txt")), None);
    }

    #[test]
    fn test_supported_versions() {
        assert!(CompileOptions::is_supported_version(110, Profile::Core));
        assert!(CompileOptions::is_supported_version(130, Profile::Core));
        assert!(!CompileOptions::is_supported_version(140, Profile::Core));
        assert!(CompileOptions::is_supported_version(100, Profile::Es));
        assert!(!CompileOptions::is_supported_version(110, Profile::Es));
    }
}
