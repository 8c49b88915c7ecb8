//! The built-in function and variable catalog.
//!
//! The catalog is owned and supplied by the host environment; the compiler
//! only seeds it into the outermost scope before lowering begins.
//! [`BuiltinCatalog::default_catalog`] builds the set a standalone front end
//! advertises for the 1.10-1.30 language family, sized by the host's
//! capability limits.

use crate::hir::Storage;
use crate::options::{CapabilityLimits, ShaderStage};
use crate::types::{SamplerKind, ScalarKind, TypeId, TypeInterner};

/// Signature of one built-in function overload.
#[derive(Debug, Clone)]
pub struct BuiltinFunction {
    pub name: String,
    pub params: Vec<TypeId>,
    pub return_type: TypeId,
}

/// A built-in variable (`gl_*`) visible to one stage.
#[derive(Debug, Clone)]
pub struct BuiltinVariable {
    pub name: String,
    pub ty: TypeId,
    pub storage: Storage,
}

/// Everything the host seeds into the outermost scope.
#[derive(Debug, Clone, Default)]
pub struct BuiltinCatalog {
    pub functions: Vec<BuiltinFunction>,
    pub variables: Vec<BuiltinVariable>,
    /// Built-in integer constants (`gl_MaxDrawBuffers`, ...).
    pub constants: Vec<(String, i32)>,
}

impl BuiltinCatalog {
    /// The default catalog for a stage, derived from the host limits.
    pub fn default_catalog(
        version: u16,
        stage: ShaderStage,
        limits: &CapabilityLimits,
        types: &TypeInterner,
    ) -> Self {
        let mut cat = BuiltinCatalog::default();
        cat.add_math_functions(types);
        cat.add_geometric_functions(types);
        cat.add_relational_functions(types, version);
        cat.add_texture_functions(types);
        cat.add_stage_variables(stage, limits, types);
        cat.add_constants(limits);
        if stage == ShaderStage::Fragment {
            cat.add_derivative_functions(types);
        }
        cat
    }

    fn func(&mut self, name: &str, params: &[TypeId], ret: TypeId) {
        self.functions.push(BuiltinFunction {
            name: name.to_string(),
            params: params.to_vec(),
            return_type: ret,
        });
    }

    /// Angle, trigonometry, exponential, and common functions, instantiated
    /// for float and each float vector size ("genType" in the GLSL
    /// specification's notation).
    fn add_math_functions(&mut self, types: &TypeInterner) {
        let gens: Vec<TypeId> = (1..=4u8)
            .map(|n| types.vector_or_scalar(ScalarKind::Float, n))
            .collect();
        let float = types.float();

        for &gen in &gens {
            for name in [
                "radians",
                "degrees",
                "sin",
                "cos",
                "tan",
                "asin",
                "acos",
                "atan",
                "exp",
                "log",
                "exp2",
                "log2",
                "sqrt",
                "inversesqrt",
                "abs",
                "sign",
                "floor",
                "ceil",
                "fract",
                "normalize",
            ] {
                self.func(name, &[gen], gen);
            }
            for name in ["atan", "pow", "mod", "min", "max", "step"] {
                self.func(name, &[gen, gen], gen);
            }
            self.func("clamp", &[gen, gen, gen], gen);
            self.func("mix", &[gen, gen, gen], gen);
            self.func("smoothstep", &[gen, gen, gen], gen);

            // float-second-operand forms exist only for the vector shapes.
            if gen != float {
                for name in ["mod", "min", "max"] {
                    self.func(name, &[gen, float], gen);
                }
                self.func("clamp", &[gen, float, float], gen);
                self.func("mix", &[gen, gen, float], gen);
                self.func("step", &[float, gen], gen);
                self.func("smoothstep", &[float, float, gen], gen);
            }
        }
    }

    fn add_geometric_functions(&mut self, types: &TypeInterner) {
        let float = types.float();
        let vec3 = types.vector(ScalarKind::Float, 3);

        for n in 1..=4u8 {
            let gen = types.vector_or_scalar(ScalarKind::Float, n);
            self.func("length", &[gen], float);
            self.func("distance", &[gen, gen], float);
            self.func("dot", &[gen, gen], float);
            self.func("faceforward", &[gen, gen, gen], gen);
            self.func("reflect", &[gen, gen], gen);
            self.func("refract", &[gen, gen, float], gen);
        }
        self.func("cross", &[vec3, vec3], vec3);

        for n in 2..=4u8 {
            let mat = types.matrix(n, n);
            self.func("matrixCompMult", &[mat, mat], mat);
        }
    }

    fn add_relational_functions(&mut self, types: &TypeInterner, version: u16) {
        for n in 2..=4u8 {
            let bvec = types.vector(ScalarKind::Bool, n);
            let mut kinds = vec![ScalarKind::Float, ScalarKind::Int];
            if version >= 130 {
                kinds.push(ScalarKind::UInt);
            }
            for kind in kinds {
                let vec = types.vector(kind, n);
                for name in [
                    "lessThan",
                    "lessThanEqual",
                    "greaterThan",
                    "greaterThanEqual",
                    "equal",
                    "notEqual",
                ] {
                    self.func(name, &[vec, vec], bvec);
                }
            }
            self.func("equal", &[bvec, bvec], bvec);
            self.func("notEqual", &[bvec, bvec], bvec);
            self.func("any", &[bvec], types.bool());
            self.func("all", &[bvec], types.bool());
            self.func("not", &[bvec], bvec);
        }
    }

    fn add_texture_functions(&mut self, types: &TypeInterner) {
        let vec2 = types.vector(ScalarKind::Float, 2);
        let vec3 = types.vector(ScalarKind::Float, 3);
        let vec4 = types.vector(ScalarKind::Float, 4);

        let s1d = types.sampler(SamplerKind::Sampler1D);
        let s2d = types.sampler(SamplerKind::Sampler2D);
        let s3d = types.sampler(SamplerKind::Sampler3D);
        let cube = types.sampler(SamplerKind::SamplerCube);
        let sh1d = types.sampler(SamplerKind::Sampler1DShadow);
        let sh2d = types.sampler(SamplerKind::Sampler2DShadow);

        self.func("texture1D", &[s1d, types.float()], vec4);
        self.func("texture1DProj", &[s1d, vec2], vec4);
        self.func("texture2D", &[s2d, vec2], vec4);
        self.func("texture2DProj", &[s2d, vec3], vec4);
        self.func("texture2DProj", &[s2d, vec4], vec4);
        self.func("texture3D", &[s3d, vec3], vec4);
        self.func("texture3DProj", &[s3d, vec4], vec4);
        self.func("textureCube", &[cube, vec3], vec4);
        self.func("shadow1D", &[sh1d, vec3], vec4);
        self.func("shadow2D", &[sh2d, vec3], vec4);
    }

    fn add_derivative_functions(&mut self, types: &TypeInterner) {
        for n in 1..=4u8 {
            let gen = types.vector_or_scalar(ScalarKind::Float, n);
            self.func("dFdx", &[gen], gen);
            self.func("dFdy", &[gen], gen);
            self.func("fwidth", &[gen], gen);
        }
    }

    fn add_stage_variables(
        &mut self,
        stage: ShaderStage,
        limits: &CapabilityLimits,
        types: &TypeInterner,
    ) {
        let float = types.float();
        let vec4 = types.vector(ScalarKind::Float, 4);

        let mut var = |name: &str, ty: TypeId, storage: Storage| {
            self.variables.push(BuiltinVariable {
                name: name.to_string(),
                ty,
                storage,
            });
        };

        match stage {
            ShaderStage::Vertex | ShaderStage::Geometry => {
                var("gl_Position", vec4, Storage::Output);
                var("gl_PointSize", float, Storage::Output);
            }
            ShaderStage::Fragment => {
                var("gl_FragColor", vec4, Storage::Output);
                var(
                    "gl_FragData",
                    types.array(vec4, Some(limits.max_draw_buffers)),
                    Storage::Output,
                );
                var("gl_FragDepth", float, Storage::Output);
                var("gl_FragCoord", vec4, Storage::Input);
                var("gl_FrontFacing", types.bool(), Storage::Input);
            }
        }
    }

    fn add_constants(&mut self, limits: &CapabilityLimits) {
        let mut c = |name: &str, value: u32| {
            self.constants.push((name.to_string(), value as i32));
        };
        c("gl_MaxLights", limits.max_lights);
        c("gl_MaxClipPlanes", limits.max_clip_planes);
        c("gl_MaxTextureUnits", limits.max_texture_units);
        c("gl_MaxTextureCoords", limits.max_texture_coord_units);
        c("gl_MaxVertexAttribs", limits.max_vertex_attribs);
        c(
            "gl_MaxVertexUniformComponents",
            limits.max_vertex_uniform_components,
        );
        c("gl_MaxVaryingFloats", limits.max_varying_floats);
        c(
            "gl_MaxVertexTextureImageUnits",
            limits.max_vertex_texture_image_units,
        );
        c(
            "gl_MaxCombinedTextureImageUnits",
            limits.max_combined_texture_image_units,
        );
        c("gl_MaxTextureImageUnits", limits.max_texture_image_units);
        c(
            "gl_MaxFragmentUniformComponents",
            limits.max_fragment_uniform_components,
        );
        c("gl_MaxDrawBuffers", limits.max_draw_buffers);
    }
}
