//! Fixed-function pipeline state
//!
//! [`PipelineStates::common`] is the baseline every device (re)creation
//! starts from. Technique passes override parts of it through
//! [`PassOverrides`] without mutating the baseline.

use serde::{Deserialize, Serialize};

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareFunc {
    /// Never passes
    Never,
    /// `<`
    Less,
    /// `==`
    Equal,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `!=`
    NotEqual,
    /// `>=`
    GreaterEqual,
    /// Always passes
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    InvSrcAlpha,
    /// Source colour
    SrcColor,
    /// 1 - source colour
    InvSrcColor,
    /// Destination colour
    DestColor,
    /// The texture factor colour
    BlendFactor,
}

/// Triangle culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CullMode {
    /// Draw both sides
    None,
    /// Cull clockwise triangles
    Clockwise,
    /// Cull counter-clockwise triangles
    CounterClockwise,
}

/// Texture filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureFilter {
    /// No filtering (mip filter only)
    None,
    /// Nearest texel
    Point,
    /// Bilinear
    Linear,
    /// Anisotropic
    Anisotropic,
}

/// Depth buffer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthState {
    /// Depth testing on
    pub test: bool,
    /// Depth writes on
    pub write: bool,
    /// Comparison function
    pub func: CompareFunc,
}

/// Colour blending state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlendState {
    /// Blending on
    pub enabled: bool,
    /// Source factor
    pub src: BlendFactor,
    /// Destination factor
    pub dst: BlendFactor,
}

impl BlendState {
    /// Blending disabled
    pub const OPAQUE: Self = Self {
        enabled: false,
        src: BlendFactor::One,
        dst: BlendFactor::Zero,
    };

    /// `src * a + dst * (1 - a)`
    pub const ALPHA: Self = Self {
        enabled: true,
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::InvSrcAlpha,
    };

    /// `src + dst`
    pub const ADDITIVE: Self = Self {
        enabled: true,
        src: BlendFactor::One,
        dst: BlendFactor::One,
    };
}

/// Alpha test state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaTestState {
    /// Alpha testing on
    pub enabled: bool,
    /// Reference value, 0..=255
    pub reference: u8,
    /// Comparison against the reference
    pub func: CompareFunc,
}

/// Sampler state shared by every texture stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerState {
    /// Minification filter
    pub min: TextureFilter,
    /// Magnification filter
    pub mag: TextureFilter,
    /// Mip filter
    pub mip: TextureFilter,
    /// Maximum anisotropy, `None` disables it
    pub max_anisotropy: Option<f32>,
}

impl SamplerState {
    /// Trilinear filtering without anisotropy
    pub const LINEAR: Self = Self {
        min: TextureFilter::Linear,
        mag: TextureFilter::Linear,
        mip: TextureFilter::Linear,
        max_anisotropy: None,
    };
}

/// Fixed-function lighting inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadingState {
    /// Per-vertex lighting on
    pub lighting: bool,
    /// Use the vertex diffuse colour as material colour
    pub vertex_color: bool,
    /// Ambient light, ARGB
    pub ambient: u32,
    /// Specular highlights on
    pub specular: bool,
}

/// Every piece of fixed-function state the device consumes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineStates {
    /// Depth buffer state
    pub depth: DepthState,
    /// Blend state
    pub blend: BlendState,
    /// Alpha test state
    pub alpha_test: AlphaTestState,
    /// Sampler state for all stages
    pub sampler: SamplerState,
    /// Lighting inputs
    pub shading: ShadingState,
    /// Culling mode
    pub cull: CullMode,
    /// Multisampling on
    pub multisample: bool,
}

/// Ambient level of the common baseline, on every channel
pub const COMMON_AMBIENT: u8 = 64;

/// Alpha test reference of the common baseline
pub const COMMON_ALPHA_REF: u8 = 0xA0;

impl PipelineStates {
    /// The engine's baseline state
    pub fn common(max_anisotropy: f32) -> Self {
        let ambient = u32::from(COMMON_AMBIENT);
        Self {
            depth: DepthState {
                test: true,
                write: true,
                func: CompareFunc::LessEqual,
            },
            blend: BlendState::ALPHA,
            alpha_test: AlphaTestState {
                enabled: true,
                reference: COMMON_ALPHA_REF,
                func: CompareFunc::Greater,
            },
            sampler: SamplerState {
                max_anisotropy: (max_anisotropy > 1.0).then_some(max_anisotropy),
                ..SamplerState::LINEAR
            },
            shading: ShadingState {
                lighting: false,
                vertex_color: true,
                ambient: 0xFF00_0000 | (ambient << 16) | (ambient << 8) | ambient,
                specular: false,
            },
            cull: CullMode::CounterClockwise,
            multisample: true,
        }
    }

    /// Apply a technique pass on top of this state
    pub fn with_overrides(mut self, overrides: &PassOverrides) -> Self {
        if let Some(depth) = overrides.depth {
            self.depth = depth;
        }
        if let Some(blend) = overrides.blend {
            self.blend = blend;
        }
        if let Some(alpha_test) = overrides.alpha_test {
            self.alpha_test = alpha_test;
        }
        if let Some(cull) = overrides.cull {
            self.cull = cull;
        }
        if let Some(lighting) = overrides.lighting {
            self.shading.lighting = lighting;
        }
        self
    }
}

impl Default for PipelineStates {
    fn default() -> Self {
        Self::common(3.0)
    }
}

/// Per-pass state overrides declared by a technique
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassOverrides {
    /// Depth state for the pass
    pub depth: Option<DepthState>,
    /// Blend state for the pass
    pub blend: Option<BlendState>,
    /// Alpha test for the pass
    pub alpha_test: Option<AlphaTestState>,
    /// Culling for the pass
    pub cull: Option<CullMode>,
    /// Lighting on/off for the pass
    pub lighting: Option<bool>,
}

impl PassOverrides {
    /// Full-screen pass: no depth, no culling, no alpha test
    pub const fn screen_space(blend: BlendState) -> Self {
        Self {
            depth: Some(DepthState {
                test: false,
                write: false,
                func: CompareFunc::Always,
            }),
            blend: Some(blend),
            alpha_test: Some(AlphaTestState {
                enabled: false,
                reference: 0,
                func: CompareFunc::Always,
            }),
            cull: Some(CullMode::None),
            lighting: Some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_baseline() {
        let states = PipelineStates::common(3.0);
        assert!(states.depth.test && states.depth.write);
        assert_eq!(states.depth.func, CompareFunc::LessEqual);
        assert_eq!(states.blend, BlendState::ALPHA);
        assert_eq!(states.alpha_test.reference, 0xA0);
        assert_eq!(states.alpha_test.func, CompareFunc::Greater);
        assert_eq!(states.sampler.max_anisotropy, Some(3.0));
        assert_eq!(states.shading.ambient, 0xFF40_4040);
        assert!(states.shading.vertex_color);
        assert_eq!(states.cull, CullMode::CounterClockwise);
    }

    #[test]
    fn test_anisotropy_disabled_at_one() {
        assert_eq!(PipelineStates::common(1.0).sampler.max_anisotropy, None);
    }

    #[test]
    fn test_overrides_leave_baseline_untouched() {
        let base = PipelineStates::common(3.0);
        let pass = base.with_overrides(&PassOverrides::screen_space(BlendState::ADDITIVE));
        assert!(!pass.depth.test);
        assert_eq!(pass.blend, BlendState::ADDITIVE);
        assert_eq!(pass.cull, CullMode::None);
        assert_eq!(base.blend, BlendState::ALPHA);
        assert_eq!(pass.sampler, base.sampler);
    }
}
