//! Fixed-function lights and material

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Vec3, Vec4};

/// Number of light slots the device exposes
pub const MAX_LIGHTS: usize = 8;

/// Light type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightKind {
    /// Omnidirectional, attenuated by range
    Point,
    /// Cone
    Spot,
    /// Infinitely distant
    Directional,
}

/// One fixed-function light
///
/// `position` is in world space when handed to the state tracker; the
/// tracker stores it rebased to render space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    /// Light type
    pub kind: LightKind,
    /// Diffuse colour, RGBA
    pub diffuse: Vec4,
    /// Specular colour, RGBA
    pub specular: Vec4,
    /// Ambient contribution, RGBA
    pub ambient: Vec4,
    /// Position (point and spot lights)
    pub position: Vec3,
    /// Direction (spot and directional lights)
    pub direction: Vec3,
    /// Cut-off distance
    pub range: f32,
    /// Constant, linear and quadratic attenuation
    pub attenuation: [f32; 3],
    /// Spot inner cone angle, radians
    pub theta: f32,
    /// Spot outer cone angle, radians
    pub phi: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Directional,
            diffuse: Vec4::new(1.0, 1.0, 1.0, 1.0),
            specular: Vec4::zeros(),
            ambient: Vec4::zeros(),
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            range: 1000.0,
            attenuation: [1.0, 0.0, 0.0],
            theta: 0.0,
            phi: 0.0,
        }
    }
}

impl Light {
    /// A white point light
    pub fn point(position: Vec3, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            range,
            ..Self::default()
        }
    }

    /// Whether `position` is meaningful for this light
    pub const fn is_positional(&self) -> bool {
        !matches!(self.kind, LightKind::Directional)
    }
}

/// Fixed-function material
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Diffuse reflectance
    pub diffuse: Vec4,
    /// Ambient reflectance
    pub ambient: Vec4,
    /// Specular reflectance
    pub specular: Vec4,
    /// Emissive colour
    pub emissive: Vec4,
    /// Specular exponent
    pub power: f32,
}

impl Default for Material {
    fn default() -> Self {
        let white = Vec4::new(1.0, 1.0, 1.0, 1.0);
        Self {
            diffuse: white,
            ambient: white,
            specular: Vec4::zeros(),
            emissive: Vec4::zeros(),
            power: 0.0,
        }
    }
}
