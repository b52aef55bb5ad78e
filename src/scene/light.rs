use glam::Vec3;

/// Shape of a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional,
    Point,
    Spot {
        /// Full outer cone angle in degrees.
        spot_angle: f32,
        /// Full inner cone angle in degrees. `None` derives a default from the
        /// outer angle.
        inner_spot_angle: Option<f32>,
    },
}

impl LightKind {
    #[inline]
    #[must_use]
    pub fn is_directional(&self) -> bool {
        matches!(self, Self::Directional)
    }

    #[inline]
    #[must_use]
    pub fn is_punctual(&self) -> bool {
        !self.is_directional()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowMode {
    #[default]
    None,
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightBakeType {
    #[default]
    Realtime,
    Mixed,
    Baked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixedLightingMode {
    #[default]
    IndirectOnly,
    Subtractive,
    Shadowmask,
}

/// Result of light baking, as reported by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightBakingOutput {
    pub bake_type: LightBakeType,
    pub mixed_mode: MixedLightingMode,
    /// Channel in the probe occlusion mask, `-1` when the light is not baked.
    pub occlusion_mask_channel: i32,
}

impl Default for LightBakingOutput {
    fn default() -> Self {
        Self {
            bake_type: LightBakeType::Realtime,
            mixed_mode: MixedLightingMode::IndirectOnly,
            occlusion_mask_channel: -1,
        }
    }
}

/// Depth and normal bias supplied by a light instead of the pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowBias {
    pub depth: f32,
    pub normal: f32,
}

/// A light that survived culling for the current camera.
///
/// Records are produced fresh every frame by the scene query and never
/// persisted by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleLight {
    pub id: u64,
    pub kind: LightKind,
    /// World position. Ignored for directional lights.
    pub position: Vec3,
    /// World-space direction the light points at (its local +Z).
    pub direction: Vec3,
    /// Linear colour.
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,

    pub shadows: ShadowMode,
    pub shadow_strength: f32,
    pub shadow_near_plane: f32,
    /// `Some` when the light opts out of the pipeline's shadow bias.
    pub bias_override: Option<ShadowBias>,

    pub baking: LightBakingOutput,
}

impl VisibleLight {
    fn base(id: u64, kind: LightKind, color: Vec3, intensity: f32) -> Self {
        Self {
            id,
            kind,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            color,
            intensity,
            range: 10.0,
            shadows: ShadowMode::None,
            shadow_strength: 1.0,
            shadow_near_plane: 0.2,
            bias_override: None,
            baking: LightBakingOutput::default(),
        }
    }

    #[must_use]
    pub fn directional(id: u64, direction: Vec3, color: Vec3, intensity: f32) -> Self {
        let mut light = Self::base(id, LightKind::Directional, color, intensity);
        light.direction = direction.normalize_or(Vec3::NEG_Z);
        light
    }

    #[must_use]
    pub fn point(id: u64, position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        let mut light = Self::base(id, LightKind::Point, color, intensity);
        light.position = position;
        light.range = range;
        light
    }

    #[must_use]
    pub fn spot(
        id: u64,
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        spot_angle: f32,
    ) -> Self {
        let mut light = Self::base(
            id,
            LightKind::Spot {
                spot_angle,
                inner_spot_angle: None,
            },
            color,
            intensity,
        );
        light.position = position;
        light.direction = direction.normalize_or(Vec3::NEG_Z);
        light.range = range;
        light
    }

    #[must_use]
    pub fn with_inner_spot_angle(mut self, degrees: f32) -> Self {
        if let LightKind::Spot {
            inner_spot_angle, ..
        } = &mut self.kind
        {
            *inner_spot_angle = Some(degrees);
        }
        self
    }

    #[must_use]
    pub fn with_shadows(mut self, mode: ShadowMode) -> Self {
        self.shadows = mode;
        self
    }

    #[must_use]
    pub fn with_shadow_strength(mut self, strength: f32) -> Self {
        self.shadow_strength = strength;
        self
    }

    #[must_use]
    pub fn with_bias_override(mut self, depth: f32, normal: f32) -> Self {
        self.bias_override = Some(ShadowBias { depth, normal });
        self
    }

    #[must_use]
    pub fn with_baking(mut self, baking: LightBakingOutput) -> Self {
        self.baking = baking;
        self
    }

    #[inline]
    #[must_use]
    pub fn casts_shadows(&self) -> bool {
        self.shadows != ShadowMode::None
    }

    /// Spot outer cone half-angle in radians; `None` for other kinds.
    #[must_use]
    pub fn spot_half_angle(&self) -> Option<f32> {
        match self.kind {
            LightKind::Spot { spot_angle, .. } => Some((spot_angle * 0.5).to_radians()),
            _ => None,
        }
    }
}
