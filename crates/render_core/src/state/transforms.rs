//! World/view/projection transforms with world-relation rebasing
//!
//! Large maps put the camera thousands of units from the origin, which eats
//! float precision in every transform. The tracker keeps the camera at the
//! render-space origin instead: `world_relation_pos` (always the negated
//! camera position) is added to every world matrix and light position
//! before it reaches the device, and the view matrix is stored with its
//! translation stripped into `view_relation_pos`.
//!
//! Callers always see plain world-space values; the offsets are applied on
//! the way in and removed on the way out.

use crate::foundation::math::{
    look_at_rotation, offset_translation, perspective, rotation_from_angles, rotation_part,
    set_translation, translation, Mat4, Plane, Vec3,
};

/// Which matrix a transform call addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// Object to world
    World,
    /// World to camera
    View,
    /// Camera to clip
    Projection,
}

/// Camera parameters of the last `set_camera` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// World-space position
    pub position: Vec3,
    /// Euler angles, radians
    pub angles: Vec3,
    /// Horizontal field of view as passed in, radians
    pub fov: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            angles: Vec3::zeros(),
            fov: std::f32::consts::FRAC_PI_2,
        }
    }
}

/// Matrices and rebasing offsets
#[derive(Debug, Clone)]
pub struct TransformState {
    world: Mat4,
    view: Mat4,
    projection: Mat4,
    world_relation_pos: Vec3,
    view_relation_pos: Vec3,
    camera: CameraState,
    near: f32,
    far: f32,
    fov_multiplier: f32,
}

impl TransformState {
    /// Identity transforms with the camera at the origin
    pub fn new(near: f32, far: f32, fov_multiplier: f32) -> Self {
        Self {
            world: Mat4::identity(),
            view: Mat4::identity(),
            projection: Mat4::identity(),
            world_relation_pos: Vec3::zeros(),
            view_relation_pos: Vec3::zeros(),
            camera: CameraState::default(),
            near,
            far,
            fov_multiplier,
        }
    }

    /// Store a matrix given in world space
    pub fn set_transform(&mut self, kind: TransformKind, m: &Mat4) {
        match kind {
            TransformKind::World => {
                self.world = *m;
                offset_translation(&mut self.world, &self.world_relation_pos);
            }
            TransformKind::View => self.set_view(m),
            TransformKind::Projection => self.projection = *m,
        }
    }

    /// Read a matrix back in world space
    pub fn transform(&self, kind: TransformKind) -> Mat4 {
        match kind {
            TransformKind::World => {
                let mut m = self.world;
                offset_translation(&mut m, &-self.world_relation_pos);
                m
            }
            TransformKind::View => {
                let mut m = self.view;
                offset_translation(&mut m, &self.view_relation_pos);
                m
            }
            TransformKind::Projection => self.projection,
        }
    }

    /// Matrix as the device sees it (rebased)
    pub const fn render_matrix(&self, kind: TransformKind) -> &Mat4 {
        match kind {
            TransformKind::World => &self.world,
            TransformKind::View => &self.view,
            TransformKind::Projection => &self.projection,
        }
    }

    /// Overwrite a rebased matrix directly
    ///
    /// Used by state snapshots, which capture render-space matrices.
    pub(crate) fn set_render_matrix(&mut self, kind: TransformKind, m: Mat4) {
        match kind {
            TransformKind::World => self.world = m,
            TransformKind::View => self.view = m,
            TransformKind::Projection => self.projection = m,
        }
    }

    /// Put back the rebasing offsets and camera of a snapshot
    pub(crate) fn set_relation(
        &mut self,
        world_relation_pos: Vec3,
        view_relation_pos: Vec3,
        camera: CameraState,
    ) {
        self.world_relation_pos = world_relation_pos;
        self.view_relation_pos = view_relation_pos;
        self.camera = camera;
    }

    fn set_view(&mut self, m: &Mat4) {
        let t = translation(m);
        let rotation = rotation_part(m);
        let relation = rotation.transpose() * t;

        self.view = *m;
        set_translation(&mut self.view, &Vec3::zeros());
        self.view_relation_pos = t;
        self.rebase(relation);
        self.camera.position = -relation;
    }

    fn rebase(&mut self, new_relation: Vec3) {
        let delta = new_relation - self.world_relation_pos;
        offset_translation(&mut self.world, &delta);
        self.world_relation_pos = new_relation;
    }

    /// Place the camera and rebuild view and projection
    ///
    /// `aspect` is screen height over width. The stored world matrix is
    /// shifted by the change in relation position so pending world
    /// transforms stay where they were in world space.
    pub fn set_camera(&mut self, position: &Vec3, angles: &Vec3, fov: f32, aspect: f32) {
        let rotation = rotation_part(&rotation_from_angles(angles));
        let view_rotation = rotation.transpose();

        let relation = -position;
        self.rebase(relation);

        self.view = Mat4::identity();
        self.view.fixed_view_mut::<3, 3>(0, 0).copy_from(&view_rotation);
        self.view_relation_pos = view_rotation * relation;

        self.camera = CameraState {
            position: *position,
            angles: *angles,
            fov,
        };
        self.set_perspective(fov, aspect);
    }

    /// Point the camera from `from` at `to`
    ///
    /// Returns false, leaving the camera untouched, when the direction is
    /// degenerate.
    pub fn set_camera_look_at(&mut self, from: &Vec3, to: &Vec3, up: &Vec3) -> bool {
        let Some(view_rotation) = look_at_rotation(from, to, up) else {
            return false;
        };
        let mut view = Mat4::identity();
        view.fixed_view_mut::<3, 3>(0, 0).copy_from(&view_rotation);
        set_translation(&mut view, &(view_rotation * -from));
        self.set_view(&view);
        true
    }

    /// Rebuild the projection
    ///
    /// `fov` is multiplied by the configured fov multiplier; `aspect` is
    /// height over width.
    pub fn set_perspective(&mut self, fov: f32, aspect: f32) {
        self.projection = perspective(fov * self.fov_multiplier, aspect, self.near, self.far);
    }

    /// Change the clip planes; takes effect at the next `set_perspective`
    pub fn set_near_far(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
    }

    /// Current clip planes
    pub const fn near_far(&self) -> (f32, f32) {
        (self.near, self.far)
    }

    /// Negated camera position
    pub const fn world_relation_pos(&self) -> Vec3 {
        self.world_relation_pos
    }

    /// Translation stripped from the view matrix
    pub const fn view_relation_pos(&self) -> Vec3 {
        self.view_relation_pos
    }

    /// Camera of the last `set_camera`, with the position kept current by
    /// `set_transform(View, ..)`
    pub const fn camera(&self) -> &CameraState {
        &self.camera
    }

    /// World-space point to render space
    pub fn to_render_space(&self, p: &Vec3) -> Vec3 {
        p + self.world_relation_pos
    }

    /// Render-space point to world space
    pub fn to_world_space(&self, p: &Vec3) -> Vec3 {
        p - self.world_relation_pos
    }

    /// Side planes of the view frustum in render space, normals inwards
    ///
    /// Order: left, right, bottom, top. Every plane passes through the
    /// camera, which sits at the render-space origin.
    pub fn frustum_planes(&self) -> [Plane; 4] {
        let w = self.projection[(0, 0)];
        let h = self.projection[(1, 1)];
        let to_render = rotation_part(&self.view).transpose();
        let camera_normals = [
            Vec3::new(w, 0.0, 1.0),
            Vec3::new(-w, 0.0, 1.0),
            Vec3::new(0.0, h, 1.0),
            Vec3::new(0.0, -h, 1.0),
        ];
        camera_normals.map(|n| Plane::new((to_render * n).normalize(), 0.0))
    }

    /// Whether a world-space sphere touches the frustum's side planes
    pub fn is_sphere_visible(&self, center: &Vec3, radius: f32) -> bool {
        let p = self.to_render_space(center);
        self.frustum_planes().iter().all(|plane| plane.distance_to(&p) >= -radius)
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::new(0.1, 4000.0, 1.0)
    }
}
