//! The sample scene and HUD driven by the interactive binary.

use std::f32::consts::TAU;

use deferred_shading::{
    BasicScene, Camera, HudQuad, Light, Material, MeshData, MeshInstance, ObjectId, QuadHud,
    Quat, ScreenRect, StrategyLadder, Transform, Vec3, WgpuBackend,
};

/// Radius of the orbit the colored lights follow.
const ORBIT_RADIUS: f32 = 4.0;

/// What a click on the HUD asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HudAction {
    Raise,
    Lower,
}

pub struct Demo {
    pub scene: BasicScene,
    pub hud: QuadHud,
    raise: ObjectId,
    lower: ObjectId,
    /// Indices into `scene.lights` that orbit the origin.
    orbiting: Vec<usize>,
}

impl Demo {
    /// Uploads the meshes and lays out the scene. Returns `None` when the ladder has no
    /// live strategy to upload into.
    pub fn build(ladder: &mut StrategyLadder<WgpuBackend>) -> Option<Self> {
        let floor = ladder.upload_mesh(&MeshData::plane(20.0))?;
        let cube = ladder.upload_mesh(&MeshData::cube())?;
        let sphere = ladder.upload_mesh(&MeshData::sphere(32, 16))?;

        let camera = Camera::new().at(0.0, 4.0, 10.0).looking_at(0.0, 0.5, 0.0);
        let mut scene = BasicScene::new(camera);

        scene.add(
            MeshInstance::new(floor, Transform::new().matrix())
                .with_material(Material::new([0.6, 0.6, 0.6, 1.0], [0.1, 0.1, 0.1, 1.0])),
        );
        for i in 0..5 {
            let angle = i as f32 / 5.0 * TAU;
            let position = Vec3::new(angle.cos() * 2.5, 0.5, angle.sin() * 2.5);
            let transform = Transform::from_position(position)
                .rotation(Quat::from_rotation_y(angle))
                .uniform_scale(0.5);
            scene.add(
                MeshInstance::new(cube, transform.matrix())
                    .with_material(Material::new([0.8, 0.3, 0.2, 1.0], [0.5, 0.5, 0.5, 1.0])),
            );
        }
        scene.add(
            MeshInstance::new(sphere, Transform::from_position(Vec3::new(0.0, 1.0, 0.0)).matrix())
                .with_material(Material::new([0.2, 0.4, 0.9, 1.0], [1.0, 1.0, 1.0, 1.0])),
        );

        scene.add_light(Light::new(Vec3::new(-2.0, 3.0, -6.0)));
        scene.add_light(Light::new(Vec3::new(ORBIT_RADIUS, 2.0, 0.0)).with_color(Vec3::new(1.0, 0.6, 0.3)));
        scene.add_light(Light::new(Vec3::new(-ORBIT_RADIUS, 2.0, 0.0)).with_color(Vec3::new(0.3, 0.6, 1.0)));

        let mut hud = QuadHud::new();
        let lower = hud.add(HudQuad::new(
            ScreenRect::new(-0.9, 0.9, 0.06, 0.06),
            [0.9, 0.2, 0.2, 0.8],
        ));
        let raise = hud.add(HudQuad::new(
            ScreenRect::new(-0.75, 0.9, 0.06, 0.06),
            [0.2, 0.9, 0.2, 0.8],
        ));

        Some(Self {
            scene,
            hud,
            raise,
            lower,
            orbiting: vec![1, 2],
        })
    }

    /// Moves the orbiting lights to their place at `seconds`.
    pub fn animate(&mut self, seconds: f32) {
        let count = self.orbiting.len().max(1) as f32;
        for (slot, &index) in self.orbiting.iter().enumerate() {
            let Some(light) = self.scene.lights.get_mut(index) else {
                continue;
            };
            let angle = seconds * 0.5 + slot as f32 / count * TAU;
            light.position = Vec3::new(angle.cos() * ORBIT_RADIUS, 2.0, angle.sin() * ORBIT_RADIUS);
        }
    }

    pub fn hud_action(&self, id: u32) -> Option<HudAction> {
        let id = ObjectId::from_raw(id)?;
        if id.is_none() {
            None
        } else if id == self.raise {
            Some(HudAction::Raise)
        } else if id == self.lower {
            Some(HudAction::Lower)
        } else {
            None
        }
    }

    /// Describes the scene object behind an id, for the log.
    pub fn describe(&self, id: u32) -> String {
        match ObjectId::from_raw(id).and_then(|id| self.scene.instance(id)) {
            Some(instance) => {
                let position = instance.transform.w_axis.truncate();
                format!("object {} at {:.2?}", id, position)
            }
            None => "nothing".to_string(),
        }
    }
}
