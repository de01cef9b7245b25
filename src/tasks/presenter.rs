use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PresenterSettings;
use crate::error::PresentationError;
use crate::events::{Eye, StereoImagePack};
use crate::geometry::PlaneGeometry;
use crate::material::MaterialLoader;
use crate::scene::{RenderEntity, SceneGraph, TextureFactory};

/// Bind a stereo pack to a fresh material and add one card to the scene.
///
/// Nothing reaches `scene` unless both eye parameters were bound.
pub fn present<L, F, S>(
    pack: &StereoImagePack,
    materials: &L,
    textures: &F,
    scene: &mut S,
    settings: &PresenterSettings,
) -> Result<PlaneGeometry, PresentationError>
where
    L: MaterialLoader,
    F: TextureFactory,
    S: SceneGraph<Texture = F::Texture>,
{
    let template = materials.load_template(&settings.material_path)?;
    let mut material = template.instantiate::<F::Texture>();

    for (eye, parameter) in [
        (Eye::Left, &settings.left_parameter),
        (Eye::Right, &settings.right_parameter),
    ] {
        let texture = textures.create_texture(eye, pack.eye(eye))?;
        material.set_parameter(parameter, texture)?;
    }
    let material = material.into_bound()?;

    let geometry = PlaneGeometry::for_bitmap(pack.left(), settings);
    let mesh = geometry.mesh().ok_or(PresentationError::EmptyPlane {
        width: pack.left().width,
        height: pack.left().height,
    })?;
    debug!(
        width = geometry.width,
        height = geometry.height,
        vertices = mesh.vertices.len(),
        "stereo plane built"
    );

    scene.add_entity(RenderEntity {
        pack_id: pack.id(),
        geometry,
        mesh,
        material,
    })?;
    info!(pack = %pack.id(), "stereo pair presented");
    Ok(geometry)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presentation {
    /// The pack was bound and added to the scene.
    Presented(PlaneGeometry),
    /// The pack is already on screen.
    Unchanged,
}

/// Presents each pack once; a different pack replaces the previous card.
#[derive(Debug, Default)]
pub struct StereoPresenter {
    presented: Option<Uuid>,
}

impl StereoPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> Option<Uuid> {
        self.presented
    }

    pub fn mount<L, F, S>(
        &mut self,
        pack: &StereoImagePack,
        materials: &L,
        textures: &F,
        scene: &mut S,
        settings: &PresenterSettings,
    ) -> Result<Presentation, PresentationError>
    where
        L: MaterialLoader,
        F: TextureFactory,
        S: SceneGraph<Texture = F::Texture>,
    {
        if self.presented == Some(pack.id()) {
            return Ok(Presentation::Unchanged);
        }
        if self.presented.take().is_some() {
            debug!(pack = %pack.id(), "replacing presented pack");
            scene.clear();
        }
        let geometry = present(pack, materials, textures, scene, settings)?;
        self.presented = Some(pack.id());
        Ok(Presentation::Presented(geometry))
    }

    /// Tear down whatever is on screen.
    pub fn unmount<S: SceneGraph>(&mut self, scene: &mut S) {
        if self.presented.take().is_some() {
            scene.clear();
        }
    }
}
