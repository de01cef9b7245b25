use uuid::Uuid;

use crate::error::PresentationError;
use crate::events::{Bitmap, Eye};
use crate::geometry::{PlaneGeometry, PlaneMesh};
use crate::material::BoundMaterial;

/// Converts a decoded bitmap into something a material can sample.
pub trait TextureFactory {
    type Texture;

    fn create_texture(&self, eye: Eye, bitmap: &Bitmap) -> Result<Self::Texture, PresentationError>;
}

/// Geometry plus a fully bound material, ready to draw.
#[derive(Debug)]
pub struct RenderEntity<T> {
    pub pack_id: Uuid,
    pub geometry: PlaneGeometry,
    pub mesh: PlaneMesh,
    pub material: BoundMaterial<T>,
}

/// Receives renderable entities for stereo display.
pub trait SceneGraph {
    type Texture;

    /// Take ownership of `entity`. Fails when the entity's material cannot be
    /// turned into something drawable (for example a shader the backend rejects).
    fn add_entity(&mut self, entity: RenderEntity<Self::Texture>) -> Result<(), PresentationError>;

    /// Drop every entity previously added.
    fn clear(&mut self);
}
