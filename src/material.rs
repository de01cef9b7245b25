//! Material templates loaded from an asset bundle and their texture parameters.
//!
//! A bundle is a directory holding `scene.yaml` plus the WGSL sources it names:
//!
//! ```yaml
//! materials:
//!   /Root/Material:
//!     shader: stereo.wgsl
//!     parameters:
//!       - { name: LeftEye, binding: 2 }
//!       - { name: RightEye, binding: 3 }
//! ```
//!
//! Binding 0 (view uniforms) and binding 1 (sampler) belong to the renderer.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::PresentationError;

pub const MANIFEST_FILE: &str = "scene.yaml";
pub const FIRST_TEXTURE_BINDING: u32 = 2;

const EMBEDDED_MANIFEST: &str = include_str!("../assets/scene/scene.yaml");
const EMBEDDED_SHADERS: &[(&str, &str)] =
    &[("stereo.wgsl", include_str!("../assets/scene/stereo.wgsl"))];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SceneManifest {
    materials: BTreeMap<String, MaterialEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct MaterialEntry {
    shader: String,
    #[serde(default)]
    parameters: Vec<ParameterSlot>,
}

/// A named texture slot declared by a template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ParameterSlot {
    pub name: String,
    pub binding: u32,
}

/// Resolves material templates by path.
pub trait MaterialLoader {
    fn load_template(&self, path: &str) -> Result<MaterialTemplate, PresentationError>;
}

#[derive(Debug, Clone)]
pub struct MaterialTemplate {
    path: String,
    shader_source: Arc<str>,
    parameters: Vec<ParameterSlot>,
}

impl MaterialTemplate {
    pub fn new(
        path: impl Into<String>,
        shader_source: impl Into<Arc<str>>,
        parameters: Vec<ParameterSlot>,
    ) -> Result<Self, PresentationError> {
        let path = path.into();
        let mut names = BTreeSet::new();
        let mut bindings = BTreeSet::new();
        for slot in &parameters {
            if slot.name.is_empty() {
                return Err(PresentationError::asset(&path, "parameter with an empty name"));
            }
            if !names.insert(slot.name.as_str()) {
                return Err(PresentationError::asset(
                    &path,
                    format!("parameter '{}' declared twice", slot.name),
                ));
            }
            if slot.binding < FIRST_TEXTURE_BINDING {
                return Err(PresentationError::asset(
                    &path,
                    format!(
                        "parameter '{}' uses reserved binding {}",
                        slot.name, slot.binding
                    ),
                ));
            }
            if !bindings.insert(slot.binding) {
                return Err(PresentationError::asset(
                    &path,
                    format!("binding {} declared twice", slot.binding),
                ));
            }
        }
        Ok(Self {
            path,
            shader_source: shader_source.into(),
            parameters,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn shader_source(&self) -> &str {
        &self.shader_source
    }

    pub fn parameters(&self) -> &[ParameterSlot] {
        &self.parameters
    }

    /// Fresh instance with every parameter unset.
    pub fn instantiate<T>(&self) -> StereoMaterial<T> {
        StereoMaterial {
            template: self.clone(),
            values: self.parameters.iter().map(|_| None).collect(),
        }
    }
}

/// A template instance whose texture parameters are being filled in.
#[derive(Debug)]
pub struct StereoMaterial<T> {
    template: MaterialTemplate,
    values: Vec<Option<T>>,
}

impl<T> StereoMaterial<T> {
    pub fn template(&self) -> &MaterialTemplate {
        &self.template
    }

    /// Set a declared parameter. Names are matched exactly, case included.
    pub fn set_parameter(&mut self, name: &str, value: T) -> Result<(), PresentationError> {
        let index = self
            .template
            .parameters
            .iter()
            .position(|slot| slot.name == name)
            .ok_or_else(|| PresentationError::Parameter {
                name: name.to_string(),
                reason: format!("not declared by template '{}'", self.template.path),
            })?;
        self.values[index] = Some(value);
        debug!(parameter = name, template = %self.template.path, "material parameter set");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn is_set(&self, name: &str) -> bool {
        self.template
            .parameters
            .iter()
            .zip(&self.values)
            .any(|(slot, value)| slot.name == name && value.is_some())
    }

    /// Freeze the material; fails while any declared parameter is unset.
    pub fn into_bound(self) -> Result<BoundMaterial<T>, PresentationError> {
        let StereoMaterial { template, values } = self;
        let mut textures = Vec::with_capacity(values.len());
        for (slot, value) in template.parameters.iter().zip(values) {
            match value {
                Some(texture) => textures.push(texture),
                None => {
                    return Err(PresentationError::Parameter {
                        name: slot.name.clone(),
                        reason: "left unset".to_string(),
                    });
                }
            }
        }
        Ok(BoundMaterial { template, textures })
    }
}

/// A material with every declared parameter holding a texture.
#[derive(Debug)]
pub struct BoundMaterial<T> {
    template: MaterialTemplate,
    textures: Vec<T>,
}

impl<T> BoundMaterial<T> {
    pub fn template(&self) -> &MaterialTemplate {
        &self.template
    }

    pub fn textures(&self) -> impl Iterator<Item = (&ParameterSlot, &T)> {
        self.template.parameters.iter().zip(&self.textures)
    }

    /// Textures in declaration order, consuming the material.
    pub fn into_textures(self) -> Vec<T> {
        self.textures
    }

    pub fn texture(&self, name: &str) -> Option<&T> {
        self.textures()
            .find(|(slot, _)| slot.name == name)
            .map(|(_, texture)| texture)
    }
}

/// Where templates come from: the bundle compiled into the binary or a directory.
#[derive(Debug, Clone)]
pub enum AssetBundle {
    Embedded,
    Directory(PathBuf),
}

impl AssetBundle {
    pub fn from_config(path: Option<&Path>) -> Self {
        match path {
            Some(dir) => AssetBundle::Directory(dir.to_path_buf()),
            None => AssetBundle::Embedded,
        }
    }

    fn manifest(&self, template: &str) -> Result<SceneManifest, PresentationError> {
        let text = match self {
            AssetBundle::Embedded => EMBEDDED_MANIFEST.to_string(),
            AssetBundle::Directory(dir) => {
                let path = dir.join(MANIFEST_FILE);
                std::fs::read_to_string(&path).map_err(|err| {
                    PresentationError::asset(template, format!("{}: {err}", path.display()))
                })?
            }
        };
        serde_yaml::from_str(&text)
            .map_err(|err| PresentationError::asset(template, format!("{MANIFEST_FILE}: {err}")))
    }

    fn shader(&self, template: &str, file: &str) -> Result<String, PresentationError> {
        match self {
            AssetBundle::Embedded => EMBEDDED_SHADERS
                .iter()
                .find(|(name, _)| *name == file)
                .map(|(_, source)| source.to_string())
                .ok_or_else(|| {
                    PresentationError::asset(template, format!("no embedded shader '{file}'"))
                }),
            AssetBundle::Directory(dir) => {
                let path = dir.join(file);
                std::fs::read_to_string(&path).map_err(|err| {
                    PresentationError::asset(template, format!("{}: {err}", path.display()))
                })
            }
        }
    }
}

impl MaterialLoader for AssetBundle {
    fn load_template(&self, path: &str) -> Result<MaterialTemplate, PresentationError> {
        let mut manifest = self.manifest(path)?;
        let entry = manifest
            .materials
            .remove(path)
            .ok_or_else(|| PresentationError::asset(path, "not present in the bundle"))?;
        let source = self.shader(path, &entry.shader)?;
        if source.trim().is_empty() {
            return Err(PresentationError::asset(path, format!("shader '{}' is empty", entry.shader)));
        }
        let template = MaterialTemplate::new(path, source, entry.parameters)?;
        info!(
            template = path,
            shader = %entry.shader,
            parameters = template.parameters().len(),
            "material template loaded"
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(name: &str, binding: u32) -> ParameterSlot {
        ParameterSlot {
            name: name.to_string(),
            binding,
        }
    }

    #[test]
    fn embedded_bundle_declares_both_eyes() {
        let template = AssetBundle::Embedded.load_template("/Root/Material").unwrap();
        let names: Vec<_> = template.parameters().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["LeftEye", "RightEye"]);
        assert!(template.shader_source().contains("fs_main"));
    }

    #[test]
    fn unknown_template_is_an_asset_failure() {
        let err = AssetBundle::Embedded.load_template("/Root/Missing").unwrap_err();
        assert!(matches!(err, PresentationError::AssetLoad { .. }));
    }

    #[test]
    fn parameter_names_are_case_sensitive() {
        let template =
            MaterialTemplate::new("/t", "src", vec![slot("LeftEye", 2), slot("RightEye", 3)])
                .unwrap();
        let mut material = template.instantiate::<u8>();
        assert!(material.set_parameter("lefteye", 1).is_err());
        material.set_parameter("LeftEye", 1).unwrap();
        assert!(material.is_set("LeftEye"));
        assert!(!material.is_set("RightEye"));
    }

    #[test]
    fn binding_requires_every_parameter() {
        let template =
            MaterialTemplate::new("/t", "src", vec![slot("LeftEye", 2), slot("RightEye", 3)])
                .unwrap();
        let mut material = template.instantiate::<&str>();
        material.set_parameter("LeftEye", "l").unwrap();
        let err = material.into_bound().unwrap_err();
        assert!(matches!(err, PresentationError::Parameter { ref name, .. } if name == "RightEye"));

        let mut material = template.instantiate::<&str>();
        material.set_parameter("RightEye", "r").unwrap();
        material.set_parameter("LeftEye", "l").unwrap();
        let bound = material.into_bound().unwrap();
        assert_eq!(bound.texture("LeftEye"), Some(&"l"));
        assert_eq!(bound.texture("RightEye"), Some(&"r"));
    }

    #[test]
    fn rejects_duplicate_and_reserved_bindings() {
        assert!(MaterialTemplate::new("/t", "src", vec![slot("A", 2), slot("A", 3)]).is_err());
        assert!(MaterialTemplate::new("/t", "src", vec![slot("A", 2), slot("B", 2)]).is_err());
        assert!(MaterialTemplate::new("/t", "src", vec![slot("A", 1)]).is_err());
    }
}
