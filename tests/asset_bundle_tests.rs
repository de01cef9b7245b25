use std::fs;

use stereo_viewer::error::PresentationError;
use stereo_viewer::material::{AssetBundle, MaterialLoader};
use tempfile::tempdir;

const MANIFEST: &str = r#"
materials:
  /Root/Material:
    shader: card.wgsl
    parameters:
      - { name: LeftEye, binding: 2 }
      - { name: RightEye, binding: 3 }
"#;

#[test]
fn directory_bundle_loads_named_template() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("scene.yaml"), MANIFEST).unwrap();
    fs::write(tmp.path().join("card.wgsl"), "@fragment fn fs_main() {}").unwrap();

    let bundle = AssetBundle::from_config(Some(tmp.path()));
    let template = bundle.load_template("/Root/Material").unwrap();
    assert_eq!(template.path(), "/Root/Material");
    assert_eq!(template.parameters().len(), 2);
    assert_eq!(template.parameters()[1].binding, 3);
    assert!(template.shader_source().contains("fs_main"));
}

#[test]
fn missing_manifest_is_an_asset_failure() {
    let tmp = tempdir().unwrap();
    let err = AssetBundle::Directory(tmp.path().to_path_buf())
        .load_template("/Root/Material")
        .unwrap_err();
    assert!(matches!(err, PresentationError::AssetLoad { ref path, .. } if path == "/Root/Material"));
}

#[test]
fn unknown_material_path_is_an_asset_failure() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("scene.yaml"), MANIFEST).unwrap();
    fs::write(tmp.path().join("card.wgsl"), "// card").unwrap();
    let err = AssetBundle::Directory(tmp.path().to_path_buf())
        .load_template("/Root/Other")
        .unwrap_err();
    assert!(matches!(err, PresentationError::AssetLoad { .. }));
}

#[test]
fn missing_or_empty_shader_is_an_asset_failure() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("scene.yaml"), MANIFEST).unwrap();
    let bundle = AssetBundle::Directory(tmp.path().to_path_buf());
    assert!(bundle.load_template("/Root/Material").is_err());

    fs::write(tmp.path().join("card.wgsl"), "   \n").unwrap();
    assert!(bundle.load_template("/Root/Material").is_err());
}

#[test]
fn duplicate_binding_is_an_asset_failure() {
    let tmp = tempdir().unwrap();
    let manifest = MANIFEST.replace("binding: 3", "binding: 2");
    fs::write(tmp.path().join("scene.yaml"), manifest).unwrap();
    fs::write(tmp.path().join("card.wgsl"), "// card").unwrap();
    let err = AssetBundle::Directory(tmp.path().to_path_buf())
        .load_template("/Root/Material")
        .unwrap_err();
    assert!(matches!(err, PresentationError::AssetLoad { .. }));
}
