use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use cadenza_core::state::{Asset, BoxNode, Document, PropertyValue, Scene, SceneSettings};

fn work_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("cli_smoke").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cadenza(dir: &Path, args: &[&str]) -> Output {
    // Run inside `dir`, so the log file lands there too.
    Command::new(env!("CARGO_BIN_EXE_cadenza"))
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap()
}

fn sample() -> Document {
    let mut document = Document::new();
    let mut scene = Scene::new(SceneSettings {
        name: "Opening".to_owned(),
        ..SceneSettings::default()
    });
    let image = scene.push_box(BoxNode::new("image").with_asset(Asset {
        file_name: "cat.png".to_owned(),
        bytes: vec![1; 32],
    }));
    scene.push_box(
        BoxNode::new("follower").with_property("target", PropertyValue::Link(Some(image))),
    );
    document.push_scene(scene);
    document
}

#[test]
fn convert_then_info() {
    let dir = work_dir("convert");
    let binary = dir.join("in.cdz");
    let zipped = dir.join("out.cdx");
    let _ = std::fs::remove_file(&zipped);
    cadenza_core::io::save(&sample(), &binary, true).unwrap();

    let output = cadenza(
        &dir,
        &["convert", binary.to_str().unwrap(), zipped.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(zipped.is_file());

    let output = cadenza(&dir, &["info", zipped.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"Opening\""), "{stdout}");
    assert!(stdout.contains("[cat.png, 32 bytes]"), "{stdout}");
    assert!(stdout.contains("\"follower\": 1 properties, 1 links"), "{stdout}");
    assert!(stdout.contains("in 1 containers"), "{stdout}");
}

#[test]
fn rejects_bad_arguments() {
    let dir = work_dir("arguments");
    assert!(!cadenza(&dir, &["settings", "--sav"]).status.success());
    assert!(!cadenza(&dir, &["convert", "a.cdz", "b.cdx", "extra"]).status.success());
    assert!(!cadenza(&dir, &["info"]).status.success());
    assert!(!cadenza(&dir, &["info", "missing.cdz"]).status.success());
}
