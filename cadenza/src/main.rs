use anyhow::{Context, Result as AnyResult};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadenza_core::cache::{BoxRenderData, MemoryDataHandler, MemoryHandler};

mod settings;

/// Inspect and convert cadenza documents.
///
/// Documents are either binary (.cdz) or zipped XML (.cdx).
#[derive(Parser, Debug)]
#[command(name = "cadenza", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the bookmarks, scenes and boxes of a document.
    Info {
        /// Document to read.
        document: PathBuf,
    },
    /// Re-save a document, in the format named by the destination's extension.
    Convert {
        /// Document to read.
        from: PathBuf,
        /// Path to write to.
        to: PathBuf,
    },
    /// Print the current settings.
    Settings {
        /// Write them to the preferences directory as well.
        #[arg(long)]
        save: bool,
    },
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }

    let cli = Cli::parse();
    let settings = settings::Settings::load();
    match cli.cmd {
        Command::Info { document } => info(&document, &settings),
        Command::Convert { from, to } => convert(&from, &to, &settings),
        Command::Settings { save } => {
            if save {
                let path = settings.save().context("saving settings")?;
                println!("saved {}", path.display());
            } else {
                match settings::Settings::path() {
                    Some(path) => println!("# {}", path.display()),
                    None => println!("# no preferences directory"),
                }
                print!("{}", settings.to_toml()?);
            }
            Ok(())
        }
    }
}

/// Cache every embedded asset as the box's render data at its first frame. Returns how many were cached.
fn cache_assets(
    document: &mut cadenza_core::state::Document,
    handler: &Arc<MemoryDataHandler>,
) -> usize {
    let mut cached = 0;
    for scene in document.scenes_mut() {
        let assets: Vec<_> = scene
            .boxes()
            .iter()
            .filter_map(|node| Some((node.id(), node.asset.as_ref()?.bytes.clone())))
            .collect();
        for (id, bytes) in assets {
            if let Some(node) = scene.node_mut(id) {
                let render = BoxRenderData::new(handler, 0.0, bytes);
                node.render_data_mut().add_item_at_rel_frame(Arc::new(render));
                cached += 1;
            }
        }
    }
    cached
}

fn info(path: &Path, settings: &settings::Settings) -> AnyResult<()> {
    let mut document = cadenza_core::io::load(path)
        .with_context(|| format!("failed to open file {path:?}"))?;
    let memory = MemoryHandler::new(settings.memory.clone());
    let cached = cache_assets(&mut document, memory.data_handler());
    let format = cadenza_core::io::FileFormat::from_path(path)?;
    println!("{} ({format})", path.display());

    let colors: Vec<String> = document
        .color_bookmarks()
        .iter()
        .map(cadenza_core::color::Color::argb_name)
        .collect();
    println!("color bookmarks: {}", colors.join(" "));
    for brush in document.brush_bookmarks() {
        println!("brush bookmark: {}/{}", brush.collection, brush.name);
    }
    for scene in document.scenes() {
        let settings = scene.settings();
        println!(
            "scene {:?}: {}x{} @ {} fps, resolution {}, frames {}..={} at {}{}",
            settings.name,
            settings.width,
            settings.height,
            settings.fps,
            settings.resolution,
            settings.frame_range.min,
            settings.frame_range.max,
            settings.current_frame,
            if settings.clip_to_canvas {
                ", clipped"
            } else {
                ""
            },
        );
        for node in scene.boxes() {
            let asset = node
                .asset
                .as_ref()
                .map(|asset| format!(" [{}, {} bytes]", asset.file_name, asset.bytes.len()))
                .unwrap_or_default();
            println!(
                "    {:?}: {} properties, {} links{asset}",
                node.name,
                node.properties().len(),
                node.links().len()
            );
        }
    }
    println!(
        "asset cache: {} in {cached} containers, memory {} (checked every {} ms)",
        human_bytes::human_bytes(memory.data_handler().registered_bytes() as f64),
        memory.state(),
        memory.poll_interval().as_millis()
    );
    Ok(())
}

fn convert(from: &Path, to: &Path, settings: &settings::Settings) -> AnyResult<()> {
    let document = cadenza_core::io::load(from)
        .with_context(|| format!("failed to open file {from:?}"))?;
    // Wrap in a queue, so the document is tracked as saved to its new location.
    let queue = cadenza_core::queue::DocumentCommandQueue::from_state(document);
    cadenza_core::io::save(&queue.read(), to, settings.archive.compress)
        .with_context(|| format!("failed to save file {to:?}"))?;
    queue.mark_saved(to.to_owned());
    log::info!(
        "converted {} to {}",
        from.display(),
        queue.read().path.as_deref().unwrap_or(to).display()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::cache_assets;
    use cadenza_core::cache::{MemoryHandler, MemorySettings};
    use cadenza_core::state::{Asset, BoxNode, Document, Scene, SceneSettings};

    #[test]
    fn assets_are_cached() {
        let mut document = Document::new();
        let mut scene = Scene::new(SceneSettings::default());
        let image = scene.push_box(BoxNode::new("image").with_asset(Asset {
            file_name: "cat.png".to_owned(),
            bytes: vec![0; 24],
        }));
        scene.push_box(BoxNode::new("plain"));
        let scene = document.push_scene(scene);

        let mut memory = MemoryHandler::new(MemorySettings::default());
        assert_eq!(cache_assets(&mut document, memory.data_handler()), 1);
        assert_eq!(memory.data_handler().registered_bytes(), 24);
        let node = document.scene(scene).unwrap().node(image).unwrap();
        assert!(node.render_data().get_item_at_rel_frame(0.0).is_some());

        memory.clear_memory();
        assert_eq!(memory.data_handler().registered_bytes(), 0);
    }
}
