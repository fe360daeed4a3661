use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WindowManifest {
    min_width: i32,
    min_height: i32,
    max_width: Option<i32>,
    max_height: Option<i32>,
    default_width: i32,
    default_height: i32,
    resizable: bool,
    draggable: bool,
    maximizable: bool,
    centered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppManifest {
    #[serde(skip_serializing)]
    schema_version: u32,
    app_id: String,
    display_name: String,
    icon: String,
    permissions: Vec<String>,
    team_scoped: bool,
    single_instance: bool,
    show_in_launcher: bool,
    show_on_desktop: bool,
    window: WindowManifest,
}

fn app_manifest_paths(root: &Path) -> Vec<PathBuf> {
    let dir = root.join("manifests");
    println!("cargo:rerun-if-changed={}", dir.display());
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", dir.display()))
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(".app.toml"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths
}

fn validate(path: &Path, manifest: &AppManifest) {
    if manifest.schema_version != 1 {
        panic!(
            "manifest schema mismatch in {}: expected 1 found {}",
            path.display(),
            manifest.schema_version
        );
    }
    let window = &manifest.window;
    if window.min_width <= 0 || window.min_height <= 0 {
        panic!("non-positive minimum size in {}", path.display());
    }
    if window.default_width < window.min_width || window.default_height < window.min_height {
        panic!("default size below minimum in {}", path.display());
    }
    if window.max_width.is_some_and(|max| max < window.min_width)
        || window.max_height.is_some_and(|max| max < window.min_height)
    {
        panic!("maximum size below minimum in {}", path.display());
    }
}

fn main() {
    let crate_root = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let mut manifests = Vec::<AppManifest>::new();

    for path in app_manifest_paths(&crate_root) {
        println!("cargo:rerun-if-changed={}", path.display());
        let raw = fs::read_to_string(&path)
            .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
        let manifest: AppManifest = toml::from_str(&raw)
            .unwrap_or_else(|err| panic!("failed to parse {}: {err}", path.display()));
        validate(&path, &manifest);
        if manifests.iter().any(|known| known.app_id == manifest.app_id) {
            panic!("duplicate app id `{}` in {}", manifest.app_id, path.display());
        }
        manifests.push(manifest);
    }

    manifests.sort_by(|a, b| a.app_id.cmp(&b.app_id));
    let json = serde_json::to_string_pretty(&manifests).expect("serialize app manifest catalog");
    let generated = format!(
        "/// Build-time generated app manifest catalog JSON.\n\
pub const APP_MANIFEST_CATALOG_JSON: &str = r##\"{}\"##;\n",
        json
    );

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR"));
    let out_file = out_dir.join("app_catalog_generated.rs");
    fs::write(&out_file, generated)
        .unwrap_or_else(|err| panic!("failed to write {}: {err}", out_file.display()));
}
