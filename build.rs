use std::env;
use std::fs;
use std::path::Path;

const CONFIG_FILE: &str = "config.toml";

fn main() {
    println!("cargo:rerun-if-changed={CONFIG_FILE}");

    let config_content =
        fs::read_to_string(Path::new(CONFIG_FILE)).expect("Failed to read config.toml");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let dest_path = Path::new(&out_dir).join("config_embedded.rs");

    fs::write(
        dest_path,
        format!("pub const DEFAULT_CONFIG: &str = r##\"{config_content}\"##;"),
    )
    .expect("Failed to write embedded config");
}
