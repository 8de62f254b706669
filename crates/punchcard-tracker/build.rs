use std::path::Path;
use std::{env, fs};

// Surfaces the workspace VERSION file as PUNCHCARD_VERSION at compile time.
fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR");
    let version_file = Path::new(&manifest_dir).join("..").join("..").join("VERSION");
    println!("cargo:rerun-if-changed={}", version_file.display());

    let contents = fs::read_to_string(&version_file)
        .unwrap_or_else(|error| panic!("cannot read {}: {error}", version_file.display()));
    let version = contents.trim();
    if version.is_empty() {
        panic!("{} holds no version", version_file.display());
    }

    println!("cargo:rustc-env=PUNCHCARD_VERSION={version}");
}
