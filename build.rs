use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

const STATIC_DIR: &str = "static";

fn main() {
    println!("cargo:rerun-if-changed={STATIC_DIR}/");

    let mut files: Vec<PathBuf> = fs::read_dir(STATIC_DIR)
        .map(|dir| {
            dir.filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .collect()
        })
        .unwrap_or_default();
    files.sort();

    let mut hasher = DefaultHasher::new();
    for path in &files {
        path.file_name().hash(&mut hasher);
        fs::read(path).unwrap_or_default().hash(&mut hasher);
    }

    let hash = format!("{:016x}", hasher.finish());
    println!("cargo:rustc-env=STATIC_HASH={}", &hash[..8]);
}
