fn main() {
    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    // Regenerate the C header for hosts linking the cdylib/staticlib.
    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let config = cbindgen::Config::from_file(format!("{}/cbindgen.toml", crate_dir))
        .expect("failed to load cbindgen.toml");

    let out = std::path::Path::new(&crate_dir).join("wallet-bridge.h");

    cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_config(config)
        .generate()
        .expect("unable to generate bindings")
        .write_to_file(out);
}
