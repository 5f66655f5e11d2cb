use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/types.rs");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };

    let generated = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("GATEWAY_FFI_H")
        .with_cpp_compat(true)
        .generate();

    match generated {
        Ok(bindings) => {
            bindings.write_to_file(crate_dir.join("include").join("gateway_ffi.h"));
        }
        Err(err) => println!("cargo:warning=skipping gateway_ffi.h: {err}"),
    }
}
