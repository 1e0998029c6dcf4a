use std::env::var;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // List of proto files containing a message definition
    let proto_files = &["proto/odoc/doc.proto", "proto/odoc/note.proto"];

    // Name of the folder containing the proto definitions
    let proto_folder = "proto";
    let out_dir = PathBuf::from(var("OUT_DIR")?);

    for file in proto_files {
        println!("cargo:rerun-if-changed={file}");
    }

    // Source info must be kept: field comments carry `@validate` rules.
    let mut compiler = protox::Compiler::new([proto_folder])?;
    compiler
        .include_imports(true)
        .include_source_info(true)
        .open_files(proto_files)?;

    std::fs::write(
        out_dir.join("descriptors.bin"),
        compiler.encode_file_descriptor_set(),
    )?;

    Ok(())
}
