//! Build script for compiling the service protobuf definitions.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/flightpoll.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/flightpoll.proto");
    Ok(())
}
