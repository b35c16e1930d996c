fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/kvraft.proto");

    // protox is a pure-Rust protobuf compiler, so building this crate never
    // requires a system `protoc` install.
    let fds = protox::compile(["proto/kvraft.proto"], ["proto/"])?;

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_fds(fds)?;

    Ok(())
}
