fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .build_transport(true)
        .compile_protos(&["proto/cluster.proto"], &["proto"])?;

    Ok(())
}
