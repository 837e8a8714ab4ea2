fn main() -> Result<(), Box<dyn std::error::Error>> {
    if cfg!(feature = "grpc") {
        tonic_build::compile_protos("proto/health.proto")?;
    }
    Ok(())
}
