fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure().compile_protos(
        &[
            "proto/registry.proto",
            "proto/user.proto",
            "proto/expense.proto",
        ],
        &["proto"],
    )?;
    Ok(())
}
