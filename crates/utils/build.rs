use std::env;

fn main() {
    if let Err(err) = emit_git_variables() {
        println!("cargo:warning=vergen: {err}");
    }

    let release = env::var("CONTROLLER_RELEASE").unwrap_or_else(|_| "dev".to_string());
    println!("cargo:rustc-env=CONTROLLER_RELEASE={release}");
    println!("cargo:rerun-if-env-changed=CONTROLLER_RELEASE");
}

// Only the commit hash and dirty flag end up in the version string.
fn emit_git_variables() -> anyhow::Result<()> {
    let git2 = vergen_git2::Git2Builder::default()
        .sha(true)
        .dirty(true)
        .build()?;

    vergen_git2::Emitter::default()
        .add_instructions(&git2)?
        .emit()
}
