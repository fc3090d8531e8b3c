//! Embeds git and toolchain details behind `parl-pipeline --version`.

use shadow_rs::{BuildPattern, SdResult, ShadowBuilder};

fn main() -> SdResult<()> {
    // Migrations and config files do not change the version banner
    let pattern = BuildPattern::Custom {
        if_path_changed: vec!["Cargo.toml".into(), "src".into(), ".git/HEAD".into()],
        if_env_changed: Vec::new(),
    };

    ShadowBuilder::builder().build_pattern(pattern).build()?;
    Ok(())
}
