use std::sync::LazyLock;

use crate::build_info::BUILD_INFO;

/// Release tag, short commit and dirty marker of the running binary,
/// e.g. `v0.3.1+4f2a9c1-dirty`.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    render(
        env!("CONTROLLER_RELEASE"),
        BUILD_INFO.commit_sha1,
        BUILD_INFO.git_dirty == Some("true"),
    )
});

const SHORT_SHA_LEN: usize = 7;

fn render(release: &str, sha: Option<&str>, dirty: bool) -> String {
    let mut version = release.to_string();
    if let Some(sha) = sha.filter(|sha| !sha.is_empty()) {
        version.push('+');
        version.push_str(sha.get(..SHORT_SHA_LEN).unwrap_or(sha));
    }
    if dirty {
        version.push_str("-dirty");
    }
    version
}
