use std::sync::LazyLock;

use crate::build_info::BUILD_INFO;

/// Defines the application version.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format_version(
        env!("IMAGE_VERSION"),
        BUILD_INFO.commit_sha1,
        BUILD_INFO.is_dirty(),
    )
});

fn format_version(image: &str, sha: Option<&str>, dirty: bool) -> String {
    format!(
        "{}-{}{}",
        image,
        sha.unwrap_or("unknown"),
        if dirty { "-dirty" } else { "" }
    )
}
