use std::process::Command;

fn main() {
    // Rerun if environment variables change
    println!("cargo:rerun-if-env-changed=PACKAGE_VERSION");
    println!("cargo:rerun-if-env-changed=FILE_VERSION");

    let (package_version, file_version, build_info) = generate_version_info();

    println!("cargo:rustc-env=PACKAGE_VERSION={}", package_version);
    println!("cargo:rustc-env=FILE_VERSION={}", file_version);
    println!("cargo:rustc-env=BUILD_INFO={}", build_info);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}

fn generate_version_info() -> (String, String, String) {
    if let (Ok(pkg_ver), Ok(file_ver)) = (
        std::env::var("PACKAGE_VERSION"),
        std::env::var("FILE_VERSION"),
    ) {
        let build_info = format!("{}+ci", file_ver);
        return (pkg_ver, file_ver, build_info);
    }

    let base_version = get_tag_version().unwrap_or_else(|| "0.1.0".to_string());
    let commit_count = get_commit_count().unwrap_or(0);
    let commit_hash = get_commit_hash().unwrap_or_else(|| "unknown".to_string());
    let dirty_suffix = if is_dirty() { "-dirty" } else { "" };

    let package_version = base_version.clone();
    let file_version = format!("{}.{}", base_version, commit_count);
    let build_info = format!(
        "{}+build.{}.{}{}",
        base_version, commit_count, commit_hash, dirty_suffix
    );

    (package_version, file_version, build_info)
}

fn get_tag_version() -> Option<String> {
    Command::new("git")
        .args(["describe", "--tags", "--abbrev=0", "--match", "v[0-9]*"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
        .map(|s| s.trim().trim_start_matches('v').to_string())
}

fn get_commit_count() -> Option<u32> {
    Command::new("git")
        .args(["rev-list", "--count", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
        .and_then(|s| s.trim().parse().ok())
}

fn get_commit_hash() -> Option<String> {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
        .map(|s| s.trim().to_string())
}

fn is_dirty() -> bool {
    Command::new("git")
        .args(["diff", "--quiet"])
        .status()
        .map(|status| !status.success())
        .unwrap_or(false)
}
