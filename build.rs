use std::process::Command;

fn main() {
    // Prefer git; release images pass WHAM_GIT_SHA instead.
    let git_sha = std::env::var("WHAM_GIT_SHA")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=WHAM_GIT_SHA={git_sha}");
    println!("cargo:rerun-if-env-changed=WHAM_GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
