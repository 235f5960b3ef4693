// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=RPI_VIDEO_VERSION");

    // Packaged builds set the version explicitly
    let version = if let Ok(v) = std::env::var("RPI_VIDEO_VERSION") {
        v
    } else {
        get_git_version()
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);

    // The VideoCore userland libraries live outside the default search path
    if std::env::var_os("CARGO_FEATURE_MMAL").is_some() {
        println!("cargo::rustc-link-search=native=/opt/vc/lib");
        for lib in ["bcm_host", "mmal_core", "mmal_util", "mmal_vc_client", "vcos"] {
            println!("cargo::rustc-link-lib={}", lib);
        }
    }
}

fn get_git_version() -> String {
    // "v0.1.0" at a tag, "v0.1.0-5-gabcdef1" after it
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output();

    let version = match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => get_commit_hash().unwrap_or_else(|| "unknown".to_string()),
    };

    version.strip_prefix('v').unwrap_or(&version).to_string()
}

fn get_commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
