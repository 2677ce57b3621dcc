use std::path::Path;
use std::process::Command;

fn main() {
    watch_git_head();

    if let Some(revision) = git_revision() {
        println!("cargo:rustc-env=NETPULSE_BUILD_GIT_HASH={}", revision);
    }
}

/// Rebuild when the checked-out commit moves, not only when sources change.
fn watch_git_head() {
    let head = Path::new(".git").join("HEAD");
    if !head.exists() {
        return;
    }
    println!("cargo:rerun-if-changed={}", head.display());

    let Ok(contents) = std::fs::read_to_string(&head) else { return };
    if let Some(reference) = contents.trim().strip_prefix("ref: ") {
        println!("cargo:rerun-if-changed=.git/{}", reference);
    }
    println!("cargo:rerun-if-changed=src");
}

/// Short hash of HEAD, suffixed with `-dirty` when the work tree has
/// uncommitted changes. `None` outside a git checkout.
fn git_revision() -> Option<String> {
    let hash = git(&["rev-parse", "--short=10", "HEAD"])?;
    if hash.is_empty() {
        return None;
    }

    let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
        .is_some_and(|status| !status.is_empty());

    Some(if dirty { format!("{}-dirty", hash) } else { hash })
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
