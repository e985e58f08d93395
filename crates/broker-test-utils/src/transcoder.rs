//! Shell-script stand-ins for the transcoder binary.
//!
//! The pipeline spawns whatever `transcoder_bin` names and only observes the
//! process exiting, so a script that ignores its arguments is enough to
//! exercise every process-lifecycle path. Unix-only, like the CI targets.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A generated stub transcoder. The script lives in its own temp dir and is
/// deleted when this is dropped.
pub struct StubTranscoder {
    _dir: TempDir,
    path: PathBuf,
}

impl StubTranscoder {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A transcoder that runs until killed.
pub fn long_running() -> StubTranscoder {
    script("#!/bin/sh\nexec sleep 600\n")
}

/// A transcoder that exits successfully right away.
pub fn exits_immediately() -> StubTranscoder {
    script("#!/bin/sh\nexit 0\n")
}

/// A transcoder that exits successfully after roughly `ms` milliseconds.
pub fn exits_after_ms(ms: u64) -> StubTranscoder {
    let secs = ms as f64 / 1000.0;
    script(&format!("#!/bin/sh\nsleep {secs}\nexit 0\n"))
}

fn script(body: &str) -> StubTranscoder {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("stub-transcoder");
    fs::write(&path, body).expect("write stub script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("chmod stub script");
    StubTranscoder { _dir: dir, path }
}
