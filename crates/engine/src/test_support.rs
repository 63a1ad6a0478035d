// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell-script plugins for tests.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::registry::{PluginEntry, Registry};

/// A temporary directory of plugin executables.
pub(crate) struct PluginDir {
    dir: TempDir,
}

impl PluginDir {
    pub(crate) fn new() -> Self {
        Self { dir: tempfile::tempdir().unwrap() }
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write an executable `/bin/sh` script. `body` sees the operation in `$1`.
    pub(crate) fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub(crate) fn entry(&self, name: &str) -> PluginEntry {
        PluginEntry { name: name.to_string(), path: self.dir.path().join(name), info: None }
    }

    pub(crate) fn registry(&self) -> Registry {
        Registry::build(&BTreeMap::new(), &[self.dir.path().to_path_buf()]).unwrap()
    }
}

/// Extract `"dir":"..."` from the endpoint without a JSON parser.
pub(crate) const ENDPOINT_DIR: &str =
    r#"dir=$(printf '%s' "$SHIELD_ENDPOINT" | sed -n 's/.*"dir":"\([^"]*\)".*/\1/p')"#;

/// Target plugin: `backup` streams `$dir/source`, `restore` writes `$dir/restored`.
pub(crate) fn file_target() -> String {
    format!(
        r#"{ENDPOINT_DIR}
case "$1" in
  meta) echo '{{"name":"files","author":"t","version":"1","features":{{"target":"yes","store":"no"}}}}' ;;
  validate) [ -n "$dir" ] || {{ echo "dir: required" >&2; exit 3; }} ;;
  backup) exec cat "$dir/source" ;;
  restore) exec cat > "$dir/restored" ;;
  *) exit 10 ;;
esac"#
    )
}

/// Store plugin keyed by the byte count of what it stored.
pub(crate) fn counting_store() -> String {
    format!(
        r#"{ENDPOINT_DIR}
case "$1" in
  meta) echo '{{"name":"count","author":"t","version":"1","features":{{"target":"no","store":"yes"}}}}' ;;
  validate) [ -n "$dir" ] || {{ echo "dir: required" >&2; exit 3; }} ;;
  store)
    cat > "$dir/incoming" || exit 1
    n=$(wc -c < "$dir/incoming" | tr -d ' ')
    mv "$dir/incoming" "$dir/$n"
    echo "stored $n bytes" >&2
    echo "$n"
    ;;
  retrieve) exec cat "$dir/$SHIELD_RESTORE_KEY" ;;
  purge) rm -f "$dir/$SHIELD_RESTORE_KEY" ;;
  *) exit 10 ;;
esac"#
    )
}

pub(crate) fn endpoint(dir: &Path) -> String {
    format!(r#"{{"dir":"{}"}}"#, dir.display())
}
