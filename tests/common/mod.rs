//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use attest_build::network::Connectivity;
use attest_build::process::{Invocation, ProcessLauncher};

type SideEffect = Box<dyn FnMut(&Invocation)>;

/// Records every invocation and replays scripted exit codes (default 0)
#[derive(Default)]
pub struct RecordingLauncher {
    pub calls: Vec<Invocation>,
    exits: VecDeque<io::Result<Option<i32>>>,
    side_effect: Option<SideEffect>,
}

impl RecordingLauncher {
    pub fn new(exits: impl IntoIterator<Item = Option<i32>>) -> Self {
        Self {
            exits: exits.into_iter().map(Ok).collect(),
            ..Default::default()
        }
    }

    /// Run `effect` for every invocation, before its exit code is returned
    pub fn with_side_effect(mut self, effect: impl FnMut(&Invocation) + 'static) -> Self {
        self.side_effect = Some(Box::new(effect));
        self
    }

    /// Invocations whose arguments start with `first`
    pub fn calls_starting_with(&self, first: &str) -> Vec<&Invocation> {
        self.calls
            .iter()
            .filter(|c| c.args.first().map(String::as_str) == Some(first))
            .collect()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn run(&mut self, invocation: &Invocation) -> io::Result<Option<i32>> {
        self.calls.push(invocation.clone());
        if let Some(effect) = self.side_effect.as_mut() {
            effect(invocation);
        }
        self.exits.pop_front().unwrap_or(Ok(Some(0)))
    }
}

/// Connectivity stub that counts probes
#[derive(Clone)]
pub struct CountingProbe {
    pub reachable: bool,
    pub probes: Arc<AtomicUsize>,
}

impl CountingProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable,
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Connectivity for CountingProbe {
    fn is_reachable(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }
}

/// Create an empty executable named `tool` in `dir`
#[cfg(unix)]
pub fn fake_tool(dir: &Path, tool: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir).unwrap();
    let path = dir.join(tool);
    fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
