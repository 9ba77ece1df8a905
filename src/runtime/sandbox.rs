use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::profile::IsolationProfile;
use crate::config::SandboxKind;

/// A fully rendered command line. Always executed with the project root as working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the rendered command actually enforces the profile.
    fn enforces_limits(&self) -> bool;

    fn render(&self, profile: &IsolationProfile, program: &Path, args: &[String]) -> CommandLine;
}

pub fn backend_for(kind: SandboxKind) -> Arc<dyn SandboxBackend> {
    match kind {
        SandboxKind::Firejail => Arc::new(Firejail::default()),
        SandboxKind::None => Arc::new(Unsandboxed),
    }
}

pub struct Firejail {
    binary: PathBuf,
}

impl Default for Firejail {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("firejail"),
        }
    }
}

impl SandboxBackend for Firejail {
    fn name(&self) -> &'static str {
        "firejail"
    }

    fn enforces_limits(&self) -> bool {
        true
    }

    fn render(&self, profile: &IsolationProfile, program: &Path, args: &[String]) -> CommandLine {
        let root = profile.root.display();
        let mut rendered = vec![
            "--quiet".to_string(),
            "--noprofile".to_string(),
            format!("--private={root}"),
            format!("--whitelist={root}"),
            format!("--read-only={}", profile.safeguard_path.display()),
            format!("--rlimit-as={}", profile.memory_bytes),
        ];
        if !profile.cpu_cores.is_empty() {
            let cores: Vec<String> = profile.cpu_cores.iter().map(u32::to_string).collect();
            rendered.push(format!("--cpu={}", cores.join(",")));
        }
        if !profile.network {
            rendered.push("--net=none".to_string());
        }
        rendered.extend(
            profile
                .deny
                .iter()
                .map(|path| format!("--blacklist={}", path.display())),
        );

        // Inside the jail the root is the home directory, so the interpreter is addressed relatively.
        let program = match program.strip_prefix(&profile.root) {
            Ok(relative) => Path::new(".").join(relative),
            Err(_) => program.to_path_buf(),
        };
        rendered.push(program.display().to_string());
        rendered.extend(args.iter().cloned());

        CommandLine {
            program: self.binary.clone(),
            args: rendered,
        }
    }
}

pub struct Unsandboxed;

impl SandboxBackend for Unsandboxed {
    fn name(&self) -> &'static str {
        "none"
    }

    fn enforces_limits(&self) -> bool {
        false
    }

    fn render(&self, _profile: &IsolationProfile, program: &Path, args: &[String]) -> CommandLine {
        CommandLine {
            program: program.to_path_buf(),
            args: args.to_vec(),
        }
    }
}
