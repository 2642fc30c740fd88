//! Line-oriented terminal prompts
//!
//! Every menu accepts `Q` to abort; free-text prompts accept `quit` or
//! `exit`. End of input is treated as an abort.
//!
//! Typed paths are expanded the same way everywhere: a leading `~` is the
//! operator's home directory and relative paths are taken from the directory
//! the command was started in.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use super::{CommandInput, Decision, DecisionProvider, ToolRemedy};
use crate::build::config::{BackendKind, BuildConfiguration, BuildVariant, CompilerFamily};
use crate::build::state::BuildAttempt;
use crate::process::RemediationAction;

/// Answer to a free-text prompt
#[derive(Debug, Clone, PartialEq, Eq)]
enum TextAnswer {
    Text(String),
    Empty,
    Quit,
}

pub struct TerminalDecisions<R, W> {
    input: R,
    output: W,
    base_dir: PathBuf,
    home: Option<PathBuf>,
}

impl<R: BufRead, W: Write> TerminalDecisions<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            base_dir: std::env::current_dir().unwrap_or_default(),
            home: directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()),
        }
    }

    /// Directory that relative answers are resolved against
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, line: &str) {
        let _ = writeln!(self.output, "{}", line);
    }

    fn prompt(&mut self, text: &str) -> Option<String> {
        let _ = write!(self.output, "{}", text);
        let _ = self.output.flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    /// Single-letter menu; `None` means quit
    fn choose(&mut self, question: &str, options: &[(char, &str)], default: Option<char>) -> Option<char> {
        let menu = options
            .iter()
            .map(|(key, label)| format!("[{}]{}", key, label))
            .collect::<Vec<_>>()
            .join(" / ");
        let suffix = match default {
            Some(key) => format!(" (default {}, Q to quit): ", key),
            None => " (Q to quit): ".to_string(),
        };

        loop {
            let answer = self.prompt(&format!("{} {}{}", question, menu, suffix))?;
            if answer.is_empty() {
                if default.is_some() {
                    return default;
                }
                continue;
            }
            if answer.eq_ignore_ascii_case("q") {
                return None;
            }
            let picked = options.iter().find(|(key, label)| {
                answer.eq_ignore_ascii_case(&key.to_string())
                    || answer.eq_ignore_ascii_case(&format!("{}{}", key, label))
            });
            match picked {
                Some((key, _)) => return Some(*key),
                None => self.say(&format!("Invalid choice '{}'", answer)),
            }
        }
    }

    fn text(&mut self, question: &str) -> TextAnswer {
        match self.prompt(question) {
            None => TextAnswer::Quit,
            Some(answer) if answer.is_empty() => TextAnswer::Empty,
            Some(answer)
                if answer.eq_ignore_ascii_case("quit") || answer.eq_ignore_ascii_case("exit") =>
            {
                TextAnswer::Quit
            }
            Some(answer) => TextAnswer::Text(answer),
        }
    }

    /// Absolute path for a typed answer
    fn typed_path(&self, answer: &str) -> PathBuf {
        let expanded = match (answer.strip_prefix('~'), &self.home) {
            (Some(""), Some(home)) => home.clone(),
            (Some(rest), Some(home)) if rest.starts_with('/') => home.join(rest.trim_start_matches('/')),
            _ => PathBuf::from(answer),
        };
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }

    fn yes_no(&mut self, question: &str) -> Option<bool> {
        match self.choose(question, &[('Y', "es"), ('N', "o")], None)? {
            'Y' => Some(true),
            _ => Some(false),
        }
    }
}

fn key_of(config_value: &str) -> char {
    config_value
        .chars()
        .next()
        .map_or('?', |c| c.to_ascii_uppercase())
}

impl<R: BufRead, W: Write> DecisionProvider for TerminalDecisions<R, W> {
    fn select_configuration(&mut self, defaults: &BuildConfiguration) -> Option<BuildConfiguration> {
        let variant = match self.choose(
            "Build variant",
            &[('D', "ebug"), ('R', "elease")],
            Some(key_of(defaults.variant.as_str())),
        )? {
            'D' => BuildVariant::Debug,
            _ => BuildVariant::Release,
        };

        let compiler_default = match defaults.compiler {
            CompilerFamily::Gcc => 'G',
            CompilerFamily::Clang => 'C',
        };
        let compiler = match self.choose(
            "Compiler",
            &[('G', "CC"), ('C', "lang")],
            Some(compiler_default),
        )? {
            'C' => CompilerFamily::Clang,
            _ => CompilerFamily::Gcc,
        };

        let backend = match self.choose(
            "Build backend",
            &[('C', "Make"), ('M', "ake")],
            Some(key_of(defaults.backend.as_str())),
        )? {
            'M' => BackendKind::Make,
            _ => BackendKind::CMake,
        };

        Some(BuildConfiguration::new(variant, compiler, backend))
    }

    fn confirm_configuration(&mut self, config: &BuildConfiguration) -> Option<bool> {
        self.say(&format!("Configuration: {}", config));
        self.yes_no("Proceed with this configuration?")
    }

    fn locate_build_dir(&mut self, build_file: &str, tried: &Path) -> Option<PathBuf> {
        self.say(&format!("{} not found in {}", build_file, tried.display()));
        loop {
            match self.text(&format!("Directory containing {} (quit to abort): ", build_file)) {
                TextAnswer::Text(dir) => return Some(self.typed_path(&dir)),
                TextAnswer::Empty => continue,
                TextAnswer::Quit => return None,
            }
        }
    }

    fn tool_remedy(&mut self, tool: &str) -> ToolRemedy {
        loop {
            let choice = self.choose(
                &format!("'{}' is required.", tool),
                &[('I', "nstall with a command"), ('P', "ath to executable")],
                None,
            );
            match choice {
                None => return ToolRemedy::Abort,
                Some('I') => return ToolRemedy::Install,
                Some(_) => match self.text(&format!("Path to {} executable: ", tool)) {
                    TextAnswer::Text(path) => return ToolRemedy::ManualPath(self.typed_path(&path)),
                    TextAnswer::Empty => continue,
                    TextAnswer::Quit => return ToolRemedy::Abort,
                },
            }
        }
    }

    fn install_command(&mut self, tool: &str, network_reachable: bool) -> CommandInput {
        if !network_reachable {
            self.say("The network looks unreachable; the command may fail.");
        }
        match self.text(&format!("Command to install {} (empty to go back): ", tool)) {
            TextAnswer::Text(command) => CommandInput::Command(command),
            TextAnswer::Empty => CommandInput::Back,
            TextAnswer::Quit => CommandInput::Abort,
        }
    }

    fn on_build_failure(&mut self, attempt: &BuildAttempt) -> Decision {
        let detail = attempt
            .failure
            .as_ref()
            .map(|f| f.classified())
            .unwrap_or_else(|| "unknown failure".to_string());
        self.say(&format!("Build attempt {} failed: {}", attempt.ordinal, detail));

        loop {
            let choice = self.choose(
                "Next step:",
                &[
                    ('R', "etry"),
                    ('S', "et environment variable"),
                    ('C', "ommand"),
                ],
                None,
            );
            match choice {
                None => return Decision::Abort,
                Some('R') => return Decision::Retry,
                Some('S') => {
                    let name = match self.text("Variable name: ") {
                        TextAnswer::Text(name) => name,
                        TextAnswer::Empty => continue,
                        TextAnswer::Quit => return Decision::Abort,
                    };
                    let value = loop {
                        match self.text(&format!("Value for {}: ", name)) {
                            TextAnswer::Text(value) => break value,
                            TextAnswer::Empty => self.say("No value entered."),
                            TextAnswer::Quit => return Decision::Abort,
                        }
                    };
                    return Decision::SetOverride { name, value };
                }
                Some(_) => match self.text("Command to run (empty to go back): ") {
                    TextAnswer::Text(command) => {
                        return Decision::RunCommand(RemediationAction::new(command))
                    }
                    TextAnswer::Empty => continue,
                    TextAnswer::Quit => return Decision::Abort,
                },
            }
        }
    }

    fn confirm_verification(&mut self) -> bool {
        self.yes_no("Verify the artifact against the signed manifests?")
            .unwrap_or(false)
    }

    fn trust_anchor_path(&mut self, missing: &Path) -> Option<PathBuf> {
        self.say(&format!("Public key not found at {}", missing.display()));
        loop {
            match self.text("Path to the public key (quit to fail verification): ") {
                TextAnswer::Text(path) => return Some(self.typed_path(&path)),
                TextAnswer::Empty => continue,
                TextAnswer::Quit => return None,
            }
        }
    }

    fn warn(&mut self, message: &str) {
        self.say(&format!("warning: {}", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::state::AttemptOutcome;
    use crate::error::AttestError;
    use chrono::Utc;
    use std::io::Cursor;

    fn terminal(input: &str) -> TerminalDecisions<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalDecisions::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn failed_attempt() -> BuildAttempt {
        let now = Utc::now();
        BuildAttempt {
            ordinal: 1,
            outcome: AttemptOutcome::Failed,
            failure: Some(AttestError::BuildBackendFailed {
                exit_code: Some(2),
                detail: "make exited with exit code 2".to_string(),
            }),
            failed_step: Some("build".to_string()),
            override_keys: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_select_configuration_with_defaults() {
        let mut t = terminal("\n\n\n");
        let chosen = t.select_configuration(&BuildConfiguration::default()).unwrap();
        assert_eq!(chosen, BuildConfiguration::default());
    }

    #[test]
    fn test_select_configuration_explicit() {
        let mut t = terminal("d\nx\nc\nm\n");
        let chosen = t.select_configuration(&BuildConfiguration::default()).unwrap();
        assert_eq!(
            chosen,
            BuildConfiguration::new(BuildVariant::Debug, CompilerFamily::Clang, BackendKind::Make)
        );
        let output = String::from_utf8(t.into_output()).unwrap();
        assert!(output.contains("Invalid choice 'x'"));
    }

    #[test]
    fn test_quit_aborts_configuration() {
        let mut t = terminal("Q\n");
        assert_eq!(t.select_configuration(&BuildConfiguration::default()), None);
    }

    #[test]
    fn test_eof_is_abort() {
        let mut t = terminal("");
        assert_eq!(t.tool_remedy("cmake"), ToolRemedy::Abort);
        assert!(!t.confirm_verification());
    }

    #[test]
    fn test_tool_remedy_manual_path() {
        let mut t = terminal("p\n\np\n/opt/cmake/bin/cmake\n");
        assert_eq!(
            t.tool_remedy("cmake"),
            ToolRemedy::ManualPath(PathBuf::from("/opt/cmake/bin/cmake"))
        );
    }

    #[test]
    fn test_install_command_inputs() {
        assert_eq!(
            terminal("brew install cmake\n").install_command("cmake", true),
            CommandInput::Command("brew install cmake".to_string())
        );
        assert_eq!(terminal("\n").install_command("cmake", true), CommandInput::Back);
        assert_eq!(terminal("exit\n").install_command("cmake", false), CommandInput::Abort);
    }

    #[test]
    fn test_failure_menu_set_override() {
        let mut t = terminal("s\nLIBROOT\n/opt/lib\n");
        assert_eq!(
            t.on_build_failure(&failed_attempt()),
            Decision::SetOverride {
                name: "LIBROOT".to_string(),
                value: "/opt/lib".to_string(),
            }
        );
        let output = String::from_utf8(t.into_output()).unwrap();
        assert!(output.contains("Build attempt 1 failed: [BUILD_BACKEND_FAILED]"));
    }

    #[test]
    fn test_override_value_is_reasked_when_empty() {
        let mut t = terminal("s\nLIBROOT\n\n/opt/lib\n");
        assert_eq!(
            t.on_build_failure(&failed_attempt()),
            Decision::SetOverride {
                name: "LIBROOT".to_string(),
                value: "/opt/lib".to_string(),
            }
        );
        let output = String::from_utf8(t.into_output()).unwrap();
        assert_eq!(output.matches("Value for LIBROOT: ").count(), 2);
        assert!(output.contains("No value entered."));

        assert_eq!(terminal("s\nLIBROOT\n\n").on_build_failure(&failed_attempt()), Decision::Abort);
    }

    #[test]
    fn test_typed_paths_are_expanded_consistently() {
        let scripted = |input: &str| {
            terminal(input)
                .with_base_dir("/work/widget")
                .with_home("/home/op")
        };

        assert_eq!(
            scripted("cpp\n").locate_build_dir("CMakeLists.txt", Path::new("/work/widget")),
            Some(PathBuf::from("/work/widget/cpp"))
        );
        assert_eq!(
            scripted("p\n~/tools/cmake\n").tool_remedy("cmake"),
            ToolRemedy::ManualPath(PathBuf::from("/home/op/tools/cmake"))
        );
        assert_eq!(
            scripted("~\n").trust_anchor_path(Path::new("/work/widget/signature/publickey.asc")),
            Some(PathBuf::from("/home/op"))
        );
        assert_eq!(
            scripted("../keys/publickey.asc\n").trust_anchor_path(Path::new("/missing.asc")),
            Some(PathBuf::from("/work/widget/../keys/publickey.asc"))
        );
        assert_eq!(
            scripted("~other/key.asc\n").trust_anchor_path(Path::new("/missing.asc")),
            Some(PathBuf::from("/work/widget/~other/key.asc"))
        );
    }

    #[test]
    fn test_anchor_prompt_explains_quit() {
        let mut t = terminal("quit\n");
        assert_eq!(t.trust_anchor_path(Path::new("/missing.asc")), None);
        let output = String::from_utf8(t.into_output()).unwrap();
        assert!(output.contains("quit to fail verification"));
    }

    #[test]
    fn test_failure_menu_command_and_back() {
        let mut t = terminal("c\n\nc\nsudo apt-get install -y libssl-dev\n");
        assert_eq!(
            t.on_build_failure(&failed_attempt()),
            Decision::RunCommand(RemediationAction::new("sudo apt-get install -y libssl-dev"))
        );
    }

    #[test]
    fn test_failure_menu_retry_and_quit() {
        assert_eq!(terminal("r\n").on_build_failure(&failed_attempt()), Decision::Retry);
        assert_eq!(terminal("q\n").on_build_failure(&failed_attempt()), Decision::Abort);
        assert_eq!(terminal("s\nquit\n").on_build_failure(&failed_attempt()), Decision::Abort);
    }

    #[test]
    fn test_confirmations() {
        assert_eq!(
            terminal("n\n").confirm_configuration(&BuildConfiguration::default()),
            Some(false)
        );
        assert!(terminal("Y\n").confirm_verification());
    }
}
