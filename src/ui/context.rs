//! Whether output goes to a person or to a pipe

use std::io::IsTerminal;

/// CI systems that run with a pseudo-terminal attached
const CI_VARS: &[&str] = &["CI", "GITHUB_ACTIONS", "GITLAB_CI", "JENKINS_URL", "BUILDKITE"];

#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    pub fn detect() -> Self {
        Self {
            interactive: std::io::stdout().is_terminal()
                && std::env::var_os("NO_COLOR").is_none()
                && !CI_VARS.iter().any(|v| std::env::var_os(v).is_some()),
        }
    }

    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    /// Spinners and colors
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_is_plain() {
        assert!(!UiContext::non_interactive().use_fancy_output());
    }
}
