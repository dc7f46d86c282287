//! Lexical allow/deny gate applied to every command before it reaches a runner.
//!
//! Matching is lexical: a case-insensitive substring scan against
//! the block registry, then an exact lookup of the first whitespace-delimited
//! token in the allow registry. Quoting, variable expansion and encoded
//! payloads are not analysed, so this is not a boundary against obfuscated
//! input.

use std::collections::BTreeMap;
use std::fmt;

const LOCAL_ALLOWED: &[(&str, &str)] = &[
    ("dir", "list directory contents"),
    ("ls", "list directory contents"),
    ("pwd", "print the current working directory"),
    ("echo", "print text"),
    ("python", "run Python scripts"),
    ("pip", "Python package manager"),
    ("git", "version control"),
    ("conda", "environment manager"),
];

const LOCAL_BLOCKED: &[&str] = &[
    "rm", "del", "remove", "format", "mkfs", "shutdown", "reboot", ">", ">>", "wget", "curl",
    "sudo", "su",
];

const REMOTE_ALLOWED: &[(&str, &str)] = &[
    ("ls", "list directory contents"),
    ("pwd", "print the current working directory"),
    ("echo", "print text"),
    ("python", "run Python scripts"),
    ("pip", "Python package manager"),
    ("nvidia-smi", "show GPU status"),
    ("top", "show processes"),
    ("ps", "process status"),
    ("free", "memory usage"),
    ("df", "disk usage"),
];

const REMOTE_BLOCKED: &[&str] = &[
    "rm", "remove", "mkfs", "format", "shutdown", "reboot", ">", ">>", "wget", "curl", "sudo",
    "su",
];

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A block-registry token occurs somewhere in the command.
    BlockedToken { token: String },
    /// The command name is not in the allow registry.
    UnknownCommand { name: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockedToken { token } => write!(f, "dangerous command blocked: {token}"),
            Self::UnknownCommand { name } if name.is_empty() => {
                f.write_str("unknown command blocked: (empty command)")
            }
            Self::UnknownCommand { name } => write!(f, "unknown command blocked: {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    Rejected(Rejection),
}

impl PolicyDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCommand {
    pub name: String,
    pub description: String,
}

/// Closed, ordered set of command names that may run.
#[derive(Debug, Clone, Default)]
pub struct AllowRegistry {
    entries: Vec<AllowedCommand>,
}

impl AllowRegistry {
    fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut registry = Self::default();
        for (name, description) in pairs {
            registry.insert(name, description);
        }
        registry
    }

    /// Insert or re-describe an entry. Names are stored lower-cased; an
    /// existing name keeps its position.
    fn insert(&mut self, name: &str, description: &str) {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return;
        }
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            description.clone_into(&mut existing.description);
        } else {
            self.entries.push(AllowedCommand {
                name,
                description: description.to_owned(),
            });
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    #[must_use]
    pub fn entries(&self) -> &[AllowedCommand] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered set of lower-cased substrings that reject a command outright.
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    tokens: Vec<String>,
}

impl BlockRegistry {
    fn from_tokens(tokens: &[&str]) -> Self {
        let mut registry = Self::default();
        for token in tokens {
            registry.insert(token);
        }
        registry
    }

    fn insert(&mut self, token: &str) {
        let token = token.to_lowercase();
        if token.is_empty() || self.tokens.contains(&token) {
            return;
        }
        self.tokens.push(token);
    }

    fn find_in(&self, normalized: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| normalized.contains(t.as_str()))
            .map(String::as_str)
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Pair of registries evaluated as one gate.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allowed: AllowRegistry,
    blocked: BlockRegistry,
}

impl CommandPolicy {
    /// Registries used for commands run on this host.
    #[must_use]
    pub fn local_default() -> Self {
        Self {
            allowed: AllowRegistry::from_pairs(LOCAL_ALLOWED),
            blocked: BlockRegistry::from_tokens(LOCAL_BLOCKED),
        }
    }

    /// Registries used for commands run over SSH.
    #[must_use]
    pub fn remote_default() -> Self {
        Self {
            allowed: AllowRegistry::from_pairs(REMOTE_ALLOWED),
            blocked: BlockRegistry::from_tokens(REMOTE_BLOCKED),
        }
    }

    /// Extend the registries with configured additions. Defaults are never
    /// removed; a configured allow entry does not lift a block token.
    #[must_use]
    pub fn extend(mut self, allowed: &BTreeMap<String, String>, blocked: &[String]) -> Self {
        for (name, description) in allowed {
            self.allowed.insert(name, description);
        }
        for token in blocked {
            self.blocked.insert(token);
        }
        self
    }

    #[must_use]
    pub fn evaluate(&self, command: &str) -> PolicyDecision {
        let normalized = command.to_lowercase();
        if let Some(token) = self.blocked.find_in(&normalized) {
            return PolicyDecision::Rejected(Rejection::BlockedToken {
                token: token.to_owned(),
            });
        }

        let name = command
            .split_whitespace()
            .next()
            .map(str::to_lowercase)
            .unwrap_or_default();
        if name.is_empty() || !self.allowed.contains(&name) {
            return PolicyDecision::Rejected(Rejection::UnknownCommand { name });
        }

        PolicyDecision::Allowed
    }

    /// `"name: description"` lines in registry order.
    #[must_use]
    pub fn describe_allowed(&self) -> Vec<String> {
        self.allowed
            .entries()
            .iter()
            .map(|e| format!("{}: {}", e.name, e.description))
            .collect()
    }

    #[must_use]
    pub fn allowed(&self) -> &AllowRegistry {
        &self.allowed
    }

    #[must_use]
    pub fn blocked(&self) -> &BlockRegistry {
        &self.blocked
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn blocked(decision: &PolicyDecision) -> Option<&str> {
        match decision {
            PolicyDecision::Rejected(Rejection::BlockedToken { token }) => Some(token),
            _ => None,
        }
    }

    fn unknown(decision: &PolicyDecision) -> bool {
        matches!(
            decision,
            PolicyDecision::Rejected(Rejection::UnknownCommand { .. })
        )
    }

    #[test]
    fn allowed_commands_pass() {
        let policy = CommandPolicy::local_default();
        assert!(policy.evaluate("pwd").is_allowed());
        assert!(policy.evaluate("ls -la").is_allowed());
        assert!(policy.evaluate("echo hello").is_allowed());
        assert!(policy.evaluate("git status").is_allowed());
        assert!(policy.evaluate("  echo padded  ").is_allowed());
    }

    #[test]
    fn command_name_is_case_insensitive() {
        let policy = CommandPolicy::local_default();
        assert!(policy.evaluate("PWD").is_allowed());
        assert!(policy.evaluate("Echo hi").is_allowed());
    }

    #[test]
    fn unknown_command_rejected() {
        let policy = CommandPolicy::local_default();
        let decision = policy.evaluate("cat file.txt");
        assert_eq!(
            decision,
            PolicyDecision::Rejected(Rejection::UnknownCommand {
                name: "cat".into()
            })
        );
    }

    #[test]
    fn name_match_is_exact_token() {
        let policy = CommandPolicy::local_default();
        assert!(unknown(&policy.evaluate("lsof -i")));
        assert!(unknown(&policy.evaluate("pwdx 1")));
        assert!(unknown(&policy.evaluate("/bin/ls")));
    }

    #[test]
    fn empty_command_is_unknown() {
        let policy = CommandPolicy::local_default();
        assert_eq!(
            policy.evaluate(""),
            PolicyDecision::Rejected(Rejection::UnknownCommand {
                name: String::new()
            })
        );
        assert!(unknown(&policy.evaluate("   \t ")));
    }

    #[test]
    fn blocked_token_rejected() {
        let policy = CommandPolicy::local_default();
        assert_eq!(blocked(&policy.evaluate("rm -rf /")), Some("rm"));
        assert_eq!(blocked(&policy.evaluate("wget http://x")), Some("wget"));
    }

    #[test]
    fn block_check_runs_before_allow_check() {
        let policy = CommandPolicy::local_default();
        assert!(blocked(&policy.evaluate("echo hi && sudo rm -rf /")).is_some());
        assert_eq!(blocked(&policy.evaluate("echo hi > out.txt")), Some(">"));
    }

    #[test]
    fn blocked_case_insensitive() {
        let policy = CommandPolicy::local_default();
        assert_eq!(blocked(&policy.evaluate("echo SUDO")), Some("sudo"));
        assert_eq!(blocked(&policy.evaluate("Curl example.com")), Some("curl"));
    }

    #[test]
    fn substring_false_positive_accepted() {
        // "summary" contains "su"; the scan is lexical.
        let policy = CommandPolicy::local_default();
        assert_eq!(blocked(&policy.evaluate("echo summary")), Some("su"));
    }

    #[test]
    fn first_registry_match_is_reported() {
        let policy = CommandPolicy::local_default();
        assert_eq!(blocked(&policy.evaluate("echo x >> log")), Some(">"));
    }

    #[test]
    fn remote_registry_differs_from_local() {
        let local = CommandPolicy::local_default();
        let remote = CommandPolicy::remote_default();
        assert!(remote.evaluate("nvidia-smi").is_allowed());
        assert!(unknown(&local.evaluate("nvidia-smi")));
        assert!(local.evaluate("git log").is_allowed());
        assert!(unknown(&remote.evaluate("git log")));
        assert!(blocked(&local.evaluate("echo del")).is_some());
        assert!(remote.evaluate("echo del").is_allowed());
    }

    #[test]
    fn describe_allowed_keeps_registry_order() {
        let policy = CommandPolicy::local_default();
        let lines = policy.describe_allowed();
        assert_eq!(lines.len(), LOCAL_ALLOWED.len());
        assert_eq!(lines[0], "dir: list directory contents");
        assert_eq!(lines[2], "pwd: print the current working directory");
        for (line, (name, _)) in lines.iter().zip(LOCAL_ALLOWED) {
            assert!(line.starts_with(&format!("{name}: ")));
        }
    }

    #[test]
    fn config_extends_registries() {
        let mut allowed_commands = BTreeMap::new();
        allowed_commands.insert("Sleep".to_owned(), "pause".to_owned());
        let blocked_commands = vec!["Danger".to_owned(), "danger".to_owned()];
        let policy = CommandPolicy::local_default().extend(&allowed_commands, &blocked_commands);
        assert!(policy.evaluate("sleep 1").is_allowed());
        assert_eq!(blocked(&policy.evaluate("echo DANGER")), Some("danger"));
        assert_eq!(policy.allowed().len(), LOCAL_ALLOWED.len() + 1);
        assert_eq!(
            policy
                .blocked()
                .tokens()
                .iter()
                .filter(|t| *t == "danger")
                .count(),
            1
        );
        assert_eq!(policy.describe_allowed().last().unwrap(), "sleep: pause");
    }

    #[test]
    fn config_cannot_lift_block() {
        let mut allowed_commands = BTreeMap::new();
        allowed_commands.insert("curl".to_owned(), "fetch".to_owned());
        let policy = CommandPolicy::local_default().extend(&allowed_commands, &[]);
        assert_eq!(blocked(&policy.evaluate("curl example.com")), Some("curl"));
    }

    #[test]
    fn config_redescribes_existing_entry_in_place() {
        let mut allowed_commands = BTreeMap::new();
        allowed_commands.insert("pwd".to_owned(), "where am I".to_owned());
        let policy = CommandPolicy::local_default().extend(&allowed_commands, &[]);
        assert_eq!(policy.allowed().len(), LOCAL_ALLOWED.len());
        assert_eq!(policy.describe_allowed()[2], "pwd: where am I");
    }

    #[test]
    fn rejection_display() {
        let r = Rejection::BlockedToken { token: "rm".into() };
        assert_eq!(r.to_string(), "dangerous command blocked: rm");
        let r = Rejection::UnknownCommand { name: "cat".into() };
        assert_eq!(r.to_string(), "unknown command blocked: cat");
    }

    proptest! {
        #[test]
        fn unlisted_name_always_unknown(name in "[a-z]{1,10}", args in "[a-z0-9 ]{0,20}") {
            let policy = CommandPolicy::remote_default();
            let command = format!("{name} {args}");
            let lowered = command.to_lowercase();
            prop_assume!(!policy.allowed().contains(&name));
            prop_assume!(!policy.blocked().tokens().iter().any(|t| lowered.contains(t.as_str())));
            prop_assert!(unknown(&policy.evaluate(&command)));
        }

        #[test]
        fn blocked_token_wins_over_allowed_name(
            idx in 0usize..REMOTE_BLOCKED.len(),
            prefix in "[a-z ]{0,10}",
            upper in any::<bool>(),
        ) {
            let policy = CommandPolicy::remote_default();
            let token = if upper {
                REMOTE_BLOCKED[idx].to_uppercase()
            } else {
                REMOTE_BLOCKED[idx].to_owned()
            };
            let command = format!("echo {prefix}{token}");
            prop_assert!(blocked(&policy.evaluate(&command)).is_some());
        }

        #[test]
        fn evaluation_is_deterministic(command in ".{0,40}") {
            let policy = CommandPolicy::local_default();
            prop_assert_eq!(policy.evaluate(&command), policy.evaluate(&command));
        }
    }
}
