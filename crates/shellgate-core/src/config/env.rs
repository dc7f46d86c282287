use super::Config;

const ENV_ALLOWED_DESCRIPTION: &str = "user-allowed command";

fn split_list(v: &str) -> impl Iterator<Item = String> + '_ {
    v.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

fn parse_timeout(key: &str) -> Option<u64> {
    let v = std::env::var(key).ok()?;
    match v.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            tracing::warn!("ignoring invalid {key} value: {v}");
            None
        }
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_timeouts();
        self.apply_env_overrides_policy();
        self.apply_env_overrides_audit();
    }

    fn apply_env_overrides_timeouts(&mut self) {
        if let Some(secs) = parse_timeout("SHELLGATE_LOCAL_TIMEOUT") {
            self.local.timeout = secs;
        }
        if let Some(secs) = parse_timeout("SHELLGATE_REMOTE_TIMEOUT") {
            self.remote.timeout = secs;
        }
        if let Some(secs) = parse_timeout("SHELLGATE_REMOTE_CONNECT_TIMEOUT") {
            self.remote.connect_timeout = secs;
        }
    }

    /// Env lists add to whatever the file configured; they never replace it.
    fn apply_env_overrides_policy(&mut self) {
        if let Ok(v) = std::env::var("SHELLGATE_LOCAL_ALLOWED_COMMANDS") {
            for name in split_list(&v) {
                self.local
                    .allowed_commands
                    .entry(name)
                    .or_insert_with(|| ENV_ALLOWED_DESCRIPTION.to_owned());
            }
        }
        if let Ok(v) = std::env::var("SHELLGATE_LOCAL_BLOCKED_COMMANDS") {
            self.local.blocked_commands.extend(split_list(&v));
        }
        if let Ok(v) = std::env::var("SHELLGATE_REMOTE_BLOCKED_COMMANDS") {
            self.remote.blocked_commands.extend(split_list(&v));
        }
    }

    fn apply_env_overrides_audit(&mut self) {
        if let Ok(v) = std::env::var("SHELLGATE_AUDIT_ENABLED") {
            if let Ok(enabled) = v.parse::<bool>() {
                self.audit.enabled = enabled;
            } else {
                tracing::warn!("ignoring invalid SHELLGATE_AUDIT_ENABLED value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SHELLGATE_AUDIT_DESTINATION")
            && !v.trim().is_empty()
        {
            self.audit.destination = v;
        }
    }
}
