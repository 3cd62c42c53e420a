/// Builds the fixed environment overrides applied to a spawned child
/// (spec.md section 4.4.1): disables pagers, colors, and IRB config
/// loading, and fixes terminal geometry so output parsing is stable
/// regardless of the user's own shell environment.
pub fn scrubbed_env(rails_env: &str) -> Vec<(String, String)> {
    vec![
        ("RAILS_ENV".to_string(), rails_env.to_string()),
        ("IRBRC".to_string(), "skip".to_string()),
        ("DISABLE_PRY_RAILS".to_string(), "1".to_string()),
        ("PAGER".to_string(), "cat".to_string()),
        ("GEM_PAGER".to_string(), "cat".to_string()),
        ("IRB_PAGER".to_string(), "cat".to_string()),
        ("NO_PAGER".to_string(), "1".to_string()),
        ("LESS".to_string(), String::new()),
        ("TERM".to_string(), "dumb".to_string()),
        ("FORCE_COLOR".to_string(), "0".to_string()),
        ("NO_COLOR".to_string(), "1".to_string()),
        ("COLUMNS".to_string(), "120".to_string()),
        ("LINES".to_string(), "24".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_rails_env_and_fixed_geometry() {
        let env = scrubbed_env("staging");
        assert!(env.contains(&("RAILS_ENV".to_string(), "staging".to_string())));
        assert!(env.contains(&("COLUMNS".to_string(), "120".to_string())));
        assert!(env.contains(&("LINES".to_string(), "24".to_string())));
        assert!(env.contains(&("TERM".to_string(), "dumb".to_string())));
    }
}
