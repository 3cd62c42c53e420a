use regex::Regex;
use std::sync::OnceLock;

/// The custom sentinel prompt programmed into the child's REPL (spec.md
/// section 4.4.1 / 9): chosen to be impossible for user code to emit by
/// accident and to survive ANSI scrubbing.
pub const SENTINEL_PROMPT: &str = "\u{1e}\u{1f}<CONSOLLE>\u{1f}\u{1e}";

fn default_pattern() -> String {
    format!(
        r"(?x)
        ^
        [^\w\s]{{0,4}}\s*                        # tolerate a short non-word leading indicator
        (?:
            {sentinel}
          | \w+\(.*?\)(?::\d+)?>                 # rails-style app(env)[:NNN]>
          | irb\(.*?\):\d+(?::\d*)?[>*]           # irb(main):NNN[:N][>*]
          | >>
          | >
        )
        \s*$
        ",
        sentinel = regex::escape(SENTINEL_PROMPT)
    )
}

fn default_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&default_pattern()).expect("default prompt regex is valid"))
}

/// Recognizes whether a single, already-sanitized line is the console's
/// "ready for input" prompt (spec.md section 4.2).
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    regex: Regex,
}

impl Default for PromptMatcher {
    fn default() -> Self {
        Self {
            regex: default_regex().clone(),
        }
    }
}

impl PromptMatcher {
    /// Build a matcher from a custom regex, overriding the whole default
    /// pattern (spec.md section 6, `prompt_pattern`).
    pub fn from_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// Does this stripped line look like an input prompt?
    pub fn is_prompt_line(&self, line: &str) -> bool {
        self.regex.is_match(line.trim_end_matches(['\n', '\r']))
    }

    /// Find the first line in sanitized, multi-line output that looks like
    /// a prompt, if any.
    pub fn find_prompt_line<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.lines().find(|line| self.is_prompt_line(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> PromptMatcher {
        PromptMatcher::default()
    }

    #[test]
    fn matches_sentinel_prompt() {
        assert!(matcher().is_prompt_line(SENTINEL_PROMPT));
        assert!(matcher().is_prompt_line(&format!("{SENTINEL_PROMPT} ")));
    }

    #[test]
    fn matches_rails_style_prompts() {
        assert!(matcher().is_prompt_line("app(dev)>"));
        assert!(matcher().is_prompt_line("app(dev):001>"));
        assert!(matcher().is_prompt_line("myapp(production):042>"));
    }

    #[test]
    fn matches_irb_prompts() {
        assert!(matcher().is_prompt_line("irb(main):001:0>"));
        assert!(matcher().is_prompt_line("irb(main):001>"));
        assert!(matcher().is_prompt_line("irb(main):002:1*"));
    }

    #[test]
    fn matches_bare_angle_brackets() {
        assert!(matcher().is_prompt_line(">>"));
        assert!(matcher().is_prompt_line(">"));
    }

    #[test]
    fn rejects_non_prompt_lines() {
        assert!(!matcher().is_prompt_line("Hello World"));
        assert!(!matcher().is_prompt_line("=> 42"));
        assert!(!matcher().is_prompt_line(""));
    }

    #[test]
    fn tolerates_remote_indicator_prefix() {
        assert!(matcher().is_prompt_line("➜ app(dev)>"));
    }

    #[test]
    fn find_prompt_line_scans_multiline_output() {
        let output = "=> 2\nsome trailing noise\napp(dev)>";
        assert_eq!(matcher().find_prompt_line(output), Some("app(dev)>"));
    }

    #[test]
    fn custom_pattern_overrides_default() {
        let custom = PromptMatcher::from_pattern(r"^CUSTOM>\s*$").unwrap();
        assert!(custom.is_prompt_line("CUSTOM>"));
        assert!(!custom.is_prompt_line("app(dev)>"));
    }
}
