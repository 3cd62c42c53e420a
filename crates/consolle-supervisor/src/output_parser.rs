use crate::error::EvalError;
use consolle_sanitizer::PromptMatcher;
use regex::Regex;
use std::sync::OnceLock;

fn init_artifact_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(IRB\.conf|DISABLE_PRY_RAILS|__consolle_init_\d+__)").unwrap())
}

fn error_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][\w:]*(?:Error|Exception)): (.*)$").unwrap())
}

/// True for lines that are artifacts of our own injection machinery and
/// should never reach the caller (spec.md section 4.4.2 step 6a/6b).
fn is_injection_echo(line: &str) -> bool {
    line.contains("eval(File.read") || line.contains("eval(Base64.decode64")
}

fn is_reprogramming_artifact(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed == "nil" || init_artifact_regex().is_match(trimmed)
}

/// Parses the sanitized output of one eval round (spec.md section 4.4.2
/// step 6): strips injection echoes, REPL-reprogramming artifacts, and
/// trailing prompt lines, then looks for a `ClassName: message` error line.
pub fn parse_eval_output(sanitized: &str, prompt: &PromptMatcher) -> Result<String, EvalError> {
    let mut kept = Vec::new();

    for line in sanitized.lines() {
        if is_injection_echo(line) || is_reprogramming_artifact(line) {
            continue;
        }
        if prompt.is_prompt_line(line) && !line.trim_start().starts_with("=> ") {
            continue;
        }
        kept.push(line);
    }

    for line in &kept {
        if let Some(captures) = error_line_regex().captures(line.trim()) {
            let class_name = captures[1].to_string();
            let message = captures[2].to_string();
            return Err(EvalError::ChildError {
                class_name,
                message,
                backtrace: Vec::new(),
            });
        }
    }

    Ok(kept.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> PromptMatcher {
        PromptMatcher::default()
    }

    #[test]
    fn strips_injection_echo_and_reprogramming_noise() {
        let raw = "eval(Base64.decode64(\"MSsx\").force_encoding('UTF-8'), binding)\nnil\nIRB.conf[:PROMPT]\n=> 2\napp(dev)>";
        let result = parse_eval_output(raw, &prompt()).unwrap();
        assert_eq!(result, "=> 2");
    }

    #[test]
    fn detects_named_error_class() {
        let raw = "NameError: undefined local variable or method `foo'\napp(dev)>";
        let err = parse_eval_output(raw, &prompt()).unwrap_err();
        match err {
            EvalError::ChildError {
                class_name,
                message,
                ..
            } => {
                assert_eq!(class_name, "NameError");
                assert!(message.contains("undefined local variable"));
            }
            other => panic!("expected ChildError, got {other:?}"),
        }
    }

    #[test]
    fn success_output_without_error_class() {
        let raw = "=> 42\napp(dev)>";
        let result = parse_eval_output(raw, &prompt()).unwrap();
        assert_eq!(result, "=> 42");
    }

    #[test]
    fn keeps_arbitrary_non_prompt_output_lines() {
        let raw = "hello\nworld\napp(dev)>";
        let result = parse_eval_output(raw, &prompt()).unwrap();
        assert_eq!(result, "hello\nworld");
    }
}
