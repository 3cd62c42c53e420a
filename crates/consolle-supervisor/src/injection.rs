use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use consolle_core::INLINE_INJECTION_LIMIT_BYTES;
use std::path::{Path, PathBuf};

/// Marker `puts` when the inner `Timeout.timeout` wrapper catches cleanly,
/// ahead of the outer deadline (spec.md section 4.4.2 step 2/4).
pub const TIMEOUT_MARKER: &str = "__consolle_timeout__";

/// Expression evaluated to obtain the REPL's current top-level binding, so
/// injected code sees the same locals the interactive user would.
const CURRENT_BINDING_EXPR: &str =
    "(defined?(IRB.conf[:MAIN_CONTEXT]) ? IRB.conf[:MAIN_CONTEXT].workspace.binding : binding)";

/// A line ready to be written to the child's stdin, plus the temp file (if
/// any) that must be cleaned up if the child never runs its own `ensure`
/// (e.g. because the eval outer-timeout kills the attempt before the
/// child's Ruby process gets to clean it up itself).
pub struct Injection {
    pub line: String,
    pub temp_file: Option<PathBuf>,
}

fn ruby_string_literal(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Build the line to inject for `code`, choosing between an inline
/// base64-encoded `eval` and a temp-file `eval(File.read(...), binding)`
/// based on byte length (spec.md section 4.4.2 step 2). Both strategies
/// evaluate the code against the REPL's current binding so the last
/// expression's value becomes the result the REPL prints, unlike
/// `Kernel#load`, which would discard it and print its own `true`/`false`.
/// `timeout_secs` is the full caller deadline `T`; the inner wrapper uses
/// `T-1` so the child has a chance to raise `Timeout::Error` cleanly before
/// the outer deadline fires.
pub fn build_injection(
    code: &str,
    timeout_secs: u64,
    tmp_dir: &Path,
) -> std::io::Result<Injection> {
    let inner_timeout = timeout_secs.saturating_sub(1).max(1);

    if code.len() <= INLINE_INJECTION_LIMIT_BYTES {
        let encoded = BASE64.encode(code.as_bytes());
        let line = format!(
            "begin; require 'timeout'; Timeout.timeout({t}) {{ eval(Base64.decode64(\"{b64}\").force_encoding('UTF-8'), {binding}) }}; rescue Timeout::Error => e; puts \"{marker}\"; nil; rescue Exception => e; puts \"#{{e.class}}: #{{e.message}}\"; nil; end",
            t = inner_timeout,
            b64 = encoded,
            binding = CURRENT_BINDING_EXPR,
            marker = TIMEOUT_MARKER,
        );
        Ok(Injection {
            line,
            temp_file: None,
        })
    } else {
        let mut builder = tempfile::Builder::new();
        let mut file = builder
            .prefix("consolle-eval-")
            .suffix(".rb")
            .tempfile_in(tmp_dir)?;
        std::io::Write::write_all(&mut file, code.as_bytes())?;
        // Keep the file on disk; the child's own `ensure` removes it.
        let (_, path) = file.keep()?;

        let path_literal = ruby_string_literal(&path.to_string_lossy());
        let line = format!(
            "begin; require 'timeout'; Timeout.timeout({t}) {{ eval(File.read({path}), {binding}) }}; rescue Timeout::Error => e; puts \"{marker}\"; nil; rescue Exception => e; puts \"#{{e.class}}: #{{e.message}}\"; puts e.backtrace.first(5); nil; ensure; File.delete({path}) if File.exist?({path}); end",
            t = inner_timeout,
            path = path_literal,
            binding = CURRENT_BINDING_EXPR,
            marker = TIMEOUT_MARKER,
        );
        Ok(Injection {
            line,
            temp_file: Some(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_code_uses_inline_base64() {
        let dir = tempfile::tempdir().unwrap();
        let injection = build_injection("1 + 1", 60, dir.path()).unwrap();
        assert!(injection.temp_file.is_none());
        assert!(injection.line.contains("Base64.decode64"));
        assert!(injection.line.contains("Timeout.timeout(59)"));
    }

    #[test]
    fn oversize_code_spills_to_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let big_code = "x = 1\n".repeat(300);
        assert!(big_code.len() > INLINE_INJECTION_LIMIT_BYTES);

        let injection = build_injection(&big_code, 60, dir.path()).unwrap();
        let path = injection.temp_file.expect("temp file expected");
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), big_code);
        assert!(injection.line.contains("eval(File.read("));
        assert!(injection.line.contains("File.delete"));
    }
}
