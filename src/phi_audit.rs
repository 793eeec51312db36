// PHI audit: static scan of every Rust source file for tracing calls that
// carry patient-identifying fields. Logs use opaque ids only.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    /// Field names and interpolations that MUST NOT appear in tracing macro arguments.
    const PHI_PATTERNS: &[&str] = &[
        // Demographics
        "patient_name",
        "patient.name",
        "ctx.patient_name",
        "mrn",
        "disposition",
        // Clinical free text
        "hospital_summary",
        "stroke_type",
        "dysphagia_result",
        "fall_risk",
        // Generated or reviewed plan text
        "suggested_fix",
        "fix_text",
        "content =",
        "%content",
        "prompt =",
        "%prompt",
        "response =",
        "%response",
        "flag.message",
        "finding.message",
    ];

    /// Files that reference the patterns outside tracing calls.
    const ALLOWLIST: &[&str] = &["phi_audit.rs"];

    #[test]
    fn no_phi_in_tracing_calls() {
        let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        assert!(src_dir.exists(), "Source directory not found: {}", src_dir.display());

        let mut violations = Vec::new();
        scan_directory(&src_dir, &mut violations);

        if !violations.is_empty() {
            let report = violations
                .iter()
                .map(|(file, line_num, line, pattern)| {
                    format!("  {}:{}: found '{}' in: {}", file, line_num, pattern, line.trim())
                })
                .collect::<Vec<_>>()
                .join("\n");
            panic!(
                "PHI AUDIT FAILED: {} violation(s) found in tracing calls:\n{}\n\n\
                 Fix: log patient_id / plan_id / flag_id instead.",
                violations.len(),
                report
            );
        }
    }

    #[test]
    fn phi_patterns_list_is_not_empty() {
        assert!(
            PHI_PATTERNS.len() >= 10,
            "PHI_PATTERNS should contain at least 10 patterns, found {}",
            PHI_PATTERNS.len()
        );
    }

    #[test]
    fn scanner_detects_known_violation() {
        let call = r#"tracing::info!(name = %ctx.patient_name, "plan generated");"#;
        assert!(find_phi(call).is_some(), "Scanner should detect PHI in: {call}");

        let call = r#"tracing::debug!(prompt = %prompt, "sending");"#;
        assert!(find_phi(call).is_some(), "Scanner should detect PHI in: {call}");
    }

    #[test]
    fn operation_names_in_string_literals_are_not_phi() {
        let span = r#"let _span = tracing::info_span!("save_hospital_summary", patient_id = %patient_id).entered();"#;
        assert_eq!(find_phi(span), None);

        let leak = r#"tracing::info!(summary = %ctx.hospital_summary, "save_hospital_summary");"#;
        assert_eq!(find_phi(leak), Some("hospital_summary"));

        let escaped = r#"tracing::warn!("quoted \"mrn\" text", flag_id = %id);"#;
        assert_eq!(find_phi(escaped), None);
    }

    #[test]
    fn scanner_passes_clean_tracing() {
        let call = r#"tracing::warn!(response_len = response.len(), "QC response unparseable");"#;
        assert_eq!(find_phi(call), None);
    }

    /// First PHI pattern in the call's code, ignoring string literals (span
    /// names and messages are static text, never patient data).
    fn find_phi(call: &str) -> Option<&'static str> {
        let code = strip_string_literals(call);
        PHI_PATTERNS.iter().copied().find(|p| code.contains(p))
    }

    fn strip_string_literals(call: &str) -> String {
        let mut code = String::with_capacity(call.len());
        let mut in_string = false;
        let mut escaped = false;
        for ch in call.chars() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => {
                        in_string = false;
                        code.push('"');
                    }
                    _ => {}
                }
            } else {
                if ch == '"' {
                    in_string = true;
                }
                code.push(ch);
            }
        }
        code
    }

    fn scan_directory(dir: &Path, violations: &mut Vec<(String, usize, String, String)>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                scan_directory(&path, violations);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                scan_file(&path, violations);
            }
        }
    }

    fn is_tracing_start(trimmed: &str) -> bool {
        ["info!", "warn!", "error!", "debug!", "trace!", "info_span!"]
            .iter()
            .any(|m| trimmed.contains(&format!("tracing::{m}")))
    }

    fn scan_file(path: &Path, violations: &mut Vec<(String, usize, String, String)>) {
        let filename = path.file_name().unwrap_or_default().to_string_lossy();
        if ALLOWLIST.iter().any(|a| filename.contains(a)) {
            return;
        }

        let Ok(content) = fs::read_to_string(path) else {
            return;
        };

        let relative_path = path
            .strip_prefix(Path::new(env!("CARGO_MANIFEST_DIR")).join("src"))
            .unwrap_or(path)
            .display()
            .to_string();

        // Macro calls may span several lines; follow parentheses to the end.
        let lines: Vec<&str> = content.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let trimmed = lines[i].trim();
            if !is_tracing_start(trimmed) {
                i += 1;
                continue;
            }

            let mut call = String::from(trimmed);
            let start_line = i + 1;
            let mut depth = paren_delta(trimmed);
            let mut j = i + 1;
            while depth > 0 && j < lines.len() {
                let next = lines[j].trim();
                call.push(' ');
                call.push_str(next);
                depth += paren_delta(next);
                j += 1;
            }

            if let Some(pattern) = find_phi(&call) {
                violations.push((relative_path.clone(), start_line, call, pattern.to_string()));
            }
            i = j;
        }
    }

    fn paren_delta(line: &str) -> i32 {
        line.chars().fold(0, |depth, ch| match ch {
            '(' => depth + 1,
            ')' => depth - 1,
            _ => depth,
        })
    }
}
