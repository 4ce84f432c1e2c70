//! Cleanup of raw OCR output before it reaches the clipboard.
//!
//! Recognizers emit stray punctuation rows (table rules, underline fragments) and ragged
//! whitespace. `cleanup_text` reduces that to a canonical string. It is pure and idempotent, so
//! callers may apply it to text that has already been cleaned.

/// Characters that, when a line consists of nothing else, mark a recognition artifact.
const ARTIFACT_CHARS: &[char] = &['|', '`', '~', '.', ',', ':', ';'];

fn is_artifact_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| ARTIFACT_CHARS.contains(&c))
}

/// Normalizes recognized text.
///
/// In order: line endings become `\n`, trailing spaces and tabs are stripped per line, artifact
/// lines are dropped (blank lines are kept), runs of two or more blank lines collapse to one,
/// and the result is trimmed.
pub fn cleanup_text(input: &str) -> String {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");

    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;

    for line in normalized.split('\n') {
        let line = line.trim_end_matches([' ', '\t']);
        if is_artifact_line(line) {
            continue;
        }

        // Only spaces and tabs were stripped, so other whitespace keeps a line non-blank.
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }

    out.join("\n").trim().to_string()
}
