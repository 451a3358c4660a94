//! Small stateless helpers shared across modules: filename sanitization,
//! duration/byte formatting, and URL/header-line parsing.

use std::time::Duration;
use url::Url;

/// Replace filesystem-unsafe characters deterministically. Idempotent:
/// running it twice on its own output is a no-op.
pub fn safe_file_name(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{bytes} {}", UNITS[unit_index])
    } else {
        format!("{size:.2} {}", UNITS[unit_index])
    }
}

/// Parse a URL and check its scheme is in `allowed_schemes`.
pub fn validate_url(url: &str, allowed_schemes: &[String]) -> Result<Url, String> {
    let parsed = Url::parse(url).map_err(|e| e.to_string())?;
    if allowed_schemes.iter().any(|s| s == parsed.scheme()) {
        Ok(parsed)
    } else {
        Err(format!("scheme {:?} not in allowed_schemes", parsed.scheme()))
    }
}

/// Parse one `"Name: value"` header line. Returns `None` for malformed
/// lines (no colon after trimming) so callers can count accepted vs.
/// skipped lines.
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("test.txt"), "test.txt");
        assert_eq!(safe_file_name("test/file.txt"), "test_file.txt");
        assert_eq!(safe_file_name("test:file?.txt"), "test_file_.txt");
    }

    #[test]
    fn safe_file_name_is_idempotent() {
        let once = safe_file_name("http://a.example/x?y=z");
        let twice = safe_file_name(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 1m 5s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_validate_url() {
        let allowed = vec!["http".to_string(), "https".to_string()];
        assert!(validate_url("https://example.com", &allowed).is_ok());
        assert!(validate_url("http://example.com", &allowed).is_ok());
        assert!(validate_url("ftp://example.com", &allowed).is_err());
        assert!(validate_url("file:///etc/passwd", &allowed).is_err());
        assert!(validate_url("invalid-url", &allowed).is_err());
    }

    #[test]
    fn header_line_parsing_accepts_single_colon_lines() {
        assert_eq!(
            parse_header_line("X-Api-Key: abc123"),
            Some(("X-Api-Key".to_string(), "abc123".to_string()))
        );
        assert_eq!(parse_header_line("no colon here"), None);
        assert_eq!(parse_header_line(": value"), None);
    }
}
