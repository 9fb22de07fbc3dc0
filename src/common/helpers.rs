// Helpers for masking sensitive values before they reach the logs

/// Masks email addresses for safe logging
///
/// # Example
/// ```ignore
/// let masked = safe_email_log("user@example.com");
/// // Returns: "u***@example.com"
/// ```
pub fn safe_email_log(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***@***.***".to_string(),
    }
}

/// Masks tokens and keys for safe logging, keeping the first and last
/// four characters.
pub fn safe_token_log(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "***".to_string()
    }
}
