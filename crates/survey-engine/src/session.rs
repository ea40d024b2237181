use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("token pattern is valid"));

/// Issues a fresh session token.
pub fn issue_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Tokens double as file names, so only a safe alphabet is accepted.
pub fn is_valid_token(token: &str) -> bool {
    TOKEN_PATTERN.is_match(token)
}
