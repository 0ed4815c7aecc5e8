use regex::Regex;
use std::collections::HashSet;

/// Consumer mailbox providers dropped when the caller asks to exclude free emails.
pub const FREE_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "aol.com",
    "mail.com",
    "protonmail.com",
    "icloud.com",
];

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";

pub struct EmailExtractor {
    email_regex: Regex,
    exact_regex: Regex,
}

impl EmailExtractor {
    pub fn new() -> Self {
        EmailExtractor {
            // Permissive on purpose: near-misses like "a..b@x.io" are kept.
            email_regex: Regex::new(EMAIL_PATTERN).expect("email pattern is valid"),
            exact_regex: Regex::new(&format!("^{}$", EMAIL_PATTERN)).expect("email pattern is valid"),
        }
    }

    /// Returns every email in `text`, lower-cased, in first-seen order, without duplicates.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut emails = Vec::new();
        for found in self.email_regex.find_iter(text) {
            let email = found.as_str().trim().to_lowercase();
            if seen.insert(email.clone()) {
                emails.push(email);
            }
        }
        emails
    }

    pub fn is_email(&self, candidate: &str) -> bool {
        self.exact_regex.is_match(candidate.trim())
    }
}

impl Default for EmailExtractor {
    fn default() -> Self {
        Self::new()
    }
}

pub fn domain_of(email: &str) -> &str {
    email.rsplit_once('@').map(|(_, domain)| domain).unwrap_or("")
}

/// Drops emails whose domain is in `free_domains` (case-insensitive) when
/// `exclude_free` is set. Order of the survivors is unchanged.
pub fn filter_free_domains<S: AsRef<str>>(
    emails: Vec<String>,
    exclude_free: bool,
    free_domains: &[S],
) -> Vec<String> {
    if !exclude_free {
        return emails;
    }
    let blocked: HashSet<String> = free_domains
        .iter()
        .map(|d| d.as_ref().trim().to_lowercase())
        .collect();

    emails
        .into_iter()
        .filter(|email| !blocked.contains(&domain_of(email).to_lowercase()))
        .collect()
}
