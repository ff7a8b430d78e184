use lazy_static::lazy_static;
use regex::Regex;

const SUSPICIOUS_QUERY_PATTERNS: &[&str] = &[
    r"--",
    r"/\*",
    r"\*/",
    r"\bunion\b",
    r"\bdrop\b",
    r"\bexec\b",
    r"\bexecute\b",
    r"\btruncate\b",
    r"\bcreate\b",
    r"\balter\b",
    r"\bgrant\b",
    r"\brevoke\b",
    r"\bcommit\b",
    r"\brollback\b",
    r"\binto outfile\b",
    r"\binto dumpfile\b",
    r"\bload_file\b",
    r"\bsleep\b",
    r"\bbenchmark\b",
    r"\bwaitfor\b",
    r"\bdelay\b",
    r"\bsys_eval\b",
    r"\binformation_schema\b",
    r"\bsysobjects\b",
    r"\bxp_\w*\b",
    r"\bsp_\w*\b",
    r"\bdeclare\b",
    r"\b\d+\s*=\s*\d+\b",
];

/// Substrings never accepted inside a bound string value.
pub(super) const SUSPICIOUS_VALUE_TOKENS: &[&str] = &[";", "--", "*", "#"];

/// Upper bound on `%` wildcards in one LIKE pattern.
pub(super) const MAX_LIKE_WILDCARDS: usize = 5;

lazy_static! {
    pub(super) static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex");
    pub(super) static ref SUSPICIOUS_QUERY: Vec<(&'static str, Regex)> = SUSPICIOUS_QUERY_PATTERNS
        .iter()
        .map(|pattern| (*pattern, Regex::new(pattern).expect("valid suspicious pattern")))
        .collect();
    pub(super) static ref LIKE_KEYWORD: Regex =
        Regex::new(r"\bi?like\b").expect("valid like regex");
    pub(super) static ref ORDER_BY_KEYWORD: Regex =
        Regex::new(r"\border\s+by\b").expect("valid order by regex");
}

/// First suspicious pattern matched by `text` (compared lower-cased).
pub(super) fn first_suspicious_match(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    SUSPICIOUS_QUERY
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(pattern, _)| *pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tautology_and_keywords_are_suspicious() {
        assert_eq!(first_suspicious_match("a OR 1 = 1"), Some(r"\b\d+\s*=\s*\d+\b"));
        assert_eq!(first_suspicious_match("x UNION select"), Some(r"\bunion\b"));
        assert_eq!(first_suspicious_match("EXEC xp_cmdshell"), Some(r"\bexec\b"));
        assert_eq!(first_suspicious_match("created_at"), None);
    }
}
