//! Chart version constraints
//!
//! Chart versions are semver. Constraints use the syntax Helm charts are
//! written against rather than Cargo's: comparators separated by spaces or
//! commas are ANDed, `||` separates alternatives, `x`/`X`/`*` are wildcards,
//! `1.2 - 1.4` is an inclusive range, `~>` is an alias for `~`, `!=` excludes,
//! and a bare version means an exact match (not a caret range).

use semver::{Version, VersionReq};

use crate::error::{RepoError, Result};

/// Parsed version constraint
#[derive(Debug, Clone)]
pub struct Constraint {
    raw: String,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone)]
struct Alternative {
    required: VersionReq,
    excluded: Vec<VersionReq>,
}

impl Alternative {
    fn matches(&self, version: &Version) -> bool {
        self.required.matches(version) && !self.excluded.iter().any(|req| req.matches(version))
    }
}

impl Constraint {
    /// Parse a constraint; an empty string accepts any version
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let source = if trimmed.is_empty() { "*" } else { trimmed };

        let alternatives = source
            .split("||")
            .map(|group| parse_alternative(group).map_err(|message| invalid(raw, message)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: source.to_string(),
            alternatives,
        })
    }

    /// Constraint text as written, `*` when empty
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(version))
    }

    /// Highest candidate satisfying the constraint
    ///
    /// Candidates that do not parse as versions are skipped. The original
    /// string is returned alongside the parsed version so tags such as
    /// `v1.2.0` can be used as-is.
    pub fn highest_match<'a, I>(&self, candidates: I) -> Option<(&'a str, Version)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter_map(|candidate| parse_version(candidate).map(|v| (candidate, v)))
            .filter(|(_, version)| self.matches(version))
            .max_by(|(_, a), (_, b)| a.cmp(b))
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn invalid(raw: &str, message: String) -> RepoError {
    RepoError::InvalidConstraint {
        constraint: raw.to_string(),
        message,
    }
}

/// Parse a version leniently: `v1.2.3`, `1.2` and `1` are accepted
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);
    let parts = core.split('.').count();
    if parts >= 3 || core.is_empty() {
        return None;
    }
    let padded = format!("{}{}{}", core, ".0".repeat(3 - parts), suffix);
    Version::parse(&padded).ok()
}

/// Whether `raw` is a complete semantic version such as `1.2.3` or `v1.2.3-rc.1`
pub fn is_exact_version(raw: &str) -> bool {
    let trimmed = raw.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).is_ok()
}

const OPERATORS: [&str; 9] = [">=", "<=", "!=", "~>", "=", ">", "<", "~", "^"];

fn parse_alternative(group: &str) -> std::result::Result<Alternative, String> {
    let tokens = tokenize(group);
    let mut required = Vec::new();
    let mut excluded = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        if tokens.get(i + 1).is_some_and(|t| t == "-") {
            let upper = tokens
                .get(i + 2)
                .ok_or_else(|| format!("incomplete range starting at {}", tokens[i]))?;
            required.push(format!(">={}", normalize_version(&tokens[i])?));
            required.push(format!("<={}", normalize_version(upper)?));
            i += 3;
            continue;
        }

        let token = &tokens[i];
        let (op, version) = split_operator(token);
        let version = normalize_version(version)?;
        match op {
            "!=" => {
                let req = VersionReq::parse(&format!("={}", version))
                    .map_err(|e| format!("{}: {}", token, e))?;
                excluded.push(req);
            }
            _ if version == "*" => {}
            "" | "=" => required.push(format!("={}", version)),
            "~>" => required.push(format!("~{}", version)),
            _ => required.push(format!("{}{}", op, version)),
        }
        i += 1;
    }

    let required = if required.is_empty() {
        VersionReq::STAR
    } else {
        VersionReq::parse(&required.join(", ")).map_err(|e| e.to_string())?
    };

    Ok(Alternative { required, excluded })
}

/// Split on spaces and commas, gluing a dangling operator to its version
fn tokenize(group: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for raw in group.split([' ', ',', '\t']).filter(|t| !t.is_empty()) {
        if raw.chars().all(|c| "<>=!~^".contains(c)) {
            pending_op = Some(pending_op.unwrap_or_default() + raw);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(op + raw),
            None => tokens.push(raw.to_string()),
        }
    }
    tokens
}

fn split_operator(token: &str) -> (&str, &str) {
    OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", token))
}

fn normalize_version(version: &str) -> std::result::Result<String, String> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    if version.is_empty() {
        return Err("missing version".to_string());
    }
    // A wildcard component is equivalent to leaving it out: `1.2.x` == `1.2`
    let parts: Vec<&str> = version
        .split('.')
        .take_while(|part| !matches!(*part, "x" | "X" | "*"))
        .collect();
    if parts.is_empty() {
        return Ok("*".to_string());
    }
    Ok(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_empty_constraint_matches_anything() {
        let constraint = Constraint::parse("").unwrap();
        assert_eq!(constraint.as_str(), "*");
        assert!(constraint.matches(&v("0.0.1")));
        assert!(constraint.matches(&v("99.1.0")));
    }

    #[test]
    fn test_bare_version_is_exact() {
        let constraint = Constraint::parse("1.2.3").unwrap();
        assert!(constraint.matches(&v("1.2.3")));
        assert!(!constraint.matches(&v("1.4.0")));
    }

    #[test]
    fn test_space_separated_range() {
        let constraint = Constraint::parse(">= 1.0 < 2.0").unwrap();
        assert!(constraint.matches(&v("1.5.0")));
        assert!(!constraint.matches(&v("2.0.0")));
        assert!(!constraint.matches(&v("0.9.0")));
    }

    #[test]
    fn test_alternatives_wildcards_and_exclusions() {
        let constraint = Constraint::parse("1.x || ~3.1, !=3.1.2").unwrap();
        assert!(constraint.matches(&v("1.9.0")));
        assert!(constraint.matches(&v("3.1.5")));
        assert!(!constraint.matches(&v("3.1.2")));
        assert!(!constraint.matches(&v("2.0.0")));

        assert!(Constraint::parse("~> 2.1").unwrap().matches(&v("2.1.7")));
    }

    #[test]
    fn test_hyphen_range() {
        let constraint = Constraint::parse("1.2 - 1.4.5").unwrap();
        assert!(constraint.matches(&v("1.2.0")));
        assert!(constraint.matches(&v("1.4.5")));
        assert!(!constraint.matches(&v("1.4.6")));
    }

    #[test]
    fn test_malformed_constraint() {
        let err = Constraint::parse(">=banana").unwrap_err();
        assert!(matches!(err, RepoError::InvalidConstraint { .. }));
        assert!(err.to_string().contains(">=banana"));
    }

    #[test]
    fn test_highest_match_keeps_original_text() {
        let constraint = Constraint::parse("^0.1.0").unwrap();
        let tags = ["v0.1.0", "0.1.4", "latest", "0.2.0", "v0.1.9"];
        let (tag, version) = constraint.highest_match(tags).unwrap();
        assert_eq!(tag, "v0.1.9");
        assert_eq!(version, v("0.1.9"));

        assert!(Constraint::parse(">=1.0.0").unwrap().highest_match(tags).is_none());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v1.2"), Some(v("1.2.0")));
        assert_eq!(parse_version("3"), Some(v("3.0.0")));
        assert_eq!(parse_version("1.0-rc.1"), Some(v("1.0.0-rc.1")));
        assert_eq!(parse_version("main"), None);

        assert!(is_exact_version("v1.2.3"));
        assert!(!is_exact_version("1.2"));
        assert!(!is_exact_version(">=1.2.3"));
    }
}
