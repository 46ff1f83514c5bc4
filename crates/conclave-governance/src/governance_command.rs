pub const GOVERNANCE_COMMAND_PREFIX: &str = "/conclave";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceCommand {
    /// Open the next voting round for the issue.
    Vote,
    /// Resolve the open voting round now.
    Tally,
    /// Post the full merge-readiness report on a pull request.
    Preflight,
}

impl GovernanceCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vote => "vote",
            Self::Tally => "tally",
            Self::Preflight => "preflight",
        }
    }
}

pub fn governance_command_usage() -> String {
    format!(
        "Usage: `{GOVERNANCE_COMMAND_PREFIX} vote`, `{GOVERNANCE_COMMAND_PREFIX} tally`, or `{GOVERNANCE_COMMAND_PREFIX} preflight`"
    )
}

/// Parses the first non-empty line of a comment.
///
/// Returns `None` when the comment is not addressed to this automation and
/// `Some(Err(usage))` when it is addressed but not understood.
pub fn parse_governance_command(body: &str) -> Option<Result<GovernanceCommand, String>> {
    let line = body.lines().map(str::trim).find(|line| !line.is_empty())?;
    let rest = line.strip_prefix(GOVERNANCE_COMMAND_PREFIX)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut tokens = rest.split_whitespace();
    let command = match tokens.next().map(str::to_ascii_lowercase).as_deref() {
        Some("vote") => GovernanceCommand::Vote,
        Some("tally") => GovernanceCommand::Tally,
        Some("preflight") => GovernanceCommand::Preflight,
        _ => return Some(Err(governance_command_usage())),
    };
    if tokens.next().is_some() {
        return Some(Err(governance_command_usage()));
    }
    Some(Ok(command))
}

#[cfg(test)]
mod tests {
    use super::{parse_governance_command, GovernanceCommand};

    #[test]
    fn unit_parse_governance_command_ignores_unaddressed_comments() {
        assert!(parse_governance_command("I think we should vote").is_none());
        assert!(parse_governance_command("/conclaves vote").is_none());
        assert!(parse_governance_command("").is_none());
    }

    #[test]
    fn functional_parse_governance_command_reads_first_non_empty_line() {
        assert_eq!(
            parse_governance_command("\n  /conclave VOTE  \nthanks"),
            Some(Ok(GovernanceCommand::Vote))
        );
        assert_eq!(
            parse_governance_command("/conclave tally"),
            Some(Ok(GovernanceCommand::Tally))
        );
        assert_eq!(
            parse_governance_command("/conclave preflight"),
            Some(Ok(GovernanceCommand::Preflight))
        );
    }

    #[test]
    fn regression_parse_governance_command_reports_usage_for_unknown_or_extra_args() {
        for body in ["/conclave", "/conclave merge", "/conclave vote now"] {
            let parsed = parse_governance_command(body).expect("addressed");
            assert!(parsed.expect_err("usage").contains("Usage"));
        }
    }
}
