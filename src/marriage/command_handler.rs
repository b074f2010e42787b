use std::sync::LazyLock;

use regex::Regex;

static USER_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:<@!?(\d+)>|(\d+))$").expect("user reference pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarriageCommand {
    Marry,
    ForceMarry { target_id: String },
    Propose { target_id: String },
    Divorce,
    ChangePartner,
    Query,
    Usage { usage: &'static str },
}

pub struct MarriageCommandHandler {
    prefix: String,
}

impl MarriageCommandHandler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn is_command(&self, content: &str) -> bool {
        content.trim_start().starts_with(&self.prefix)
    }

    /// Parses a prefixed command. Unrelated messages yield `None`.
    pub fn parse(&self, content: &str) -> Option<MarriageCommand> {
        let body = content.trim().strip_prefix(&self.prefix)?;
        let mut parts = body.split_whitespace();
        let name = parts.next()?.to_ascii_lowercase();
        let target = parts.next().and_then(parse_user_reference);

        let command = match name.as_str() {
            "marry" | "waifu" => MarriageCommand::Marry,
            "force-marry" | "forcemarry" => match target {
                Some(target_id) => MarriageCommand::ForceMarry { target_id },
                None => MarriageCommand::Usage {
                    usage: "force-marry <@user>",
                },
            },
            "propose" => match target {
                Some(target_id) => MarriageCommand::Propose { target_id },
                None => MarriageCommand::Usage {
                    usage: "propose <@user>",
                },
            },
            "divorce" => MarriageCommand::Divorce,
            "change-waifu" | "changewaifu" => MarriageCommand::ChangePartner,
            "my-waifu" | "mywaifu" => MarriageCommand::Query,
            _ => return None,
        };
        Some(command)
    }
}

/// Accepts `<@id>`, `<@!id>` or a bare numeric id.
pub fn parse_user_reference(raw: &str) -> Option<String> {
    let captures = USER_REFERENCE.captures(raw.trim())?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|id| id != "0")
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{MarriageCommand, MarriageCommandHandler, parse_user_reference};

    fn handler() -> MarriageCommandHandler {
        MarriageCommandHandler::new("!")
    }

    #[test_case("!marry", MarriageCommand::Marry ; "marry")]
    #[test_case("  !WAIFU  ", MarriageCommand::Marry ; "alias is case insensitive")]
    #[test_case("!divorce", MarriageCommand::Divorce ; "divorce")]
    #[test_case("!change-waifu", MarriageCommand::ChangePartner ; "change partner")]
    #[test_case("!my-waifu", MarriageCommand::Query ; "query")]
    #[test_case("!force-marry <@123>", MarriageCommand::ForceMarry { target_id: "123".to_string() } ; "force with mention")]
    #[test_case("!propose <@!456>", MarriageCommand::Propose { target_id: "456".to_string() } ; "propose with nick mention")]
    #[test_case("!propose 789", MarriageCommand::Propose { target_id: "789".to_string() } ; "propose with raw id")]
    #[test_case("!propose", MarriageCommand::Usage { usage: "propose <@user>" } ; "propose without target")]
    #[test_case("!force-marry bob", MarriageCommand::Usage { usage: "force-marry <@user>" } ; "force with junk target")]
    fn parses_commands(input: &str, expected: MarriageCommand) {
        assert_eq!(handler().parse(input), Some(expected));
    }

    #[test_case("marry" ; "missing prefix")]
    #[test_case("!" ; "bare prefix")]
    #[test_case("!dance" ; "unknown command")]
    #[test_case("hello !marry" ; "prefix mid sentence")]
    fn ignores_non_commands(input: &str) {
        assert_eq!(handler().parse(input), None);
    }

    #[test]
    fn custom_prefix_is_honoured() {
        let handler = MarriageCommandHandler::new("w/");
        assert!(handler.is_command("w/marry"));
        assert_eq!(handler.parse("w/marry"), Some(MarriageCommand::Marry));
        assert_eq!(handler.parse("!marry"), None);
    }

    #[test_case("<@0>" ; "zero mention")]
    #[test_case("<#123>" ; "channel mention")]
    #[test_case("12a" ; "not numeric")]
    fn rejects_bad_user_references(raw: &str) {
        assert_eq!(parse_user_reference(raw), None);
    }
}
