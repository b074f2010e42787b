use serenity::all::{Member, Message, User};

use crate::marriage::GroupMember;

pub fn user_to_group(user: &User) -> GroupMember {
    GroupMember {
        user_id: user.id.to_string(),
        username: Some(user.name.clone()),
        global_name: user.global_name.clone(),
        nick: None,
        guild_avatar: None,
        avatar: user.avatar_url(),
        bot: user.bot,
    }
}

pub fn member_to_group(member: &Member) -> GroupMember {
    GroupMember {
        nick: member.nick.clone(),
        guild_avatar: member.avatar_url(),
        ..user_to_group(&member.user)
    }
}

/// The author of a message, with the guild nickname when the gateway sent
/// one along.
pub fn message_author(msg: &Message) -> GroupMember {
    GroupMember {
        nick: msg.member.as_ref().and_then(|member| member.nick.clone()),
        ..user_to_group(&msg.author)
    }
}

/// Mention prefix followed by the reply text.
pub fn reply_content(mention: Option<&str>, text: &str) -> String {
    match mention {
        Some(user_id) => format!("<@{user_id}> {text}"),
        None => text.to_string(),
    }
}

/// Parses a Discord snowflake. Zero is rejected since the model types
/// cannot hold it.
pub fn parse_snowflake(kind: &str, raw: &str) -> anyhow::Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => anyhow::bail!("invalid {kind} id: {raw}"),
        Ok(id) => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{parse_snowflake, reply_content};

    #[test]
    fn mention_goes_first() {
        assert_eq!(reply_content(Some("42"), "hi"), "<@42> hi");
        assert_eq!(reply_content(None, "hi"), "hi");
    }

    #[test_case("0" ; "zero")]
    #[test_case("" ; "empty")]
    #[test_case("abc" ; "not numeric")]
    #[test_case("-5" ; "negative")]
    fn bad_snowflakes_are_rejected(raw: &str) {
        assert!(parse_snowflake("user", raw).is_err());
    }

    #[test]
    fn snowflake_parses() {
        assert_eq!(parse_snowflake("guild", " 80351110224678912 ").unwrap(), 80351110224678912);
    }
}
