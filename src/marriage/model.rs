use serde::{Deserialize, Serialize};

/// Snapshot of a guild member as the platform last reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: String,
    /// Account name.
    #[serde(default)]
    pub username: Option<String>,
    /// Account-wide display name.
    #[serde(default)]
    pub global_name: Option<String>,
    /// Nickname inside this guild.
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub guild_avatar: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl GroupMember {
    #[cfg(test)]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Guild nickname, then account display name, then account name.
    pub fn resolved_name(&self) -> Option<&str> {
        non_empty(&self.nick)
            .or_else(|| non_empty(&self.global_name))
            .or_else(|| non_empty(&self.username))
    }

    pub fn display_name(&self) -> String {
        self.resolved_name()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| self.user_id.clone())
    }

    /// Guild avatar first, account avatar otherwise.
    pub fn avatar_url(&self) -> Option<&str> {
        non_empty(&self.guild_avatar).or_else(|| non_empty(&self.avatar))
    }
}

/// Ids coming from system or bridged messages carry no real user.
pub fn is_real_user_id(user_id: &str) -> bool {
    let user_id = user_id.trim();
    !user_id.is_empty() && user_id != "0"
}

/// What a reply shows about a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerProfile {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl PartnerProfile {
    pub fn bare(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: user_id.to_string(),
            avatar: None,
        }
    }
}

impl From<&GroupMember> for PartnerProfile {
    fn from(member: &GroupMember) -> Self {
        Self {
            user_id: member.user_id.clone(),
            name: member.display_name(),
            avatar: member.avatar_url().map(ToOwned::to_owned),
        }
    }
}

/// Where a command came from and who sent it.
#[derive(Debug, Clone)]
pub struct CommandOrigin {
    /// `None` for direct messages.
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub message_id: Option<String>,
    /// The bot's own account id.
    pub self_id: String,
    pub author: GroupMember,
}

#[cfg(test)]
mod tests {
    use super::{GroupMember, PartnerProfile, is_real_user_id};

    fn member() -> GroupMember {
        GroupMember {
            user_id: "42".to_string(),
            username: Some("ferris".to_string()),
            global_name: Some("Ferris the Crab".to_string()),
            nick: Some("crab".to_string()),
            guild_avatar: Some("https://cdn/guild.png".to_string()),
            avatar: Some("https://cdn/user.png".to_string()),
            bot: false,
        }
    }

    #[test]
    fn name_prefers_guild_nick_then_global_then_username() {
        let mut m = member();
        assert_eq!(m.display_name(), "crab");
        m.nick = Some("   ".to_string());
        assert_eq!(m.display_name(), "Ferris the Crab");
        m.global_name = None;
        assert_eq!(m.display_name(), "ferris");
        m.username = None;
        assert_eq!(m.display_name(), "42");
        assert!(m.resolved_name().is_none());
    }

    #[test]
    fn avatar_prefers_guild_avatar() {
        let mut m = member();
        assert_eq!(m.avatar_url(), Some("https://cdn/guild.png"));
        m.guild_avatar = None;
        assert_eq!(m.avatar_url(), Some("https://cdn/user.png"));
        m.avatar = None;
        assert_eq!(m.avatar_url(), None);
    }

    #[test]
    fn profile_from_member_uses_resolved_fields() {
        let profile = PartnerProfile::from(&member());
        assert_eq!(profile.user_id, "42");
        assert_eq!(profile.name, "crab");
        assert_eq!(profile.avatar.as_deref(), Some("https://cdn/guild.png"));
    }

    #[test]
    fn sentinel_ids_are_not_real_users() {
        assert!(!is_real_user_id(""));
        assert!(!is_real_user_id("0"));
        assert!(is_real_user_id("1234"));
    }

    #[test]
    fn snapshot_decodes_with_missing_fields() {
        let decoded: GroupMember = serde_json::from_str(r#"{"user_id":"7"}"#).unwrap();
        assert_eq!(decoded, GroupMember::new("7"));
    }
}
