use super::model::PartnerProfile;

/// Outcome of a marriage command, rendered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarriageReply {
    NotInGuild,
    TooFewMembers,
    Married {
        partner: PartnerProfile,
    },
    AlreadyMarried {
        partner: PartnerProfile,
    },
    TargetIsSelf,
    TargetTaken {
        target: PartnerProfile,
    },
    ProposalPrompt {
        requester: PartnerProfile,
        target_id: String,
        accept: String,
        decline: String,
    },
    ProposalAccepted {
        partner: PartnerProfile,
    },
    ProposalDeclined {
        target: PartnerProfile,
    },
    ProposalConflict {
        target: PartnerProfile,
    },
    Divorced {
        partner: PartnerProfile,
    },
    NotMarried,
    PartnerChanged {
        partner: PartnerProfile,
        last_change: bool,
    },
    ChangeQuotaExhausted {
        max: u32,
    },
    CurrentPartner {
        partner: PartnerProfile,
    },
    Usage {
        usage: String,
    },
}

/// Platform independent message layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedReply {
    pub text: String,
    /// User to mention ahead of the text.
    pub mention: Option<String>,
    pub image: Option<String>,
    /// Reply to the triggering message.
    pub quote: bool,
}

impl RenderedReply {
    fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quote: true,
            ..Self::default()
        }
    }

    fn with_image(mut self, image: &Option<String>) -> Self {
        self.image = image.clone();
        self
    }
}

impl MarriageReply {
    pub fn render(&self) -> RenderedReply {
        match self {
            Self::NotInGuild => RenderedReply::quoted("This only works inside a server."),
            Self::TooFewMembers => {
                RenderedReply::quoted("There aren't enough members here to pick a partner from.")
            }
            Self::Married { partner } => RenderedReply::quoted(format!(
                "Your partner for today is **{}**!",
                partner.name
            ))
            .with_image(&partner.avatar),
            Self::AlreadyMarried { partner } => RenderedReply::quoted(format!(
                "You already have a partner: **{}**.",
                partner.name
            ))
            .with_image(&partner.avatar),
            Self::TargetIsSelf => RenderedReply::quoted("You can't marry yourself."),
            Self::TargetTaken { target } => RenderedReply::quoted(format!(
                "**{}** already has a partner.",
                target.name
            )),
            Self::ProposalPrompt {
                requester,
                target_id,
                accept,
                decline,
            } => RenderedReply {
                text: format!(
                    "**{}** wants to marry you! Reply `{accept}` or `{decline}`.",
                    requester.name
                ),
                mention: Some(target_id.clone()),
                image: requester.avatar.clone(),
                quote: false,
            },
            Self::ProposalAccepted { partner } => RenderedReply::quoted(format!(
                "**{}** said yes! You are now married.",
                partner.name
            ))
            .with_image(&partner.avatar),
            Self::ProposalDeclined { target } => {
                RenderedReply::quoted(format!("**{}** turned you down.", target.name))
            }
            Self::ProposalConflict { target } => RenderedReply::quoted(format!(
                "**{}** was taken by someone else while you waited.",
                target.name
            )),
            Self::Divorced { partner } => {
                RenderedReply::quoted(format!("You and **{}** are divorced.", partner.name))
            }
            Self::NotMarried => RenderedReply::quoted("You don't have a partner right now."),
            Self::PartnerChanged {
                partner,
                last_change,
            } => {
                let mut text = format!("Your new partner is **{}**!", partner.name);
                if *last_change {
                    text.push_str(" That was your last change for today.");
                }
                RenderedReply::quoted(text).with_image(&partner.avatar)
            }
            Self::ChangeQuotaExhausted { max } => RenderedReply::quoted(format!(
                "You've used all {max} partner changes for today."
            )),
            Self::CurrentPartner { partner } => RenderedReply::quoted(format!(
                "Your current partner is **{}**.",
                partner.name
            ))
            .with_image(&partner.avatar),
            Self::Usage { usage } => RenderedReply::quoted(format!("Usage: `{usage}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MarriageReply;
    use crate::marriage::model::PartnerProfile;

    fn partner() -> PartnerProfile {
        PartnerProfile {
            user_id: "2".to_string(),
            name: "Bea".to_string(),
            avatar: Some("https://cdn/bea.png".to_string()),
        }
    }

    #[test]
    fn marriage_carries_name_and_avatar() {
        let rendered = MarriageReply::Married { partner: partner() }.render();
        assert!(rendered.text.contains("Bea"));
        assert_eq!(rendered.image.as_deref(), Some("https://cdn/bea.png"));
        assert!(rendered.quote);
        assert!(rendered.mention.is_none());
    }

    #[test]
    fn proposal_prompt_mentions_the_target() {
        let rendered = MarriageReply::ProposalPrompt {
            requester: partner(),
            target_id: "9".to_string(),
            accept: "yes".to_string(),
            decline: "no".to_string(),
        }
        .render();
        assert_eq!(rendered.mention.as_deref(), Some("9"));
        assert!(rendered.text.contains("`yes`"));
        assert!(rendered.text.contains("`no`"));
        assert!(!rendered.quote);
    }

    #[test]
    fn last_change_is_announced() {
        let last = MarriageReply::PartnerChanged {
            partner: partner(),
            last_change: true,
        }
        .render();
        let not_last = MarriageReply::PartnerChanged {
            partner: partner(),
            last_change: false,
        }
        .render();
        assert!(last.text.contains("last change"));
        assert!(!not_last.text.contains("last change"));
    }
}
