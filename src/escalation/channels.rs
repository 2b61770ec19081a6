//! Recipient addresses per channel

use crate::models::{ChannelType, User};

/// `whatsapp:+<digits>` with spaces, dashes and parentheses removed
pub fn whatsapp_address(phone: &str) -> Option<String> {
    let cleaned: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    if cleaned.starts_with("whatsapp:") {
        return Some(cleaned);
    }
    match cleaned.strip_prefix('+') {
        Some("") => None,
        Some(_) => Some(format!("whatsapp:{}", cleaned)),
        None => Some(format!("whatsapp:+{}", cleaned)),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Where to reach the user on a channel, if they can be reached there
pub fn address_for(user: &User, channel: ChannelType) -> Option<String> {
    match channel {
        ChannelType::Gmail => non_empty(&user.email).map(str::to_string),
        ChannelType::Whatsapp => non_empty(&user.phone).and_then(whatsapp_address),
        ChannelType::Slack => non_empty(&user.slack_id).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_whatsapp_formatting() {
        assert_eq!(whatsapp_address("+57 (300) 123-4567").as_deref(), Some("whatsapp:+573001234567"));
        assert_eq!(whatsapp_address("573001234567").as_deref(), Some("whatsapp:+573001234567"));
        assert_eq!(whatsapp_address("whatsapp:+1555").as_deref(), Some("whatsapp:+1555"));
        assert_eq!(whatsapp_address(" - "), None);
    }

    #[test]
    fn test_address_for_user() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            email: Some("ana@example.com".to_string()),
            phone: None,
            slack_id: Some("  ".to_string()),
            user_type: "YUNO".to_string(),
            active: true,
        };
        assert_eq!(address_for(&user, ChannelType::Gmail).as_deref(), Some("ana@example.com"));
        assert_eq!(address_for(&user, ChannelType::Whatsapp), None);
        assert_eq!(address_for(&user, ChannelType::Slack), None);
    }
}
