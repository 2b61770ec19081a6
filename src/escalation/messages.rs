//! Guard and escalation message rendering

use crate::models::{ChannelType, RiskNotification, User};

/// WhatsApp rejects longer bodies
pub const WHATSAPP_MAX_CHARS: usize = 1600;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Values that appear in every guard message
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub backend_url: &'a str,
    pub max_attempts: i32,
    pub retry_minutes: i64,
}

fn truncate_chars(body: String, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body,
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

fn links(n: &RiskNotification, guard: &User, ctx: &GuardContext<'_>) -> (String, String) {
    let base = ctx.backend_url.trim_end_matches('/');
    let propagate = format!("{}/api/v1/risk-notifications/{}/propagate", base, n.id);
    let dismiss = format!(
        "{}/api/v1/risk-notifications/{}/dismiss?user_id={}&reason=False%20positive",
        base, n.id, guard.id
    );
    (propagate, dismiss)
}

pub fn guard_message(
    n: &RiskNotification,
    guard: &User,
    channel: ChannelType,
    ctx: &GuardContext<'_>,
) -> RenderedMessage {
    let subject = format!(
        "[GUARD] Risk {}: {}",
        n.risk_level.as_str().to_uppercase(),
        n.entity_name
    );

    let body = match channel {
        ChannelType::Gmail => guard_html(n, guard, ctx),
        ChannelType::Whatsapp => truncate_chars(guard_text(n, guard, ctx), WHATSAPP_MAX_CHARS),
        ChannelType::Slack => guard_text(n, guard, ctx),
    };

    RenderedMessage { subject, body }
}

pub fn escalation_message(n: &RiskNotification, channel: ChannelType) -> RenderedMessage {
    match channel {
        ChannelType::Gmail => RenderedMessage {
            subject: format!("[CRITICAL] Risk detected: {}", n.entity_name),
            body: escalation_html(n),
        },
        ChannelType::Whatsapp => RenderedMessage {
            subject: format!("[CRITICAL] {}", n.entity_name),
            body: truncate_chars(escalation_text(n), WHATSAPP_MAX_CHARS),
        },
        ChannelType::Slack => RenderedMessage {
            subject: format!("[CRITICAL] {}", n.entity_name),
            body: escalation_text(n),
        },
    }
}

fn guard_text(n: &RiskNotification, guard: &User, ctx: &GuardContext<'_>) -> String {
    let (propagate, dismiss) = links(n, guard, ctx);
    let mut lines = vec![
        "*RISK ALERT - Action required*".to_string(),
        String::new(),
        format!("Hi *{}*,", guard.name),
        "A risk has been detected that requires your attention as the on-call guard:".to_string(),
        String::new(),
        format!("*{}* - {}", n.risk_level.as_str().to_uppercase(), n.entity_name),
        format!("*Type:* {}", n.entity_type),
        format!("*Failure probability:* {}", percent(n.probability, 1)),
        format!("*Attempt:* {} of {}", n.guard_attempts, ctx.max_attempts),
    ];

    if let Some(meta) = &n.metadata {
        let b = &meta.baseline_comparison;
        lines.push(String::new());
        lines.push("*Baseline comparison:*".to_string());
        lines.push(format!("- Current error rate: {}", percent(b.current_error_rate, 2)));
        lines.push(format!("- Baseline error rate: {}", percent(b.baseline_error_rate, 2)));
        lines.push(format!("- Deviation: {:.1}%", b.deviation_percentage));

        lines.push(String::new());
        lines.push("*Trend:*".to_string());
        lines.push(format!("- Direction: *{}*", meta.trend.direction.as_str()));

        if !meta.recommended_actions.is_empty() {
            lines.push(String::new());
            lines.push("*Recommended actions:*".to_string());
            lines.extend(meta.recommended_actions.iter().map(|a| format!("- {}", a)));
        }
    }

    lines.push(String::new());
    lines.push(format!("Propagate: {}", propagate));
    lines.push(format!("Dismiss: {}", dismiss));
    lines.push(String::new());
    lines.push(format!(
        "If you don't respond within {} minutes, another reminder will be sent. After {} attempts, it will be escalated automatically.",
        ctx.retry_minutes, ctx.max_attempts
    ));

    lines.join("\n")
}

fn guard_html(n: &RiskNotification, guard: &User, ctx: &GuardContext<'_>) -> String {
    let (propagate, dismiss) = links(n, guard, ctx);
    let mut details = String::new();

    if let Some(meta) = &n.metadata {
        let b = &meta.baseline_comparison;
        details.push_str(&format!(
            "<h4>Baseline comparison</h4><ul><li>Current error rate: {}</li><li>Baseline error rate: {}</li><li>Deviation: {:.1}%</li></ul>",
            percent(b.current_error_rate, 2),
            percent(b.baseline_error_rate, 2),
            b.deviation_percentage
        ));
        details.push_str(&format!(
            "<h4>Trend</h4><p>Direction: <strong>{}</strong></p>",
            meta.trend.direction.as_str()
        ));
        if !meta.recommended_actions.is_empty() {
            let items: String = meta
                .recommended_actions
                .iter()
                .map(|a| format!("<li>{}</li>", escape_html(a)))
                .collect();
            details.push_str(&format!("<h4>Recommended actions</h4><ul>{}</ul>", items));
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2 style="background: #f44336; color: white; padding: 16px;">RISK ALERT - Action Required</h2>
  <p>Hello <strong>{guard}</strong>,</p>
  <p>A risk has been detected that requires your attention as the on-call guard:</p>
  <h3>{level} {name}</h3>
  <p><strong>Type:</strong> {entity_type}</p>
  <p><strong>Failure probability:</strong> {probability}</p>
  <p><strong>Attempt:</strong> {attempt} of {max}</p>
  {details}
  <p>
    <a href="{propagate}">Propagate to the team</a> |
    <a href="{dismiss}">Dismiss as false positive</a>
  </p>
  <p style="color: #f44336;">If you don't respond within {retry} minutes, another reminder will be sent.
  After {max} attempts, it will be automatically escalated to the entire team.</p>
</body>
</html>"#,
        guard = escape_html(&guard.name),
        level = n.risk_level.as_str().to_uppercase(),
        name = escape_html(&n.entity_name),
        entity_type = n.entity_type,
        probability = percent(n.probability, 1),
        attempt = n.guard_attempts,
        max = ctx.max_attempts,
        details = details,
        propagate = propagate,
        dismiss = dismiss,
        retry = ctx.retry_minutes,
    )
}

fn escalation_text(n: &RiskNotification) -> String {
    let mut lines = vec![
        "*CRITICAL ALERT ESCALATED*".to_string(),
        String::new(),
        "*IMMEDIATE ATTENTION REQUIRED*".to_string(),
        format!(
            "This alert was escalated after {} unanswered on-call guard attempts.",
            n.guard_attempts
        ),
        String::new(),
        format!("*Entity at Risk:* {}", n.entity_name),
        format!("*Type:* {}", n.entity_type),
        format!("*Risk Level:* {}", n.risk_level.as_str().to_uppercase()),
        format!("*Failure probability:* {}", percent(n.probability, 1)),
    ];

    if let Some(meta) = n.metadata.as_ref().filter(|m| !m.recommended_actions.is_empty()) {
        lines.push(String::new());
        lines.push("*Recommended actions:*".to_string());
        lines.extend(meta.recommended_actions.iter().map(|a| format!("- {}", a)));
    }

    lines.push(String::new());
    lines.push("Go to the application to decide what to do.".to_string());
    lines.join("\n")
}

fn escalation_html(n: &RiskNotification) -> String {
    let actions = match n.metadata.as_ref().filter(|m| !m.recommended_actions.is_empty()) {
        Some(meta) => {
            let items: String = meta
                .recommended_actions
                .iter()
                .map(|a| format!("<li>{}</li>", escape_html(a)))
                .collect();
            format!("<h4>Recommended actions</h4><ul>{}</ul>", items)
        }
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <h2 style="background: #d32f2f; color: white; padding: 16px;">CRITICAL ALERT ESCALATED</h2>
  <p><strong>IMMEDIATE ATTENTION REQUIRED.</strong>
  This alert was escalated after {attempts} unanswered on-call guard attempts.</p>
  <h3>Entity at Risk: {name}</h3>
  <p><strong>Type:</strong> {entity_type}</p>
  <p><strong>Risk Level:</strong> {level}</p>
  <p><strong>Failure probability:</strong> {probability}</p>
  {actions}
  <p>Go to the application to decide what to do.</p>
</body>
</html>"#,
        attempts = n.guard_attempts,
        name = escape_html(&n.entity_name),
        entity_type = n.entity_type,
        level = n.risk_level.as_str().to_uppercase(),
        probability = percent(n.probability, 1),
        actions = actions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BaselineComparison, EntityType, RiskLevel, RiskMetadata, Trend, TrendDirection,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn notification(actions: Vec<String>) -> RiskNotification {
        let now = Utc::now();
        RiskNotification {
            id: Uuid::new_v4(),
            entity_type: EntityType::Provider,
            entity_id: "p1".to_string(),
            entity_name: "Acme <Pay>".to_string(),
            risk_level: RiskLevel::High,
            probability: 0.634,
            status: crate::models::RiskStatus::GuardNotified,
            guard_attempts: 2,
            last_guard_notification: Some(now),
            guard_user_id: None,
            escalated_to_all: false,
            escalated_at: None,
            dismissed_by_guard: false,
            dismissed_by_user_id: None,
            dismissed_at: None,
            dismissal_reason: None,
            resolved: false,
            resolved_at: None,
            metadata: Some(RiskMetadata {
                signals: vec![],
                baseline_comparison: BaselineComparison {
                    current_error_rate: 0.25,
                    baseline_error_rate: 0.05,
                    deviation_percentage: 400.0,
                },
                trend: Trend { direction: TrendDirection::Degrading, rate_of_change: 0.2 },
                recommended_actions: actions,
            }),
            created_at: now,
            updated_at: now,
        }
    }

    fn guard() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            email: Some("ana@example.com".to_string()),
            phone: Some("+573001234567".to_string()),
            slack_id: None,
            user_type: "YUNO".to_string(),
            active: true,
        }
    }

    const CTX: GuardContext<'static> = GuardContext {
        backend_url: "https://risk.example.com/",
        max_attempts: 3,
        retry_minutes: 10,
    };

    #[test]
    fn test_guard_email_contents() {
        let n = notification(vec!["Verify system load".to_string()]);
        let g = guard();
        let msg = guard_message(&n, &g, ChannelType::Gmail, &CTX);

        assert_eq!(msg.subject, "[GUARD] Risk HIGH: Acme <Pay>");
        assert!(msg.body.contains("Acme &lt;Pay&gt;"));
        assert!(msg.body.contains("63.4%"));
        assert!(msg.body.contains("2 of 3"));
        assert!(msg.body.contains("25.00%"));
        assert!(msg.body.contains(&format!(
            "https://risk.example.com/api/v1/risk-notifications/{}/dismiss?user_id={}",
            n.id, g.id
        )));
        assert!(msg.body.contains("<li>Verify system load</li>"));
    }

    #[test]
    fn test_whatsapp_body_is_truncated() {
        let n = notification(vec!["x".repeat(400); 8]);
        let msg = guard_message(&n, &guard(), ChannelType::Whatsapp, &CTX);
        assert_eq!(msg.body.chars().count(), WHATSAPP_MAX_CHARS);

        let esc = escalation_message(&n, ChannelType::Whatsapp);
        assert_eq!(esc.body.chars().count(), WHATSAPP_MAX_CHARS);
        assert_eq!(esc.subject, "[CRITICAL] Acme <Pay>");
    }

    #[test]
    fn test_escalation_mentions_attempts() {
        let n = notification(vec![]);
        let msg = escalation_message(&n, ChannelType::Gmail);
        assert_eq!(msg.subject, "[CRITICAL] Risk detected: Acme <Pay>");
        assert!(msg.body.contains("after 2 unanswered"));
        assert!(!msg.body.contains("Recommended actions"));
    }
}
