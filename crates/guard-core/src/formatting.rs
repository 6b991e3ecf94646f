use crate::domain::UserId;

/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Clickable mention of a user.
pub fn mention_html(user_id: UserId, name: &str) -> String {
    let name = if name.trim().is_empty() {
        user_id.0.to_string()
    } else {
        name.to_string()
    };
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user_id.0,
        escape_html(&name)
    )
}
