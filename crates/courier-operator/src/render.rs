use serde_json::Value;

use crate::client::ClientSummary;

const NAME_WIDTH: usize = 20;

pub fn clients_table(clients: &[ClientSummary]) -> String {
    if clients.is_empty() {
        return "No clients registered.".to_string();
    }
    let header = format!(
        "{:3} {:36}  {:20}  {:7}  Last seen",
        "#", "Client ID", "Name", "Status"
    );
    let mut lines = vec![header.clone(), "-".repeat(header.chars().count())];
    for (idx, client) in clients.iter().enumerate() {
        lines.push(format!(
            "{:3} {:36}  {:20}  {:7}  {}",
            idx + 1,
            client.id,
            clip(client.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("-")),
            client.status.as_deref().unwrap_or("?"),
            client.last_seen_at.as_deref().unwrap_or("never"),
        ));
    }
    lines.join("\n")
}

fn clip(name: &str) -> String {
    if name.chars().count() <= NAME_WIDTH {
        return name.to_string();
    }
    let head: String = name.chars().take(NAME_WIDTH - 3).collect();
    format!("{head}...")
}

/// `[id] created_at -> type: payload`; `<-` marks a message a client addressed to itself.
pub fn message_line(message: &Value) -> String {
    let direction = if message.get("from_client_id") == message.get("to_client_id") {
        "<-"
    } else {
        "->"
    };
    let id = match message.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    };
    let kind = message.get("type").and_then(Value::as_str).unwrap_or("?");
    let created_at = message
        .get("created_at")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let payload = message
        .get("payload")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    format!("[{id}] {created_at} {direction} {kind}: {payload}")
}
